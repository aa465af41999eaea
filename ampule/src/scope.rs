/// Defines the lifecycle scope of a provider in the resolution engine.
///
/// This determines when and how often provider instances are created:
/// - **Singleton**: Created once per container, shared across all flows
/// - **Session**: Created once per session scope, shared within that session
/// - **Request**: Created once per request scope, shared within that request
/// - **Transient**: Created every time it's resolved, never cached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Created once per container and reused by every flow that resolves it.
    /// Lives until `clear_singletons()` or container teardown.
    ///
    /// **Use for:** connection pools, configuration, stateless services
    Singleton,

    /// Created once per session scope and shared within it. Destroyed when
    /// the session scope exits. Sessions may nest; the innermost open
    /// session receives writes.
    Session,

    /// Created once per request scope and shared within it. Destroyed when
    /// the request scope exits. Requests nest within sessions.
    Request,

    /// Created every time it's resolved. Never cached, never given a
    /// container-managed cleanup action.
    ///
    /// **Use for:** one-off stateful values, non-shareable helpers
    Transient,
}

impl Default for Scope {
    fn default() -> Self {
        Self::Transient
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Singleton => write!(f, "singleton"),
            Self::Session => write!(f, "session"),
            Self::Request => write!(f, "request"),
            Self::Transient => write!(f, "transient"),
        }
    }
}

impl std::str::FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "singleton" => Ok(Self::Singleton),
            "session" => Ok(Self::Session),
            "request" => Ok(Self::Request),
            "transient" => Ok(Self::Transient),
            _ => Err(format!(
                "Invalid scope: '{}'. Must be 'singleton', 'session', 'request', or 'transient'",
                s
            )),
        }
    }
}
