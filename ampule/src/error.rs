//! Error taxonomy for registration, resolution, and teardown.
//!
//! Factory errors are carried verbatim as [`anyhow::Error`] so callers can
//! downcast to their own domain errors; everything the engine itself raises
//! is a typed variant.

use thiserror::Error;

use crate::scope::Scope;
use crate::token::Key;

/// Top-level error type returned by every fallible container operation.
#[derive(Debug, Error)]
pub enum Error {
    /// The engine could not resolve a token (missing provider, async-only
    /// provider on the sync path, registration conflict, ...).
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// A token's resolution re-entered itself transitively.
    #[error(transparent)]
    Circular(#[from] CircularDependencyError),

    /// One or more cleanup actions failed while draining a scope.
    #[error(transparent)]
    Cleanup(#[from] CleanupError),

    /// A provider factory returned an error. Propagated verbatim.
    #[error(transparent)]
    Factory(#[from] anyhow::Error),

    /// A type was requested from a [`Dependencies`](crate::Dependencies) set
    /// that never declared it. Distinct from a resolution failure: the set
    /// membership is fixed at construction time.
    #[error("type `{requested}` is not part of this dependency set (members: {members})")]
    NotInSet {
        requested: &'static str,
        members: String,
    },
}

impl Error {
    /// Converts an error coming back out of a factory call.
    ///
    /// Engine errors raised by nested resolutions travel through the
    /// factory's `anyhow::Result` and are unwrapped back into their typed
    /// form; genuine factory errors stay verbatim.
    pub(crate) fn from_factory(err: anyhow::Error) -> Self {
        match err.downcast::<Error>() {
            Ok(inner) => inner,
            Err(err) => Error::Factory(err),
        }
    }
}

/// Why a token could not be resolved or registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionKind {
    /// No provider record exists for the token.
    NotRegistered,
    /// The provider is async-only and was invoked from the sync path.
    AsyncOnlyProvider,
    /// The cached instance could not be downcast to the requested type.
    TypeMismatch,
    /// The token is already registered under a different declared scope.
    ScopeConflict { existing: Scope, requested: Scope },
    /// The scope kind cannot be entered as a layer (singleton/transient).
    NotEnterable(Scope),
}

impl std::fmt::Display for ResolutionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotRegistered => write!(f, "no provider registered"),
            Self::AsyncOnlyProvider => {
                write!(f, "provider is async; use `aget` to resolve it")
            }
            Self::TypeMismatch => write!(f, "cached instance has a different type"),
            Self::ScopeConflict {
                existing,
                requested,
            } => write!(
                f,
                "already registered with scope `{existing}`, re-registration requested `{requested}`"
            ),
            Self::NotEnterable(scope) => {
                write!(f, "scope `{scope}` cannot be entered as a layer")
            }
        }
    }
}

/// A token has no usable provider for the attempted resolution path.
///
/// Always names the offending token.
#[derive(Debug, Error)]
#[error("cannot resolve token `{token}`: {kind}")]
pub struct ResolutionError {
    /// Rendered identity of the offending token.
    pub token: String,
    pub kind: ResolutionKind,
}

impl ResolutionError {
    pub(crate) fn new(key: &Key, kind: ResolutionKind) -> Self {
        Self {
            token: key.to_string(),
            kind,
        }
    }

    pub(crate) fn not_registered(key: &Key) -> Self {
        Self::new(key, ResolutionKind::NotRegistered)
    }

    pub(crate) fn async_only(key: &Key) -> Self {
        Self::new(key, ResolutionKind::AsyncOnlyProvider)
    }
}

/// A resolution chain re-entered a token that is still under construction.
///
/// The chain lists every token on the active resolution path, ending with
/// the re-entered token.
#[derive(Debug, Error)]
#[error("circular dependency detected: {}", .chain.join(" -> "))]
pub struct CircularDependencyError {
    pub chain: Vec<String>,
}

/// One or more teardown actions failed while a scope drained.
///
/// Every action in the drain still ran (or was recorded as unrunnable, for
/// async actions hit by a sync drain); the individual failures are collected
/// here rather than silently swallowed.
#[derive(Debug, Error)]
#[error("{} cleanup action(s) failed during scope teardown", .errors.len())]
pub struct CleanupError {
    errors: Vec<anyhow::Error>,
}

impl CleanupError {
    pub(crate) fn new(errors: Vec<anyhow::Error>) -> Self {
        Self { errors }
    }

    /// The individual action failures, in drain (reverse-registration) order.
    pub fn errors(&self) -> &[anyhow::Error] {
        &self.errors
    }
}
