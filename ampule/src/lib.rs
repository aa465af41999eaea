//! Scope-aware dependency container with deterministic teardown.
//!
//! Providers are registered under typed [`Token`]s and resolved through a
//! [`Context`], which layers session and request scopes over the shared
//! singleton root. Singleton construction is single-flight across threads
//! and tasks, cycles are detected per flow with the full chain reported,
//! and every scope drains its cleanup stack in reverse construction order
//! on exit.
//!
//! # Quick start
//!
//! ```
//! use ampule::{Container, Injectable, Scope, Token};
//!
//! struct Greeter {
//!     greeting: String,
//! }
//! impl Injectable for Greeter {}
//!
//! # fn main() -> Result<(), ampule::Error> {
//! let container = Container::new();
//! let greeter: Token<Greeter> = Token::new("greeter").with_scope(Scope::Singleton);
//! container.register(&greeter, |_| {
//!     Ok(Greeter { greeting: "hello".into() })
//! })?;
//!
//! let ctx = container.context();
//! assert_eq!(ctx.get(&greeter)?.greeting, "hello");
//! # Ok(())
//! # }
//! ```
//!
//! # Scopes
//!
//! - `Singleton`: one instance per container, constructed once no matter
//!   how many flows race for it.
//! - `Session` / `Request`: one instance per open layer; enter layers with
//!   [`Context::enter_session`] / [`Context::enter_request`].
//! - `Transient`: a fresh instance per resolution, never cached.

mod batch;
mod cleanup;
mod container;
mod context;
mod error;
mod layer;
mod provider;
mod registry;
mod scope;
mod token;

pub use batch::{Dependencies, TokenSet};
pub use container::Container;
pub use context::{Context, ScopeGuard};
pub use error::{
    CircularDependencyError, CleanupError, Error, ResolutionError, ResolutionKind,
};
pub use provider::{CleanupKind, Injectable};
pub use scope::Scope;
pub use token::{Key, Token};
