//! Provider records: the factory, its declared scope, and the teardown
//! strategy precomputed at registration time.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::cleanup::CleanupAction;
use crate::context::Context;
use crate::scope::Scope;

/// A resolved instance, erased for storage in the scope layers.
pub(crate) type Instance = Arc<dyn Any + Send + Sync>;

pub(crate) type SyncFactory =
    Arc<dyn Fn(&Context) -> anyhow::Result<Instance> + Send + Sync>;

pub(crate) type AsyncFactory =
    Arc<dyn for<'a> Fn(&'a Context) -> BoxFuture<'a, anyhow::Result<Instance>> + Send + Sync>;

/// Builds the teardown action for one produced instance. Precomputed per
/// record so teardown never probes instance capabilities at runtime.
pub(crate) type ActionFactory =
    Arc<dyn Fn(&Instance) -> Option<CleanupAction> + Send + Sync>;

/// How instances produced by a provider are torn down when their scope exits.
///
/// Decided once at registration from the produced type's declared capability
/// surface ([`Injectable::cleanup`]), stored in the provider record, and
/// dispatched by tag at teardown time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupKind {
    /// No container-managed teardown.
    None,
    /// The instance is an RAII resource: the container releases its cached
    /// reference in reverse construction order and lets `Drop` run.
    ScopedResource,
    /// Call [`Injectable::close`] when the owning scope exits.
    Close,
    /// Await [`Injectable::close_async`] when the owning scope exits. Only
    /// drainable from an async scope exit.
    AsyncClose,
}

impl std::fmt::Display for CleanupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::ScopedResource => write!(f, "scoped-resource"),
            Self::Close => write!(f, "close"),
            Self::AsyncClose => write!(f, "async-close"),
        }
    }
}

/// Capability surface for types produced by providers.
///
/// `cleanup()` declares which teardown the container owns for instances of
/// the type; the matching hook is the only one that will ever be called.
/// Types with no teardown needs implement the trait with an empty body.
///
/// # Examples
///
/// ```
/// use ampule::{CleanupKind, Injectable};
///
/// struct Connection;
///
/// impl Injectable for Connection {
///     fn cleanup() -> CleanupKind {
///         CleanupKind::Close
///     }
///
///     fn close(&self) -> anyhow::Result<()> {
///         // flush, hang up, ...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Injectable: Send + Sync + 'static {
    /// The teardown strategy for instances of this type.
    fn cleanup() -> CleanupKind
    where
        Self: Sized,
    {
        CleanupKind::None
    }

    /// Synchronous teardown hook, called when `cleanup()` is
    /// [`CleanupKind::Close`].
    fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Asynchronous teardown hook, awaited when `cleanup()` is
    /// [`CleanupKind::AsyncClose`].
    async fn close_async(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// The factory callable, in its sync or async flavor.
#[derive(Clone)]
pub(crate) enum Provider {
    Sync(SyncFactory),
    Async(AsyncFactory),
}

/// Immutable provider metadata with precomputed cleanup strategy.
///
/// Created once at registration; resolution only reads it.
#[derive(Clone)]
pub(crate) struct ProviderRecord {
    pub provider: Provider,
    pub cleanup: CleanupKind,
    pub scope: Scope,
    action: ActionFactory,
}

impl ProviderRecord {
    pub fn new<T: Injectable>(provider: Provider, scope: Scope) -> Self {
        let cleanup = T::cleanup();
        Self {
            provider,
            cleanup,
            scope,
            action: action_factory::<T>(cleanup),
        }
    }

    /// A record for a pre-built value: the factory hands out the stored
    /// reference, and the container owns no teardown for it.
    pub fn value<T: Injectable>(instance: Instance, scope: Scope) -> Self {
        Self {
            provider: Provider::Sync(Arc::new(move |_| Ok(instance.clone()))),
            cleanup: CleanupKind::None,
            scope,
            action: Arc::new(|_| None),
        }
    }

    /// Builds the teardown action for a freshly constructed instance, or
    /// `None` when the strategy is `None`.
    pub fn cleanup_action(&self, instance: &Instance) -> Option<CleanupAction> {
        (self.action)(instance)
    }
}

/// Precomputes the per-instance action builder for a produced type.
///
/// The strategy match happens here, once per registration; constructing an
/// instance later only invokes the prepared closure.
fn action_factory<T: Injectable>(cleanup: CleanupKind) -> ActionFactory {
    match cleanup {
        CleanupKind::None => Arc::new(|_| None),
        CleanupKind::ScopedResource => Arc::new(|instance| {
            let held = instance.clone();
            Some(CleanupAction::Sync(Box::new(move || {
                drop(held);
                Ok(())
            })))
        }),
        CleanupKind::Close => Arc::new(|instance| {
            let typed = instance.clone().downcast::<T>().ok()?;
            Some(CleanupAction::Sync(Box::new(move || typed.close())))
        }),
        CleanupKind::AsyncClose => Arc::new(|instance| {
            let typed = instance.clone().downcast::<T>().ok()?;
            Some(CleanupAction::Async(Box::new(
                move || -> BoxFuture<'static, anyhow::Result<()>> {
                    Box::pin(async move { typed.close_async().await })
                },
            )))
        }),
    }
}
