//! The container: provider registration and ownership of the singleton root.
//!
//! `Container` is a cheap `Arc` handle; clones share the registry, the
//! singleton root layer, and the per-token construction gates. Resolution
//! happens through a [`Context`] obtained from [`Container::context`].

use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::context::Context;
use crate::error::Error;
use crate::layer::Layer;
use crate::provider::{AsyncFactory, Injectable, Instance, Provider, ProviderRecord};
use crate::registry::Registry;
use crate::scope::Scope;
use crate::token::{Key, Token};

struct Inner {
    registry: Registry,
    root: Arc<Layer>,
    sync_gates: Mutex<FxHashMap<Key, Arc<Mutex<()>>>>,
    async_gates: Mutex<FxHashMap<Key, Arc<tokio::sync::Mutex<()>>>>,
}

/// Thread-safe provider container.
///
/// # Examples
///
/// ```
/// use ampule::{Container, Injectable, Scope, Token};
///
/// struct Config { url: String }
/// impl Injectable for Config {}
///
/// # fn main() -> Result<(), ampule::Error> {
/// let container = Container::new();
/// let config: Token<Config> = Token::new("config").with_scope(Scope::Singleton);
/// container.register(&config, |_| {
///     Ok(Config { url: "localhost".into() })
/// })?;
///
/// let ctx = container.context();
/// assert_eq!(ctx.get(&config)?.url, "localhost");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<Inner>,
}

impl Container {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Registry::default(),
                root: Layer::root(),
                sync_gates: Mutex::default(),
                async_gates: Mutex::default(),
            }),
        }
    }

    /// A fresh resolution context rooted at the singleton layer.
    pub fn context(&self) -> Context {
        Context::new(self.clone())
    }

    // ============= Registration =============

    /// Registers a synchronous factory under the token's identity and
    /// declared scope.
    ///
    /// Re-registering the same token replaces the factory; doing so with a
    /// different declared scope is an error and leaves the existing record
    /// in place.
    pub fn register<T, F>(&self, token: &Token<T>, factory: F) -> Result<(), Error>
    where
        T: Injectable,
        F: Fn(&Context) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let provider = Provider::Sync(Arc::new(move |ctx: &Context| {
            factory(ctx).map(|value| Arc::new(value) as Instance)
        }));
        let record = ProviderRecord::new::<T>(provider, token.scope());
        self.inner.registry.insert(token.key().clone(), record)?;
        Ok(())
    }

    /// Registers an asynchronous factory. Tokens registered this way resolve
    /// only through [`Context::aget`]; the sync path reports them as
    /// async-only.
    pub fn register_async<T, F>(&self, token: &Token<T>, factory: F) -> Result<(), Error>
    where
        T: Injectable,
        F: for<'a> Fn(&'a Context) -> BoxFuture<'a, anyhow::Result<T>> + Send + Sync + 'static,
    {
        let provider = Provider::Async(erase_async(factory));
        let record = ProviderRecord::new::<T>(provider, token.scope());
        self.inner.registry.insert(token.key().clone(), record)?;
        Ok(())
    }

    /// Registers a pre-built value as a singleton.
    ///
    /// The value is cached immediately; no factory ever runs and the
    /// container owns no teardown for it.
    pub fn register_value<T: Injectable>(&self, token: &Token<T>, value: T) -> Result<(), Error> {
        let instance: Instance = Arc::new(value);
        let record = ProviderRecord::value::<T>(instance.clone(), Scope::Singleton);
        self.inner.registry.insert(token.key().clone(), record)?;
        self.inner.root.insert(token.key().clone(), instance);
        debug!(token = %token.key(), "value registered");
        Ok(())
    }

    /// Registers a pre-built value under the type-derived token
    /// ([`Token::of`]). Resolve it with a `Token::of` token of the same type.
    pub fn given<T: Injectable>(&self, value: T) -> Result<(), Error> {
        let token = Token::<T>::of().with_scope(Scope::Singleton);
        self.register_value(&token, value)
    }

    // ============= Overrides =============

    /// Installs a substitution instance for the token.
    ///
    /// Overrides are checked before any cached instance or provider, which
    /// makes them suitable for swapping in test doubles without touching
    /// registrations.
    pub fn set_override<T: Injectable>(&self, token: &Token<T>, value: T) {
        self.inner
            .registry
            .set_override(token.key().clone(), Arc::new(value));
    }

    /// Removes every installed override.
    pub fn clear_overrides(&self) {
        self.inner.registry.clear_overrides();
    }

    // ============= Introspection =============

    /// True if the token has a registered provider.
    pub fn has<T: 'static>(&self, token: &Token<T>) -> bool {
        self.inner.registry.contains(token.key())
    }

    /// Number of registered providers.
    pub fn provider_count(&self) -> usize {
        self.inner.registry.len()
    }

    // ============= Resolution shorthands =============

    /// Resolves through an ephemeral context. Scoped tokens see no open
    /// session or request layer here; use [`Container::context`] for those.
    pub fn get<T: Injectable>(&self, token: &Token<T>) -> Result<Arc<T>, Error> {
        self.context().get(token)
    }

    /// Async counterpart of [`Container::get`].
    pub async fn aget<T: Injectable>(&self, token: &Token<T>) -> Result<Arc<T>, Error> {
        self.context().aget(token).await
    }

    // ============= Lifecycle =============

    /// Evicts all cached singletons. Providers stay registered; the next
    /// resolution reconstructs. Cleanup actions are not run by eviction.
    pub fn clear_singletons(&self) {
        self.inner.root.clear();
    }

    /// Resets the container: providers, overrides, cached singletons, and
    /// construction gates. Queued cleanup actions are dropped unrun.
    pub fn clear_all(&self) {
        self.inner.registry.clear();
        self.inner.registry.clear_overrides();
        self.inner.root.clear();
        self.inner.sync_gates.lock().clear();
        self.inner.async_gates.lock().clear();
        debug!("container cleared");
    }

    /// Tears down the singleton layer: evicts cached instances and drains
    /// the root cleanup stack in reverse construction order.
    ///
    /// Singletons with async teardown make this fail; close such containers
    /// with [`Container::aclose`].
    pub fn close(&self) -> Result<(), Error> {
        self.inner.root.clear();
        self.inner.root.cleanup().drain_sync()?;
        Ok(())
    }

    /// Async teardown of the singleton layer, awaiting async cleanup actions.
    pub async fn aclose(&self) -> Result<(), Error> {
        self.inner.root.clear();
        self.inner.root.cleanup().drain_async().await?;
        Ok(())
    }

    // ============= Engine internals =============

    pub(crate) fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub(crate) fn root(&self) -> Arc<Layer> {
        self.inner.root.clone()
    }

    /// The per-token gate serializing sync singleton construction. Created
    /// lazily; [`discard_sync_gate`](Self::discard_sync_gate) removes it
    /// after the singleton is populated.
    pub(crate) fn sync_gate(&self, key: &Key) -> Arc<Mutex<()>> {
        self.inner
            .sync_gates
            .lock()
            .entry(key.clone())
            .or_default()
            .clone()
    }

    pub(crate) fn discard_sync_gate(&self, key: &Key) {
        self.inner.sync_gates.lock().remove(key);
    }

    pub(crate) fn async_gate(&self, key: &Key) -> Arc<tokio::sync::Mutex<()>> {
        self.inner
            .async_gates
            .lock()
            .entry(key.clone())
            .or_default()
            .clone()
    }

    pub(crate) fn discard_async_gate(&self, key: &Key) {
        self.inner.async_gates.lock().remove(key);
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("providers", &self.inner.registry.len())
            .field("singletons", &self.inner.root.len())
            .finish()
    }
}

fn erase_async<T, F>(factory: F) -> AsyncFactory
where
    T: Injectable,
    F: for<'a> Fn(&'a Context) -> BoxFuture<'a, anyhow::Result<T>> + Send + Sync + 'static,
{
    Arc::new(move |ctx| {
        let fut = factory(ctx);
        Box::pin(async move { fut.await.map(|value| Arc::new(value) as Instance) })
    })
}
