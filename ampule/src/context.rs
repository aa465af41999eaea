//! Resolution context: one logical flow's view of the container.
//!
//! A [`Context`] carries the chain of open scope layers and the flow-local
//! resolution tracking set. Layers are shared structurally (`Arc`-linked to
//! the container's singleton root), so clearing a layer anywhere is
//! immediately visible here; the tracking set is never shared. Cloning a
//! context shares the layer chain but starts a fresh tracking set, which is
//! how concurrent batch members stay cycle-checked per flow.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashSet;
use tracing::{debug, error, trace};

use crate::batch::{Dependencies, TokenSet};
use crate::container::Container;
use crate::error::{CircularDependencyError, Error, ResolutionError, ResolutionKind};
use crate::layer::Layer;
use crate::provider::{Injectable, Instance, Provider, ProviderRecord};
use crate::scope::Scope;
use crate::token::{Key, Token};

#[derive(Default)]
struct TrackState {
    set: FxHashSet<Key>,
    order: Vec<Key>,
}

/// A resolution context for one logical flow (thread or task).
///
/// Obtained from [`Container::context`]. All resolution and scope-lifecycle
/// operations go through a context; the container itself only registers.
pub struct Context {
    container: Container,
    head: RwLock<Arc<Layer>>,
    tracking: Mutex<TrackState>,
}

impl Context {
    pub(crate) fn new(container: Container) -> Self {
        let head = container.root();
        Self {
            container,
            head: RwLock::new(head),
            tracking: Mutex::new(TrackState::default()),
        }
    }

    /// The container this context resolves against.
    pub fn container(&self) -> &Container {
        &self.container
    }

    fn head(&self) -> Arc<Layer> {
        self.head.read().clone()
    }

    // ============= Resolution =============

    /// Resolves a token synchronously.
    ///
    /// Fails with [`ResolutionError`] if the token has no provider or its
    /// provider is async-only, and with [`CircularDependencyError`] if the
    /// token is already under construction on this flow.
    pub fn get<T: Injectable>(&self, token: &Token<T>) -> Result<Arc<T>, Error> {
        let instance = self.get_erased(token.key())?;
        downcast::<T>(token.key(), instance)
    }

    /// Resolves a token asynchronously, awaiting async providers.
    pub async fn aget<T: Injectable>(&self, token: &Token<T>) -> Result<Arc<T>, Error> {
        let instance = self.aget_erased(token.key()).await?;
        downcast::<T>(token.key(), instance)
    }

    pub(crate) fn get_erased(&self, key: &Key) -> Result<Instance, Error> {
        if let Some(found) = self.container.registry().override_for(key) {
            trace!(token = %key, "resolved from override");
            return Ok(found);
        }
        if let Some(found) = self.head().lookup(key) {
            trace!(token = %key, "resolved from scope store");
            return Ok(found);
        }

        let record = self
            .container
            .registry()
            .record(key)
            .ok_or_else(|| ResolutionError::not_registered(key))?;
        let _track = self.track(key)?;
        match record.scope {
            Scope::Singleton => self.construct_singleton_sync(key, &record),
            Scope::Session | Scope::Request => self.construct_scoped_sync(key, &record),
            Scope::Transient => self.invoke_sync(key, &record),
        }
    }

    pub(crate) async fn aget_erased(&self, key: &Key) -> Result<Instance, Error> {
        if let Some(found) = self.container.registry().override_for(key) {
            trace!(token = %key, "resolved from override");
            return Ok(found);
        }
        if let Some(found) = self.head().lookup(key) {
            trace!(token = %key, "resolved from scope store");
            return Ok(found);
        }

        let record = self
            .container
            .registry()
            .record(key)
            .ok_or_else(|| ResolutionError::not_registered(key))?;
        let _track = self.track(key)?;
        match record.scope {
            Scope::Singleton => self.construct_singleton_async(key, &record).await,
            Scope::Session | Scope::Request => self.construct_scoped_async(key, &record).await,
            Scope::Transient => self.invoke_async(key, &record).await,
        }
    }

    // ============= Construction paths =============

    fn invoke_sync(&self, key: &Key, record: &ProviderRecord) -> Result<Instance, Error> {
        match &record.provider {
            Provider::Sync(factory) => factory(self).map_err(Error::from_factory),
            Provider::Async(_) => Err(ResolutionError::async_only(key).into()),
        }
    }

    async fn invoke_async(&self, _key: &Key, record: &ProviderRecord) -> Result<Instance, Error> {
        match &record.provider {
            Provider::Sync(factory) => factory(self).map_err(Error::from_factory),
            Provider::Async(factory) => factory(self).await.map_err(Error::from_factory),
        }
    }

    /// Single-flight singleton construction, sync flavor.
    ///
    /// The per-token gate is created lazily and discarded right after the
    /// first successful construction; populated singletons leave no lock
    /// residue. The store is re-checked under the gate in case another flow
    /// finished first.
    fn construct_singleton_sync(
        &self,
        key: &Key,
        record: &ProviderRecord,
    ) -> Result<Instance, Error> {
        let gate = self.container.sync_gate(key);
        let _held = gate.lock();

        let root = self.container.root();
        if let Some(found) = root.get_local(key) {
            trace!(token = %key, "singleton constructed by another flow");
            return Ok(found);
        }

        let instance = self.invoke_sync(key, record)?;
        if let Some(action) = record.cleanup_action(&instance) {
            root.cleanup().push(action);
        }
        root.insert(key.clone(), instance.clone());
        self.container.discard_sync_gate(key);
        debug!(token = %key, "singleton constructed");
        Ok(instance)
    }

    async fn construct_singleton_async(
        &self,
        key: &Key,
        record: &ProviderRecord,
    ) -> Result<Instance, Error> {
        let gate = self.container.async_gate(key);
        let _held = gate.lock().await;

        let root = self.container.root();
        if let Some(found) = root.get_local(key) {
            trace!(token = %key, "singleton constructed by another flow");
            return Ok(found);
        }

        let instance = self.invoke_async(key, record).await?;
        if let Some(action) = record.cleanup_action(&instance) {
            root.cleanup().push(action);
        }
        root.insert(key.clone(), instance.clone());
        self.container.discard_async_gate(key);
        debug!(token = %key, "singleton constructed");
        Ok(instance)
    }

    /// Session/request construction. Layers are flow-local, so there is no
    /// cross-flow gate; construction is sequential within the flow.
    fn construct_scoped_sync(
        &self,
        key: &Key,
        record: &ProviderRecord,
    ) -> Result<Instance, Error> {
        let instance = self.invoke_sync(key, record)?;
        self.store_scoped(key, record, &instance);
        Ok(instance)
    }

    async fn construct_scoped_async(
        &self,
        key: &Key,
        record: &ProviderRecord,
    ) -> Result<Instance, Error> {
        let instance = self.invoke_async(key, record).await?;
        self.store_scoped(key, record, &instance);
        Ok(instance)
    }

    fn store_scoped(&self, key: &Key, record: &ProviderRecord, instance: &Instance) {
        let head = self.head();
        match head.find(record.scope) {
            Some(layer) => {
                if let Some(action) = record.cleanup_action(instance) {
                    layer.cleanup().push(action);
                }
                layer.insert(key.clone(), instance.clone());
                debug!(token = %key, scope = %record.scope, "instance constructed and cached");
            }
            None => {
                trace!(token = %key, scope = %record.scope, "no open layer of matching kind; instance not cached");
            }
        }
    }

    // ============= Cycle tracking =============

    fn track(&self, key: &Key) -> Result<TrackGuard<'_>, Error> {
        let mut tracking = self.tracking.lock();
        if tracking.set.contains(key) {
            let mut chain: Vec<String> = tracking.order.iter().map(|k| k.to_string()).collect();
            chain.push(key.to_string());
            return Err(CircularDependencyError { chain }.into());
        }
        tracking.set.insert(key.clone());
        tracking.order.push(key.clone());
        Ok(TrackGuard {
            ctx: self,
            key: key.clone(),
        })
    }

    // ============= Scope lifecycle =============

    /// Opens a session scope. Dropping the guard (or calling
    /// [`ScopeGuard::close`]/[`ScopeGuard::aclose`]) exits the scope and
    /// runs its cleanup stack, on every exit path.
    pub fn enter_session(&self) -> ScopeGuard<'_> {
        self.push_layer(Scope::Session)
    }

    /// Opens a request scope.
    pub fn enter_request(&self) -> ScopeGuard<'_> {
        self.push_layer(Scope::Request)
    }

    /// Generic spelling of [`enter_session`](Self::enter_session) /
    /// [`enter_request`](Self::enter_request). Singleton and transient are
    /// not enterable layers.
    pub fn enter_scope(&self, kind: Scope) -> Result<ScopeGuard<'_>, Error> {
        match kind {
            Scope::Session | Scope::Request => Ok(self.push_layer(kind)),
            other => Err(ResolutionError {
                token: other.to_string(),
                kind: ResolutionKind::NotEnterable(other),
            }
            .into()),
        }
    }

    fn push_layer(&self, kind: Scope) -> ScopeGuard<'_> {
        let mut head = self.head.write();
        let layer = Layer::child(head.clone(), kind);
        *head = layer.clone();
        trace!(kind = %kind, "scope entered");
        ScopeGuard {
            ctx: self,
            layer,
            closed: false,
        }
    }

    /// Empties the innermost open session layer, if any. Instances are
    /// evicted immediately for every reader chained through the layer; the
    /// layer itself stays open.
    pub fn clear_session(&self) {
        let head = self.head();
        if let Some(layer) = head.find(Scope::Session) {
            layer.clear();
        }
    }

    /// Empties the innermost open request layer, if any.
    pub fn clear_request(&self) {
        let head = self.head();
        if let Some(layer) = head.find(Scope::Request) {
            layer.clear();
        }
    }

    /// Empties every layer in the chain, the singleton root included.
    pub fn clear_all(&self) {
        self.head().clear_chain();
    }

    // ============= Batch =============

    /// Builds a lazy batch resolver over a fixed set of tokens.
    ///
    /// ```
    /// # use ampule::{Container, Injectable, Scope, Token};
    /// # struct Db; impl Injectable for Db {}
    /// # struct Cache; impl Injectable for Cache {}
    /// # fn main() -> Result<(), ampule::Error> {
    /// # let container = Container::new();
    /// # let db: Token<Db> = Token::new("db").with_scope(Scope::Singleton);
    /// # let cache: Token<Cache> = Token::new("cache").with_scope(Scope::Singleton);
    /// # container.register(&db, |_| Ok(Db))?;
    /// # container.register(&cache, |_| Ok(Cache))?;
    /// let ctx = container.context();
    /// let deps = ctx.dependencies((&db, &cache));
    /// let _db = deps.get::<Db>()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn dependencies(&self, set: impl TokenSet) -> Dependencies {
        Dependencies::new(self.clone(), set.keys())
    }
}

impl Clone for Context {
    /// Shares the layer chain, starts a fresh tracking set.
    fn clone(&self) -> Self {
        Self {
            container: self.container.clone(),
            head: RwLock::new(self.head()),
            tracking: Mutex::new(TrackState::default()),
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("open_scope", &self.head().kind())
            .finish()
    }
}

struct TrackGuard<'a> {
    ctx: &'a Context,
    key: Key,
}

impl Drop for TrackGuard<'_> {
    fn drop(&mut self) {
        let mut tracking = self.ctx.tracking.lock();
        tracking.set.remove(&self.key);
        tracking.order.pop();
    }
}

/// Scoped-acquisition handle for an open session or request layer.
///
/// Exit runs teardown on every path: dropping the guard pops the layer and
/// drains its cleanup stack synchronously. Scopes holding async cleanup
/// actions must exit through [`aclose`](Self::aclose).
#[must_use = "dropping the guard exits the scope"]
pub struct ScopeGuard<'c> {
    ctx: &'c Context,
    layer: Arc<Layer>,
    closed: bool,
}

impl ScopeGuard<'_> {
    /// The kind of layer this guard opened.
    pub fn kind(&self) -> Scope {
        self.layer.kind()
    }

    /// Exits the scope, surfacing cleanup failures instead of logging them.
    pub fn close(mut self) -> Result<(), Error> {
        self.closed = true;
        self.pop();
        self.layer.clear();
        self.layer.cleanup().drain_sync()?;
        Ok(())
    }

    /// Exits the scope from async code, awaiting async cleanup actions.
    pub async fn aclose(mut self) -> Result<(), Error> {
        self.closed = true;
        self.pop();
        self.layer.clear();
        self.layer.cleanup().drain_async().await?;
        Ok(())
    }

    fn pop(&self) {
        if let Some(parent) = self.layer.parent() {
            *self.ctx.head.write() = parent.clone();
        }
        trace!(kind = %self.layer.kind(), "scope exited");
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.pop();
        self.layer.clear();
        if let Err(err) = self.layer.cleanup().drain_sync() {
            error!(error = %err, kind = %self.layer.kind(), "scope teardown reported errors");
        }
    }
}

fn downcast<T: Injectable>(key: &Key, instance: Instance) -> Result<Arc<T>, Error> {
    instance
        .downcast::<T>()
        .map_err(|_| ResolutionError::new(key, ResolutionKind::TypeMismatch).into())
}
