//! Chained scope layers: the live-view storage behind the resolution engine.
//!
//! Each open scope is a [`Layer`] holding its own instance map, its own
//! cleanup stack, and an `Arc` reference to its parent layer. Reads walk the
//! chain innermost-out; writes go to the nearest layer whose kind matches
//! the token's declared scope. Because lookups always read the live maps
//! through the chain (never a snapshot taken at scope entry), clearing any
//! layer is immediately visible to every context chained through it.

use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::cleanup::CleanupStack;
use crate::provider::Instance;
use crate::scope::Scope;
use crate::token::Key;

pub(crate) struct Layer {
    kind: Scope,
    values: RwLock<FxHashMap<Key, Instance>>,
    cleanup: CleanupStack,
    parent: Option<Arc<Layer>>,
}

impl Layer {
    /// The container-owned singleton root. Every chain bottoms out here.
    pub fn root() -> Arc<Self> {
        Arc::new(Self {
            kind: Scope::Singleton,
            values: RwLock::default(),
            cleanup: CleanupStack::default(),
            parent: None,
        })
    }

    /// Pushes a fresh, empty layer of the given kind on top of `parent`.
    pub fn child(parent: Arc<Layer>, kind: Scope) -> Arc<Self> {
        Arc::new(Self {
            kind,
            values: RwLock::default(),
            cleanup: CleanupStack::default(),
            parent: Some(parent),
        })
    }

    pub fn kind(&self) -> Scope {
        self.kind
    }

    pub fn parent(&self) -> Option<&Arc<Layer>> {
        self.parent.as_ref()
    }

    pub fn cleanup(&self) -> &CleanupStack {
        &self.cleanup
    }

    /// Live-view read: walks the chain from this layer down to the root and
    /// returns the first hit.
    pub fn lookup(&self, key: &Key) -> Option<Instance> {
        let mut current = self;
        loop {
            if let Some(found) = current.values.read().get(key) {
                return Some(found.clone());
            }
            match &current.parent {
                Some(parent) => current = parent,
                None => return None,
            }
        }
    }

    /// Read restricted to this layer, no fallthrough. Used for the
    /// double-checked singleton re-check under the per-token lock.
    pub fn get_local(&self, key: &Key) -> Option<Instance> {
        self.values.read().get(key).cloned()
    }

    /// The nearest layer (this one included) of the given kind.
    pub fn find(&self, kind: Scope) -> Option<&Layer> {
        let mut current = self;
        loop {
            if current.kind == kind {
                return Some(current);
            }
            match &current.parent {
                Some(parent) => current = parent,
                None => return None,
            }
        }
    }

    pub fn insert(&self, key: Key, instance: Instance) {
        self.values.write().insert(key, instance);
    }

    /// Empties this layer's map in place. The cleanup stack is untouched:
    /// clearing evicts cached instances, it does not exit the scope.
    pub fn clear(&self) {
        self.values.write().clear();
    }

    /// Clears every layer from this one down to the root.
    pub fn clear_chain(&self) {
        let mut current = self;
        loop {
            current.clear();
            match &current.parent {
                Some(parent) => current = parent,
                None => return,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }
}
