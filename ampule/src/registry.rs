//! Provider registry: token identity to provider record, plus the override
//! table consulted before any store lookup.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{ResolutionError, ResolutionKind};
use crate::provider::{Instance, ProviderRecord};
use crate::token::Key;

#[derive(Default)]
pub(crate) struct Registry {
    records: RwLock<FxHashMap<Key, ProviderRecord>>,
    overrides: RwLock<FxHashMap<Key, Instance>>,
}

impl Registry {
    /// Stores a record, overwriting any prior record for the same identity.
    ///
    /// Re-registering an equal key under a different declared scope is a
    /// configuration error; the existing record stays in place.
    pub fn insert(&self, key: Key, record: ProviderRecord) -> Result<(), ResolutionError> {
        let mut records = self.records.write();
        if let Some(existing) = records.get(&key) {
            if existing.scope != record.scope {
                return Err(ResolutionError::new(
                    &key,
                    ResolutionKind::ScopeConflict {
                        existing: existing.scope,
                        requested: record.scope,
                    },
                ));
            }
        }
        debug!(token = %key, scope = %record.scope, cleanup = %record.cleanup, "provider registered");
        records.insert(key, record);
        Ok(())
    }

    /// Lookup; absence is reported, not judged. The engine decides severity.
    pub fn record(&self, key: &Key) -> Option<ProviderRecord> {
        self.records.read().get(key).cloned()
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.records.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn clear(&self) {
        self.records.write().clear();
    }

    /// Installs a substitution checked before any store lookup.
    pub fn set_override(&self, key: Key, instance: Instance) {
        debug!(token = %key, "override installed");
        self.overrides.write().insert(key, instance);
    }

    pub fn override_for(&self, key: &Key) -> Option<Instance> {
        self.overrides.read().get(key).cloned()
    }

    pub fn clear_overrides(&self) {
        let mut overrides = self.overrides.write();
        if !overrides.is_empty() {
            debug!(count = overrides.len(), "overrides cleared");
            overrides.clear();
        }
    }
}
