//! Construction options for a [`crate::triplestore::TripleStore`]
//! (spec.md §6, "Construction options"), mirroring the teacher's
//! `ServerConfig`-style plain-struct-with-defaults, validated once at
//! construction rather than scattered through call sites.

use std::collections::HashMap;
use std::sync::Arc;

use factstore_core::{Clock, StoreError};

use crate::engine::OrderedEngine;

/// Either shape `storage` may take: one backend used under an implicit
/// `"default"` name, or a caller-assigned name→backend mapping.
pub enum Storage {
    Single(Arc<dyn OrderedEngine>),
    Named(HashMap<String, Arc<dyn OrderedEngine>>),
}

/// The implicit name a bare [`Storage::Single`] backend is registered
/// under.
pub const DEFAULT_STORE_NAME: &str = "default";

/// Construction options for a [`crate::triplestore::TripleStore`].
///
/// Exactly one of `storage`/`stores` must be set (spec.md §6); `stores` is
/// kept as a distinct field from `storage` because the source system
/// distinguishes "a backend this store should own" from "a client handed
/// to us, already wired up by the caller" — a distinction without a
/// runtime difference here, since both resolve to the same
/// `HashMap<String, Arc<dyn OrderedEngine>>`, but preserved for fidelity
/// to the construction contract.
#[derive(Default)]
pub struct TripleStoreOptions {
    pub storage: Option<Storage>,
    pub stores: Option<HashMap<String, Arc<dyn OrderedEngine>>>,
    pub tenant_id: Option<String>,
    pub storage_scope: Option<Vec<String>>,
    pub clock: Option<Arc<Clock>>,
}

impl TripleStoreOptions {
    #[must_use]
    pub fn with_storage(storage: Arc<dyn OrderedEngine>) -> Self {
        Self {
            storage: Some(Storage::Single(storage)),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_stores(stores: HashMap<String, Arc<dyn OrderedEngine>>) -> Self {
        Self {
            stores: Some(stores),
            ..Self::default()
        }
    }

    /// Resolves `{storage, stores}` into one backend mapping, and applies
    /// every other field's documented default.
    ///
    /// # Errors
    /// Returns [`StoreError::TripleStoreOptions`] unless exactly one of
    /// `storage`/`stores` is set.
    pub fn resolve(self) -> Result<ResolvedOptions, StoreError> {
        let backends = match (self.storage, self.stores) {
            (Some(_), Some(_)) => {
                return Err(StoreError::TripleStoreOptions(
                    "exactly one of `storage` or `stores` must be supplied, not both".to_string(),
                ))
            }
            (None, None) => {
                return Err(StoreError::TripleStoreOptions(
                    "exactly one of `storage` or `stores` must be supplied".to_string(),
                ))
            }
            (Some(Storage::Single(backend)), None) => {
                HashMap::from([(DEFAULT_STORE_NAME.to_string(), backend)])
            }
            (Some(Storage::Named(map)), None) => map,
            (None, Some(map)) => map,
        };

        if backends.is_empty() {
            return Err(StoreError::TripleStoreOptions(
                "at least one backend must be configured".to_string(),
            ));
        }

        let tenant_id = self.tenant_id.unwrap_or_else(|| "client".to_string());
        let storage_scope = self
            .storage_scope
            .unwrap_or_else(|| backends.keys().cloned().collect());
        let clock = self.clock.unwrap_or_else(|| Arc::new(Clock::default()));

        Ok(ResolvedOptions {
            backends,
            tenant_id,
            storage_scope,
            clock,
        })
    }
}

/// The fully defaulted, validated form of [`TripleStoreOptions`] that
/// [`crate::multistore::MultiStore::new`] consumes.
pub struct ResolvedOptions {
    pub backends: HashMap<String, Arc<dyn OrderedEngine>>,
    pub tenant_id: String,
    pub storage_scope: Vec<String>,
    pub clock: Arc<Clock>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::MemoryEngine;

    #[test]
    fn neither_storage_nor_stores_is_rejected() {
        let err = TripleStoreOptions::default().resolve().unwrap_err();
        assert!(matches!(err, StoreError::TripleStoreOptions(_)));
    }

    #[test]
    fn both_storage_and_stores_is_rejected() {
        let opts = TripleStoreOptions {
            storage: Some(Storage::Single(Arc::new(MemoryEngine::new()))),
            stores: Some(HashMap::from([("x".to_string(), Arc::new(MemoryEngine::new()) as Arc<dyn OrderedEngine>)])),
            ..TripleStoreOptions::default()
        };
        let err = opts.resolve().unwrap_err();
        assert!(matches!(err, StoreError::TripleStoreOptions(_)));
    }

    #[test]
    fn single_storage_resolves_under_default_name() {
        let opts = TripleStoreOptions::with_storage(Arc::new(MemoryEngine::new()));
        let resolved = opts.resolve().unwrap();
        assert_eq!(resolved.tenant_id, "client");
        assert_eq!(resolved.storage_scope, vec![DEFAULT_STORE_NAME.to_string()]);
        assert!(resolved.backends.contains_key(DEFAULT_STORE_NAME));
    }

    #[test]
    fn named_stores_default_scope_covers_all_names() {
        let stores: HashMap<String, Arc<dyn OrderedEngine>> = HashMap::from([
            ("primary".to_string(), Arc::new(MemoryEngine::new()) as Arc<dyn OrderedEngine>),
            ("outbox".to_string(), Arc::new(MemoryEngine::new()) as Arc<dyn OrderedEngine>),
        ]);
        let resolved = TripleStoreOptions::with_stores(stores).resolve().unwrap();
        let mut scope = resolved.storage_scope.clone();
        scope.sort();
        assert_eq!(scope, vec!["outbox".to_string(), "primary".to_string()]);
    }

    #[test]
    fn explicit_tenant_id_overrides_default() {
        let opts = TripleStoreOptions {
            tenant_id: Some("acme".to_string()),
            ..TripleStoreOptions::with_storage(Arc::new(MemoryEngine::new()))
        };
        assert_eq!(opts.resolve().unwrap().tenant_id, "acme");
    }
}
