//! Multi-store dispatch (spec.md §4.A/§4.B): one logical ordered
//! key-value surface fanning out over several named physical backends
//! sharing a tenant prefix.
//!
//! Generalizes the teacher's `RecordStoreFactory` (one factory assembling
//! independently storable named units) with the "commit all participants
//! atomically" requirement: a [`MultiStoreTxn`] stages writes against every
//! backend in its scope and commits (or cancels) them together.
//!
//! **Write fan-out.** A write issued through [`MultiStoreTxn::set`]/
//! [`MultiStoreTxn::remove`] is mirrored to *every* backend in the active
//! scope, and [`MultiStoreTxn::scan`]/[`MultiStore::scan`] merge-sort reads
//! back across the same scope — the natural symmetric reading of spec.md's
//! "one transaction can atomically span storages scoped by name", since
//! nothing in the index codec or scan algebra carries a store name to route
//! a write to one participant selectively. A caller who configures more
//! than one store name into one active scope (e.g. "primary" mirrored into
//! "outbox") should expect every scoped write to land in both; this crate's
//! own tests exercise only the single-backend default scope, matching the
//! teacher's own integration tests.

use std::collections::HashMap;
use std::sync::Arc;

use factstore_core::{Key, KeyComponent, StoreError, Timestamp};
use parking_lot::Mutex;

use crate::codec;
use crate::engine::{EngineTxn, KvEntry, OrderedEngine, ScanArgs, SubscribeCallback, Unsubscribe, WriteBatch};
use crate::scan;

/// Owns every named backend (each already wrapped in a tenant-prefixed
/// [`crate::engine::Subspace`]) plus the tenant id and default scope a
/// [`crate::triplestore::TripleStore`] was constructed with.
pub struct MultiStore {
    backends: HashMap<String, Arc<dyn OrderedEngine>>,
    tenant_id: String,
    default_scope: Vec<String>,
}

fn unknown_participant(name: &str) -> StoreError {
    StoreError::Internal(format!("unknown storage scope participant: {name}"))
}

impl MultiStore {
    /// Wraps every backend in `backends` with the tenant prefix, once, at
    /// construction — so repeated [`MultiStore::subspace`] calls never need
    /// to re-derive it (SPEC_FULL.md §9).
    #[must_use]
    pub fn new(
        backends: HashMap<String, Arc<dyn OrderedEngine>>,
        tenant_id: impl Into<String>,
        default_scope: Vec<String>,
    ) -> Self {
        let tenant_id = tenant_id.into();
        let tenant_prefix = vec![KeyComponent::String(tenant_id.clone())];
        let backends = backends
            .into_iter()
            .map(|(name, engine)| (name, engine.subspace(tenant_prefix.clone())))
            .collect();
        Self {
            backends,
            tenant_id,
            default_scope,
        }
    }

    #[must_use]
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    #[must_use]
    pub fn default_scope(&self) -> &[String] {
        &self.default_scope
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    fn resolve(&self, scope: &[String]) -> Result<Vec<&Arc<dyn OrderedEngine>>, StoreError> {
        scope
            .iter()
            .map(|name| self.backends.get(name).ok_or_else(|| unknown_participant(name)))
            .collect()
    }

    /// Merge-sorted scan across every backend in `scope` (spec.md §4.A).
    ///
    /// # Errors
    /// Returns [`StoreError::Internal`] if `scope` names an unconfigured
    /// backend.
    pub fn scan(&self, scope: &[String], args: &ScanArgs) -> Result<Vec<KvEntry>, StoreError> {
        let mut merged = Vec::new();
        for backend in self.resolve(scope)? {
            merged.extend(backend.scan(args));
        }
        merged.sort_by(|a, b| a.key.cmp(&b.key));
        if args.reverse {
            merged.reverse();
        }
        Ok(merged)
    }

    /// The highest timestamp on record for `client_id` across `scope`,
    /// used both by [`crate::triplestore::TripleStore::find_max_timestamp`]
    /// and to seed a [`factstore_core::Clock`] at construction time.
    ///
    /// # Errors
    /// Returns [`StoreError::Internal`] on an unknown scope participant, or
    /// whatever [`codec::decode_row`] returns on a malformed stored row.
    pub fn find_max_timestamp(&self, scope: &[String], client_id: &str) -> Result<Option<Timestamp>, StoreError> {
        let rows = self.scan(scope, &scan::find_max_timestamp(client_id))?;
        match rows.first() {
            Some(entry) => Ok(Some(codec::decode_row(&entry.key, &entry.value)?.timestamp)),
            None => Ok(None),
        }
    }

    /// Registers `cb` against every backend in `scope`, aggregating their
    /// individual unsubscribe handles into one.
    ///
    /// # Errors
    /// Returns [`StoreError::Internal`] if `scope` names an unconfigured
    /// backend.
    pub fn subscribe(
        &self,
        scope: &[String],
        range: ScanArgs,
        cb: Arc<dyn Fn(&WriteBatch) + Send + Sync>,
    ) -> Result<Unsubscribe, StoreError> {
        let mut handles = Vec::new();
        for backend in self.resolve(scope)? {
            let cb = cb.clone();
            let forward: SubscribeCallback = Box::new(move |batch| cb(batch));
            handles.push(backend.subscribe(range.clone(), forward));
        }
        Ok(Unsubscribe::new(move || {
            for handle in handles {
                handle.cancel();
            }
        }))
    }

    /// A view of this multi-store whose every backend is additionally
    /// prefixed with `prefix`, composed below the tenant prefix already
    /// applied in [`MultiStore::new`].
    #[must_use]
    pub fn subspace(&self, prefix: Key) -> MultiStore {
        let backends = self
            .backends
            .iter()
            .map(|(name, engine)| (name.clone(), engine.subspace(prefix.clone())))
            .collect();
        MultiStore {
            backends,
            tenant_id: self.tenant_id.clone(),
            default_scope: self.default_scope.clone(),
        }
    }

    /// Drops all data from every backend in `scope`.
    ///
    /// # Errors
    /// Returns [`StoreError::Internal`] if `scope` names an unconfigured
    /// backend.
    pub fn clear(&self, scope: &[String]) -> Result<(), StoreError> {
        for backend in self.resolve(scope)? {
            backend.clear();
        }
        Ok(())
    }

    /// Opens one transaction spanning every backend in `scope`
    /// (spec.md §4.A `transact(stores?, callback)`).
    ///
    /// # Errors
    /// Returns [`StoreError::Internal`] if `scope` names an unconfigured
    /// backend.
    pub fn transact(&self, scope: &[String]) -> Result<MultiStoreTxn, StoreError> {
        let mut txns = HashMap::with_capacity(scope.len());
        for name in scope {
            let backend = self.backends.get(name).ok_or_else(|| unknown_participant(name))?;
            txns.insert(name.clone(), Mutex::new(Some(backend.begin_txn())));
        }
        Ok(MultiStoreTxn {
            txns: Arc::new(txns),
            full_scope: scope.to_vec(),
            scope: scope.to_vec(),
        })
    }
}

/// One transaction spanning the backends named in `full_scope`, committed
/// or cancelled as a unit regardless of how many [`MultiStoreTxn::with_scope`]
/// narrowings produced the view actually driving reads/writes at any given
/// moment (spec.md §4.G, "withScope ... while keeping the atomic commit
/// boundary").
pub struct MultiStoreTxn {
    txns: Arc<HashMap<String, Mutex<Option<Box<dyn EngineTxn>>>>>,
    full_scope: Vec<String>,
    scope: Vec<String>,
}

impl MultiStoreTxn {
    fn slot(&self, name: &str) -> Result<&Mutex<Option<Box<dyn EngineTxn>>>, StoreError> {
        self.txns.get(name).ok_or_else(|| unknown_participant(name))
    }

    /// Mirrors `(key, value)` into every backend in the current scope.
    ///
    /// # Errors
    /// Returns [`StoreError::Internal`] if the scope names an unconfigured
    /// participant.
    pub fn set(&self, key: Key, value: Vec<u8>) -> Result<(), StoreError> {
        for name in &self.scope {
            let slot = self.slot(name)?;
            let mut guard = slot.lock();
            guard
                .as_mut()
                .expect("transaction already committed or cancelled")
                .set(key.clone(), value.clone());
        }
        Ok(())
    }

    /// Mirrors the removal of `key` into every backend in the current
    /// scope.
    ///
    /// # Errors
    /// Returns [`StoreError::Internal`] if the scope names an unconfigured
    /// participant.
    pub fn remove(&self, key: &Key) -> Result<(), StoreError> {
        for name in &self.scope {
            let slot = self.slot(name)?;
            let mut guard = slot.lock();
            guard
                .as_mut()
                .expect("transaction already committed or cancelled")
                .remove(key);
        }
        Ok(())
    }

    /// Merge-sorted scan across the current scope, seeing this
    /// transaction's own staged writes (spec.md §5, read-your-own-writes).
    ///
    /// # Errors
    /// Returns [`StoreError::Internal`] if the scope names an unconfigured
    /// participant.
    pub fn scan(&self, args: &ScanArgs) -> Result<Vec<KvEntry>, StoreError> {
        let mut merged = Vec::new();
        for name in &self.scope {
            let slot = self.slot(name)?;
            let guard = slot.lock();
            merged.extend(
                guard
                    .as_ref()
                    .expect("transaction already committed or cancelled")
                    .scan(args),
            );
        }
        merged.sort_by(|a, b| a.key.cmp(&b.key));
        if args.reverse {
            merged.reverse();
        }
        Ok(merged)
    }

    /// A sub-operator sharing this transaction's already-open participants
    /// but restricted to `names`, which must be a subset of the parent's
    /// `full_scope` (spec.md §4.B, "withScope").
    ///
    /// # Errors
    /// Returns [`StoreError::Internal`] if `names` includes a participant
    /// outside the parent transaction's scope.
    pub fn with_scope(&self, names: &[String]) -> Result<MultiStoreTxn, StoreError> {
        for name in names {
            if !self.full_scope.iter().any(|n| n == name) {
                return Err(StoreError::Internal(format!(
                    "{name} is not part of the parent transaction's storage scope"
                )));
            }
        }
        Ok(MultiStoreTxn {
            txns: self.txns.clone(),
            full_scope: self.full_scope.clone(),
            scope: names.to_vec(),
        })
    }

    /// Commits every participant in the transaction's original
    /// (`full_scope`) storage scope, regardless of any narrowing done via
    /// [`MultiStoreTxn::with_scope`] along the way.
    ///
    /// # Errors
    /// Returns whatever the first failing participant's
    /// [`EngineTxn::commit`] returns; earlier participants in iteration
    /// order have already been flushed (spec.md's Non-goals exclude
    /// durability stronger than the backend provides, so this crate does
    /// not attempt a rollback of already-committed participants).
    pub fn commit(self) -> anyhow::Result<()> {
        for name in &self.full_scope {
            if let Some(slot) = self.txns.get(name) {
                if let Some(txn) = slot.lock().take() {
                    txn.commit()?;
                }
            }
        }
        Ok(())
    }

    /// Cancels every participant in the transaction's original scope.
    pub fn cancel(self) {
        for name in &self.full_scope {
            if let Some(slot) = self.txns.get(name) {
                if let Some(txn) = slot.lock().take() {
                    txn.cancel();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::MemoryEngine;

    fn store(names: &[&str]) -> MultiStore {
        let backends: HashMap<String, Arc<dyn OrderedEngine>> = names
            .iter()
            .map(|n| (n.to_string(), Arc::new(MemoryEngine::new()) as Arc<dyn OrderedEngine>))
            .collect();
        let scope = names.iter().map(|n| n.to_string()).collect();
        MultiStore::new(backends, "t1", scope)
    }

    fn k(s: &str) -> Key {
        vec![KeyComponent::String(s.to_string())]
    }

    #[test]
    fn commit_mirrors_writes_into_every_scoped_backend() {
        let store = store(&["primary", "outbox"]);
        let txn = store.transact(&store.default_scope().to_vec()).unwrap();
        txn.set(k("a"), b"1".to_vec()).unwrap();
        txn.commit().unwrap();

        let results = store.scan(&["primary".to_string()], &ScanArgs::with_prefix(vec![])).unwrap();
        assert_eq!(results.len(), 1);
        let results = store.scan(&["outbox".to_string()], &ScanArgs::with_prefix(vec![])).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn cancel_discards_staged_writes() {
        let store = store(&["primary"]);
        let txn = store.transact(&["primary".to_string()]).unwrap();
        txn.set(k("a"), b"1".to_vec()).unwrap();
        txn.cancel();

        assert!(store
            .scan(&["primary".to_string()], &ScanArgs::with_prefix(vec![]))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn with_scope_rejects_names_outside_parent_scope() {
        let store = store(&["primary", "outbox"]);
        let txn = store.transact(&["primary".to_string()]).unwrap();
        let err = txn.with_scope(&["outbox".to_string()]).unwrap_err();
        assert!(matches!(err, StoreError::Internal(_)));
    }

    #[test]
    fn with_scope_restricts_subsequent_operations_but_shares_commit() {
        let store = store(&["primary", "outbox"]);
        let txn = store.transact(&["primary".to_string(), "outbox".to_string()]).unwrap();
        let narrowed = txn.with_scope(&["primary".to_string()]).unwrap();
        narrowed.set(k("a"), b"1".to_vec()).unwrap();
        narrowed.commit().unwrap();

        // The parent's full scope was committed, including "outbox", even
        // though only the narrowed view wrote anything.
        assert!(store
            .scan(&["outbox".to_string()], &ScanArgs::with_prefix(vec![]))
            .unwrap()
            .is_empty());
        assert_eq!(
            store
                .scan(&["primary".to_string()], &ScanArgs::with_prefix(vec![]))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn tenant_prefix_isolates_two_multistores_over_the_same_backend() {
        let backend: Arc<dyn OrderedEngine> = Arc::new(MemoryEngine::new());
        let a = MultiStore::new(
            HashMap::from([("default".to_string(), backend.clone())]),
            "tenant-a",
            vec!["default".to_string()],
        );
        let b = MultiStore::new(
            HashMap::from([("default".to_string(), backend)]),
            "tenant-b",
            vec!["default".to_string()],
        );

        let txn = a.transact(&["default".to_string()]).unwrap();
        txn.set(k("shared-key"), b"from-a".to_vec()).unwrap();
        txn.commit().unwrap();

        assert!(b
            .scan(&["default".to_string()], &ScanArgs::with_prefix(vec![]))
            .unwrap()
            .is_empty());
    }
}
