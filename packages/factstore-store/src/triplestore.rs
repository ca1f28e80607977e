//! The public read API and single-write entry point:
//! `TripleStore` owns the hook registry and clock, runs every mutating
//! method inside [`TripleStore::transact`], and answers every read
//! directly against the [`MultiStore`] snapshot, outside any transaction.

use std::collections::HashMap;
use std::sync::Arc;

use factstore_core::{Attribute, Clock, MetaRow, StoreError, Timestamp, TimestampSource, TripleRow, Value};
use parking_lot::Mutex;

use crate::codec;
use crate::engine::Unsubscribe;
use crate::multistore::MultiStore;
use crate::options::TripleStoreOptions;
use crate::scan::{self, Direction, RangeOpts, TimestampOp};
use crate::subscription::{self, InsertCallback, WriteCallback};
use crate::transaction::{BeforeCommitHook, BeforeInsertHook, Transaction};

/// Adapts a [`MultiStore`] + scope into the [`TimestampSource`] a
/// [`Clock`] needs to seed itself at construction time.
struct ScopedTimestampSource<'a> {
    multi: &'a MultiStore,
    scope: &'a [String],
}

impl TimestampSource for ScopedTimestampSource<'_> {
    fn find_max_timestamp(&self, client_id: &str) -> Option<Timestamp> {
        self.multi.find_max_timestamp(self.scope, client_id).ok().flatten()
    }
}

/// The public storage substrate surface.
///
/// Cheap to clone-by-reference: every field is an `Arc`, so
/// [`TripleStore::set_storage_scope`] can hand back a logically distinct
/// store (different `storage_scope`) that still shares the same backends,
/// clock, and hook registry as its parent.
pub struct TripleStore {
    multi: Arc<MultiStore>,
    storage_scope: Vec<String>,
    clock: Arc<Clock>,
    before_insert_hooks: Arc<Mutex<Vec<BeforeInsertHook>>>,
    before_commit_hooks: Arc<Mutex<Vec<BeforeCommitHook>>>,
}

impl TripleStore {
    /// Resolves `options`, assembles the [`MultiStore`], and seeds the
    /// clock from the configured storage scope's client-timestamp index.
    ///
    /// # Errors
    /// Whatever [`TripleStoreOptions::resolve`] returns (exactly one of
    /// `storage`/`stores` must be supplied).
    pub fn new(options: TripleStoreOptions) -> Result<Self, StoreError> {
        let resolved = options.resolve()?;
        let multi = MultiStore::new(resolved.backends, resolved.tenant_id, resolved.storage_scope.clone());
        resolved.clock.assign_to_store(&ScopedTimestampSource {
            multi: &multi,
            scope: &resolved.storage_scope,
        });
        tracing::debug!(
            tenant_id = multi.tenant_id(),
            storage_scope = ?resolved.storage_scope,
            "triple store constructed"
        );
        Ok(Self {
            multi: Arc::new(multi),
            storage_scope: resolved.storage_scope,
            clock: resolved.clock,
            before_insert_hooks: Arc::new(Mutex::new(Vec::new())),
            before_commit_hooks: Arc::new(Mutex::new(Vec::new())),
        })
    }

    #[must_use]
    pub fn tenant_id(&self) -> &str {
        self.multi.tenant_id()
    }

    #[must_use]
    pub fn storage_scope(&self) -> &[String] {
        &self.storage_scope
    }

    /// Returns a logically identical triple store whose multi-store is
    /// restricted to `names`.
    #[must_use]
    pub fn set_storage_scope(&self, names: Vec<String>) -> Self {
        Self {
            multi: self.multi.clone(),
            storage_scope: names,
            clock: self.clock.clone(),
            before_insert_hooks: self.before_insert_hooks.clone(),
            before_commit_hooks: self.before_commit_hooks.clone(),
        }
    }

    // ---- reads: against the multi-store directly, outside any transaction ----

    /// # Errors
    /// [`StoreError::Internal`] on an unknown storage scope participant or
    /// a malformed stored row.
    pub fn find_by_collection(&self, collection: &str, dir: Direction) -> Result<Vec<TripleRow>, StoreError> {
        self.decode_eav_scan(scan::find_by_collection(collection, dir))
    }

    /// # Errors
    /// See [`TripleStore::find_by_collection`].
    pub fn find_by_eav(
        &self,
        entity_id: Option<&str>,
        attribute: Option<&Attribute>,
        value: Option<&Value>,
        dir: Direction,
    ) -> Result<Vec<TripleRow>, StoreError> {
        self.decode_eav_scan(scan::find_by_eav(entity_id, attribute, value, dir))
    }

    /// # Errors
    /// See [`TripleStore::find_by_collection`].
    pub fn find_by_entity(&self, entity_id: &str) -> Result<Vec<TripleRow>, StoreError> {
        self.decode_eav_scan(scan::find_by_entity(entity_id))
    }

    /// # Errors
    /// See [`TripleStore::find_by_collection`].
    pub fn find_by_entity_attribute(&self, entity_id: &str, attribute: &Attribute) -> Result<Vec<TripleRow>, StoreError> {
        self.decode_eav_scan(scan::find_by_entity_attribute(entity_id, attribute))
    }

    /// # Errors
    /// See [`TripleStore::find_by_collection`].
    pub fn find_by_ave(
        &self,
        attribute: Option<&Attribute>,
        value: Option<&Value>,
        entity_id: Option<&str>,
        dir: Direction,
    ) -> Result<Vec<TripleRow>, StoreError> {
        self.decode_eav_scan(scan::find_by_ave(attribute, value, entity_id, dir))
    }

    /// # Errors
    /// See [`TripleStore::find_by_collection`].
    pub fn find_by_attribute(&self, attribute: &Attribute) -> Result<Vec<TripleRow>, StoreError> {
        self.decode_eav_scan(scan::find_by_attribute(attribute))
    }

    /// # Errors
    /// See [`TripleStore::find_by_collection`].
    pub fn find_values_in_range(&self, attribute: &Attribute, opts: &RangeOpts) -> Result<Vec<TripleRow>, StoreError> {
        self.decode_eav_scan(scan::find_values_in_range(attribute, opts))
    }

    /// # Errors
    /// [`StoreError::InvalidTimestampIndexScan`] if `op` parses to an
    /// unsupported operator; otherwise see
    /// [`TripleStore::find_by_collection`].
    pub fn find_by_client_timestamp(&self, client_id: &str, op: &str, t: Option<&Timestamp>) -> Result<Vec<TripleRow>, StoreError> {
        let op = TimestampOp::parse(op)?;
        self.decode_eav_scan(scan::find_by_client_timestamp(client_id, op, t))
    }

    /// # Errors
    /// See [`TripleStore::find_by_collection`].
    pub fn find_max_timestamp(&self, client_id: &str) -> Result<Option<Timestamp>, StoreError> {
        self.multi.find_max_timestamp(&self.storage_scope, client_id)
    }

    /// # Errors
    /// See [`TripleStore::find_by_collection`].
    pub fn read_metadata_tuples(&self, entity_id: &str) -> Result<Vec<MetaRow>, StoreError> {
        let entries = self.multi.scan(&self.storage_scope, &scan::find_metadata_by_entity(entity_id))?;
        entries.iter().map(|e| codec::decode_metadata_row(&e.key, &e.value)).collect()
    }

    fn decode_eav_scan(&self, args: crate::engine::ScanArgs) -> Result<Vec<TripleRow>, StoreError> {
        let entries = self.multi.scan(&self.storage_scope, &args)?;
        codec::decode_rows(&entries)
    }

    // ---- subscriptions ----

    /// Subscribes to `EAV` inserts/overwrites.
    ///
    /// # Errors
    /// [`StoreError::Internal`] on an unknown storage scope participant.
    pub fn on_insert(&self, cb: InsertCallback) -> Result<Unsubscribe, StoreError> {
        subscription::subscribe_inserts(&self.multi, &self.storage_scope, cb)
    }

    /// Subscribes to both `EAV` inserts/overwrites and deletes.
    ///
    /// # Errors
    /// [`StoreError::Internal`] on an unknown storage scope participant.
    pub fn on_write(&self, cb: WriteCallback) -> Result<Unsubscribe, StoreError> {
        subscription::subscribe_writes(&self.multi, &self.storage_scope, cb)
    }

    // ---- hook registration ----

    /// Registers a hook invoked with every insert batch and its staging
    /// transaction before indexing. Adding a hook mid-transaction is
    /// undefined — register hooks before the transactions that should
    /// observe them are opened.
    pub fn before_insert(&self, hook: BeforeInsertHook) {
        self.before_insert_hooks.lock().push(hook);
    }

    /// Registers a hook invoked once per transaction, immediately before
    /// its backend flush.
    pub fn before_commit(&self, hook: BeforeCommitHook) {
        self.before_commit_hooks.lock().push(hook);
    }

    // ---- transact ----

    /// Opens a transaction spanning this store's storage scope, runs `f`,
    /// then commits or cancels depending on `f`'s outcome (spec.md §4.G
    /// "Commit/cancel"): a [`StoreError::WriteRule`] escaping `f` cancels
    /// the transaction and is rethrown; any other error is rethrown
    /// without an explicit cancel (nothing was flushed either way, so the
    /// staged writes are simply dropped).
    ///
    /// # Errors
    /// Whatever `f` returns, or [`StoreError::Internal`] if the storage
    /// scope names an unconfigured backend.
    pub fn transact<T>(&self, f: impl FnOnce(&Transaction) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let multi_txn = self.multi.transact(&self.storage_scope)?;
        let txn = Transaction::new(
            multi_txn,
            self.clock.clone(),
            Arc::new(self.before_insert_hooks.lock().clone()),
            Arc::new(self.before_commit_hooks.lock().clone()),
        );

        match f(&txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) if e.is_write_rule() => {
                tracing::warn!(error = %e, "write-rule violation, cancelling transaction");
                txn.cancel();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// `insertTriples(batch)`, wrapped in its own transaction.
    ///
    /// # Errors
    /// See [`Transaction::insert_triples`].
    pub fn insert_triples(&self, batch: Vec<TripleRow>) -> Result<(), StoreError> {
        self.transact(move |txn| txn.insert_triples(batch))
    }

    /// `insertTriple(single)`, wrapped in its own transaction.
    ///
    /// # Errors
    /// See [`Transaction::insert_triple`].
    pub fn insert_triple(&self, row: TripleRow) -> Result<(), StoreError> {
        self.transact(move |txn| txn.insert_triple(row))
    }

    /// `deleteTriples(batch)`, wrapped in its own transaction.
    ///
    /// # Errors
    /// See [`Transaction::delete_triples`].
    pub fn delete_triples(&self, batch: Vec<TripleRow>) -> Result<(), StoreError> {
        self.transact(move |txn| txn.delete_triples(&batch))
    }

    /// `setValue(e, a, v)`, wrapped in its own transaction.
    ///
    /// # Errors
    /// See [`Transaction::set_value`].
    pub fn set_value(&self, entity_id: impl Into<String>, attribute: Attribute, value: Value) -> Result<(), StoreError> {
        let entity_id = entity_id.into();
        self.transact(move |txn| txn.set_value(entity_id, attribute, value))
    }

    /// `setValues([(e, a, v), ...])`, wrapped in its own transaction.
    ///
    /// # Errors
    /// See [`Transaction::set_values`].
    pub fn set_values(&self, updates: Vec<(String, Attribute, Value)>) -> Result<(), StoreError> {
        self.transact(move |txn| txn.set_values(updates))
    }

    /// `expireEntity(e)`, wrapped in its own transaction.
    ///
    /// # Errors
    /// See [`Transaction::expire_entity`].
    pub fn expire_entity(&self, entity_id: &str) -> Result<(), StoreError> {
        let entity_id = entity_id.to_string();
        self.transact(move |txn| txn.expire_entity(&entity_id))
    }

    /// `expireEntityAttributes([(e, a), ...])`, wrapped in its own
    /// transaction.
    ///
    /// # Errors
    /// See [`Transaction::expire_entity_attributes`].
    pub fn expire_entity_attributes(&self, pairs: Vec<(String, Attribute)>) -> Result<(), StoreError> {
        self.transact(move |txn| txn.expire_entity_attributes(&pairs))
    }

    /// `updateMetadataTuples`, wrapped in its own transaction.
    ///
    /// # Errors
    /// See [`Transaction::update_metadata_tuples`].
    pub fn update_metadata_tuples(&self, rows: Vec<MetaRow>) -> Result<(), StoreError> {
        self.transact(move |txn| txn.update_metadata_tuples(&rows))
    }

    /// `deleteMetadataTuples`, wrapped in its own transaction.
    ///
    /// # Errors
    /// See [`Transaction::delete_metadata_tuples`].
    pub fn delete_metadata_tuples(&self, entity_id: &str, attributes: Vec<Attribute>) -> Result<(), StoreError> {
        let entity_id = entity_id.to_string();
        self.transact(move |txn| txn.delete_metadata_tuples(&entity_id, &attributes))
    }

    /// Drops all data from every backend in this store's current storage
    /// scope (spec.md §4.F `clear`; SPEC_FULL.md §9 resolves the
    /// underspecified scope to "current scope, not just the default").
    ///
    /// # Errors
    /// [`StoreError::Internal`] on an unknown storage scope participant.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.multi.clear(&self.storage_scope)
    }
}
