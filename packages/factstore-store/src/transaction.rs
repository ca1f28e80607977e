//! The transaction layer: scoped read/write operators over
//! one [`MultiStoreTxn`], with read-your-own-writes, lazy timestamp
//! assignment, before-insert/before-commit hooks, and cancellation on the
//! dedicated write-rule error.
//!
//! A [`Transaction`] is never constructed directly by callers — it is
//! handed to the user callback passed to
//! [`crate::triplestore::TripleStore::transact`], which owns the commit/
//! cancel decision around it.

use std::sync::Arc;

use factstore_core::{attr, Attribute, Clock, StoreError, Timestamp, TripleRow, Value};
use parking_lot::Mutex;

use crate::codec;
use crate::engine::ScanArgs;
use crate::multistore::MultiStoreTxn;
use crate::scan;

/// Invoked with the incoming batch and the transaction staging it, before
/// any index write; may veto the whole batch by returning `Err`
/// (conventionally [`StoreError::WriteRule`]).
pub type BeforeInsertHook = Arc<dyn Fn(&[TripleRow], &Transaction) -> Result<(), StoreError> + Send + Sync>;

/// Invoked once, with the transaction about to commit, before the
/// underlying backend flush.
pub type BeforeCommitHook = Arc<dyn Fn(&Transaction) -> Result<(), StoreError> + Send + Sync>;

/// The attribute every entity's collection-membership fact is stored
/// under, used by `expireEntity` to find every attribute an entity has
/// ever been written under.
fn collection_attribute() -> Attribute {
    attr(&["_collection"])
}

/// One transaction staged against a [`MultiStoreTxn`].
///
/// Every read issued through a `Transaction` method sees this
/// transaction's own staged writes layered over the backend snapshot it
/// began from, because it scans through [`MultiStoreTxn::scan`] rather
/// than [`crate::multistore::MultiStore::scan`].
pub struct Transaction {
    txn: MultiStoreTxn,
    clock: Arc<Clock>,
    cached_timestamp: Arc<Mutex<Option<Timestamp>>>,
    before_insert_hooks: Arc<Vec<BeforeInsertHook>>,
    before_commit_hooks: Arc<Vec<BeforeCommitHook>>,
}

impl Transaction {
    pub(crate) fn new(
        txn: MultiStoreTxn,
        clock: Arc<Clock>,
        before_insert_hooks: Arc<Vec<BeforeInsertHook>>,
        before_commit_hooks: Arc<Vec<BeforeCommitHook>>,
    ) -> Self {
        Self {
            txn,
            clock,
            cached_timestamp: Arc::new(Mutex::new(None)),
            before_insert_hooks,
            before_commit_hooks,
        }
    }

    fn scan(&self, args: &ScanArgs) -> Result<Vec<TripleRow>, StoreError> {
        codec::decode_rows(&self.txn.scan(args)?)
    }

    /// Lazily obtains one timestamp from the clock on first call, then
    /// returns the same value for the rest of this transaction's lifetime
    /// — including sub-operators produced by [`Transaction::with_scope`],
    /// since they share `cached_timestamp`.
    #[must_use]
    pub fn get_transaction_timestamp(&self) -> Timestamp {
        let mut cached = self.cached_timestamp.lock();
        if let Some(ts) = cached.as_ref() {
            return ts.clone();
        }
        let ts = self.clock.get_next_timestamp();
        *cached = Some(ts.clone());
        ts
    }

    // ---- reads (see own staged writes) ----

    /// # Errors
    /// Propagates [`StoreError::Internal`] for an unknown storage scope
    /// participant or a malformed stored row.
    pub fn find_by_entity(&self, entity_id: &str) -> Result<Vec<TripleRow>, StoreError> {
        self.scan(&scan::find_by_entity(entity_id))
    }

    /// # Errors
    /// See [`Transaction::find_by_entity`].
    pub fn find_by_entity_attribute(&self, entity_id: &str, attribute: &Attribute) -> Result<Vec<TripleRow>, StoreError> {
        self.scan(&scan::find_by_entity_attribute(entity_id, attribute))
    }

    /// # Errors
    /// See [`Transaction::find_by_entity`].
    pub fn find_by_attribute(&self, attribute: &Attribute) -> Result<Vec<TripleRow>, StoreError> {
        self.scan(&scan::find_by_attribute(attribute))
    }

    // ---- insert protocol ----

    /// `insertTriples(batch)`.
    ///
    /// 1. An empty batch is a no-op.
    /// 2. Every before-insert hook runs first, against the whole batch; any
    ///    `Err` aborts without writing anything.
    /// 3. Every fact's value must be well-formed (not the "undefined"
    ///    sentinel, not NaN) — checked for the *entire* batch before any
    ///    fact is written, so a bad fact never leaves earlier facts in the
    ///    same batch partially indexed.
    /// 4. Each fact is then staged through the idempotent per-key insert
    ///    rule: writing the same `(entity, attribute)` key with the same
    ///    `expired` flag twice is a no-op.
    ///
    /// # Errors
    /// [`StoreError::InvalidTripleStoreValue`] if any fact's value is not
    /// well-formed; [`StoreError::Internal`] if a hook vetoes the batch, an
    /// EAV key already has more than one row (corruption), or a storage
    /// scope participant is unknown.
    pub fn insert_triples(&self, batch: Vec<TripleRow>) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        for hook in self.before_insert_hooks.iter() {
            hook(&batch, self)?;
        }
        for row in &batch {
            if !row.value.is_well_formed() {
                return Err(StoreError::InvalidTripleStoreValue(format!("{:?}", row.value)));
            }
        }
        for row in &batch {
            self.insert_one(row)?;
        }
        Ok(())
    }

    /// `insertTriple(single)`: a one-element [`Transaction::insert_triples`].
    ///
    /// # Errors
    /// See [`Transaction::insert_triples`].
    pub fn insert_triple(&self, row: TripleRow) -> Result<(), StoreError> {
        self.insert_triples(vec![row])
    }

    fn insert_one(&self, row: &TripleRow) -> Result<(), StoreError> {
        let (eav_key, _) = codec::encode_eav(row);
        let existing = self.txn.scan(&ScanArgs::with_prefix(eav_key))?;
        match existing.as_slice() {
            [] => self.write_all_indexes(row),
            [only] => {
                let meta: codec::FactMeta = serde_json::from_slice(&only.value)
                    .map_err(|e| StoreError::Internal(format!("corrupt fact metadata: {e}")))?;
                if meta.expired == row.expired {
                    Ok(())
                } else {
                    self.write_all_indexes(row)
                }
            }
            _ => Err(StoreError::Internal(format!(
                "multiple EAV rows for entity {:?} attribute {:?}",
                row.entity_id, row.attribute
            ))),
        }
    }

    fn write_all_indexes(&self, row: &TripleRow) -> Result<(), StoreError> {
        for (key, value) in codec::encode_all(row) {
            self.txn.set(key, value)?;
        }
        Ok(())
    }

    // ---- delete protocol ----

    /// Removes each fact's `EAV`, `AVE`, and `clientTimestamp` keys. (The
    /// `VAE` family is never written, so there is no `VAE` key to remove —
    /// see `DESIGN.md`'s Open Question resolution.) Idempotent: removing a
    /// key that is already absent is not an error.
    ///
    /// # Errors
    /// [`StoreError::Internal`] if a storage scope participant is unknown.
    pub fn delete_triples(&self, batch: &[TripleRow]) -> Result<(), StoreError> {
        for row in batch {
            let (eav_key, _) = codec::encode_eav(row);
            let (ave_key, _) = codec::encode_ave(row);
            let (ct_key, _) = codec::encode_client_timestamp(row);
            self.txn.remove(&eav_key)?;
            self.txn.remove(&ave_key)?;
            self.txn.remove(&ct_key)?;
        }
        Ok(())
    }

    // ---- setValue(s) protocol ----

    /// `setValue(e, a, v)`: a one-pair [`Transaction::set_values`].
    ///
    /// # Errors
    /// See [`Transaction::set_values`].
    pub fn set_value(&self, entity_id: impl Into<String>, attribute: Attribute, value: Value) -> Result<(), StoreError> {
        self.set_values(vec![(entity_id.into(), attribute, value)])
    }

    /// `setValues([(e, a, v), ...])`: last-writer-wins under the
    /// transaction timestamp. For each pair, every
    /// existing fact for `(e, a)` is read; if any has a timestamp strictly
    /// greater than this transaction's timestamp, the update for that pair
    /// is dropped — otherwise a new fact `(e, a, v, t_tx, expired=false)` is
    /// staged.
    ///
    /// # Errors
    /// [`StoreError::Internal`] on an unknown storage scope participant;
    /// [`StoreError::InvalidTripleStoreValue`] if any staged value is not
    /// well-formed.
    pub fn set_values(&self, updates: Vec<(String, Attribute, Value)>) -> Result<(), StoreError> {
        let t_tx = self.get_transaction_timestamp();
        let mut batch = Vec::with_capacity(updates.len());
        for (entity_id, attribute, value) in updates {
            let existing = self.find_by_entity_attribute(&entity_id, &attribute)?;
            if existing.iter().any(|row| row.timestamp > t_tx) {
                continue;
            }
            batch.push(TripleRow::new(entity_id, attribute, value, t_tx.clone(), false));
        }
        self.insert_triples(batch)
    }

    // ---- expiry ----

    /// `expireEntity(e)`: at this transaction's timestamp, deletes every
    /// fact currently held for `e` — including its existing `_collection`
    /// fact(s) — then re-inserts one tombstone per `_collection` fact with
    /// `expired=true` at `t_tx`.
    ///
    /// The existing `_collection` facts must be deleted explicitly rather
    /// than left for the insert protocol's same-key overwrite rule to
    /// replace: that rule only fires when the tombstone's EAV key matches
    /// the original fact's key exactly, which requires `t_tx` to equal the
    /// original fact's timestamp. `t_tx` comes from the shared, strictly
    /// monotone clock (`Clock::get_next_timestamp`), so once any other
    /// transaction has run since the `_collection` fact was written, `t_tx`
    /// is strictly greater and the tombstone would land at a brand-new key
    /// alongside the untouched original instead of replacing it.
    ///
    /// # Errors
    /// [`StoreError::Internal`] on an unknown storage scope participant or
    /// index corruption.
    pub fn expire_entity(&self, entity_id: &str) -> Result<(), StoreError> {
        let t_tx = self.get_transaction_timestamp();
        let all = self.find_by_entity(entity_id)?;
        let collection_attr = collection_attribute();
        let (collection_facts, other_facts): (Vec<TripleRow>, Vec<TripleRow>) =
            all.into_iter().partition(|row| row.attribute == collection_attr);

        self.delete_triples(&other_facts)?;
        self.delete_triples(&collection_facts)?;

        let tombstones: Vec<TripleRow> = collection_facts
            .into_iter()
            .map(|fact| TripleRow::new(fact.entity_id, fact.attribute, fact.value, t_tx.clone(), true))
            .collect();
        self.insert_triples(tombstones)
    }

    /// `expireEntityAttributes([(e, a), ...])`: for each pair, deletes any
    /// existing facts then inserts one tombstone fact with `value=null,
    /// expired=true` at this transaction's timestamp.
    ///
    /// # Errors
    /// [`StoreError::Internal`] on an unknown storage scope participant or
    /// index corruption.
    pub fn expire_entity_attributes(&self, pairs: &[(String, Attribute)]) -> Result<(), StoreError> {
        let t_tx = self.get_transaction_timestamp();
        let mut to_delete = Vec::new();
        for (entity_id, attribute) in pairs {
            to_delete.extend(self.find_by_entity_attribute(entity_id, attribute)?);
        }
        self.delete_triples(&to_delete)?;

        let tombstones: Vec<TripleRow> = pairs
            .iter()
            .map(|(entity_id, attribute)| {
                TripleRow::new(entity_id.clone(), attribute.clone(), Value::Null, t_tx.clone(), true)
            })
            .collect();
        self.insert_triples(tombstones)
    }

    // ---- metadata ----

    /// `updateMetadataTuples`: writes each row's metadata key directly,
    /// bypassing the fact indexing protocol entirely (metadata tuples are
    /// not versioned).
    ///
    /// # Errors
    /// [`StoreError::Internal`] on an unknown storage scope participant.
    pub fn update_metadata_tuples(&self, rows: &[factstore_core::MetaRow]) -> Result<(), StoreError> {
        for row in rows {
            let (key, value) = codec::encode_metadata(row);
            self.txn.set(key, value)?;
        }
        Ok(())
    }

    /// `deleteMetadataTuples`: removes the metadata key for each
    /// `(entity_id, attribute)` pair.
    ///
    /// # Errors
    /// [`StoreError::Internal`] on an unknown storage scope participant.
    pub fn delete_metadata_tuples(&self, entity_id: &str, attributes: &[Attribute]) -> Result<(), StoreError> {
        for attribute in attributes {
            let key = codec::encode_metadata_key(entity_id, attribute);
            self.txn.remove(&key)?;
        }
        Ok(())
    }

    // ---- scoping, hooks, commit/cancel ----

    /// `withScope(names)`: a sub-operator sharing this transaction's
    /// clock, cached timestamp, and hook lists, but whose backend
    /// operations are restricted to `names`.
    ///
    /// # Errors
    /// [`StoreError::Internal`] if `names` is not a subset of the parent
    /// transaction's storage scope.
    pub fn with_scope(&self, names: &[String]) -> Result<Transaction, StoreError> {
        Ok(Transaction {
            txn: self.txn.with_scope(names)?,
            clock: self.clock.clone(),
            cached_timestamp: self.cached_timestamp.clone(),
            before_insert_hooks: self.before_insert_hooks.clone(),
            before_commit_hooks: self.before_commit_hooks.clone(),
        })
    }

    /// Runs every registered before-commit hook, in registration order.
    fn run_before_commit_hooks(&self) -> Result<(), StoreError> {
        for hook in self.before_commit_hooks.iter() {
            hook(self)?;
        }
        Ok(())
    }

    /// Runs before-commit hooks, then flushes every participant in this
    /// transaction's original storage scope. Consumes the transaction.
    ///
    /// # Errors
    /// Whatever the first failing before-commit hook or backend commit
    /// returns.
    pub fn commit(self) -> Result<(), StoreError> {
        self.run_before_commit_hooks()?;
        self.txn.commit().map_err(StoreError::from)
    }

    /// Discards every staged write across this transaction's original
    /// storage scope. Consumes the transaction.
    pub fn cancel(self) {
        self.txn.cancel();
    }
}
