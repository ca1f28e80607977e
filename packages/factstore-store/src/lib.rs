//! `factstore-store` — the storage substrate itself: the ordered
//! key-value backend contract and its in-memory reference implementation,
//! the multi-store dispatcher, the EAV/AVE/clientTimestamp/metadata index
//! codec, the scan algebra, the transaction layer, the public
//! [`TripleStore`], and the insert/write subscription plumbing.
//!
//! Everything here is built against [`factstore_core`]'s tenant-free
//! vocabulary (`Timestamp`, `Value`, `Attribute`, `KeyComponent`,
//! `StoreError`) — this crate adds the parts that actually touch a
//! backend.

pub mod codec;
pub mod engine;
pub mod engines;
pub mod multistore;
pub mod options;
pub mod scan;
pub mod subscription;
pub mod transaction;
pub mod triplestore;

pub use engine::{EngineTxn, KvEntry, OrderedEngine, ScanArgs, Unsubscribe, WriteBatch};
pub use engines::MemoryEngine;
pub use multistore::{MultiStore, MultiStoreTxn};
pub use options::{Storage, TripleStoreOptions, DEFAULT_STORE_NAME};
pub use scan::{Direction, RangeOpts, TimestampOp, ValueCursor};
pub use subscription::{InsertCallback, WriteCallback, WriteEvent};
pub use transaction::{BeforeCommitHook, BeforeInsertHook, Transaction};
pub use triplestore::TripleStore;


/// End-to-end scenarios, each exercised against the public [`TripleStore`]
/// surface the way a real caller would use it — not against any one
/// internal module in isolation. Wires multiple layers (clock, transaction,
/// multi-store dispatch) together and asserts on the resulting behavior
/// rather than unit-testing any one of them.
#[cfg(test)]
mod integration_tests {
    use std::sync::{Arc, Mutex};

    use factstore_core::{attr, Clock, Timestamp, TripleRow, Value};

    use crate::engines::MemoryEngine;
    use crate::options::TripleStoreOptions;
    use crate::subscription::WriteEvent;
    use crate::triplestore::TripleStore;

    fn store_with_clock(clock: Arc<Clock>) -> TripleStore {
        TripleStore::new(TripleStoreOptions {
            clock: Some(clock),
            ..TripleStoreOptions::with_storage(Arc::new(MemoryEngine::new()))
        })
        .unwrap()
    }

    /// S1: insert one fact, read it back through every index it
    /// participates in.
    #[test]
    fn s1_insert_then_read_through_every_index() {
        let store = store_with_clock(Arc::new(Clock::new("c1")));
        store
            .insert_triple(TripleRow::new(
                "e1",
                attr(&["users", "name"]),
                Value::String("Ada".to_string()),
                Timestamp::new(1, "c1"),
                false,
            ))
            .unwrap();

        let by_entity = store.find_by_entity("e1").unwrap();
        assert_eq!(by_entity.len(), 1);
        assert_eq!(by_entity[0].value, Value::String("Ada".to_string()));

        let by_attribute = store.find_by_attribute(&attr(&["users", "name"])).unwrap();
        assert_eq!(by_attribute, by_entity);

        assert_eq!(store.find_max_timestamp("c1").unwrap(), Some(Timestamp::new(1, "c1")));
    }

    /// S2: re-inserting the same fact is a no-op; re-inserting the same
    /// key with a different `expired` overwrites in place rather than
    /// duplicating.
    #[test]
    fn s2_reinsert_is_idempotent_expired_flip_overwrites() {
        let store = store_with_clock(Arc::new(Clock::new("c1")));
        let row = TripleRow::new("e1", attr(&["users", "name"]), Value::String("Ada".to_string()), Timestamp::new(1, "c1"), false);
        store.insert_triple(row.clone()).unwrap();
        store.insert_triple(row.clone()).unwrap();
        assert_eq!(store.find_by_entity("e1").unwrap().len(), 1);

        let mut expired = row;
        expired.expired = true;
        store.insert_triple(expired).unwrap();

        let rows = store.find_by_entity("e1").unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].expired);
    }

    /// S3: `setValue` writes a second, later-timestamped version without
    /// displacing the first.
    #[test]
    fn s3_set_value_appends_a_later_version() {
        let clock = Arc::new(Clock::new("c1"));
        let store = store_with_clock(clock.clone());
        store
            .insert_triple(TripleRow::new("e1", attr(&["users", "name"]), Value::String("Ada".to_string()), Timestamp::new(1, "c1"), false))
            .unwrap();
        // Fast-forward the clock past the pre-seeded fact's counter so the
        // transaction's own timestamp lands at (2, "c1") as the scenario
        // describes.
        clock.observe(&Timestamp::new(1, "c1"));
        store
            .set_value("e1", attr(&["users", "name"]), Value::String("Grace".to_string()))
            .unwrap();

        let mut rows = store.find_by_entity_attribute("e1", &attr(&["users", "name"])).unwrap();
        rows.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp, Timestamp::new(1, "c1"));
        assert_eq!(rows[1].timestamp, Timestamp::new(2, "c1"));
        assert_eq!(rows[1].value, Value::String("Grace".to_string()));
    }

    /// S4: `setValue` under a fact from the future is dropped entirely.
    #[test]
    fn s4_set_value_under_a_future_fact_is_dropped() {
        // A fresh clock's first timestamp is (1, "c1"); pre-populating a
        // fact at (5, "c1") without ever observing it puts that fact ahead
        // of any transaction this store opens next.
        let store = store_with_clock(Arc::new(Clock::new("c1")));
        store
            .insert_triple(TripleRow::new("e1", attr(&["users", "name"]), Value::String("X".to_string()), Timestamp::new(5, "c1"), false))
            .unwrap();

        store
            .set_value("e1", attr(&["users", "name"]), Value::String("Y".to_string()))
            .unwrap();

        let rows = store.find_by_entity_attribute("e1", &attr(&["users", "name"])).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, Value::String("X".to_string()), "future fact must not be displaced");
    }

    /// S5: `findByClientTimestamp` with `gt` returns everything strictly
    /// greater, in ascending order.
    #[test]
    fn s5_find_by_client_timestamp_gt_is_ascending_and_exclusive() {
        let store = store_with_clock(Arc::new(Clock::new("c1")));
        for counter in 1..=4u64 {
            store
                .insert_triple(TripleRow::new(
                    format!("e{counter}"),
                    attr(&["users", "name"]),
                    Value::String(format!("v{counter}")),
                    Timestamp::new(counter, "c1"),
                    false,
                ))
                .unwrap();
        }

        let rows = store
            .find_by_client_timestamp("c1", "gt", Some(&Timestamp::new(2, "c1")))
            .unwrap();
        let counters: Vec<u64> = rows.iter().map(|r| r.timestamp.counter).collect();
        assert_eq!(counters, vec![3, 4]);
    }

    /// S6: `expireEntity` leaves only the `_collection` tombstone, and
    /// subscribers observe both the tombstone insert and the deletes of
    /// everything else. Runs after the clock has already advanced past the
    /// entity's facts' own timestamp — exactly as spec.md §8 describes
    /// ("`expireEntity("e1")` after S3", where S3 already moved the clock
    /// to counter 2) — so `expire_entity`'s tombstone timestamp cannot
    /// coincidentally equal the original `_collection` fact's timestamp.
    #[test]
    fn s6_expire_entity_tombstones_and_notifies_subscribers() {
        let clock = Arc::new(Clock::new("c1"));
        let store = store_with_clock(clock.clone());
        store
            .insert_triples(vec![
                TripleRow::new("e1", attr(&["_collection"]), Value::String("users".to_string()), Timestamp::new(1, "c1"), false),
                TripleRow::new("e1", attr(&["users", "name"]), Value::String("Ada".to_string()), Timestamp::new(1, "c1"), false),
                TripleRow::new("e1", attr(&["users", "age"]), Value::Number(30.0), Timestamp::new(1, "c1"), false),
            ])
            .unwrap();
        clock.observe(&Timestamp::new(1, "c1"));

        let inserts = Arc::new(Mutex::new(Vec::new()));
        let inserts2 = inserts.clone();
        let _insert_sub = store.on_insert(Arc::new(move |row| inserts2.lock().unwrap().push(row.clone()))).unwrap();

        let writes = Arc::new(Mutex::new(Vec::new()));
        let writes2 = writes.clone();
        let _write_sub = store.on_write(Arc::new(move |event| writes2.lock().unwrap().push(event.clone()))).unwrap();

        store.expire_entity("e1").unwrap();

        let rows = store.find_by_entity("e1").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].attribute, attr(&["_collection"]));
        assert!(rows[0].expired);

        assert_eq!(inserts.lock().unwrap().len(), 1, "the re-inserted tombstone is the only onInsert event from the expiry");
        let deletes: Vec<_> = writes
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, WriteEvent::Deleted(_)))
            .count();
        assert_eq!(deletes, 3, "both non-collection facts and the original _collection fact were deleted");
    }

    /// Hook veto: a before-insert hook that returns `Err` keeps every fact
    /// in the batch out of every index.
    #[test]
    fn hook_veto_blocks_the_whole_batch() {
        let store = store_with_clock(Arc::new(Clock::new("c1")));
        store.before_insert(Arc::new(|_batch, _txn| {
            Err(factstore_core::StoreError::WriteRule("no writes allowed".to_string()))
        }));

        let err = store
            .insert_triple(TripleRow::new("e1", attr(&["users", "name"]), Value::String("Ada".to_string()), Timestamp::new(1, "c1"), false))
            .unwrap_err();
        assert!(err.is_write_rule());
        assert!(store.find_by_entity("e1").unwrap().is_empty());
        assert!(store.find_by_attribute(&attr(&["users", "name"])).unwrap().is_empty());
    }
}
