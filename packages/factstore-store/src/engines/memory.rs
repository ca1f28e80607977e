//! In-memory [`OrderedEngine`] implementation backed by a `BTreeMap`.
//!
//! The reference backend for this crate: a `parking_lot::RwLock<BTreeMap<Key,
//! Vec<u8>>>`. Ordering by `Key` (a `Vec<KeyComponent>`) directly realizes the
//! composite-key ordering algebra via `KeyComponent`'s own `Ord` impl — no
//! byte encoding step involved. Generalized from a `DashMap`-backed
//! point-lookup store to an ordered, range-scannable, transactional engine.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use factstore_core::Key;
use parking_lot::{Mutex, RwLock};

use crate::engine::{
    batch_intersects, key_in_range, EngineTxn, KvEntry, OrderedEngine, ScanArgs, Subspace,
    SubscribeCallback, Unsubscribe, WriteBatch,
};

struct Subscriber {
    id: u64,
    range: ScanArgs,
    cb: SubscribeCallback,
}

struct Inner {
    data: RwLock<BTreeMap<Key, Vec<u8>>>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_sub_id: AtomicU64,
}

/// In-memory ordered key-value engine. Cheap to clone: internally an
/// `Arc`, so `subspace()` and test fixtures can share one backend.
#[derive(Clone)]
pub struct MemoryEngine {
    inner: Arc<Inner>,
}

impl MemoryEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                data: RwLock::new(BTreeMap::new()),
                subscribers: Mutex::new(Vec::new()),
                next_sub_id: AtomicU64::new(0),
            }),
        }
    }

    fn notify(&self, batch: &WriteBatch) {
        if batch.is_empty() {
            return;
        }
        let subs = self.inner.subscribers.lock();
        for sub in subs.iter() {
            if batch_intersects(&sub.range, batch) {
                (sub.cb)(batch);
            }
        }
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn scan_map(map: &BTreeMap<Key, Vec<u8>>, args: &ScanArgs) -> Vec<KvEntry> {
    let mut out: Vec<KvEntry> = map
        .iter()
        .filter(|(k, _)| key_in_range(args, k))
        .map(|(k, v)| KvEntry {
            key: k.clone(),
            value: v.clone(),
        })
        .collect();
    if args.reverse {
        out.reverse();
    }
    out
}

impl OrderedEngine for MemoryEngine {
    fn scan(&self, args: &ScanArgs) -> Vec<KvEntry> {
        scan_map(&self.inner.data.read(), args)
    }

    fn begin_txn(&self) -> Box<dyn EngineTxn> {
        Box::new(MemoryTxn {
            engine: self.clone(),
            staged: BTreeMap::new(),
        })
    }

    fn subscribe(&self, range: ScanArgs, cb: SubscribeCallback) -> Unsubscribe {
        let id = self.inner.next_sub_id.fetch_add(1, AtomicOrdering::SeqCst);
        self.inner
            .subscribers
            .lock()
            .push(Subscriber { id, range, cb });

        let inner = self.inner.clone();
        Unsubscribe::new(move || {
            inner.subscribers.lock().retain(|s| s.id != id);
        })
    }

    fn subspace(&self, prefix: Key) -> Arc<dyn OrderedEngine> {
        Arc::new(Subspace::new(Arc::new(self.clone()), prefix))
    }

    fn clear(&self) {
        let mut data = self.inner.data.write();
        if data.is_empty() {
            return;
        }
        let remove: Vec<Key> = data.keys().cloned().collect();
        data.clear();
        drop(data);
        self.notify(&WriteBatch {
            set: Vec::new(),
            remove,
        });
    }
}

/// A transaction over one [`MemoryEngine`]. Staged writes are kept in a
/// local map (`None` meaning "staged for removal") and layered over the
/// live committed state on every [`EngineTxn::scan`] call, giving callers a
/// read-your-own-writes view of their own in-flight transaction. This
/// reference implementation rebuilds the merged view on every scan rather
/// than maintaining an incremental overlay — simple and correct, not
/// optimized for large transactions.
struct MemoryTxn {
    engine: MemoryEngine,
    staged: BTreeMap<Key, Option<Vec<u8>>>,
}

impl EngineTxn for MemoryTxn {
    fn set(&mut self, key: Key, value: Vec<u8>) {
        self.staged.insert(key, Some(value));
    }

    fn remove(&mut self, key: &Key) {
        self.staged.insert(key.clone(), None);
    }

    fn scan(&self, args: &ScanArgs) -> Vec<KvEntry> {
        let mut merged = self.engine.inner.data.read().clone();
        for (k, v) in &self.staged {
            match v {
                Some(bytes) => {
                    merged.insert(k.clone(), bytes.clone());
                }
                None => {
                    merged.remove(k);
                }
            }
        }
        scan_map(&merged, args)
    }

    fn commit(self: Box<Self>) -> anyhow::Result<()> {
        let mut batch = WriteBatch::default();
        {
            let mut data = self.engine.inner.data.write();
            for (key, value) in self.staged {
                match value {
                    Some(bytes) => {
                        data.insert(key.clone(), bytes.clone());
                        batch.set.push(KvEntry { key, value: bytes });
                    }
                    None => {
                        data.remove(&key);
                        batch.remove.push(key);
                    }
                }
            }
        }
        self.engine.notify(&batch);
        Ok(())
    }

    fn cancel(self: Box<Self>) {}
}
