//! The ordered key-value backend contract (spec.md §4.A/§6, component A).
//!
//! [`OrderedEngine`] is the innermost storage layer: a sorted map from
//! composite [`Key`]s to opaque byte values, with prefix/range scans and
//! atomic transactional commit. Everything above this layer — the index
//! codec, the scan algebra, the transaction layer — is backend-agnostic and
//! only ever speaks this trait.

use factstore_core::Key;

/// One entry returned from a scan: an ordered key plus its opaque value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub key: Key,
    pub value: Vec<u8>,
}

/// Bounds for one ordered scan. `prefix` restricts the scan to keys that
/// start with it; `gt`/`gte` and `lt`/`lte` additionally bound the range
/// (at most one of each pair is set). `reverse` walks the matched range
/// from high to low.
///
/// This mirrors spec.md §4.A's `scan(args)` almost verbatim; the only
/// departure is that bounds here are structured [`Key`]s (sequences of
/// [`KeyComponent`](factstore_core::KeyComponent)) rather than pre-encoded
/// bytes, so the scan algebra in `crate::scan` never has to reason about
/// byte encoding.
#[derive(Debug, Clone, Default)]
pub struct ScanArgs {
    pub prefix: Key,
    pub gt: Option<Key>,
    pub gte: Option<Key>,
    pub lt: Option<Key>,
    pub lte: Option<Key>,
    pub reverse: bool,
}

impl ScanArgs {
    #[must_use]
    pub fn with_prefix(prefix: Key) -> Self {
        Self {
            prefix,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }
}

/// A batch of committed writes, as delivered to subscribers: keys that were
/// set (with their new value) and keys that were removed.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub set: Vec<KvEntry>,
    pub remove: Vec<Key>,
}

impl WriteBatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }
}

/// Callback invoked with every committed [`WriteBatch`] whose keys
/// intersect the range a subscriber registered for.
pub type SubscribeCallback = Box<dyn Fn(&WriteBatch) + Send + Sync>;

/// Handle returned by [`OrderedEngine::subscribe`]. Dropping it does
/// nothing by itself — call [`Unsubscribe::cancel`] to actually detach,
/// matching spec.md §4.A's "subscribe returns an unsubscribe handle"
/// (explicit, not RAII).
pub struct Unsubscribe(Box<dyn FnOnce() + Send>);

impl Unsubscribe {
    #[must_use]
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    pub fn cancel(self) {
        (self.0)();
    }
}

/// One transaction staged against an [`OrderedEngine`]. Reads issued
/// through [`EngineTxn::scan`] see this transaction's own staged writes
/// layered over the snapshot it began from (spec.md §5, "read-your-own-
/// writes").
pub trait EngineTxn: Send {
    fn set(&mut self, key: Key, value: Vec<u8>);
    fn remove(&mut self, key: &Key);
    fn scan(&self, args: &ScanArgs) -> Vec<KvEntry>;

    /// Flushes staged writes to the backend and notifies subscribers.
    /// Consumes the transaction: there is nothing left to do with it after
    /// commit or cancel.
    ///
    /// # Errors
    /// Returns an error if the backend rejects the commit (e.g. an
    /// optimistic-concurrency conflict).
    fn commit(self: Box<Self>) -> anyhow::Result<()>;

    /// Discards every staged write. Consumes the transaction.
    fn cancel(self: Box<Self>);
}

/// The per-backend contract every index, scan, and transaction in this
/// crate is built against (spec.md §6, "Ordered KV backend contract").
pub trait OrderedEngine: Send + Sync {
    fn scan(&self, args: &ScanArgs) -> Vec<KvEntry>;
    fn begin_txn(&self) -> Box<dyn EngineTxn>;

    /// Registers `cb` to be invoked, after commit, with every write batch
    /// whose keys intersect `range`.
    fn subscribe(&self, range: ScanArgs, cb: SubscribeCallback) -> Unsubscribe;

    /// Returns a view of this engine whose every key is transparently
    /// prefixed with `prefix` (spec.md §4.A).
    fn subspace(&self, prefix: Key) -> std::sync::Arc<dyn OrderedEngine>;

    /// Drops all data in this engine.
    fn clear(&self);
}

/// True if `key` falls within the range `args` describes.
///
/// Shared by every [`OrderedEngine`] implementation (and by subscription
/// dispatch, which must decide whether a committed key belongs to a given
/// subscriber's range) so the definition of "matches a scan" has exactly
/// one place to live.
#[must_use]
pub fn key_in_range(args: &ScanArgs, key: &Key) -> bool {
    if key.len() < args.prefix.len() || key[..args.prefix.len()] != args.prefix[..] {
        return false;
    }
    if let Some(gt) = &args.gt {
        if key <= gt {
            return false;
        }
    }
    if let Some(gte) = &args.gte {
        if key < gte {
            return false;
        }
    }
    if let Some(lt) = &args.lt {
        if key >= lt {
            return false;
        }
    }
    if let Some(lte) = &args.lte {
        if key > lte {
            return false;
        }
    }
    true
}

/// True if any key touched by `batch` falls within `range`.
#[must_use]
pub fn batch_intersects(range: &ScanArgs, batch: &WriteBatch) -> bool {
    batch
        .set
        .iter()
        .any(|e| key_in_range(range, &e.key))
        || batch.remove.iter().any(|k| key_in_range(range, k))
}

/// An [`OrderedEngine`] view that transparently prefixes every key of an
/// inner engine with a fixed [`Key`] (spec.md §4.A's `subspace(prefix)`).
pub struct Subspace {
    inner: std::sync::Arc<dyn OrderedEngine>,
    prefix: Key,
}

impl Subspace {
    #[must_use]
    pub fn new(inner: std::sync::Arc<dyn OrderedEngine>, prefix: Key) -> Self {
        Self { inner, prefix }
    }

    fn extend(&self, suffix: &Key) -> Key {
        let mut full = self.prefix.clone();
        full.extend(suffix.iter().cloned());
        full
    }

    fn extend_bound(&self, bound: &Option<Key>) -> Option<Key> {
        bound.as_ref().map(|b| self.extend(b))
    }

    fn translate_args(&self, args: &ScanArgs) -> ScanArgs {
        ScanArgs {
            prefix: self.extend(&args.prefix),
            gt: self.extend_bound(&args.gt),
            gte: self.extend_bound(&args.gte),
            lt: self.extend_bound(&args.lt),
            lte: self.extend_bound(&args.lte),
            reverse: args.reverse,
        }
    }

    fn strip(&self, key: &Key) -> Key {
        key[self.prefix.len()..].to_vec()
    }
}

impl OrderedEngine for Subspace {
    fn scan(&self, args: &ScanArgs) -> Vec<KvEntry> {
        self.inner
            .scan(&self.translate_args(args))
            .into_iter()
            .map(|e| KvEntry {
                key: self.strip(&e.key),
                value: e.value,
            })
            .collect()
    }

    fn begin_txn(&self) -> Box<dyn EngineTxn> {
        Box::new(SubspaceTxn {
            inner: self.inner.begin_txn(),
            prefix: self.prefix.clone(),
        })
    }

    fn subscribe(&self, range: ScanArgs, cb: SubscribeCallback) -> Unsubscribe {
        let prefix = self.prefix.clone();
        let translated = self.translate_args(&range);
        self.inner.subscribe(
            translated,
            Box::new(move |batch| {
                let stripped = WriteBatch {
                    set: batch
                        .set
                        .iter()
                        .map(|e| KvEntry {
                            key: e.key[prefix.len()..].to_vec(),
                            value: e.value.clone(),
                        })
                        .collect(),
                    remove: batch.remove.iter().map(|k| k[prefix.len()..].to_vec()).collect(),
                };
                cb(&stripped);
            }),
        )
    }

    fn subspace(&self, prefix: Key) -> std::sync::Arc<dyn OrderedEngine> {
        std::sync::Arc::new(Subspace::new(self.inner.clone(), self.extend(&prefix)))
    }

    fn clear(&self) {
        let entries = self.scan(&ScanArgs::default());
        let mut txn = self.begin_txn();
        for e in entries {
            txn.remove(&e.key);
        }
        let _ = txn.commit();
    }
}

struct SubspaceTxn {
    inner: Box<dyn EngineTxn>,
    prefix: Key,
}

impl EngineTxn for SubspaceTxn {
    fn set(&mut self, key: Key, value: Vec<u8>) {
        let mut full = self.prefix.clone();
        full.extend(key);
        self.inner.set(full, value);
    }

    fn remove(&mut self, key: &Key) {
        let mut full = self.prefix.clone();
        full.extend(key.iter().cloned());
        self.inner.remove(&full);
    }

    fn scan(&self, args: &ScanArgs) -> Vec<KvEntry> {
        let mut full_args = args.clone();
        let mut prefix = self.prefix.clone();
        prefix.extend(args.prefix.iter().cloned());
        full_args.prefix = prefix;
        full_args.gt = args.gt.as_ref().map(|b| {
            let mut v = self.prefix.clone();
            v.extend(b.iter().cloned());
            v
        });
        full_args.gte = args.gte.as_ref().map(|b| {
            let mut v = self.prefix.clone();
            v.extend(b.iter().cloned());
            v
        });
        full_args.lt = args.lt.as_ref().map(|b| {
            let mut v = self.prefix.clone();
            v.extend(b.iter().cloned());
            v
        });
        full_args.lte = args.lte.as_ref().map(|b| {
            let mut v = self.prefix.clone();
            v.extend(b.iter().cloned());
            v
        });
        self.inner
            .scan(&full_args)
            .into_iter()
            .map(|e| KvEntry {
                key: e.key[self.prefix.len()..].to_vec(),
                value: e.value,
            })
            .collect()
    }

    fn commit(self: Box<Self>) -> anyhow::Result<()> {
        self.inner.commit()
    }

    fn cancel(self: Box<Self>) {
        self.inner.cancel();
    }
}
