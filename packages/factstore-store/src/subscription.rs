//! Insert/write notification plumbing.
//!
//! The multi-store already publishes raw [`WriteBatch`](crate::engine::WriteBatch)es to
//! any subscriber whose range intersects a commit; this module narrows that
//! to the `EAV` family and decodes each touched key into a
//! [`TripleRow`](factstore_core::TripleRow), following a simple fan-out
//! shape (a list of callbacks invoked in registration order) but specialized
//! to decode rather than forward opaque bytes.

use std::sync::Arc;

use factstore_core::{StoreError, TripleRow};

use crate::codec::{self, FactMeta, IndexFamily};
use crate::engine::{ScanArgs, Unsubscribe, WriteBatch};
use crate::multistore::MultiStore;

/// Invoked once per inserted/overwritten fact.
pub type InsertCallback = Arc<dyn Fn(&TripleRow) + Send + Sync>;

/// One event delivered to an `onWrite` subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteEvent {
    /// A fact was inserted or overwritten.
    Inserted(TripleRow),
    /// A fact was removed. `expired` is always `false` here: the erased
    /// value is unavailable to a delete event, so it is fabricated rather
    /// than guessed.
    Deleted(TripleRow),
}

pub type WriteCallback = Arc<dyn Fn(&WriteEvent) + Send + Sync>;

/// The `{expired}` payload a delete event decodes against, since no real
/// value survives a removal.
fn fabricated_not_expired() -> Vec<u8> {
    serde_json::to_vec(&FactMeta { expired: false }).expect("FactMeta serialization cannot fail")
}

/// `onInsert(cb)`: decodes every `set` in the `EAV` family and hands each
/// row to `cb`.
///
/// # Errors
/// Returns [`StoreError::Internal`] if `scope` names an unconfigured
/// backend.
pub fn subscribe_inserts(store: &MultiStore, scope: &[String], cb: InsertCallback) -> Result<Unsubscribe, StoreError> {
    let range = ScanArgs::with_prefix(IndexFamily::Eav.prefix());
    store.subscribe(
        scope,
        range,
        Arc::new(move |batch: &WriteBatch| {
            for entry in &batch.set {
                if let Ok(row) = codec::decode_row(&entry.key, &entry.value) {
                    cb(&row);
                }
            }
        }),
    )
}

/// `onWrite(cb)`: decodes every `set` and `remove` in the `EAV` family and
/// hands each as a [`WriteEvent`] to `cb`.
///
/// # Errors
/// Returns [`StoreError::Internal`] if `scope` names an unconfigured
/// backend.
pub fn subscribe_writes(store: &MultiStore, scope: &[String], cb: WriteCallback) -> Result<Unsubscribe, StoreError> {
    let range = ScanArgs::with_prefix(IndexFamily::Eav.prefix());
    store.subscribe(
        scope,
        range,
        Arc::new(move |batch: &WriteBatch| {
            for entry in &batch.set {
                if let Ok(row) = codec::decode_row(&entry.key, &entry.value) {
                    cb(&WriteEvent::Inserted(row));
                }
            }
            let deleted_payload = fabricated_not_expired();
            for key in &batch.remove {
                if let Ok(row) = codec::decode_row(key, &deleted_payload) {
                    cb(&WriteEvent::Deleted(row));
                }
            }
        }),
    )
}
