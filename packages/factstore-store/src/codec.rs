//! Index codec: translates facts and metadata tuples to and from the
//! composite keys of the four index families (spec.md §4.D).
//!
//! Four tagged families, each a [`Key`] prefixed by its tag:
//!
//! ```text
//! EAV:              [EAV, e, a, v, t]              -> {expired}
//! AVE:              [AVE, a, v, e, t]               -> {expired}
//! clientTimestamp:  [clientTimestamp, client, t, e, a, v] -> {expired}
//! metadata:         [metadata, e, ...a]             -> arbitrary
//! ```
//!
//! (The tenant prefix from spec.md's table is not part of these keys: it is
//! applied once, transparently, by the [`crate::multistore::MultiStore`]
//! that owns the backend each family is written through — see
//! `crate::multistore` and `DESIGN.md`.)
//!
//! The VAE family is named here (spec.md §9's "schema and delete paths")
//! but deliberately has no encoder: the half-implemented VAE index is an
//! explicit Open Question in spec.md, resolved to full omission (see
//! `DESIGN.md`).

use factstore_core::{
    attribute_from_key_component, attribute_key_component, AttrComponent, Attribute, Key,
    KeyComponent, MetaRow, MetaValue, StoreError, Timestamp, TripleRow, Value,
};
use serde::{Deserialize, Serialize};

use crate::engine::KvEntry;

/// Discriminates the four index families a [`Key`] may belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFamily {
    Eav,
    Ave,
    /// Reserved, never written (spec.md §9 Redesign Flag).
    Vae,
    ClientTimestamp,
    Metadata,
}

impl IndexFamily {
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            IndexFamily::Eav => "EAV",
            IndexFamily::Ave => "AVE",
            IndexFamily::Vae => "VAE",
            IndexFamily::ClientTimestamp => "clientTimestamp",
            IndexFamily::Metadata => "metadata",
        }
    }

    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "EAV" => IndexFamily::Eav,
            "AVE" => IndexFamily::Ave,
            "VAE" => IndexFamily::Vae,
            "clientTimestamp" => IndexFamily::ClientTimestamp,
            "metadata" => IndexFamily::Metadata,
            _ => return None,
        })
    }

    fn tag_component(self) -> KeyComponent {
        KeyComponent::String(self.tag().to_string())
    }

    /// The key prefix that selects exactly this family (every key in this
    /// family starts with its own tag and nothing else).
    #[must_use]
    pub fn prefix(self) -> Key {
        vec![self.tag_component()]
    }
}

/// The value payload stored alongside every EAV/AVE/clientTimestamp key:
/// just the tombstone flag, since every other field of the fact is already
/// recoverable from the key itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FactMeta {
    pub expired: bool,
}

fn internal(msg: impl Into<String>) -> StoreError {
    StoreError::Internal(msg.into())
}

fn encode_fact_meta(expired: bool) -> Vec<u8> {
    serde_json::to_vec(&FactMeta { expired }).expect("FactMeta serialization cannot fail")
}

fn decode_fact_meta(bytes: &[u8]) -> Result<FactMeta, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| internal(format!("corrupt fact metadata: {e}")))
}

/// Builds the EAV key `[EAV, e, a, v, t]` and its `{expired}` value.
#[must_use]
pub fn encode_eav(row: &TripleRow) -> (Key, Vec<u8>) {
    let key = vec![
        IndexFamily::Eav.tag_component(),
        KeyComponent::String(row.entity_id.clone()),
        attribute_key_component(&row.attribute),
        KeyComponent::from(&row.value),
        KeyComponent::from(&row.timestamp),
    ];
    (key, encode_fact_meta(row.expired))
}

/// Builds the AVE key `[AVE, a, v, e, t]` and its `{expired}` value.
#[must_use]
pub fn encode_ave(row: &TripleRow) -> (Key, Vec<u8>) {
    let key = vec![
        IndexFamily::Ave.tag_component(),
        attribute_key_component(&row.attribute),
        KeyComponent::from(&row.value),
        KeyComponent::String(row.entity_id.clone()),
        KeyComponent::from(&row.timestamp),
    ];
    (key, encode_fact_meta(row.expired))
}

/// Builds the clientTimestamp key `[clientTimestamp, client, t, e, a, v]`
/// and its `{expired}` value.
#[must_use]
pub fn encode_client_timestamp(row: &TripleRow) -> (Key, Vec<u8>) {
    let key = vec![
        IndexFamily::ClientTimestamp.tag_component(),
        KeyComponent::String(row.timestamp.client_id.clone()),
        KeyComponent::from(&row.timestamp),
        KeyComponent::String(row.entity_id.clone()),
        attribute_key_component(&row.attribute),
        KeyComponent::from(&row.value),
    ];
    (key, encode_fact_meta(row.expired))
}

/// Builds every index key this fact participates in (EAV, AVE,
/// clientTimestamp — never VAE), paired with the shared `{expired}` value.
/// Used by the transaction layer's insert protocol to write all three
/// indexes in lockstep (spec.md invariant #2, "Index coherence").
#[must_use]
pub fn encode_all(row: &TripleRow) -> [(Key, Vec<u8>); 3] {
    [
        encode_eav(row),
        encode_ave(row),
        encode_client_timestamp(row),
    ]
}

/// Builds the metadata key `[metadata, e, ...a]`: unlike fact keys, the
/// attribute path is spread directly into the key rather than nested as one
/// array component (spec.md §4.D).
#[must_use]
pub fn encode_metadata_key(entity_id: &str, attribute: &Attribute) -> Key {
    let mut key = vec![
        IndexFamily::Metadata.tag_component(),
        KeyComponent::String(entity_id.to_string()),
    ];
    key.extend(attribute.iter().map(KeyComponent::from));
    key
}

#[must_use]
pub fn encode_metadata(row: &MetaRow) -> (Key, Vec<u8>) {
    let key = encode_metadata_key(&row.entity_id, &row.attribute);
    let value = serde_json::to_vec(&row.value.0).expect("serde_json::Value never fails to serialize");
    (key, value)
}

fn expect_string(component: &KeyComponent) -> Result<String, StoreError> {
    match component {
        KeyComponent::String(s) => Ok(s.clone()),
        other => Err(internal(format!("expected string key component, found {other:?}"))),
    }
}

fn expect_attribute(component: &KeyComponent) -> Result<Attribute, StoreError> {
    attribute_from_key_component(component).map_err(internal)
}

fn expect_value(component: &KeyComponent) -> Result<Value, StoreError> {
    Value::try_from(component).map_err(internal)
}

fn expect_timestamp(component: &KeyComponent) -> Result<Timestamp, StoreError> {
    Timestamp::try_from(component).map_err(internal)
}

fn decode_eav(key: &Key, value: &[u8]) -> Result<TripleRow, StoreError> {
    let [_, entity, attribute, val, ts] = expect_arity(key)?;
    let meta = decode_fact_meta(value)?;
    Ok(TripleRow::new(
        expect_string(entity)?,
        expect_attribute(attribute)?,
        expect_value(val)?,
        expect_timestamp(ts)?,
        meta.expired,
    ))
}

fn decode_ave(key: &Key, value: &[u8]) -> Result<TripleRow, StoreError> {
    let [_, attribute, val, entity, ts] = expect_arity(key)?;
    let meta = decode_fact_meta(value)?;
    Ok(TripleRow::new(
        expect_string(entity)?,
        expect_attribute(attribute)?,
        expect_value(val)?,
        expect_timestamp(ts)?,
        meta.expired,
    ))
}

fn decode_client_timestamp(key: &Key, value: &[u8]) -> Result<TripleRow, StoreError> {
    if key.len() != 6 {
        return Err(internal(format!(
            "clientTimestamp key has {} components, expected 6",
            key.len()
        )));
    }
    let entity = &key[3];
    let attribute = &key[4];
    let val = &key[5];
    let ts = &key[2];
    let meta = decode_fact_meta(value)?;
    Ok(TripleRow::new(
        expect_string(entity)?,
        expect_attribute(attribute)?,
        expect_value(val)?,
        expect_timestamp(ts)?,
        meta.expired,
    ))
}

fn expect_arity(key: &Key) -> Result<[&KeyComponent; 5], StoreError> {
    key.as_slice()
        .try_into()
        .map_err(|_| internal(format!("fact key has {} components, expected 5", key.len())))
}

/// Decodes one scan result into a [`TripleRow`], dispatching on the index
/// family tag embedded as the key's first component (spec.md §4.D).
///
/// # Errors
/// Returns [`StoreError::IndexNotFound`] for an unrecognized or
/// non-fact-bearing tag (`VAE`, `metadata`, or anything unknown), and
/// [`StoreError::Internal`] if the key/value shape does not match what this
/// family's encoder would have produced.
pub fn decode_row(key: &Key, value: &[u8]) -> Result<TripleRow, StoreError> {
    let tag = key
        .first()
        .ok_or_else(|| internal("empty key cannot be decoded"))?;
    let tag = expect_string(tag)?;
    match IndexFamily::from_tag(&tag) {
        Some(IndexFamily::Eav) => decode_eav(key, value),
        Some(IndexFamily::Ave) => decode_ave(key, value),
        Some(IndexFamily::ClientTimestamp) => decode_client_timestamp(key, value),
        Some(IndexFamily::Vae) | Some(IndexFamily::Metadata) | None => {
            Err(StoreError::IndexNotFound(tag))
        }
    }
}

/// Decodes every entry of a fact-family (`EAV`/`AVE`/`clientTimestamp`) scan
/// result in order, the shared tail end of every `TripleStore::find_by_*`
/// read and of the transaction layer's own staging scans.
///
/// # Errors
/// Returns the first [`decode_row`] error encountered.
pub fn decode_rows(entries: &[KvEntry]) -> Result<Vec<TripleRow>, StoreError> {
    entries.iter().map(|e| decode_row(&e.key, &e.value)).collect()
}

/// Decodes a metadata-family scan result into a [`MetaRow`].
///
/// # Errors
/// Returns [`StoreError::Internal`] if `key` is shorter than the
/// `[metadata, entity]` minimum, or if the value is not a JSON document.
pub fn decode_metadata_row(key: &Key, value: &[u8]) -> Result<MetaRow, StoreError> {
    if key.len() < 2 {
        return Err(internal("metadata key missing entity id"));
    }
    let entity_id = expect_string(&key[1])?;
    let attribute: Result<Vec<AttrComponent>, _> = key[2..].iter().map(AttrComponent::try_from).collect();
    let attribute = attribute.map_err(internal)?;
    let json: serde_json::Value =
        serde_json::from_slice(value).map_err(|e| internal(format!("corrupt metadata value: {e}")))?;
    Ok(MetaRow::new(entity_id, attribute, MetaValue::new(json)))
}


/// Property-based round-trip checks (spec.md §8, "Round-trip laws") over
/// randomly generated facts, rather than the handful of fixed rows above.
#[cfg(test)]
mod proptests {
    use super::*;
    use factstore_core::AttrComponent;
    use proptest::prelude::*;

    fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i16>().prop_map(|n| Value::Number(f64::from(n))),
            "[a-z]{0,8}".prop_map(Value::String),
        ]
    }

    fn arb_attribute() -> impl Strategy<Value = Attribute> {
        proptest::collection::vec("[a-z]{1,6}", 1..4)
            .prop_map(|parts| parts.into_iter().map(AttrComponent::String).collect())
    }

    fn arb_row() -> impl Strategy<Value = TripleRow> {
        (
            "[a-z]{1,8}",
            arb_attribute(),
            arb_value(),
            1u64..10_000,
            "[a-z]{1,4}",
            any::<bool>(),
        )
            .prop_map(|(entity, attribute, value, counter, client, expired)| {
                TripleRow::new(entity, attribute, value, Timestamp::new(counter, client), expired)
            })
    }

    proptest! {
        #[test]
        fn eav_round_trip_holds_for_arbitrary_rows(row in arb_row()) {
            let (key, value) = encode_eav(&row);
            prop_assert_eq!(decode_row(&key, &value).unwrap(), row);
        }

        #[test]
        fn ave_round_trip_holds_for_arbitrary_rows(row in arb_row()) {
            let (key, value) = encode_ave(&row);
            prop_assert_eq!(decode_row(&key, &value).unwrap(), row);
        }

        #[test]
        fn client_timestamp_round_trip_holds_for_arbitrary_rows(row in arb_row()) {
            let (key, value) = encode_client_timestamp(&row);
            prop_assert_eq!(decode_row(&key, &value).unwrap(), row);
        }
    }
}
