//! The two row shapes the storage substrate persists: versioned facts and
//! unversioned metadata tuples.

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::value::{Attribute, MetaValue, Value};

/// The atomic unit of state: a versioned assertion `(entity, attribute,
/// value)` tagged with a timestamp and an expired flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripleRow {
    pub entity_id: String,
    pub attribute: Attribute,
    pub value: Value,
    pub timestamp: Timestamp,
    /// Tombstone marker. `true` means this fact records that its entity (or
    /// entity/attribute pair) was expired, not that the row itself decayed.
    pub expired: bool,
}

impl TripleRow {
    #[must_use]
    pub fn new(
        entity_id: impl Into<String>,
        attribute: Attribute,
        value: Value,
        timestamp: Timestamp,
        expired: bool,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            attribute,
            value,
            timestamp,
            expired,
        }
    }
}

/// A metadata tuple: `(entity-id, attribute, value)` stored under a
/// distinct index family, not versioned and not participating in the
/// timestamp-ordered fact indexes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaRow {
    pub entity_id: String,
    pub attribute: Attribute,
    pub value: MetaValue,
}

impl MetaRow {
    #[must_use]
    pub fn new(entity_id: impl Into<String>, attribute: Attribute, value: MetaValue) -> Self {
        Self {
            entity_id: entity_id.into(),
            attribute,
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::attr;

    #[test]
    fn triple_row_constructor_fills_fields() {
        let row = TripleRow::new(
            "e1",
            attr(&["users", "name"]),
            Value::String("Ada".to_string()),
            Timestamp::new(1, "c1"),
            false,
        );
        assert_eq!(row.entity_id, "e1");
        assert!(!row.expired);
    }
}
