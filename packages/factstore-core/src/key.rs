//! Composite-key ordering algebra over heterogeneous union values.
//!
//! Every index key is a tuple of [`KeyComponent`]s. Two sentinel variants,
//! [`KeyComponent::Min`] and [`KeyComponent::Max`], never appear in real
//! data and exist purely to bound half-open ranges ("any suffix"). The
//! ordering realized here — `null < bool < number < string < array`,
//! recursing component-wise into arrays — is what every prefix/`gte`/`lt`
//! scan in the scan algebra relies on, and it is realized directly: `Key`
//! is `Vec<KeyComponent>`, and `factstore-store`'s `MemoryEngine` keys its
//! backing `BTreeMap<Key, Vec<u8>>` on this `Ord` impl as-is. There is no
//! separate byte encoding — `Vec<T: Ord>`'s own lexicographic,
//! component-wise order already is the ordering a byte-oriented backend
//! would otherwise have to reconstruct by encoding.

use std::cmp::Ordering;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// One component of a composite index key.
///
/// Ordered as `Min < Null < Bool < Number < String < Array < Max`. Arrays
/// compare component-wise, recursively, the same way tuples do; a shorter
/// array that is a prefix of a longer one sorts first (matches the
/// "attribute prefix scan" requirement in the design notes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeyComponent {
    /// Sorts below every concrete value. Used to build the low end of a
    /// half-open range ("any value at or above this point").
    Min,
    Null,
    Bool(bool),
    Number(OrderedFloat<f64>),
    String(String),
    Array(Vec<KeyComponent>),
    /// Sorts above every concrete value. Used to build the high end of a
    /// half-open range ("any suffix of this prefix").
    Max,
}

impl KeyComponent {
    fn rank(&self) -> u8 {
        match self {
            KeyComponent::Min => 0,
            KeyComponent::Null => 1,
            KeyComponent::Bool(_) => 2,
            KeyComponent::Number(_) => 3,
            KeyComponent::String(_) => 4,
            KeyComponent::Array(_) => 5,
            KeyComponent::Max => 6,
        }
    }
}

impl Eq for KeyComponent {}

impl Ord for KeyComponent {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyComponent::Bool(a), KeyComponent::Bool(b)) => a.cmp(b),
            (KeyComponent::Number(a), KeyComponent::Number(b)) => a.cmp(b),
            (KeyComponent::String(a), KeyComponent::String(b)) => a.cmp(b),
            (KeyComponent::Array(a), KeyComponent::Array(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for KeyComponent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A full composite key: an ordered tuple of [`KeyComponent`]s.
pub type Key = Vec<KeyComponent>;

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> KeyComponent {
        KeyComponent::String(v.to_string())
    }

    fn n(v: f64) -> KeyComponent {
        KeyComponent::Number(OrderedFloat(v))
    }

    #[test]
    fn type_ordering_null_bool_number_string_array() {
        let vals = vec![
            KeyComponent::Null,
            KeyComponent::Bool(false),
            n(0.0),
            s(""),
            KeyComponent::Array(vec![]),
        ];
        for w in vals.windows(2) {
            assert!(w[0] < w[1], "{w:?} should be increasing");
        }
    }

    #[test]
    fn min_below_everything_max_above_everything() {
        assert!(KeyComponent::Min < KeyComponent::Null);
        assert!(KeyComponent::Min < s("anything"));
        assert!(KeyComponent::Max > s("anything"));
        assert!(KeyComponent::Max > KeyComponent::Array(vec![s("z")]));
    }

    #[test]
    fn number_ordering_matches_numeric_order() {
        assert!(n(-5.0) < n(0.0));
        assert!(n(0.0) < n(5.0));
        assert!(n(1.5) < n(2.5));
    }

    #[test]
    fn array_ordering_is_componentwise_with_prefix_first() {
        let a = KeyComponent::Array(vec![s("users")]);
        let b = KeyComponent::Array(vec![s("users"), s("name")]);
        let c = KeyComponent::Array(vec![s("users"), s("zzz")]);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn string_prefix_does_not_sort_before_its_own_extension() {
        // A shorter string is not a prefix-match win here: plain string
        // comparison already orders "e1" before "e1x" character-by-character,
        // and an `Array` one level up orders a prefix tuple before any
        // longer tuple that extends it.
        let just_e1 = vec![s("e1")];
        let e1_then_more = vec![s("e1"), s("x")];
        assert!(just_e1 < e1_then_more);
    }

    #[test]
    fn strings_order_by_byte_value_including_nul() {
        assert!(s("a") < s("a\0"));
        assert!(s("a\0") < s("ab"));
    }
}
