//! The fact value domain, attribute paths, and the opaque metadata value
//! type — plus their projection onto the key ordering algebra in
//! [`crate::key`].

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::key::KeyComponent;

/// The scalar domain a [`TripleRow`](crate::TripleRow)'s value may take.
///
/// `Undefined` is not part of the allowed domain — a well-formed fact value
/// is one of `null | boolean | number | string`; it exists only so that a
/// value arriving from an untyped caller can be represented and then
/// rejected at write time with [`StoreError::InvalidTripleStoreValue`](crate::error::StoreError::InvalidTripleStoreValue),
/// distinguishing an explicit `null` from a missing/`undefined` value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// The "undefined" sentinel. Never valid as a stored fact value.
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl Value {
    /// True for every value this domain allows to be persisted: everything
    /// except [`Value::Undefined`] and a NaN [`Value::Number`] (NaN has no
    /// consistent position in the key ordering algebra, so it is rejected
    /// alongside "undefined" rather than silently breaking scan order).
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        match self {
            Value::Undefined => false,
            Value::Number(n) => !n.is_nan(),
            Value::Null | Value::Bool(_) | Value::String(_) => true,
        }
    }
}

impl From<&Value> for KeyComponent {
    fn from(value: &Value) -> Self {
        match value {
            Value::Undefined | Value::Null => KeyComponent::Null,
            Value::Bool(b) => KeyComponent::Bool(*b),
            Value::Number(n) => KeyComponent::Number(OrderedFloat(*n)),
            Value::String(s) => KeyComponent::String(s.clone()),
        }
    }
}

/// Reconstructs a [`Value`] from a decoded key component. `Undefined` never
/// round-trips back out of a key: a well-formed fact is never written with
/// it, so a decoded `Null` is always read back as `Value::Null`.
impl TryFrom<&KeyComponent> for Value {
    type Error = String;

    fn try_from(component: &KeyComponent) -> Result<Self, Self::Error> {
        match component {
            KeyComponent::Null => Ok(Value::Null),
            KeyComponent::Bool(b) => Ok(Value::Bool(*b)),
            KeyComponent::Number(n) => Ok(Value::Number(n.into_inner())),
            KeyComponent::String(s) => Ok(Value::String(s.clone())),
            other => Err(format!("key component is not a valid fact value: {other:?}")),
        }
    }
}

/// One component of an [`Attribute`] path: either a named field or a
/// numeric index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttrComponent {
    String(String),
    Number(i64),
}

impl From<&AttrComponent> for KeyComponent {
    fn from(component: &AttrComponent) -> Self {
        match component {
            AttrComponent::String(s) => KeyComponent::String(s.clone()),
            AttrComponent::Number(n) => KeyComponent::Number(OrderedFloat(*n as f64)),
        }
    }
}

impl From<&str> for AttrComponent {
    fn from(s: &str) -> Self {
        AttrComponent::String(s.to_string())
    }
}

impl TryFrom<&KeyComponent> for AttrComponent {
    type Error = String;

    fn try_from(component: &KeyComponent) -> Result<Self, Self::Error> {
        match component {
            KeyComponent::String(s) => Ok(AttrComponent::String(s.clone())),
            KeyComponent::Number(n) => Ok(AttrComponent::Number(n.into_inner() as i64)),
            other => Err(format!("key component is not a valid attribute path segment: {other:?}")),
        }
    }
}

/// An ordered path of [`AttrComponent`]s. By convention the first component
/// names the collection.
pub type Attribute = Vec<AttrComponent>;

/// Builds an [`Attribute`] from string literals, for tests and call sites
/// that only ever use named fields.
#[must_use]
pub fn attr(parts: &[&str]) -> Attribute {
    parts.iter().map(|p| AttrComponent::from(*p)).collect()
}

/// Embeds an [`Attribute`] as a single nested [`KeyComponent::Array`], which
/// is what makes "attribute is a prefix of this attribute" scans
/// (`findByCollection`, attribute-prefix scans) a plain range scan: a
/// shorter array sorts before any longer array it is a prefix of.
#[must_use]
pub fn attribute_key_component(attribute: &Attribute) -> KeyComponent {
    KeyComponent::Array(attribute.iter().map(KeyComponent::from).collect())
}

/// The inverse of [`attribute_key_component`]: recovers an [`Attribute`]
/// from the nested array a scan result decodes it into.
pub fn attribute_from_key_component(component: &KeyComponent) -> Result<Attribute, String> {
    match component {
        KeyComponent::Array(parts) => parts.iter().map(AttrComponent::try_from).collect(),
        other => Err(format!("key component is not an attribute array: {other:?}")),
    }
}

/// Opaque value type for metadata tuples. Metadata values are not restricted
/// to the scalar [`Value`] domain, so they are modeled as an arbitrary
/// serialized-JSON blob rather than conflated with facts' [`Value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaValue(pub serde_json::Value);

impl MetaValue {
    #[must_use]
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_is_not_well_formed() {
        assert!(!Value::Undefined.is_well_formed());
    }

    #[test]
    fn nan_number_is_not_well_formed() {
        assert!(!Value::Number(f64::NAN).is_well_formed());
    }

    #[test]
    fn ordinary_values_are_well_formed() {
        assert!(Value::Null.is_well_formed());
        assert!(Value::Bool(true).is_well_formed());
        assert!(Value::Number(3.5).is_well_formed());
        assert!(Value::String("x".to_string()).is_well_formed());
    }

    #[test]
    fn value_to_key_component_maps_null_and_undefined_alike() {
        assert_eq!(KeyComponent::from(&Value::Null), KeyComponent::Null);
        assert_eq!(KeyComponent::from(&Value::Undefined), KeyComponent::Null);
    }

    #[test]
    fn attribute_embeds_as_nested_array_with_prefix_ordering() {
        let collection_only = attribute_key_component(&attr(&["users"]));
        let full = attribute_key_component(&attr(&["users", "name"]));
        assert!(collection_only < full);
    }

    #[test]
    fn attribute_key_component_round_trip() {
        let original = attr(&["users", "name"]);
        let component = attribute_key_component(&original);
        let decoded = attribute_from_key_component(&component).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn value_key_component_round_trip_for_every_scalar() {
        for v in [
            Value::Null,
            Value::Bool(true),
            Value::Number(3.5),
            Value::String("hi".to_string()),
        ] {
            let component = KeyComponent::from(&v);
            let decoded = Value::try_from(&component).unwrap();
            assert_eq!(v, decoded);
        }
    }

    #[test]
    fn attr_helper_builds_string_components() {
        let a = attr(&["users", "name"]);
        assert_eq!(
            a,
            vec![
                AttrComponent::String("users".to_string()),
                AttrComponent::String("name".to_string()),
            ]
        );
    }
}
