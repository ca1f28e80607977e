//! `factstore-core` — the tenant-free building blocks of the triple store:
//! hybrid logical timestamps, the fact/attribute/metadata value domain, the
//! composite-key ordering algebra, and the boundary error type.
//!
//! This crate has no storage dependency. Everything that touches an actual
//! ordered key-value backend lives in `factstore-store`, which depends on
//! this crate for its vocabulary.

pub mod clock;
pub mod error;
pub mod key;
pub mod model;
pub mod value;

pub use clock::{Clock, Timestamp, TimestampSource};
pub use error::StoreError;
pub use key::{Key, KeyComponent};
pub use model::{MetaRow, TripleRow};
pub use value::{
    attr, attribute_from_key_component, attribute_key_component, AttrComponent, Attribute,
    MetaValue, Value,
};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {}

    /// Re-exports should be reachable straight from the crate root, the way
    /// callers actually use this crate.
    #[test]
    fn reexports_accessible() {
        let _ts = crate::Timestamp::new(0, "c");
        let _clock = crate::Clock::new("c");
        let _v = crate::Value::Null;
        let _attr = crate::attr(&["a", "b"]);
        let _kc = crate::KeyComponent::Min;
    }
}
