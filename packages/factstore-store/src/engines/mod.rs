//! Concrete [`crate::engine::OrderedEngine`] implementations.

mod memory;

pub use memory::MemoryEngine;
