//! Boundary error types.
//!
//! One variant per error kind in the error-handling design: options
//! validation, invalid values, invalid scans, unknown index families,
//! rule-violating writes, and an internal-invariant catch-all for anything
//! that should never happen but did.

use thiserror::Error;

/// Errors surfaced at the public boundary of the storage substrate.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Construction options were invalid (e.g. both or neither of
    /// `storage`/`stores` supplied).
    #[error("invalid triple store options: {0}")]
    TripleStoreOptions(String),

    /// A fact's value was the "undefined" sentinel, which is rejected at
    /// write time.
    #[error("invalid triple store value: {0}")]
    InvalidTripleStoreValue(String),

    /// A client-timestamp scan was built with an operator other than
    /// `lt | lte | gt | gte | eq`.
    #[error("invalid timestamp index scan operator: {0}")]
    InvalidTimestampIndexScan(String),

    /// A scan result (or delete) referenced an index family tag that the
    /// codec does not know how to decode.
    #[error("index not found: {0}")]
    IndexNotFound(String),

    /// Raised from user code during a transaction to request cancellation.
    /// Propagating this out of a `transact` callback cancels the
    /// transaction and rethrows the error to the caller.
    #[error("write rule violated: {0}")]
    WriteRule(String),

    /// An internal invariant was violated (e.g. more than one EAV row for
    /// the same key). Indicates corruption or a bug in the indexing
    /// protocol, not a user error.
    #[error("internal invariant violated: {0}")]
    Internal(String),

    /// Anything else, wrapped from a backend or hook.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    /// True for the one error kind that cancels an in-flight transaction
    /// when it escapes a user callback.
    #[must_use]
    pub fn is_write_rule(&self) -> bool {
        matches!(self, StoreError::WriteRule(_))
    }
}
