//! Hybrid logical timestamps and the monotone clock that mints them.
//!
//! A [`Timestamp`] is a pair `(counter, client-id)`: a logical counter that
//! only ever moves forward for a given client, plus the id of the client
//! that produced it. There is no wall-clock component — ordering and
//! causality both fall out of the counter and, as a tiebreaker between
//! distinct clients racing on the same counter value, the client id's
//! lexicographic order.

use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::key::KeyComponent;

/// A hybrid logical timestamp: `(counter, client-id)`.
///
/// Ordered first by `counter`, then by `client_id` (lexicographic byte
/// order). Two timestamps from the same client are never equal once the
/// clock that produced them upholds [`Clock`]'s monotonicity contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    /// Logical counter, monotone per client.
    pub counter: u64,
    /// Id of the client that produced this timestamp.
    pub client_id: String,
}

impl Timestamp {
    /// Creates a timestamp from its parts.
    #[must_use]
    pub fn new(counter: u64, client_id: impl Into<String>) -> Self {
        Self {
            counter,
            client_id: client_id.into(),
        }
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.counter
            .cmp(&other.counter)
            .then_with(|| self.client_id.cmp(&other.client_id))
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.counter, self.client_id)
    }
}

/// Embeds a timestamp as one nested [`KeyComponent::Array`] holding
/// `[counter, client_id]`, so that array-wise comparison reproduces
/// [`Timestamp`]'s own `Ord` exactly — this is the `t` slot in every index
/// family's key shape.
impl From<&Timestamp> for KeyComponent {
    fn from(ts: &Timestamp) -> Self {
        KeyComponent::Array(vec![
            KeyComponent::Number(OrderedFloat(ts.counter as f64)),
            KeyComponent::String(ts.client_id.clone()),
        ])
    }
}

impl TryFrom<&KeyComponent> for Timestamp {
    type Error = String;

    fn try_from(component: &KeyComponent) -> Result<Self, Self::Error> {
        match component {
            KeyComponent::Array(parts) if parts.len() == 2 => {
                let counter = match &parts[0] {
                    KeyComponent::Number(n) => n.into_inner() as u64,
                    other => return Err(format!("expected numeric counter, found {other:?}")),
                };
                let client_id = match &parts[1] {
                    KeyComponent::String(s) => s.clone(),
                    other => return Err(format!("expected string client id, found {other:?}")),
                };
                Ok(Timestamp::new(counter, client_id))
            }
            other => Err(format!("expected a 2-element timestamp array, found {other:?}")),
        }
    }
}

/// Anything that can report the highest timestamp previously recorded for a
/// client. Implemented by the storage layer (via `find_max_timestamp`) so a
/// [`Clock`] can seed its counter across restarts without `factstore-core`
/// depending on the storage crate.
pub trait TimestampSource {
    /// Returns the greatest timestamp on record for `client_id`, if any.
    fn find_max_timestamp(&self, client_id: &str) -> Option<Timestamp>;
}

/// Monotone hybrid-logical-timestamp generator for one client.
///
/// [`Clock::get_next_timestamp`] is the only operation most callers need:
/// successive calls on one `Clock` yield strictly increasing timestamps.
/// [`Clock::assign_to_store`] is called once, at construction time, to
/// fast-forward the counter past whatever this client already wrote in a
/// previous process lifetime.
pub struct Clock {
    client_id: String,
    counter: AtomicU64,
}

impl Clock {
    /// Creates a clock for `client_id` starting at counter `0`.
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            counter: AtomicU64::new(0),
        }
    }

    /// The client id this clock stamps every timestamp with.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Produces a timestamp strictly greater than every timestamp this
    /// clock has produced before.
    #[must_use]
    pub fn get_next_timestamp(&self) -> Timestamp {
        let counter = self.counter.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        Timestamp::new(counter, self.client_id.clone())
    }

    /// Fast-forwards the counter so it is at least `remote.counter`,
    /// without ever moving it backwards. Used both to seed from storage on
    /// startup and to record watermarks observed from other clients.
    pub fn observe(&self, remote: &Timestamp) {
        self.counter.fetch_max(remote.counter, AtomicOrdering::SeqCst);
    }

    /// Binds this clock to `source` and seeds its counter from the highest
    /// timestamp on record for its own client id, so timestamps remain
    /// monotone across process restarts.
    pub fn assign_to_store(&self, source: &dyn TimestampSource) {
        if let Some(max) = source.find_max_timestamp(&self.client_id) {
            tracing::debug!(
                client_id = %self.client_id,
                seed_counter = max.counter,
                "seeding clock from client-timestamp index"
            );
            self.observe(&max);
        }
    }
}

impl Default for Clock {
    /// An anonymous clock for ad hoc use (tests, single-writer scripts).
    /// Every call allocates a process-wide unique client id so two default
    /// clocks never collide under the monotonicity invariant.
    fn default() -> Self {
        static NEXT_ANON: AtomicU64 = AtomicU64::new(0);
        let id = NEXT_ANON.fetch_add(1, AtomicOrdering::SeqCst);
        Self::new(format!("anon-{id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successive_timestamps_strictly_increase() {
        let clock = Clock::new("c1");
        let t1 = clock.get_next_timestamp();
        let t2 = clock.get_next_timestamp();
        let t3 = clock.get_next_timestamp();
        assert!(t1 < t2);
        assert!(t2 < t3);
    }

    #[test]
    fn ordering_breaks_ties_on_client_id() {
        let a = Timestamp::new(5, "alice");
        let b = Timestamp::new(5, "bob");
        assert!(a < b);
        assert_ne!(a.cmp(&b), Ordering::Equal);
    }

    #[test]
    fn ordering_prefers_counter_over_client_id() {
        let a = Timestamp::new(1, "zzz");
        let b = Timestamp::new(2, "aaa");
        assert!(a < b);
    }

    struct FixedSource(Option<Timestamp>);
    impl TimestampSource for FixedSource {
        fn find_max_timestamp(&self, _client_id: &str) -> Option<Timestamp> {
            self.0.clone()
        }
    }

    #[test]
    fn assign_to_store_seeds_counter_past_prior_max() {
        let clock = Clock::new("c1");
        clock.assign_to_store(&FixedSource(Some(Timestamp::new(41, "c1"))));
        let next = clock.get_next_timestamp();
        assert_eq!(next.counter, 42);
    }

    #[test]
    fn assign_to_store_is_noop_with_no_prior_history() {
        let clock = Clock::new("c1");
        clock.assign_to_store(&FixedSource(None));
        let next = clock.get_next_timestamp();
        assert_eq!(next.counter, 1);
    }

    #[test]
    fn observe_never_moves_counter_backwards() {
        let clock = Clock::new("c1");
        clock.observe(&Timestamp::new(100, "c1"));
        clock.observe(&Timestamp::new(3, "c1"));
        let next = clock.get_next_timestamp();
        assert_eq!(next.counter, 101);
    }

    #[test]
    fn default_clocks_never_collide() {
        let a = Clock::default();
        let b = Clock::default();
        assert_ne!(a.client_id(), b.client_id());
    }

    #[test]
    fn display_format_is_counter_colon_client() {
        let ts = Timestamp::new(7, "c1");
        assert_eq!(ts.to_string(), "7:c1");
    }

    #[test]
    fn key_component_round_trip() {
        let ts = Timestamp::new(42, "c1");
        let component = KeyComponent::from(&ts);
        let decoded = Timestamp::try_from(&component).unwrap();
        assert_eq!(ts, decoded);
    }

    #[test]
    fn key_component_ordering_matches_timestamp_ordering() {
        let a = KeyComponent::from(&Timestamp::new(1, "zzz"));
        let b = KeyComponent::from(&Timestamp::new(2, "aaa"));
        assert!(a < b);
    }

    #[test]
    fn timestamp_msgpack_roundtrip() {
        let ts = Timestamp::new(42, "c1");
        let bytes = rmp_serde::to_vec(&ts).expect("serialize");
        let decoded: Timestamp = rmp_serde::from_slice(&bytes).expect("deserialize");
        assert_eq!(ts, decoded);
    }
}
