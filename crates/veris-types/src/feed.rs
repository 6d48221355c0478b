//! Read-only view of oracle feeds.
//!
//! Markets never touch oracle state directly. They read feed output through
//! [`FeedSource`], which the oracle engine implements.

use serde::{Deserialize, Serialize};

use crate::{FeedId, Timestamp};

/// Point-in-time copy of a data feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub id: FeedId,
    pub name: String,
    pub description: String,
    /// Submissions required to resolve a round.
    pub threshold: u32,
    /// Whether the feed accepts submissions.
    pub active: bool,
    pub created_at: Timestamp,
    /// Last consensus value, if any round has resolved.
    pub last_value: Option<i64>,
    /// Confidence of the last value in basis points (0..=10_000).
    pub confidence_bps: u64,
    pub last_resolved_at: Option<Timestamp>,
    pub resolution_count: u64,
}

impl FeedSnapshot {
    /// The last value if it was resolved at or after `not_before`.
    pub fn value_since(&self, not_before: Timestamp) -> Option<(i64, Timestamp)> {
        match (self.last_value, self.last_resolved_at) {
            (Some(value), Some(at)) if at >= not_before => Some((value, at)),
            _ => None,
        }
    }
}

/// Source of feed snapshots.
pub trait FeedSource {
    fn feed_snapshot(&self, feed_id: &FeedId) -> Option<FeedSnapshot>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(last_value: Option<i64>, last_resolved_at: Option<Timestamp>) -> FeedSnapshot {
        FeedSnapshot {
            id: [0x01; 32],
            name: "BTC/USD".to_string(),
            description: String::new(),
            threshold: 3,
            active: true,
            created_at: 1_000,
            last_value,
            confidence_bps: 10_000,
            last_resolved_at,
            resolution_count: u64::from(last_value.is_some()),
        }
    }

    #[test]
    fn test_value_since_unresolved() {
        assert!(snapshot(None, None).value_since(0).is_none());
    }

    #[test]
    fn test_value_since_boundary() {
        let snap = snapshot(Some(42), Some(2_000));
        assert_eq!(snap.value_since(2_000), Some((42, 2_000)));
        assert_eq!(snap.value_since(1_999), Some((42, 2_000)));
        assert!(snap.value_since(2_001).is_none());
    }
}
