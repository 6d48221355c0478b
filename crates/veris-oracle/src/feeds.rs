//! Data feed registry.
//!
//! A feed is identified by `BLAKE3::derive_key("Veris v1 feed-id", name)`.
//! It accepts submissions from creation until the authority deactivates it.
//! Each resolution overwrites the last value and appends to a bounded
//! history used for TWAP queries.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use veris_types::feed::FeedSnapshot;
use veris_types::identity;
use veris_types::{FeedId, Timestamp};

use crate::params::MAX_FEED_NAME_LEN;
use crate::{OracleError, Result};

/// One resolved value in a feed's history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPoint {
    pub timestamp: Timestamp,
    pub value: i64,
}

/// A named data feed and its resolution state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFeed {
    pub id: FeedId,
    pub name: String,
    pub description: String,
    pub threshold: u32,
    pub active: bool,
    pub created_at: Timestamp,
    pub last_value: Option<i64>,
    pub confidence_bps: u64,
    pub last_resolved_at: Option<Timestamp>,
    pub resolution_count: u64,
    /// Most recent resolved points, oldest first.
    pub history: VecDeque<ResolvedPoint>,
}

impl DataFeed {
    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            threshold: self.threshold,
            active: self.active,
            created_at: self.created_at,
            last_value: self.last_value,
            confidence_bps: self.confidence_bps,
            last_resolved_at: self.last_resolved_at,
            resolution_count: self.resolution_count,
        }
    }

    /// Record a resolved value.
    ///
    /// A second resolution within the same second replaces the previous
    /// history point, keeping history timestamps strictly increasing.
    pub(crate) fn record_resolution(
        &mut self,
        value: i64,
        confidence_bps: u64,
        now: Timestamp,
        history_len: usize,
    ) {
        self.last_value = Some(value);
        self.confidence_bps = confidence_bps;
        self.last_resolved_at = Some(now);
        self.resolution_count = self.resolution_count.saturating_add(1);

        let point = ResolvedPoint {
            timestamp: now,
            value,
        };
        match self.history.back_mut() {
            Some(last) if last.timestamp == now => *last = point,
            _ => self.history.push_back(point),
        }
        while self.history.len() > history_len {
            self.history.pop_front();
        }
    }
}

/// Table of feeds keyed by derived id.
#[derive(Debug, Clone, Default)]
pub struct FeedRegistry {
    feeds: BTreeMap<FeedId, DataFeed>,
}

impl FeedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a feed definition and return the record it would produce.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidName`] if the name is empty or too long
    /// - [`OracleError::InvalidThreshold`] if `threshold` is zero
    /// - [`OracleError::ThresholdTooHigh`] if `threshold > active_validators`
    /// - [`OracleError::DuplicateFeed`] if the derived id is taken
    pub fn plan_feed(
        &self,
        name: &str,
        description: &str,
        threshold: u32,
        active_validators: u32,
        now: Timestamp,
    ) -> Result<DataFeed> {
        let name = name.trim();
        if name.is_empty() {
            return Err(OracleError::InvalidName("name is empty".to_string()));
        }
        if name.len() > MAX_FEED_NAME_LEN {
            return Err(OracleError::InvalidName(format!(
                "name exceeds {MAX_FEED_NAME_LEN} bytes"
            )));
        }
        if threshold == 0 {
            return Err(OracleError::InvalidThreshold);
        }
        if threshold > active_validators {
            return Err(OracleError::ThresholdTooHigh {
                threshold,
                active: active_validators,
            });
        }

        let id = identity::feed_id(name);
        if self.feeds.contains_key(&id) {
            return Err(OracleError::DuplicateFeed(id));
        }

        Ok(DataFeed {
            id,
            name: name.to_string(),
            description: description.to_string(),
            threshold,
            active: true,
            created_at: now,
            last_value: None,
            confidence_bps: 0,
            last_resolved_at: None,
            resolution_count: 0,
            history: VecDeque::new(),
        })
    }

    pub(crate) fn insert(&mut self, feed: DataFeed) {
        self.feeds.insert(feed.id, feed);
    }

    pub fn get(&self, id: &FeedId) -> Option<&DataFeed> {
        self.feeds.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &FeedId) -> Option<&mut DataFeed> {
        self.feeds.get_mut(id)
    }

    /// Ids of feeds currently accepting submissions.
    pub fn active_feed_ids(&self) -> Vec<FeedId> {
        self.feeds
            .values()
            .filter(|f| f.active)
            .map(|f| f.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_feed_derives_id() {
        let registry = FeedRegistry::new();
        let feed = registry
            .plan_feed("BTC/USD", "bitcoin spot", 3, 3, 1_000)
            .expect("plan");
        assert_eq!(feed.id, identity::feed_id("BTC/USD"));
        assert!(feed.active);
        assert!(feed.last_value.is_none());
        assert_eq!(feed.created_at, 1_000);
    }

    #[test]
    fn test_threshold_bounds() {
        let registry = FeedRegistry::new();
        assert_eq!(
            registry.plan_feed("A", "", 0, 3, 0).expect_err("zero"),
            OracleError::InvalidThreshold
        );
        assert_eq!(
            registry.plan_feed("A", "", 4, 3, 0).expect_err("too high"),
            OracleError::ThresholdTooHigh { threshold: 4, active: 3 }
        );
        for threshold in 1..=3 {
            registry
                .plan_feed("A", "", threshold, 3, 0)
                .expect("threshold within active count");
        }
    }

    #[test]
    fn test_duplicate_feed() {
        let mut registry = FeedRegistry::new();
        let feed = registry.plan_feed("ETH/USD", "", 1, 1, 0).expect("plan");
        registry.insert(feed);
        let err = registry.plan_feed("ETH/USD", "other", 1, 1, 5).expect_err("dup");
        assert!(matches!(err, OracleError::DuplicateFeed(_)));
    }

    #[test]
    fn test_invalid_names() {
        let registry = FeedRegistry::new();
        assert!(matches!(
            registry.plan_feed("   ", "", 1, 1, 0),
            Err(OracleError::InvalidName(_))
        ));
        let long = "x".repeat(MAX_FEED_NAME_LEN + 1);
        assert!(matches!(
            registry.plan_feed(&long, "", 1, 1, 0),
            Err(OracleError::InvalidName(_))
        ));
    }

    #[test]
    fn test_record_resolution_history_bounded() {
        let registry = FeedRegistry::new();
        let mut feed = registry.plan_feed("X", "", 1, 1, 0).expect("plan");
        for i in 0..5u64 {
            feed.record_resolution(i as i64 * 10, 9_000, 100 + i, 3);
        }
        assert_eq!(feed.history.len(), 3);
        assert_eq!(feed.history[0].timestamp, 102);
        assert_eq!(feed.last_value, Some(40));
        assert_eq!(feed.last_resolved_at, Some(104));
        assert_eq!(feed.resolution_count, 5);
    }

    #[test]
    fn test_same_second_resolution_replaces_point() {
        let registry = FeedRegistry::new();
        let mut feed = registry.plan_feed("X", "", 1, 1, 0).expect("plan");
        feed.record_resolution(1, 10_000, 100, 8);
        feed.record_resolution(2, 10_000, 100, 8);
        assert_eq!(feed.history.len(), 1);
        assert_eq!(feed.history[0].value, 2);
        assert_eq!(feed.resolution_count, 2);
    }

    #[test]
    fn test_active_feed_ids() {
        let mut registry = FeedRegistry::new();
        let a = registry.plan_feed("A", "", 1, 1, 0).expect("a");
        let mut b = registry.plan_feed("B", "", 1, 1, 0).expect("b");
        b.active = false;
        let a_id = a.id;
        registry.insert(a);
        registry.insert(b);
        assert_eq!(registry.active_feed_ids(), vec![a_id]);
        assert_eq!(registry.len(), 2);
    }
}
