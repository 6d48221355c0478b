//! Event records published by the engines.
//!
//! Engines push immutable [`Event`]s into an [`EventLog`] outbox as the last
//! step of a successful operation; a failed operation publishes nothing. Hosts
//! drain the outbox and forward the records to whatever consumes them.

use serde::{Deserialize, Serialize};

use crate::identity::hex32;
use crate::{Address, Amount, FeedId, MarketId, Outcome, Timestamp};

/// Envelope for every published event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: Timestamp,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// All event kinds with the fields a consumer needs to rebuild state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventKind {
    // Validator events
    ValidatorRegistered {
        #[serde(with = "hex32")]
        validator: Address,
        stake: Amount,
        reputation: u32,
    },
    StakeAdded {
        #[serde(with = "hex32")]
        validator: Address,
        amount: Amount,
        total_stake: Amount,
    },
    ReputationUpdated {
        #[serde(with = "hex32")]
        validator: Address,
        old_reputation: u32,
        new_reputation: u32,
        deviation_bps: u64,
    },
    ValidatorSlashed {
        #[serde(with = "hex32")]
        validator: Address,
        #[serde(with = "hex32")]
        feed_id: FeedId,
        amount: Amount,
        remaining_stake: Amount,
        slash_count: u32,
        deviation_bps: u64,
    },
    ValidatorDeactivated {
        #[serde(with = "hex32")]
        validator: Address,
        remaining_stake: Amount,
    },

    // Feed events
    FeedCreated {
        #[serde(with = "hex32")]
        feed_id: FeedId,
        name: String,
        description: String,
        threshold: u32,
    },
    FeedDeactivated {
        #[serde(with = "hex32")]
        feed_id: FeedId,
    },
    ValidationSubmitted {
        #[serde(with = "hex32")]
        feed_id: FeedId,
        #[serde(with = "hex32")]
        validator: Address,
        value: i64,
        source: String,
        round_size: u32,
    },
    RoundExpired {
        #[serde(with = "hex32")]
        feed_id: FeedId,
        opened_at: Timestamp,
        discarded: u32,
    },
    FeedResolved {
        #[serde(with = "hex32")]
        feed_id: FeedId,
        value: i64,
        confidence_bps: u64,
        submissions: u32,
        resolution_count: u64,
    },

    // Market events
    MarketCreated {
        market_id: MarketId,
        #[serde(with = "hex32")]
        feed_id: FeedId,
        #[serde(with = "hex32")]
        creator: Address,
        question: String,
        liquidity: Amount,
        seed_shares: u64,
        end_time: Timestamp,
    },
    SharesBought {
        market_id: MarketId,
        #[serde(with = "hex32")]
        buyer: Address,
        outcome: Outcome,
        shares: u64,
        cost: Amount,
        fee: Amount,
    },
    SharesSold {
        market_id: MarketId,
        #[serde(with = "hex32")]
        seller: Address,
        outcome: Outcome,
        shares: u64,
        refund: Amount,
        fee: Amount,
    },
    MarketResolved {
        market_id: MarketId,
        winning_outcome: Outcome,
        feed_value: i64,
        feed_resolved_at: Timestamp,
        pool_value: Amount,
        winning_supply: u64,
    },
    MarketCancelled {
        market_id: MarketId,
        pool_value: Amount,
    },
    WinningsClaimed {
        market_id: MarketId,
        #[serde(with = "hex32")]
        holder: Address,
        shares: u64,
        payout: Amount,
    },
    RefundClaimed {
        market_id: MarketId,
        #[serde(with = "hex32")]
        holder: Address,
        shares: u64,
        payout: Amount,
    },

    // Treasury and admin events
    FeesSwept {
        #[serde(with = "hex32")]
        fee_sink: Address,
        amount: Amount,
    },
    Paused,
    Resumed,
}

impl EventKind {
    /// Stable snake_case name of the event kind.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::ValidatorRegistered { .. } => "validator_registered",
            EventKind::StakeAdded { .. } => "stake_added",
            EventKind::ReputationUpdated { .. } => "reputation_updated",
            EventKind::ValidatorSlashed { .. } => "validator_slashed",
            EventKind::ValidatorDeactivated { .. } => "validator_deactivated",
            EventKind::FeedCreated { .. } => "feed_created",
            EventKind::FeedDeactivated { .. } => "feed_deactivated",
            EventKind::ValidationSubmitted { .. } => "validation_submitted",
            EventKind::RoundExpired { .. } => "round_expired",
            EventKind::FeedResolved { .. } => "feed_resolved",
            EventKind::MarketCreated { .. } => "market_created",
            EventKind::SharesBought { .. } => "shares_bought",
            EventKind::SharesSold { .. } => "shares_sold",
            EventKind::MarketResolved { .. } => "market_resolved",
            EventKind::MarketCancelled { .. } => "market_cancelled",
            EventKind::WinningsClaimed { .. } => "winnings_claimed",
            EventKind::RefundClaimed { .. } => "refund_claimed",
            EventKind::FeesSwept { .. } => "fees_swept",
            EventKind::Paused => "paused",
            EventKind::Resumed => "resumed",
        }
    }
}

/// Outbox of events not yet collected by the host.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    pending: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one event.
    pub fn emit(&mut self, timestamp: Timestamp, kind: EventKind) {
        tracing::trace!(event = kind.name(), timestamp, "event emitted");
        self.pending.push(Event { timestamp, kind });
    }

    /// Append a batch of events stamped with the same timestamp.
    pub fn emit_all(&mut self, timestamp: Timestamp, kinds: impl IntoIterator<Item = EventKind>) {
        for kind in kinds {
            self.emit(timestamp, kind);
        }
    }

    /// Take every pending event, oldest first.
    pub fn drain(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.pending)
    }

    /// Pending events without removing them.
    pub fn pending(&self) -> &[Event] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_and_drain() {
        let mut log = EventLog::new();
        log.emit(1_000, EventKind::Paused);
        log.emit(1_001, EventKind::Resumed);
        assert_eq!(log.len(), 2);

        let events = log.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Paused);
        assert_eq!(events[1].timestamp, 1_001);
        assert!(log.is_empty());
    }

    #[test]
    fn test_event_json_shape() {
        let event = Event {
            timestamp: 1_700_000_000,
            kind: EventKind::FeedDeactivated { feed_id: [0xAB; 32] },
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["event_type"], "feed_deactivated");
        assert_eq!(json["timestamp"], 1_700_000_000u64);
        assert_eq!(json["feed_id"], hex::encode([0xAB; 32]));
    }

    #[test]
    fn test_event_json_roundtrip_with_outcome() {
        let event = Event {
            timestamp: 5,
            kind: EventKind::SharesBought {
                market_id: 7,
                buyer: [0x01; 32],
                outcome: Outcome::Yes,
                shares: 10,
                cost: 5_250_000,
                fee: 0,
            },
        };
        let json = serde_json::to_string(&event).expect("serialize");
        let parsed: Event = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed, event);
        assert_eq!(parsed.kind.name(), "shares_bought");
    }
}
