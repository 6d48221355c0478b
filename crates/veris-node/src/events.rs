//! Event broadcast.
//!
//! Engines buffer their events; the host drains them after every call and
//! publishes them here. Each subscriber gets an independent buffer of the
//! configured capacity and sees `Lagged` if it falls behind.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use veris_types::events::{Event, EventKind};

/// Coarse grouping used by subscription filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Validator,
    Feed,
    Market,
    Admin,
}

impl EventCategory {
    pub fn of(kind: &EventKind) -> Self {
        match kind {
            EventKind::ValidatorRegistered { .. }
            | EventKind::StakeAdded { .. }
            | EventKind::ReputationUpdated { .. }
            | EventKind::ValidatorSlashed { .. }
            | EventKind::ValidatorDeactivated { .. } => EventCategory::Validator,
            EventKind::FeedCreated { .. }
            | EventKind::FeedDeactivated { .. }
            | EventKind::ValidationSubmitted { .. }
            | EventKind::RoundExpired { .. }
            | EventKind::FeedResolved { .. } => EventCategory::Feed,
            EventKind::MarketCreated { .. }
            | EventKind::SharesBought { .. }
            | EventKind::SharesSold { .. }
            | EventKind::MarketResolved { .. }
            | EventKind::MarketCancelled { .. }
            | EventKind::WinningsClaimed { .. }
            | EventKind::RefundClaimed { .. } => EventCategory::Market,
            EventKind::FeesSwept { .. } | EventKind::Paused | EventKind::Resumed => {
                EventCategory::Admin
            }
        }
    }

    /// Parse a category name as used on the command line.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "validator" => Some(EventCategory::Validator),
            "feed" => Some(EventCategory::Feed),
            "market" => Some(EventCategory::Market),
            "admin" => Some(EventCategory::Admin),
            _ => None,
        }
    }
}

/// Filter for event subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// Accept only these categories. `None` accepts everything.
    pub categories: Option<Vec<EventCategory>>,
}

impl EventFilter {
    /// Check if an event matches this filter.
    pub fn matches(&self, event: &Event) -> bool {
        match &self.categories {
            Some(categories) => categories.contains(&EventCategory::of(&event.kind)),
            None => true,
        }
    }
}

/// Event bus for broadcasting protocol events to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: Event) {
        self.sequence.fetch_add(1, Ordering::SeqCst);
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }

    /// Emit a batch in order.
    pub fn emit_all(&self, events: impl IntoIterator<Item = Event>) {
        for event in events {
            self.emit(event);
        }
    }

    /// Subscribe to events. Returns a receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Number of events emitted so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }
}
