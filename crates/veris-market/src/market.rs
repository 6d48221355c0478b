//! Market, position and settlement records.

use serde::{Deserialize, Serialize};
use veris_types::identity::hex32;
use veris_types::{Address, Amount, FeedId, MarketId, Outcome, Timestamp, DAY_SECS};

use crate::pricing::SHARE_UNIT;
use crate::{MarketError, Result};

/// Minimum initial liquidity (100 tokens).
pub const DEFAULT_MIN_LIQUIDITY: Amount = 100 * SHARE_UNIT;

/// Longest allowed market duration (365 days).
pub const DEFAULT_MAX_DURATION: u64 = 365 * DAY_SECS;

/// Trading fee in basis points (0.3%).
pub const DEFAULT_TRADE_FEE_BPS: u64 = 30;

/// Upper bound on the trading fee (10%).
pub const MAX_TRADE_FEE_BPS: u64 = 1_000;

/// Maximum question length in bytes.
pub const MAX_QUESTION_LEN: usize = 256;

/// Market engine parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketParams {
    pub min_liquidity: Amount,
    pub max_duration: u64,
    pub trade_fee_bps: u64,
}

impl Default for MarketParams {
    fn default() -> Self {
        Self {
            min_liquidity: DEFAULT_MIN_LIQUIDITY,
            max_duration: DEFAULT_MAX_DURATION,
            trade_fee_bps: DEFAULT_TRADE_FEE_BPS,
        }
    }
}

impl MarketParams {
    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// - [`MarketError::InvalidParams`] describing the first violated rule
    pub fn validate(&self) -> Result<()> {
        // A seed of at least one share per side keeps the curve constant positive.
        if self.min_liquidity < SHARE_UNIT {
            return Err(MarketError::InvalidParams(format!(
                "min_liquidity must be at least {SHARE_UNIT}"
            )));
        }
        if self.max_duration == 0 {
            return Err(MarketError::InvalidParams(
                "max_duration must be non-zero".to_string(),
            ));
        }
        if self.trade_fee_bps > MAX_TRADE_FEE_BPS {
            return Err(MarketError::InvalidParams(format!(
                "trade_fee_bps must not exceed {MAX_TRADE_FEE_BPS}"
            )));
        }
        Ok(())
    }
}

/// How a feed value is compared against a market's threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    Above,
    AtOrAbove,
    Below,
    AtOrBelow,
    Equal,
}

impl Comparator {
    pub fn holds(self, value: i64, threshold: i64) -> bool {
        match self {
            Comparator::Above => value > threshold,
            Comparator::AtOrAbove => value >= threshold,
            Comparator::Below => value < threshold,
            Comparator::AtOrBelow => value <= threshold,
            Comparator::Equal => value == threshold,
        }
    }
}

/// YES wins iff `value <comparator> threshold`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionCriterion {
    pub comparator: Comparator,
    pub threshold: i64,
}

impl ResolutionCriterion {
    /// Winning outcome for a resolved feed value.
    pub fn evaluate(&self, value: i64) -> Outcome {
        if self.comparator.holds(value, self.threshold) {
            Outcome::Yes
        } else {
            Outcome::No
        }
    }
}

/// Descriptive metadata plus the resolution rule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketMetadata {
    pub question: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub criterion: ResolutionCriterion,
}

impl MarketMetadata {
    pub(crate) fn validate(&self) -> Result<()> {
        let question = self.question.trim();
        if question.is_empty() {
            return Err(MarketError::InvalidMetadata("question is empty".to_string()));
        }
        if question.len() > MAX_QUESTION_LEN {
            return Err(MarketError::InvalidMetadata(format!(
                "question exceeds {MAX_QUESTION_LEN} bytes"
            )));
        }
        Ok(())
    }
}

/// Lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketState {
    Open,
    Resolved,
    Cancelled,
}

/// Pool snapshot taken when trading stops for good.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Settlement {
    /// Winners split `pool_value` pro rata over `winning_supply`.
    Resolved {
        winning_outcome: Outcome,
        feed_value: i64,
        feed_resolved_at: Timestamp,
        pool_value: Amount,
        winning_supply: u64,
        settled_at: Timestamp,
    },
    /// Every share is refunded pro rata over `total_supply`.
    Cancelled {
        pool_value: Amount,
        total_supply: u64,
        settled_at: Timestamp,
    },
}

impl Settlement {
    pub fn pool_value(&self) -> Amount {
        match self {
            Settlement::Resolved { pool_value, .. } | Settlement::Cancelled { pool_value, .. } => {
                *pool_value
            }
        }
    }

    pub fn winning_outcome(&self) -> Option<Outcome> {
        match self {
            Settlement::Resolved {
                winning_outcome, ..
            } => Some(*winning_outcome),
            Settlement::Cancelled { .. } => None,
        }
    }
}

/// A binary market.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    pub metadata: MarketMetadata,
    #[serde(with = "hex32")]
    pub feed_id: FeedId,
    #[serde(with = "hex32")]
    pub creator: Address,
    pub created_at: Timestamp,
    pub end_time: Timestamp,
    pub initial_liquidity: Amount,
    /// Value backing outstanding shares: liquidity plus net trade flow, fees excluded.
    pub pool_value: Amount,
    pub yes_supply: u64,
    pub no_supply: u64,
    /// Curve constant `K`.
    pub curve_k: u64,
    /// Shares per side credited to the creator at creation.
    pub seed_shares: u64,
    pub state: MarketState,
    pub settlement: Option<Settlement>,
}

impl Market {
    pub fn supply(&self, outcome: Outcome) -> u64 {
        match outcome {
            Outcome::Yes => self.yes_supply,
            Outcome::No => self.no_supply,
        }
    }

    pub(crate) fn supply_mut(&mut self, outcome: Outcome) -> &mut u64 {
        match outcome {
            Outcome::Yes => &mut self.yes_supply,
            Outcome::No => &mut self.no_supply,
        }
    }

    /// Whether trading is closed at `now`.
    pub fn has_ended(&self, now: Timestamp) -> bool {
        now >= self.end_time
    }

    /// Fail unless the market is open for trading at `now`.
    pub(crate) fn ensure_tradable(&self, now: Timestamp) -> Result<()> {
        if self.state != MarketState::Open {
            return Err(MarketError::MarketNotOpen(self.id));
        }
        if self.has_ended(now) {
            return Err(MarketError::MarketEnded {
                market_id: self.id,
                end_time: self.end_time,
            });
        }
        Ok(())
    }
}

/// One holder's shares in one market.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub yes: u64,
    pub no: u64,
    /// Seed shares per side that cannot be sold before settlement.
    pub locked: u64,
}

impl Position {
    pub fn balance(&self, outcome: Outcome) -> u64 {
        match outcome {
            Outcome::Yes => self.yes,
            Outcome::No => self.no,
        }
    }

    pub(crate) fn balance_mut(&mut self, outcome: Outcome) -> &mut u64 {
        match outcome {
            Outcome::Yes => &mut self.yes,
            Outcome::No => &mut self.no,
        }
    }

    /// Shares of `outcome` the holder may sell.
    pub fn sellable(&self, outcome: Outcome) -> u64 {
        self.balance(outcome).saturating_sub(self.locked)
    }

    pub fn is_empty(&self) -> bool {
        self.yes == 0 && self.no == 0
    }
}
