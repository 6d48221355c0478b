//! # veris-market
//!
//! Binary prediction markets priced on a quadratic bonding curve and settled
//! against an oracle feed.
//!
//! Each market sells YES and NO shares from a pool seeded by its creator.
//! Share prices rise linearly with outstanding supply. Once the market's end
//! time has passed and its feed has resolved, the pool is split pro rata
//! among holders of the winning outcome.
//!
//! ## Modules
//!
//! - [`pricing`]: Bonding curve quotes and trading fees
//! - [`market`]: Market, position and settlement records
//! - [`engine`]: The [`MarketEngine`] entry points for creation and trading
//! - [`resolution`]: Resolution, cancellation and claims

pub mod engine;
pub mod market;
pub mod pricing;
pub mod resolution;

pub use engine::{MarketEngine, MarketRequest};
pub use market::{
    Comparator, Market, MarketMetadata, MarketParams, MarketState, Position,
    ResolutionCriterion, Settlement,
};

use veris_ledger::LedgerError;
use veris_types::authority::AuthorityError;
use veris_types::identity::short_hex;
use veris_types::{Address, Amount, FeedId, MarketId, Timestamp};

/// Error types for market operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketError {
    /// Markets are paused by the administrative authority.
    #[error("markets are paused")]
    Paused,

    /// The caller is not the administrative authority.
    #[error("caller {} is not authorized", short_hex(.0))]
    Unauthorized(Address),

    /// The bound feed does not exist.
    #[error("unknown feed {}", short_hex(.0))]
    UnknownFeed(FeedId),

    /// The bound feed no longer accepts submissions.
    #[error("feed {} is inactive", short_hex(.0))]
    FeedInactive(FeedId),

    /// Initial liquidity below the minimum.
    #[error("liquidity too low: need {required}, provided {provided}")]
    LiquidityTooLow {
        /// Minimum liquidity.
        required: Amount,
        /// Amount offered.
        provided: Amount,
    },

    /// Duration is zero or above the maximum.
    #[error("invalid duration {duration}s (max {max}s)")]
    InvalidDuration {
        /// Requested duration.
        duration: u64,
        /// Maximum duration.
        max: u64,
    },

    /// Question is empty.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// No market with this id.
    #[error("unknown market {0}")]
    UnknownMarket(MarketId),

    /// The market is resolved or cancelled.
    #[error("market {0} is not open")]
    MarketNotOpen(MarketId),

    /// Trading has closed.
    #[error("market {market_id} ended at {end_time}")]
    MarketEnded {
        /// The market.
        market_id: MarketId,
        /// Its end time.
        end_time: Timestamp,
    },

    /// Share amount is zero.
    #[error("share amount must be non-zero")]
    InvalidAmount,

    /// The seller does not hold enough unlocked shares.
    #[error("insufficient shares: hold {held}, requested {requested}")]
    InsufficientShares {
        /// Sellable balance.
        held: u64,
        /// Amount requested.
        requested: u64,
    },

    /// The market has not reached its end time.
    #[error("market {market_id} ends at {end_time}")]
    MarketNotEnded {
        /// The market.
        market_id: MarketId,
        /// Its end time.
        end_time: Timestamp,
    },

    /// The market was already resolved.
    #[error("market {0} is already resolved")]
    AlreadyResolved(MarketId),

    /// Claims need a resolved (or, for refunds, cancelled) market.
    #[error("market {0} is not settled for this claim")]
    MarketNotResolved(MarketId),

    /// The bound feed has no value resolved since the market opened.
    #[error("feed {} has no resolution since market creation", short_hex(.0))]
    FeedNotResolved(FeedId),

    /// The caller has nothing to claim.
    #[error("nothing to claim")]
    NothingToClaim,

    /// No accrued trading fees to sweep.
    #[error("nothing to sweep")]
    NothingToSweep,

    /// Arithmetic overflow in pricing or accounting.
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    /// Invalid market parameters.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// The token ledger refused a transfer.
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),
}

impl From<AuthorityError> for MarketError {
    fn from(err: AuthorityError) -> Self {
        match err {
            AuthorityError::Paused => MarketError::Paused,
            AuthorityError::Unauthorized(caller) => MarketError::Unauthorized(caller),
        }
    }
}

/// Convenience result type for market operations.
pub type Result<T> = std::result::Result<T, MarketError>;
