//! # veris-oracle
//!
//! Validator consensus and reputation engine.
//!
//! Staked validators submit observations for named feeds. When a round
//! collects the feed's threshold of submissions it resolves to a stake- and
//! reputation-weighted mean, and every submitter is rewarded or penalised by
//! how far it strayed from that mean.
//!
//! ## Modules
//!
//! - [`params`]: Protocol parameters and defaults
//! - [`registry`]: Validator registry
//! - [`feeds`]: Data feed registry
//! - [`consensus`]: Validation rounds and weighted consensus
//! - [`reputation`]: Reputation updates and slashing
//! - [`twap`]: Time-weighted average over feed history
//! - [`engine`]: The [`Oracle`] entry points tying the above together

pub mod consensus;
pub mod engine;
pub mod feeds;
pub mod params;
pub mod registry;
pub mod reputation;
pub mod twap;

pub use engine::{Oracle, Resolution, SubmitReceipt};
pub use params::OracleParams;
pub use reputation::ReputationPolicy;

use veris_ledger::LedgerError;
use veris_types::authority::AuthorityError;
use veris_types::identity::short_hex;
use veris_types::{Address, Amount, Timestamp};

/// Error types for oracle operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    /// The oracle is paused by the administrative authority.
    #[error("oracle is paused")]
    Paused,

    /// The caller is not the administrative authority.
    #[error("caller {} is not authorized", short_hex(.0))]
    Unauthorized(Address),

    /// The identity already has an active validator record.
    #[error("validator {} is already registered", short_hex(.0))]
    AlreadyRegistered(Address),

    /// Stake deposit is below the protocol minimum.
    #[error("insufficient stake: need {required}, provided {provided}")]
    InsufficientStake {
        /// Minimum stake.
        required: Amount,
        /// Amount offered.
        provided: Amount,
    },

    /// The active validator set is full.
    #[error("validator cap of {cap} reached")]
    ValidatorCapReached {
        /// Maximum number of active validators.
        cap: u32,
    },

    /// The caller is not an active validator.
    #[error("{} is not an active validator", short_hex(.0))]
    NotValidator(Address),

    /// Amount is zero.
    #[error("amount must be non-zero")]
    InvalidAmount,

    /// Feed name is empty or too long.
    #[error("invalid feed name: {0}")]
    InvalidName(String),

    /// Source label is too long.
    #[error("source label exceeds {max} bytes")]
    InvalidSource {
        /// Maximum label length.
        max: usize,
    },

    /// Threshold of zero.
    #[error("threshold must be at least 1")]
    InvalidThreshold,

    /// Threshold exceeds the number of active validators.
    #[error("threshold {threshold} exceeds active validator count {active}")]
    ThresholdTooHigh {
        /// Requested threshold.
        threshold: u32,
        /// Active validators at creation time.
        active: u32,
    },

    /// A feed with the same derived id already exists.
    #[error("feed {} already exists", short_hex(.0))]
    DuplicateFeed([u8; 32]),

    /// No feed with this id.
    #[error("unknown feed {}", short_hex(.0))]
    UnknownFeed([u8; 32]),

    /// The feed does not accept submissions.
    #[error("feed {} is inactive", short_hex(.0))]
    FeedInactive([u8; 32]),

    /// The validation window of the current round has elapsed.
    #[error("validation window closed: round opened at {opened_at}, window {window}s, now {now}")]
    ValidationWindowClosed {
        /// When the abandoned round opened.
        opened_at: Timestamp,
        /// Window length in seconds.
        window: u64,
        /// Time of the rejected submission.
        now: Timestamp,
    },

    /// The validator already submitted in the current round.
    #[error("{} already submitted in this round", short_hex(.0))]
    AlreadySubmitted(Address),

    /// Not enough resolved points for a TWAP.
    #[error("insufficient history: need {required}, have {available}")]
    InsufficientHistory {
        /// Points required.
        required: usize,
        /// Points available.
        available: usize,
    },

    /// History timestamps are not strictly increasing.
    #[error("non-monotonic history: {new} <= {last}")]
    NonMonotonicHistory {
        /// The offending timestamp.
        new: Timestamp,
        /// The previous timestamp.
        last: Timestamp,
    },

    /// No accrued penalties to sweep.
    #[error("nothing to sweep")]
    NothingToSweep,

    /// Arithmetic overflow in a weighted computation.
    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    /// Invalid protocol parameters.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// The token ledger refused a transfer.
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),
}

impl From<AuthorityError> for OracleError {
    fn from(err: AuthorityError) -> Self {
        match err {
            AuthorityError::Paused => OracleError::Paused,
            AuthorityError::Unauthorized(caller) => OracleError::Unauthorized(caller),
        }
    }
}

/// Convenience result type for oracle operations.
pub type Result<T> = std::result::Result<T, OracleError>;
