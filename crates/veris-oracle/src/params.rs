//! Oracle protocol parameters.
//!
//! Every field has a `pub const` default. Parameters are validated once when
//! the [`Oracle`](crate::Oracle) is constructed and are immutable afterwards.

use serde::{Deserialize, Serialize};
use veris_types::{Amount, HOUR_SECS, UNITS_PER_TOKEN};

use crate::reputation::ReputationPolicy;
use crate::{OracleError, Result};

/// Minimum stake deposit (1,000 tokens).
pub const DEFAULT_MIN_STAKE: Amount = 1_000 * UNITS_PER_TOKEN;

/// Maximum number of simultaneously active validators.
pub const DEFAULT_MAX_VALIDATORS: u32 = 100;

/// Validation window in seconds (1 hour).
pub const DEFAULT_VALIDATION_WINDOW: u64 = HOUR_SECS;

/// Resolved points retained per feed.
pub const DEFAULT_HISTORY_LEN: usize = 256;

/// Maximum feed name length in bytes.
pub const MAX_FEED_NAME_LEN: usize = 128;

/// Maximum submission source label length in bytes.
pub const MAX_SOURCE_LEN: usize = 64;

/// Oracle parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleParams {
    /// Minimum stake deposit for registration.
    pub min_stake: Amount,
    /// Maximum active validators.
    pub max_validators: u32,
    /// Seconds a round stays open before it is abandoned.
    pub validation_window: u64,
    /// Resolved points retained per feed.
    pub history_len: usize,
    /// Reward and slashing policy.
    pub reputation: ReputationPolicy,
}

impl Default for OracleParams {
    fn default() -> Self {
        Self {
            min_stake: DEFAULT_MIN_STAKE,
            max_validators: DEFAULT_MAX_VALIDATORS,
            validation_window: DEFAULT_VALIDATION_WINDOW,
            history_len: DEFAULT_HISTORY_LEN,
            reputation: ReputationPolicy::default(),
        }
    }
}

impl OracleParams {
    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidParams`] describing the first violated rule
    pub fn validate(&self) -> Result<()> {
        if self.min_stake == 0 {
            return Err(OracleError::InvalidParams(
                "min_stake must be non-zero".to_string(),
            ));
        }
        if self.max_validators == 0 {
            return Err(OracleError::InvalidParams(
                "max_validators must be non-zero".to_string(),
            ));
        }
        if self.validation_window == 0 {
            return Err(OracleError::InvalidParams(
                "validation_window must be non-zero".to_string(),
            ));
        }
        if self.history_len == 0 {
            return Err(OracleError::InvalidParams(
                "history_len must be non-zero".to_string(),
            ));
        }
        self.reputation.validate()
    }
}
