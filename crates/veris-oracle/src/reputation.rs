//! Reputation updates and slashing.
//!
//! After every resolution each submitter is judged by the relative deviation
//! of its value from the consensus value:
//!
//! ```text
//! deviation_bps = |value - consensus| * 10_000 / |consensus|   (consensus != 0)
//! deviation_bps = |value| * 10_000                              (consensus == 0)
//! ```
//!
//! | Deviation                   | Effect                                           |
//! |-----------------------------|--------------------------------------------------|
//! | `<= tight_tolerance_bps`    | reputation += reward (capped at max)             |
//! | `> loose_tolerance_bps`     | reputation -= penalty (floored at min)           |
//! | `> outlier_tolerance_bps`   | penalty, plus slash                              |
//! | in between                  | no change                                        |
//!
//! A penalty that drops reputation below `low_watermark` also slashes. A slash
//! forfeits `slash_bps` of stake, increments the slash count, and deactivates
//! the validator if its stake falls below the registration minimum.
//!
//! Reputation never falls below `min_reputation`, and the weight floor keeps
//! every weight strictly positive regardless.

use serde::{Deserialize, Serialize};
use veris_types::{Address, Amount, BPS_DENOMINATOR};

use crate::consensus::Submission;
use crate::registry::ValidatorRegistry;
use crate::{OracleError, Result};

/// Reputation of a freshly registered validator.
pub const DEFAULT_INITIAL_REPUTATION: u32 = 500;

/// Reputation cap.
pub const DEFAULT_MAX_REPUTATION: u32 = 1_000;

/// Reputation never decays below this.
pub const DEFAULT_MIN_REPUTATION: u32 = 10;

/// Minimum reputation factor used in consensus weights.
pub const DEFAULT_FLOOR_WEIGHT: u32 = 10;

/// Deviation rewarded as accurate (2%).
pub const DEFAULT_TIGHT_TOLERANCE_BPS: u64 = 200;

/// Deviation penalised as divergent (20%).
pub const DEFAULT_LOOSE_TOLERANCE_BPS: u64 = 2_000;

/// Deviation slashed on a single submission (50%).
pub const DEFAULT_OUTLIER_TOLERANCE_BPS: u64 = 5_000;

/// Reputation gained per accurate submission.
pub const DEFAULT_REWARD: u32 = 10;

/// Reputation lost per divergent submission.
pub const DEFAULT_PENALTY: u32 = 50;

/// Falling below this reputation triggers a slash.
pub const DEFAULT_LOW_WATERMARK: u32 = 200;

/// Fraction of stake forfeited per slash (10%).
pub const DEFAULT_SLASH_BPS: u64 = 1_000;

/// Tunable reward and slashing policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationPolicy {
    pub initial_reputation: u32,
    pub max_reputation: u32,
    pub min_reputation: u32,
    /// Lower bound on the reputation factor of a consensus weight.
    pub floor_weight: u32,
    pub tight_tolerance_bps: u64,
    pub loose_tolerance_bps: u64,
    pub outlier_tolerance_bps: u64,
    pub reward: u32,
    pub penalty: u32,
    pub low_watermark: u32,
    pub slash_bps: u64,
}

impl Default for ReputationPolicy {
    fn default() -> Self {
        Self {
            initial_reputation: DEFAULT_INITIAL_REPUTATION,
            max_reputation: DEFAULT_MAX_REPUTATION,
            min_reputation: DEFAULT_MIN_REPUTATION,
            floor_weight: DEFAULT_FLOOR_WEIGHT,
            tight_tolerance_bps: DEFAULT_TIGHT_TOLERANCE_BPS,
            loose_tolerance_bps: DEFAULT_LOOSE_TOLERANCE_BPS,
            outlier_tolerance_bps: DEFAULT_OUTLIER_TOLERANCE_BPS,
            reward: DEFAULT_REWARD,
            penalty: DEFAULT_PENALTY,
            low_watermark: DEFAULT_LOW_WATERMARK,
            slash_bps: DEFAULT_SLASH_BPS,
        }
    }
}

impl ReputationPolicy {
    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidParams`] describing the first violated rule
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(OracleError::InvalidParams(msg.to_string()));

        if self.floor_weight == 0 {
            return fail("floor_weight must be strictly positive");
        }
        if self.min_reputation == 0 {
            return fail("min_reputation must be strictly positive");
        }
        if !(self.min_reputation <= self.initial_reputation
            && self.initial_reputation <= self.max_reputation)
        {
            return fail("reputation bounds must satisfy min <= initial <= max");
        }
        if !(self.tight_tolerance_bps <= self.loose_tolerance_bps
            && self.loose_tolerance_bps <= self.outlier_tolerance_bps)
        {
            return fail("tolerances must satisfy tight <= loose <= outlier");
        }
        // A full slash would leave a zero-weight submitter.
        if self.slash_bps == 0 || self.slash_bps >= BPS_DENOMINATOR {
            return fail("slash_bps must be in 1..10000");
        }
        Ok(())
    }

    /// Reputation factor used in a consensus weight.
    pub fn weight_factor(&self, reputation: u32) -> u32 {
        reputation.max(self.floor_weight)
    }
}

/// Relative deviation of `value` from `consensus` in basis points.
///
/// Saturates at `u64::MAX`.
pub fn deviation_bps(value: i64, consensus: i64) -> u64 {
    let diff = (i128::from(value) - i128::from(consensus)).unsigned_abs();
    let scaled = diff.saturating_mul(u128::from(BPS_DENOMINATOR));
    let bps = if consensus == 0 {
        scaled
    } else {
        scaled / i128::from(consensus).unsigned_abs()
    };
    u64::try_from(bps).unwrap_or(u64::MAX)
}

/// Outcome of judging one submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Judgement {
    pub new_reputation: u32,
    pub slash: bool,
}

/// Apply the policy to a validator with `reputation` whose submission
/// deviated by `deviation_bps`.
pub fn judge(policy: &ReputationPolicy, reputation: u32, deviation_bps: u64) -> Judgement {
    if deviation_bps <= policy.tight_tolerance_bps {
        let new_reputation = reputation
            .saturating_add(policy.reward)
            .min(policy.max_reputation);
        return Judgement {
            new_reputation,
            slash: false,
        };
    }

    if deviation_bps > policy.loose_tolerance_bps {
        let new_reputation = reputation
            .saturating_sub(policy.penalty)
            .max(policy.min_reputation);
        let slash = new_reputation < policy.low_watermark
            || deviation_bps > policy.outlier_tolerance_bps;
        return Judgement {
            new_reputation,
            slash,
        };
    }

    Judgement {
        new_reputation: reputation,
        slash: false,
    }
}

/// Stake forfeited by one slash.
///
/// At least one unit is taken, and at least one unit is always left behind so
/// the validator's pending weights stay positive.
pub fn slash_amount(stake: Amount, slash_bps: u64) -> Amount {
    let proportional = u128::from(stake) * u128::from(slash_bps) / u128::from(BPS_DENOMINATOR);
    // proportional <= stake, so the cast cannot truncate
    let amount = (proportional as Amount).max(1);
    amount.min(stake.saturating_sub(1))
}

/// Planned change to one validator after a resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatorUpdate {
    pub validator: Address,
    pub deviation_bps: u64,
    pub old_reputation: u32,
    pub new_reputation: u32,
    /// Stake forfeited by this resolution (0 if not slashed).
    pub slashed: Amount,
    pub new_stake: Amount,
    pub slash_count: u32,
    /// The validator drops out of the active set.
    pub deactivated: bool,
}

/// Compute the reputation and stake changes for a resolved round.
///
/// Pure: nothing is applied until the caller commits the returned plan with
/// [`ValidatorRegistry::apply_update`].
///
/// # Errors
///
/// - [`OracleError::NotValidator`] if a submitter has no record
pub fn plan_updates(
    registry: &ValidatorRegistry,
    submissions: &[Submission],
    consensus: i64,
    policy: &ReputationPolicy,
    min_stake: Amount,
) -> Result<Vec<ValidatorUpdate>> {
    let mut updates = Vec::with_capacity(submissions.len());

    for submission in submissions {
        let validator = registry
            .get(&submission.validator)
            .ok_or(OracleError::NotValidator(submission.validator))?;

        let deviation = deviation_bps(submission.value, consensus);
        let judgement = judge(policy, validator.reputation, deviation);

        let (slashed, slash_count) = if judgement.slash {
            (
                slash_amount(validator.stake, policy.slash_bps),
                validator.slash_count.saturating_add(1),
            )
        } else {
            (0, validator.slash_count)
        };
        let new_stake = validator.stake - slashed;
        let deactivated = judgement.slash && validator.active && new_stake < min_stake;

        updates.push(ValidatorUpdate {
            validator: submission.validator,
            deviation_bps: deviation,
            old_reputation: validator.reputation,
            new_reputation: judgement.new_reputation,
            slashed,
            new_stake,
            slash_count,
            deactivated,
        });
    }

    Ok(updates)
}
