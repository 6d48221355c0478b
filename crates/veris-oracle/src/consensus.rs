//! Validation rounds and weighted consensus.
//!
//! Each feed has at most one in-flight round. A round opens when the feed is
//! created or resolves, or at the first accepted submission after an abandoned
//! round. It stays open for the validation window:
//!
//! ```text
//! now - opened_at > window  =>  round abandoned, submission rejected
//! ```
//!
//! When a round holds the feed's threshold of submissions it resolves to the
//! weighted mean of the submitted values:
//!
//! ```text
//! w_i        = stake_i * max(reputation_i, floor_weight)
//! consensus  = sum(v_i * w_i) / sum(w_i)                     (truncates toward 0)
//! mad        = sum(w_i * |v_i - consensus|) / sum(w_i)
//! confidence = 10_000 - min(mad * 10_000 / max(|consensus|, 1), 10_000)
//! ```
//!
//! The weighted sum is independent of submission order, so which validator
//! completes the round never changes the resolved value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use veris_types::{Address, Amount, FeedId, Timestamp, BPS_DENOMINATOR};

use crate::reputation::ReputationPolicy;
use crate::{OracleError, Result};

/// One validator observation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub feed_id: FeedId,
    pub validator: Address,
    pub value: i64,
    /// Free-form label naming where the value came from.
    pub source: String,
    pub submitted_at: Timestamp,
}

/// Pending submissions for one feed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Round {
    /// `None` after an abandoned round until the next accepted submission.
    pub opened_at: Option<Timestamp>,
    pub submissions: Vec<Submission>,
}

impl Round {
    fn opened(now: Timestamp) -> Self {
        Self {
            opened_at: Some(now),
            submissions: Vec::new(),
        }
    }

    /// Whether the round's window has elapsed at `now`.
    pub fn is_expired(&self, now: Timestamp, window: u64) -> bool {
        self.opened_at
            .is_some_and(|opened| now.saturating_sub(opened) > window)
    }

    pub fn contains(&self, validator: &Address) -> bool {
        self.submissions.iter().any(|s| &s.validator == validator)
    }

    pub fn len(&self) -> usize {
        self.submissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.submissions.is_empty()
    }
}

/// A value with its consensus weight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WeightedValue {
    pub value: i64,
    pub weight: u128,
}

/// Result of aggregating one round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Consensus {
    pub value: i64,
    /// Agreement score in basis points, `0..=10_000`.
    pub confidence_bps: u64,
    pub total_weight: u128,
}

/// Consensus weight of a validator.
///
/// Strictly positive whenever `stake > 0`, because the policy's floor weight
/// is positive.
pub fn validator_weight(stake: Amount, reputation: u32, policy: &ReputationPolicy) -> u128 {
    u128::from(stake) * u128::from(policy.weight_factor(reputation))
}

/// Aggregate weighted values into a consensus value and confidence score.
///
/// # Errors
///
/// - [`OracleError::InvalidParams`] if `values` is empty or the total weight is zero
/// - [`OracleError::Overflow`] if a weighted sum leaves `i128`/`u128`
pub fn compute_consensus(values: &[WeightedValue]) -> Result<Consensus> {
    let total_weight = values
        .iter()
        .try_fold(0u128, |acc, wv| acc.checked_add(wv.weight))
        .ok_or(OracleError::Overflow("total weight"))?;
    if total_weight == 0 {
        return Err(OracleError::InvalidParams(
            "consensus requires positive total weight".to_string(),
        ));
    }
    let divisor = i128::try_from(total_weight).map_err(|_| OracleError::Overflow("total weight"))?;

    let mut weighted_sum: i128 = 0;
    for wv in values {
        let weight = i128::try_from(wv.weight).map_err(|_| OracleError::Overflow("weight"))?;
        let term = i128::from(wv.value)
            .checked_mul(weight)
            .ok_or(OracleError::Overflow("consensus"))?;
        weighted_sum = weighted_sum
            .checked_add(term)
            .ok_or(OracleError::Overflow("consensus"))?;
    }

    // Integer division truncates toward zero. A weighted mean lies within
    // the range of its inputs, so it fits in i64.
    let value = i64::try_from(weighted_sum / divisor).map_err(|_| OracleError::Overflow("consensus"))?;
    let confidence_bps = confidence(values, value, total_weight)?;

    Ok(Consensus {
        value,
        confidence_bps,
        total_weight,
    })
}

/// Confidence score of `consensus` over `values`.
fn confidence(values: &[WeightedValue], consensus: i64, total_weight: u128) -> Result<u64> {
    let mut weighted_deviation: u128 = 0;
    for wv in values {
        let diff = (i128::from(wv.value) - i128::from(consensus)).unsigned_abs();
        let term = diff
            .checked_mul(wv.weight)
            .ok_or(OracleError::Overflow("confidence"))?;
        weighted_deviation = weighted_deviation
            .checked_add(term)
            .ok_or(OracleError::Overflow("confidence"))?;
    }

    let mad = weighted_deviation / total_weight;
    let scale = i128::from(consensus).unsigned_abs().max(1);
    let denominator = u128::from(BPS_DENOMINATOR);
    let relative = mad.saturating_mul(denominator) / scale;
    let penalty = relative.min(denominator);

    // penalty <= 10_000
    Ok(BPS_DENOMINATOR - penalty as u64)
}

/// Per-feed round bookkeeping.
#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    rounds: BTreeMap<FeedId, Round>,
    window: u64,
}

impl ConsensusEngine {
    pub fn new(window: u64) -> Self {
        Self {
            rounds: BTreeMap::new(),
            window,
        }
    }

    pub fn window(&self) -> u64 {
        self.window
    }

    /// Start a fresh round for `feed_id` at `now`, dropping any pending one.
    pub(crate) fn open_round(&mut self, feed_id: FeedId, now: Timestamp) {
        self.rounds.insert(feed_id, Round::opened(now));
    }

    pub fn round(&self, feed_id: &FeedId) -> Option<&Round> {
        self.rounds.get(feed_id)
    }

    /// Abandon the round for `feed_id` if its window has elapsed.
    ///
    /// Returns the abandoned round's opening time and the number of
    /// submissions discarded.
    pub(crate) fn expire_if_stale(
        &mut self,
        feed_id: &FeedId,
        now: Timestamp,
    ) -> Option<(Timestamp, u32)> {
        let round = self.rounds.get_mut(feed_id)?;
        if !round.is_expired(now, self.window) {
            return None;
        }
        let opened_at = round.opened_at?;
        let discarded = u32::try_from(round.submissions.len()).unwrap_or(u32::MAX);
        round.opened_at = None;
        round.submissions.clear();
        Some((opened_at, discarded))
    }

    /// Add a submission, opening the round at its timestamp if none is open.
    ///
    /// Returns the round size after insertion.
    pub(crate) fn record(&mut self, submission: Submission) -> usize {
        let round = self.rounds.entry(submission.feed_id).or_default();
        if round.opened_at.is_none() {
            round.opened_at = Some(submission.submitted_at);
        }
        round.submissions.push(submission);
        round.submissions.len()
    }

    /// Put back a round captured before a failed operation.
    pub(crate) fn restore(&mut self, feed_id: FeedId, previous: Option<Round>) {
        match previous {
            Some(round) => {
                self.rounds.insert(feed_id, round);
            }
            None => {
                self.rounds.remove(&feed_id);
            }
        }
    }

    /// Drop every pending submission without opening a new round.
    pub(crate) fn discard_round(&mut self, feed_id: &FeedId) -> usize {
        self.rounds
            .remove(feed_id)
            .map(|round| round.submissions.len())
            .unwrap_or(0)
    }
}
