//! Oracle entry points.
//!
//! [`Oracle`] owns the validator registry, the feed registry and the round
//! bookkeeping. Every mutating call takes `&mut self`, the caller identity and
//! the current time, runs all checks first, and performs at most one ledger
//! transfer as its last step. If that transfer fails the prior records are put
//! back and the ledger error is returned.

use veris_ledger::{ensure_can_pull, TokenLedger};
use veris_types::authority::Authority;
use veris_types::events::{Event, EventKind, EventLog};
use veris_types::feed::{FeedSnapshot, FeedSource};
use veris_types::identity::short_hex;
use veris_types::{Address, Amount, FeedId, Timestamp};

use crate::consensus::{
    compute_consensus, validator_weight, Consensus, ConsensusEngine, Round, Submission,
    WeightedValue,
};
use crate::feeds::{DataFeed, FeedRegistry, ResolvedPoint};
use crate::params::{OracleParams, MAX_SOURCE_LEN};
use crate::registry::{Validator, ValidatorRegistry};
use crate::reputation::{plan_updates, ValidatorUpdate};
use crate::twap::compute_twap;
use crate::{OracleError, Result};

/// A round that reached its threshold and resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub feed_id: FeedId,
    pub value: i64,
    pub confidence_bps: u64,
    pub submissions: u32,
    pub resolved_at: Timestamp,
    /// Reputation and stake changes applied to each submitter.
    pub updates: Vec<ValidatorUpdate>,
}

/// Outcome of an accepted submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// Submissions in the round after this one was recorded.
    pub round_size: u32,
    /// Set when this submission completed the round.
    pub resolution: Option<Resolution>,
}

/// Validator consensus and reputation engine.
#[derive(Debug, Clone)]
pub struct Oracle {
    authority: Authority,
    custody: Address,
    fee_sink: Address,
    params: OracleParams,
    validators: ValidatorRegistry,
    feeds: FeedRegistry,
    consensus: ConsensusEngine,
    /// Slashed stake held in custody until swept to the fee sink.
    penalties_accrued: Amount,
    events: EventLog,
}

impl Oracle {
    /// Build an oracle with validated parameters.
    ///
    /// # Errors
    ///
    /// - [`OracleError::InvalidParams`] if `params` fail validation
    pub fn new(
        admin: Address,
        custody: Address,
        fee_sink: Address,
        params: OracleParams,
    ) -> Result<Self> {
        params.validate()?;
        tracing::info!(
            admin = short_hex(&admin),
            custody = short_hex(&custody),
            min_stake = params.min_stake,
            window = params.validation_window,
            "oracle initialised"
        );
        Ok(Self {
            authority: Authority::new(admin),
            custody,
            fee_sink,
            consensus: ConsensusEngine::new(params.validation_window),
            params,
            validators: ValidatorRegistry::new(),
            feeds: FeedRegistry::new(),
            penalties_accrued: 0,
            events: EventLog::new(),
        })
    }

    // ---------------------------------------------------------------------
    // Administration
    // ---------------------------------------------------------------------

    /// Halt every state-mutating entry point. Admin only.
    pub fn pause(&mut self, caller: Address, now: Timestamp) -> Result<()> {
        self.authority.pause(&caller)?;
        self.events.emit(now, EventKind::Paused);
        Ok(())
    }

    /// Lift a pause. Admin only.
    pub fn resume(&mut self, caller: Address, now: Timestamp) -> Result<()> {
        self.authority.resume(&caller)?;
        self.events.emit(now, EventKind::Resumed);
        Ok(())
    }

    /// Send accrued slashing penalties from custody to the fee sink.
    ///
    /// Any caller may trigger a sweep; the destination is fixed.
    ///
    /// # Errors
    ///
    /// - [`OracleError::Paused`]
    /// - [`OracleError::NothingToSweep`] if no penalties have accrued
    /// - [`OracleError::Ledger`] if the transfer fails; nothing changes
    pub fn sweep_fees<L: TokenLedger + ?Sized>(
        &mut self,
        ledger: &mut L,
        caller: Address,
        now: Timestamp,
    ) -> Result<Amount> {
        self.authority.ensure_operational()?;
        let amount = self.penalties_accrued;
        if amount == 0 {
            return Err(OracleError::NothingToSweep);
        }

        self.penalties_accrued = 0;
        if let Err(err) = ledger.transfer(&self.custody, &self.fee_sink, amount) {
            self.penalties_accrued = amount;
            return Err(err.into());
        }

        tracing::info!(
            amount,
            fee_sink = short_hex(&self.fee_sink),
            swept_by = short_hex(&caller),
            "penalties swept"
        );
        self.events.emit(
            now,
            EventKind::FeesSwept {
                fee_sink: self.fee_sink,
                amount,
            },
        );
        Ok(amount)
    }

    // ---------------------------------------------------------------------
    // Validators
    // ---------------------------------------------------------------------

    /// Stake `stake` and join the active validator set.
    ///
    /// A previously deactivated identity keeps its reputation and slash
    /// count; the new deposit is added to what slashing left behind.
    ///
    /// # Errors
    ///
    /// - [`OracleError::Paused`]
    /// - [`OracleError::AlreadyRegistered`] if `caller` is active
    /// - [`OracleError::InsufficientStake`] if `stake` is below the minimum
    /// - [`OracleError::ValidatorCapReached`] if the active set is full
    /// - [`OracleError::Ledger`] if the deposit cannot be pulled
    pub fn register_validator<L: TokenLedger + ?Sized>(
        &mut self,
        ledger: &mut L,
        caller: Address,
        stake: Amount,
        now: Timestamp,
    ) -> Result<()> {
        self.authority.ensure_operational()?;
        let validator = self
            .validators
            .plan_registration(&caller, stake, now, &self.params)?;
        ensure_can_pull(ledger, &self.custody, &caller, stake)?;

        let previous = self.validators.get(&caller).cloned();
        let (total_stake, reputation) = (validator.stake, validator.reputation);
        self.validators.put(validator);

        if let Err(err) = ledger.transfer_from(&self.custody, &caller, &self.custody, stake) {
            self.validators.restore(&caller, previous);
            return Err(err.into());
        }

        tracing::info!(
            validator = short_hex(&caller),
            stake,
            total_stake,
            reputation,
            active = self.validators.active_count(),
            "validator registered"
        );
        self.events.emit(
            now,
            EventKind::ValidatorRegistered {
                validator: caller,
                stake: total_stake,
                reputation,
            },
        );
        Ok(())
    }

    /// Add `amount` to an active validator's stake.
    ///
    /// # Errors
    ///
    /// - [`OracleError::Paused`]
    /// - [`OracleError::NotValidator`] if `caller` is not active
    /// - [`OracleError::InvalidAmount`] if `amount` is zero
    /// - [`OracleError::Ledger`] if the deposit cannot be pulled
    pub fn add_stake<L: TokenLedger + ?Sized>(
        &mut self,
        ledger: &mut L,
        caller: Address,
        amount: Amount,
        now: Timestamp,
    ) -> Result<Amount> {
        self.authority.ensure_operational()?;
        let previous = match self.validators.get(&caller) {
            Some(v) if v.active => v.clone(),
            _ => return Err(OracleError::NotValidator(caller)),
        };
        if amount == 0 {
            return Err(OracleError::InvalidAmount);
        }
        let total_stake = previous
            .stake
            .checked_add(amount)
            .ok_or(OracleError::Overflow("stake"))?;
        ensure_can_pull(ledger, &self.custody, &caller, amount)?;

        self.validators.put(Validator {
            stake: total_stake,
            ..previous.clone()
        });
        if let Err(err) = ledger.transfer_from(&self.custody, &caller, &self.custody, amount) {
            self.validators.restore(&caller, Some(previous));
            return Err(err.into());
        }

        tracing::debug!(validator = short_hex(&caller), amount, total_stake, "stake added");
        self.events.emit(
            now,
            EventKind::StakeAdded {
                validator: caller,
                amount,
                total_stake,
            },
        );
        Ok(total_stake)
    }

    // ---------------------------------------------------------------------
    // Feeds
    // ---------------------------------------------------------------------

    /// Create a feed and open its first round. Admin only.
    ///
    /// # Errors
    ///
    /// - [`OracleError::Paused`] / [`OracleError::Unauthorized`]
    /// - [`OracleError::InvalidName`], [`OracleError::InvalidThreshold`],
    ///   [`OracleError::ThresholdTooHigh`], [`OracleError::DuplicateFeed`]
    pub fn create_feed(
        &mut self,
        caller: Address,
        name: &str,
        description: &str,
        threshold: u32,
        now: Timestamp,
    ) -> Result<FeedId> {
        self.authority.ensure_operational()?;
        self.authority.ensure_admin(&caller)?;
        let feed = self.feeds.plan_feed(
            name,
            description,
            threshold,
            self.validators.active_count(),
            now,
        )?;

        let feed_id = feed.id;
        let event = EventKind::FeedCreated {
            feed_id,
            name: feed.name.clone(),
            description: feed.description.clone(),
            threshold,
        };
        tracing::info!(feed = short_hex(&feed_id), name = %feed.name, threshold, "feed created");

        self.feeds.insert(feed);
        self.consensus.open_round(feed_id, now);
        self.events.emit(now, event);
        Ok(feed_id)
    }

    /// Stop a feed from accepting submissions and drop its pending round.
    /// Admin only.
    ///
    /// # Errors
    ///
    /// - [`OracleError::Paused`] / [`OracleError::Unauthorized`]
    /// - [`OracleError::UnknownFeed`]
    /// - [`OracleError::FeedInactive`] if the feed is already inactive
    pub fn deactivate_feed(
        &mut self,
        caller: Address,
        feed_id: FeedId,
        now: Timestamp,
    ) -> Result<()> {
        self.authority.ensure_operational()?;
        self.authority.ensure_admin(&caller)?;
        let feed = self
            .feeds
            .get_mut(&feed_id)
            .ok_or(OracleError::UnknownFeed(feed_id))?;
        if !feed.active {
            return Err(OracleError::FeedInactive(feed_id));
        }

        feed.active = false;
        let discarded = self.consensus.discard_round(&feed_id);
        tracing::info!(feed = short_hex(&feed_id), discarded, "feed deactivated");
        self.events.emit(now, EventKind::FeedDeactivated { feed_id });
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Submissions
    // ---------------------------------------------------------------------

    /// Submit an observation for `feed_id`.
    ///
    /// If this submission brings the round to the feed's threshold, the round
    /// resolves in the same call and the returned receipt carries the
    /// [`Resolution`].
    ///
    /// A submission arriving after the round's window abandons the round: its
    /// pending submissions are discarded and `RoundExpired` is published even
    /// though the call itself fails. The next accepted submission opens a new
    /// round.
    ///
    /// # Errors
    ///
    /// - [`OracleError::Paused`]
    /// - [`OracleError::UnknownFeed`] / [`OracleError::FeedInactive`]
    /// - [`OracleError::NotValidator`] if `caller` is not active
    /// - [`OracleError::ValidationWindowClosed`] if the round's window elapsed
    /// - [`OracleError::AlreadySubmitted`] if `caller` is already in the round
    /// - [`OracleError::InvalidSource`] if `source` is too long
    /// - [`OracleError::Overflow`] if the weighted aggregation overflows;
    ///   the submission is not recorded
    pub fn submit(
        &mut self,
        caller: Address,
        feed_id: FeedId,
        value: i64,
        source: &str,
        now: Timestamp,
    ) -> Result<SubmitReceipt> {
        self.authority.ensure_operational()?;
        let feed = self
            .feeds
            .get(&feed_id)
            .ok_or(OracleError::UnknownFeed(feed_id))?;
        if !feed.active {
            return Err(OracleError::FeedInactive(feed_id));
        }
        let threshold = feed.threshold;
        if !self.validators.is_active(&caller) {
            return Err(OracleError::NotValidator(caller));
        }

        if let Some((opened_at, discarded)) = self.consensus.expire_if_stale(&feed_id, now) {
            tracing::warn!(
                feed = short_hex(&feed_id),
                opened_at,
                discarded,
                "validation round abandoned"
            );
            self.events.emit(
                now,
                EventKind::RoundExpired {
                    feed_id,
                    opened_at,
                    discarded,
                },
            );
            return Err(OracleError::ValidationWindowClosed {
                opened_at,
                window: self.consensus.window(),
                now,
            });
        }

        if self
            .consensus
            .round(&feed_id)
            .is_some_and(|round| round.contains(&caller))
        {
            return Err(OracleError::AlreadySubmitted(caller));
        }
        if source.len() > MAX_SOURCE_LEN {
            return Err(OracleError::InvalidSource {
                max: MAX_SOURCE_LEN,
            });
        }

        let previous_round = self.consensus.round(&feed_id).cloned();
        let round_size = self.consensus.record(Submission {
            feed_id,
            validator: caller,
            value,
            source: source.to_string(),
            submitted_at: now,
        });
        let round_size = u32::try_from(round_size).unwrap_or(u32::MAX);

        let submitted = EventKind::ValidationSubmitted {
            feed_id,
            validator: caller,
            value,
            source: source.to_string(),
            round_size,
        };
        tracing::debug!(
            feed = short_hex(&feed_id),
            validator = short_hex(&caller),
            value,
            progress = format!("{round_size}/{threshold}"),
            "submission recorded"
        );

        if round_size < threshold {
            self.events.emit(now, submitted);
            return Ok(SubmitReceipt {
                round_size,
                resolution: None,
            });
        }

        let (consensus, submissions, updates, slashed_total) = match self.plan_resolution(&feed_id)
        {
            Ok(plan) => plan,
            Err(err) => {
                self.consensus.restore(feed_id, previous_round);
                return Err(err);
            }
        };
        self.events.emit(now, submitted);
        let resolution = self.commit_resolution(
            feed_id,
            consensus,
            submissions,
            updates,
            slashed_total,
            now,
        );

        Ok(SubmitReceipt {
            round_size,
            resolution: Some(resolution),
        })
    }

    /// Compute consensus and validator updates for a full round without
    /// touching state.
    fn plan_resolution(
        &self,
        feed_id: &FeedId,
    ) -> Result<(Consensus, Vec<Submission>, Vec<ValidatorUpdate>, Amount)> {
        let submissions = self
            .consensus
            .round(feed_id)
            .map(|round| round.submissions.clone())
            .unwrap_or_default();
        let policy = &self.params.reputation;

        let mut weighted = Vec::with_capacity(submissions.len());
        for submission in &submissions {
            let validator = self
                .validators
                .get(&submission.validator)
                .ok_or(OracleError::NotValidator(submission.validator))?;
            weighted.push(WeightedValue {
                value: submission.value,
                weight: validator_weight(validator.stake, validator.reputation, policy),
            });
        }
        let consensus = compute_consensus(&weighted)?;

        let updates = plan_updates(
            &self.validators,
            &submissions,
            consensus.value,
            policy,
            self.params.min_stake,
        )?;
        let slashed_total = updates
            .iter()
            .try_fold(0u64, |acc, u| acc.checked_add(u.slashed))
            .filter(|total| self.penalties_accrued.checked_add(*total).is_some())
            .ok_or(OracleError::Overflow("penalties"))?;

        Ok((consensus, submissions, updates, slashed_total))
    }

    /// Apply a planned resolution. Infallible.
    fn commit_resolution(
        &mut self,
        feed_id: FeedId,
        consensus: Consensus,
        submissions: Vec<Submission>,
        updates: Vec<ValidatorUpdate>,
        slashed_total: Amount,
        now: Timestamp,
    ) -> Resolution {
        let history_len = self.params.history_len;
        let submission_count = u32::try_from(submissions.len()).unwrap_or(u32::MAX);
        let resolution_count = match self.feeds.get_mut(&feed_id) {
            Some(feed) => {
                feed.record_resolution(consensus.value, consensus.confidence_bps, now, history_len);
                feed.resolution_count
            }
            None => 0,
        };
        self.consensus.open_round(feed_id, now);
        self.penalties_accrued += slashed_total;

        tracing::info!(
            feed = short_hex(&feed_id),
            value = consensus.value,
            confidence_bps = consensus.confidence_bps,
            submissions = submission_count,
            "feed resolved"
        );
        self.events.emit(
            now,
            EventKind::FeedResolved {
                feed_id,
                value: consensus.value,
                confidence_bps: consensus.confidence_bps,
                submissions: submission_count,
                resolution_count,
            },
        );

        for update in &updates {
            let slashed = self
                .validators
                .slash_count(&update.validator)
                .is_some_and(|before| update.slash_count > before);
            self.validators.apply_update(update);
            if update.new_reputation != update.old_reputation {
                self.events.emit(
                    now,
                    EventKind::ReputationUpdated {
                        validator: update.validator,
                        old_reputation: update.old_reputation,
                        new_reputation: update.new_reputation,
                        deviation_bps: update.deviation_bps,
                    },
                );
            }
            if slashed {
                tracing::warn!(
                    validator = short_hex(&update.validator),
                    feed = short_hex(&feed_id),
                    amount = update.slashed,
                    deviation_bps = update.deviation_bps,
                    "validator slashed"
                );
                self.events.emit(
                    now,
                    EventKind::ValidatorSlashed {
                        validator: update.validator,
                        feed_id,
                        amount: update.slashed,
                        remaining_stake: update.new_stake,
                        slash_count: update.slash_count,
                        deviation_bps: update.deviation_bps,
                    },
                );
            }
            if update.deactivated {
                tracing::warn!(
                    validator = short_hex(&update.validator),
                    remaining_stake = update.new_stake,
                    "validator deactivated"
                );
                self.events.emit(
                    now,
                    EventKind::ValidatorDeactivated {
                        validator: update.validator,
                        remaining_stake: update.new_stake,
                    },
                );
            }
        }

        Resolution {
            feed_id,
            value: consensus.value,
            confidence_bps: consensus.confidence_bps,
            submissions: submission_count,
            resolved_at: now,
            updates,
        }
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn params(&self) -> &OracleParams {
        &self.params
    }

    pub fn is_paused(&self) -> bool {
        self.authority.is_paused()
    }

    pub fn admin(&self) -> &Address {
        self.authority.admin()
    }

    pub fn custody(&self) -> &Address {
        &self.custody
    }

    pub fn fee_sink(&self) -> &Address {
        &self.fee_sink
    }

    pub fn validator(&self, address: &Address) -> Option<&Validator> {
        self.validators.get(address)
    }

    /// Active validators in deterministic (key) order.
    pub fn active_validators(&self) -> Vec<Address> {
        self.validators.active_validators()
    }

    pub fn active_validator_count(&self) -> u32 {
        self.validators.active_count()
    }

    pub fn slash_count(&self, address: &Address) -> Option<u32> {
        self.validators.slash_count(address)
    }

    /// Stake plus accrued penalties: everything this oracle holds in custody.
    pub fn custodied(&self) -> u128 {
        self.validators.total_stake() + u128::from(self.penalties_accrued)
    }

    pub fn penalties_accrued(&self) -> Amount {
        self.penalties_accrued
    }

    pub fn feed(&self, feed_id: &FeedId) -> Option<&DataFeed> {
        self.feeds.get(feed_id)
    }

    pub fn active_feed_ids(&self) -> Vec<FeedId> {
        self.feeds.active_feed_ids()
    }

    /// The in-flight round of a feed.
    pub fn round(&self, feed_id: &FeedId) -> Option<&Round> {
        self.consensus.round(feed_id)
    }

    /// Time-weighted average of a feed's resolved values from `since` on.
    ///
    /// # Errors
    ///
    /// - [`OracleError::UnknownFeed`]
    /// - [`OracleError::InsufficientHistory`] if fewer than two points qualify
    pub fn feed_twap(&self, feed_id: &FeedId, since: Timestamp) -> Result<i64> {
        let feed = self
            .feeds
            .get(feed_id)
            .ok_or(OracleError::UnknownFeed(*feed_id))?;
        let points: Vec<ResolvedPoint> = feed
            .history
            .iter()
            .filter(|p| p.timestamp >= since)
            .copied()
            .collect();
        compute_twap(&points)
    }

    /// Take every event published since the last drain.
    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain()
    }

    pub fn pending_events(&self) -> &[Event] {
        self.events.pending()
    }
}

impl FeedSource for Oracle {
    fn feed_snapshot(&self, feed_id: &FeedId) -> Option<FeedSnapshot> {
        self.feeds.get(feed_id).map(DataFeed::snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veris_ledger::{InMemoryLedger, LedgerError};
    use veris_types::UNITS_PER_TOKEN;

    const ADMIN: Address = [0xAD; 32];
    const CUSTODY: Address = [0xC0; 32];
    const FEE_SINK: Address = [0xFE; 32];
    const STAKE: Amount = 1_000 * UNITS_PER_TOKEN;

    fn validator(n: u8) -> Address {
        [n; 32]
    }

    fn setup(validators: u8) -> (Oracle, InMemoryLedger) {
        let mut oracle =
            Oracle::new(ADMIN, CUSTODY, FEE_SINK, OracleParams::default()).expect("oracle");
        let mut ledger = InMemoryLedger::new();
        for n in 1..=validators {
            let v = validator(n);
            ledger.mint(&v, 10 * STAKE).expect("mint");
            ledger.approve(&v, &CUSTODY, 10 * STAKE);
            oracle
                .register_validator(&mut ledger, v, STAKE, 0)
                .expect("register");
        }
        oracle.drain_events();
        (oracle, ledger)
    }

    #[test]
    fn test_register_pulls_stake() {
        let (oracle, ledger) = setup(2);
        assert_eq!(ledger.balance_of(&CUSTODY), 2 * STAKE);
        assert_eq!(ledger.balance_of(&validator(1)), 9 * STAKE);
        assert_eq!(oracle.active_validator_count(), 2);
        assert_eq!(oracle.custodied(), u128::from(2 * STAKE));
    }

    #[test]
    fn test_register_without_allowance_changes_nothing() {
        let (mut oracle, mut ledger) = setup(0);
        ledger.mint(&validator(1), STAKE).expect("mint");
        let err = oracle
            .register_validator(&mut ledger, validator(1), STAKE, 0)
            .expect_err("no allowance");
        assert!(matches!(
            err,
            OracleError::Ledger(LedgerError::InsufficientAllowance { .. })
        ));
        assert!(oracle.validator(&validator(1)).is_none());
        assert!(oracle.pending_events().is_empty());
    }

    #[test]
    fn test_register_rolls_back_on_transfer_failure() {
        let (mut oracle, mut ledger) = setup(0);
        ledger.mint(&validator(1), STAKE).expect("mint");
        ledger.approve(&validator(1), &CUSTODY, STAKE);
        ledger.freeze(&validator(1));
        let err = oracle
            .register_validator(&mut ledger, validator(1), STAKE, 0)
            .expect_err("frozen");
        assert!(matches!(err, OracleError::Ledger(LedgerError::Rejected(_))));
        assert!(oracle.validator(&validator(1)).is_none());
        assert_eq!(oracle.active_validator_count(), 0);
    }

    #[test]
    fn test_add_stake() {
        let (mut oracle, mut ledger) = setup(1);
        let total = oracle
            .add_stake(&mut ledger, validator(1), 500, 10)
            .expect("top up");
        assert_eq!(total, STAKE + 500);
        assert!(matches!(
            oracle.add_stake(&mut ledger, validator(1), 0, 10),
            Err(OracleError::InvalidAmount)
        ));
        assert!(matches!(
            oracle.add_stake(&mut ledger, validator(9), 1, 10),
            Err(OracleError::NotValidator(_))
        ));
    }

    #[test]
    fn test_create_feed_admin_only() {
        let (mut oracle, _) = setup(3);
        let err = oracle
            .create_feed(validator(1), "BTC/USD", "", 3, 0)
            .expect_err("not admin");
        assert!(matches!(err, OracleError::Unauthorized(_)));

        let err = oracle
            .create_feed(ADMIN, "BTC/USD", "", 4, 0)
            .expect_err("too high");
        assert!(matches!(err, OracleError::ThresholdTooHigh { threshold: 4, active: 3 }));

        let id = oracle.create_feed(ADMIN, "BTC/USD", "", 3, 0).expect("create");
        assert_eq!(oracle.active_feed_ids(), vec![id]);
        assert_eq!(oracle.round(&id).and_then(|r| r.opened_at), Some(0));
    }

    #[test]
    fn test_three_validators_resolve() {
        let (mut oracle, _) = setup(3);
        let feed = oracle.create_feed(ADMIN, "BTC/USD", "", 3, 100).expect("create");

        let r1 = oracle.submit(validator(1), feed, 50_000, "a", 110).expect("s1");
        assert_eq!(r1.round_size, 1);
        assert!(r1.resolution.is_none());
        oracle.submit(validator(2), feed, 50_100, "b", 120).expect("s2");
        let r3 = oracle.submit(validator(3), feed, 49_900, "c", 130).expect("s3");

        let resolution = r3.resolution.expect("resolved");
        assert!(resolution.value > 49_900 && resolution.value < 50_100);
        assert!(resolution.confidence_bps > 0);

        let snapshot = oracle.feed_snapshot(&feed).expect("snapshot");
        assert_eq!(snapshot.last_value, Some(resolution.value));
        assert_eq!(snapshot.last_resolved_at, Some(130));
        assert_eq!(snapshot.resolution_count, 1);

        let round = oracle.round(&feed).expect("round");
        assert!(round.is_empty());
        assert_eq!(round.opened_at, Some(130));

        // All within 2%: everyone is rewarded.
        for n in 1..=3 {
            let v = oracle.validator(&validator(n)).expect("validator");
            assert_eq!(v.reputation, 510);
        }

        let names: Vec<&str> = oracle.drain_events().iter().map(|e| e.kind.name()).collect();
        assert!(names.contains(&"feed_resolved"));
        assert_eq!(names.iter().filter(|n| **n == "validation_submitted").count(), 3);
        assert_eq!(names.iter().filter(|n| **n == "reputation_updated").count(), 3);
    }

    #[test]
    fn test_double_submission_rejected() {
        let (mut oracle, _) = setup(2);
        let feed = oracle.create_feed(ADMIN, "X", "", 2, 0).expect("create");
        oracle.submit(validator(1), feed, 1, "", 1).expect("first");
        let err = oracle.submit(validator(1), feed, 2, "", 2).expect_err("second");
        assert_eq!(err, OracleError::AlreadySubmitted(validator(1)));
        assert_eq!(oracle.round(&feed).expect("round").len(), 1);
    }

    #[test]
    fn test_window_closes_and_reopens() {
        let (mut oracle, _) = setup(2);
        let feed = oracle.create_feed(ADMIN, "X", "", 2, 0).expect("create");
        oracle.submit(validator(1), feed, 10, "", 100).expect("inside window");
        oracle.drain_events();

        let err = oracle
            .submit(validator(2), feed, 10, "", 3_601)
            .expect_err("window closed");
        assert_eq!(
            err,
            OracleError::ValidationWindowClosed { opened_at: 0, window: 3_600, now: 3_601 }
        );
        let events = oracle.drain_events();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0].kind,
            EventKind::RoundExpired { discarded: 1, opened_at: 0, .. }
        ));

        // The next submission opens a fresh round.
        let receipt = oracle.submit(validator(2), feed, 10, "", 3_602).expect("new round");
        assert_eq!(receipt.round_size, 1);
        assert_eq!(oracle.round(&feed).and_then(|r| r.opened_at), Some(3_602));
    }

    #[test]
    fn test_source_too_long() {
        let (mut oracle, _) = setup(1);
        let feed = oracle.create_feed(ADMIN, "X", "", 1, 0).expect("create");
        let err = oracle
            .submit(validator(1), feed, 1, &"s".repeat(MAX_SOURCE_LEN + 1), 1)
            .expect_err("long source");
        assert!(matches!(err, OracleError::InvalidSource { .. }));
    }

    #[test]
    fn test_outlier_slashed_and_swept() {
        let (mut oracle, mut ledger) = setup(4);
        let feed = oracle.create_feed(ADMIN, "X", "", 4, 0).expect("create");
        for n in 1..=3 {
            oracle
                .submit(validator(n), feed, 100, "", u64::from(n))
                .expect("honest");
        }
        let receipt = oracle.submit(validator(4), feed, 200, "", 4).expect("outlier");
        let resolution = receipt.resolution.expect("resolved");
        assert_eq!(resolution.value, 125);

        // Honest values sit exactly on the loose tolerance (20%): unchanged.
        for n in 1..=3 {
            let v = oracle.validator(&validator(n)).expect("honest");
            assert_eq!(v.reputation, 500);
            assert_eq!(v.slash_count, 0);
        }

        // |200 - 125| / 125 = 60%: penalised and slashed.
        let outlier = oracle.validator(&validator(4)).expect("outlier");
        assert_eq!(outlier.slash_count, 1);
        assert_eq!(outlier.stake, STAKE - STAKE / 10);
        assert!(!outlier.active);
        assert_eq!(oracle.penalties_accrued(), STAKE / 10);

        let events = oracle.drain_events();
        assert!(events.iter().any(|e| e.kind.name() == "validator_slashed"));
        assert!(events.iter().any(|e| e.kind.name() == "validator_deactivated"));

        // Custody still holds every unit until the sweep.
        assert_eq!(ledger.balance_of(&CUSTODY), 4 * STAKE);
        let swept = oracle.sweep_fees(&mut ledger, ADMIN, 5).expect("sweep");
        assert_eq!(swept, STAKE / 10);
        assert_eq!(ledger.balance_of(&FEE_SINK), STAKE / 10);
        assert_eq!(u128::from(ledger.balance_of(&CUSTODY)), oracle.custodied());
        assert!(matches!(
            oracle.sweep_fees(&mut ledger, ADMIN, 6),
            Err(OracleError::NothingToSweep)
        ));
    }

    #[test]
    fn test_paused_rejects_mutation() {
        let (mut oracle, mut ledger) = setup(1);
        let feed = oracle.create_feed(ADMIN, "X", "", 1, 0).expect("create");
        assert!(matches!(
            oracle.pause(validator(1), 1),
            Err(OracleError::Unauthorized(_))
        ));
        oracle.pause(ADMIN, 1).expect("pause");
        assert!(matches!(
            oracle.submit(validator(1), feed, 1, "", 2),
            Err(OracleError::Paused)
        ));
        assert!(matches!(
            oracle.register_validator(&mut ledger, validator(2), STAKE, 2),
            Err(OracleError::Paused)
        ));
        oracle.resume(ADMIN, 3).expect("resume");
        oracle.submit(validator(1), feed, 1, "", 4).expect("submit after resume");
    }

    #[test]
    fn test_deactivated_feed_rejects_submissions() {
        let (mut oracle, _) = setup(2);
        let feed = oracle.create_feed(ADMIN, "X", "", 2, 0).expect("create");
        oracle.submit(validator(1), feed, 1, "", 1).expect("s1");
        oracle.deactivate_feed(ADMIN, feed, 2).expect("deactivate");
        assert!(oracle.round(&feed).is_none());
        assert_eq!(
            oracle.submit(validator(2), feed, 1, "", 3).expect_err("inactive"),
            OracleError::FeedInactive(feed)
        );
        assert!(oracle.active_feed_ids().is_empty());
    }

    #[test]
    fn test_feed_twap() {
        let (mut oracle, _) = setup(1);
        let feed = oracle.create_feed(ADMIN, "X", "", 1, 0).expect("create");
        oracle.submit(validator(1), feed, 100, "", 0).expect("t0");
        oracle.submit(validator(1), feed, 200, "", 30).expect("t30");
        oracle.submit(validator(1), feed, 200, "", 40).expect("t40");

        // (100 * 30 + 200 * 10) / 40
        assert_eq!(oracle.feed_twap(&feed, 0).expect("twap"), 125);
        assert!(matches!(
            oracle.feed_twap(&feed, 35),
            Err(OracleError::InsufficientHistory { .. })
        ));
        assert!(matches!(
            oracle.feed_twap(&[0x77; 32], 0),
            Err(OracleError::UnknownFeed(_))
        ));
    }
}
