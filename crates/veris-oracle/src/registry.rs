//! Validator registry.
//!
//! One record per identity. Records are never removed: a validator that is
//! slashed below the minimum stake is deactivated and keeps its reputation
//! and slash count, which carry over if it registers again.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use veris_types::{Address, Amount, Timestamp};

use crate::params::OracleParams;
use crate::reputation::ValidatorUpdate;
use crate::{OracleError, Result};

/// A staked participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub address: Address,
    /// Stake held in custody.
    pub stake: Amount,
    pub reputation: u32,
    pub active: bool,
    pub slash_count: u32,
    pub registered_at: Timestamp,
}

/// Table of validator records keyed by identity.
#[derive(Debug, Clone, Default)]
pub struct ValidatorRegistry {
    validators: BTreeMap<Address, Validator>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a registration and return the record it would produce.
    ///
    /// Does not mutate the registry.
    ///
    /// # Errors
    ///
    /// - [`OracleError::AlreadyRegistered`] if the identity is active
    /// - [`OracleError::InsufficientStake`] if `stake` is below the minimum
    /// - [`OracleError::ValidatorCapReached`] if the active set is full
    /// - [`OracleError::Overflow`] if a re-registration would overflow the stake
    pub fn plan_registration(
        &self,
        address: &Address,
        stake: Amount,
        now: Timestamp,
        params: &OracleParams,
    ) -> Result<Validator> {
        let existing = self.validators.get(address);
        if existing.is_some_and(|v| v.active) {
            return Err(OracleError::AlreadyRegistered(*address));
        }
        if stake < params.min_stake {
            return Err(OracleError::InsufficientStake {
                required: params.min_stake,
                provided: stake,
            });
        }
        if self.active_count() >= params.max_validators {
            return Err(OracleError::ValidatorCapReached {
                cap: params.max_validators,
            });
        }

        match existing {
            // Returning validator: history is kept, the deposit tops up what
            // slashing left behind.
            Some(previous) => Ok(Validator {
                stake: previous
                    .stake
                    .checked_add(stake)
                    .ok_or(OracleError::Overflow("stake"))?,
                active: true,
                registered_at: now,
                ..previous.clone()
            }),
            None => Ok(Validator {
                address: *address,
                stake,
                reputation: params.reputation.initial_reputation,
                active: true,
                slash_count: 0,
                registered_at: now,
            }),
        }
    }

    /// Insert or replace a record.
    pub(crate) fn put(&mut self, validator: Validator) {
        self.validators.insert(validator.address, validator);
    }

    /// Put back a record captured before a failed operation.
    pub(crate) fn restore(&mut self, address: &Address, previous: Option<Validator>) {
        match previous {
            Some(validator) => self.put(validator),
            None => {
                self.validators.remove(address);
            }
        }
    }

    /// Commit a planned post-resolution update.
    pub(crate) fn apply_update(&mut self, update: &ValidatorUpdate) {
        if let Some(validator) = self.validators.get_mut(&update.validator) {
            validator.reputation = update.new_reputation;
            validator.stake = update.new_stake;
            validator.slash_count = update.slash_count;
            if update.deactivated {
                validator.active = false;
            }
        }
    }

    pub fn get(&self, address: &Address) -> Option<&Validator> {
        self.validators.get(address)
    }

    pub fn is_active(&self, address: &Address) -> bool {
        self.validators.get(address).is_some_and(|v| v.active)
    }

    /// Number of active validators.
    pub fn active_count(&self) -> u32 {
        let count = self.validators.values().filter(|v| v.active).count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Identities of all active validators, in key order.
    pub fn active_validators(&self) -> Vec<Address> {
        self.validators
            .values()
            .filter(|v| v.active)
            .map(|v| v.address)
            .collect()
    }

    pub fn slash_count(&self, address: &Address) -> Option<u32> {
        self.validators.get(address).map(|v| v.slash_count)
    }

    /// Sum of all stake held in custody, active or not.
    pub fn total_stake(&self) -> u128 {
        self.validators.values().map(|v| u128::from(v.stake)).sum()
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}
