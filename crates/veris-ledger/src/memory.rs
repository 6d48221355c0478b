//! In-memory token ledger.
//!
//! Stands in for the external token in tests and in the simulation host.
//! Accounts can be frozen to make transfers touching them fail, which is how
//! tests exercise the engines' rollback paths.

use std::collections::{BTreeMap, BTreeSet};

use veris_types::identity::short_hex;
use veris_types::{Address, Amount};

use crate::{LedgerError, Result, TokenLedger};

/// Balance and allowance tables held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    balances: BTreeMap<Address, Amount>,
    allowances: BTreeMap<(Address, Address), Amount>,
    frozen: BTreeSet<Address>,
    total_supply: Amount,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create tokens out of thin air (simulation and tests only).
    pub fn mint(&mut self, account: &Address, amount: Amount) -> Result<()> {
        let balance = self.balances.entry(*account).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(LedgerError::Overflow)?;
        self.total_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        tracing::debug!(account = %short_hex(account), amount, "ledger: minted");
        Ok(())
    }

    /// Set the amount `spender` may pull from `owner`.
    pub fn approve(&mut self, owner: &Address, spender: &Address, amount: Amount) {
        if amount == 0 {
            self.allowances.remove(&(*owner, *spender));
        } else {
            self.allowances.insert((*owner, *spender), amount);
        }
    }

    /// Make every transfer touching `account` fail.
    pub fn freeze(&mut self, account: &Address) {
        self.frozen.insert(*account);
    }

    pub fn unfreeze(&mut self, account: &Address) {
        self.frozen.remove(account);
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    fn check_not_frozen(&self, from: &Address, to: &Address) -> Result<()> {
        for account in [from, to] {
            if self.frozen.contains(account) {
                return Err(LedgerError::Rejected(format!(
                    "account {} is frozen",
                    short_hex(account)
                )));
            }
        }
        Ok(())
    }

    fn move_balance(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<()> {
        let available = self.balance_of(from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                account: *from,
                required: amount,
                available,
            });
        }
        if from == to {
            return Ok(());
        }
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        self.balances.insert(*from, available - amount);
        self.balances.insert(*to, credited);
        Ok(())
    }
}

impl TokenLedger for InMemoryLedger {
    fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> Amount {
        self.allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<()> {
        self.check_not_frozen(from, to)?;
        let allowed = self.allowance(from, spender);
        if allowed < amount {
            return Err(LedgerError::InsufficientAllowance {
                owner: *from,
                required: amount,
                available: allowed,
            });
        }
        self.move_balance(from, to, amount)?;
        self.approve(from, spender, allowed - amount);

        tracing::trace!(
            from = %short_hex(from),
            to = %short_hex(to),
            amount,
            "ledger: transfer_from"
        );
        Ok(())
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<()> {
        self.check_not_frozen(from, to)?;
        self.move_balance(from, to, amount)?;

        tracing::trace!(
            from = %short_hex(from),
            to = %short_hex(to),
            amount,
            "ledger: transfer"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: Address = [0x01; 32];
    const BOB: Address = [0x02; 32];
    const CUSTODY: Address = [0xC0; 32];

    fn funded() -> InMemoryLedger {
        let mut ledger = InMemoryLedger::new();
        ledger.mint(&ALICE, 1_000).expect("mint");
        ledger
    }

    #[test]
    fn test_mint_and_balance() {
        let ledger = funded();
        assert_eq!(ledger.balance_of(&ALICE), 1_000);
        assert_eq!(ledger.balance_of(&BOB), 0);
        assert_eq!(ledger.total_supply(), 1_000);
    }

    #[test]
    fn test_transfer() {
        let mut ledger = funded();
        ledger.transfer(&ALICE, &BOB, 400).expect("transfer");
        assert_eq!(ledger.balance_of(&ALICE), 600);
        assert_eq!(ledger.balance_of(&BOB), 400);
        assert_eq!(ledger.total_supply(), 1_000);
    }

    #[test]
    fn test_transfer_insufficient_balance() {
        let mut ledger = funded();
        let err = ledger.transfer(&ALICE, &BOB, 1_001).expect_err("overdraw");
        assert!(matches!(err, LedgerError::InsufficientBalance { required: 1_001, available: 1_000, .. }));
        assert_eq!(ledger.balance_of(&ALICE), 1_000);
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let mut ledger = funded();
        ledger.approve(&ALICE, &CUSTODY, 700);
        ledger
            .transfer_from(&CUSTODY, &ALICE, &CUSTODY, 300)
            .expect("pull");
        assert_eq!(ledger.balance_of(&CUSTODY), 300);
        assert_eq!(ledger.allowance(&ALICE, &CUSTODY), 400);
    }

    #[test]
    fn test_transfer_from_without_allowance() {
        let mut ledger = funded();
        let err = ledger
            .transfer_from(&CUSTODY, &ALICE, &CUSTODY, 1)
            .expect_err("no allowance");
        assert!(matches!(err, LedgerError::InsufficientAllowance { .. }));
        assert_eq!(ledger.balance_of(&ALICE), 1_000);
    }

    #[test]
    fn test_frozen_account_rejects() {
        let mut ledger = funded();
        ledger.freeze(&BOB);
        let err = ledger.transfer(&ALICE, &BOB, 1).expect_err("frozen");
        assert!(matches!(err, LedgerError::Rejected(_)));

        ledger.unfreeze(&BOB);
        ledger.transfer(&ALICE, &BOB, 1).expect("unfrozen");
    }

    #[test]
    fn test_approve_zero_clears() {
        let mut ledger = funded();
        ledger.approve(&ALICE, &CUSTODY, 10);
        ledger.approve(&ALICE, &CUSTODY, 0);
        assert_eq!(ledger.allowance(&ALICE, &CUSTODY), 0);
    }
}
