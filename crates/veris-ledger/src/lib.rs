//! # veris-ledger
//!
//! Value-transfer interface consumed by the oracle and market engines.
//!
//! The engines never hold balances of their own beyond custody accounting.
//! Every movement of value is a call into a [`TokenLedger`]: deposits are
//! allowance-based pulls into the custody account, payouts are transfers out
//! of it.
//!
//! ## Modules
//!
//! - [`memory`]: In-memory ledger used by tests and the simulation host

pub mod memory;

pub use memory::InMemoryLedger;

use veris_types::identity::short_hex;
use veris_types::{Address, Amount};

/// Error types for ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The source account does not hold enough tokens.
    #[error("insufficient balance for {}: need {required}, have {available}", short_hex(account))]
    InsufficientBalance {
        /// The debited account.
        account: Address,
        /// Amount requested.
        required: Amount,
        /// Amount held.
        available: Amount,
    },

    /// The spender is not approved for the requested amount.
    #[error("insufficient allowance from {}: need {required}, have {available}", short_hex(owner))]
    InsufficientAllowance {
        /// The account whose tokens are being pulled.
        owner: Address,
        /// Amount requested.
        required: Amount,
        /// Amount approved.
        available: Amount,
    },

    /// Crediting the destination would overflow its balance.
    #[error("balance overflow")]
    Overflow,

    /// The ledger refused the transfer for another reason.
    #[error("transfer rejected: {0}")]
    Rejected(String),
}

/// Convenience result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Fungible balance and allowance source.
///
/// Implementations take `&mut self` and receive no handle to the calling
/// engine, so a transfer can fail but can never re-enter the engine that
/// issued it.
pub trait TokenLedger {
    /// Current balance of `account`.
    fn balance_of(&self, account: &Address) -> Amount;

    /// Amount `spender` may still pull from `owner`.
    fn allowance(&self, owner: &Address, spender: &Address) -> Amount;

    /// Move `amount` from `from` to `to` on behalf of `spender`, consuming
    /// allowance.
    fn transfer_from(
        &mut self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<()>;

    /// Move `amount` out of an account the caller controls.
    fn transfer(&mut self, from: &Address, to: &Address, amount: Amount) -> Result<()>;
}

/// Check that `custody` could pull `amount` from `owner` right now.
///
/// Engines call this before applying effects so that the common failure
/// modes are reported without touching state.
pub fn ensure_can_pull<L: TokenLedger + ?Sized>(
    ledger: &L,
    custody: &Address,
    owner: &Address,
    amount: Amount,
) -> Result<()> {
    let available = ledger.allowance(owner, custody);
    if available < amount {
        return Err(LedgerError::InsufficientAllowance {
            owner: *owner,
            required: amount,
            available,
        });
    }
    let balance = ledger.balance_of(owner);
    if balance < amount {
        return Err(LedgerError::InsufficientBalance {
            account: *owner,
            required: amount,
            available: balance,
        });
    }
    Ok(())
}
