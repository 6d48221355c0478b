//! The oracle and market engines wired to one ledger.
//!
//! [`Protocol`] owns the ledger and both engines and passes the ledger into
//! each call. The engines share custody and fee-sink accounts, and the market
//! engine reads feeds straight from the oracle.

use veris_ledger::TokenLedger;
use veris_market::engine::MarketRequest;
use veris_market::pricing::Quote;
use veris_market::{MarketEngine, MarketError, MarketParams};
use veris_oracle::{Oracle, OracleError, OracleParams, SubmitReceipt};
use veris_types::events::Event;
use veris_types::{Address, Amount, FeedId, MarketId, Outcome, Timestamp};

use crate::config::Accounts;

/// Error from either engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("oracle: {0}")]
    Oracle(#[from] OracleError),

    #[error("market: {0}")]
    Market(#[from] MarketError),

    /// Neither engine has anything accrued.
    #[error("nothing to sweep")]
    NothingToSweep,
}

/// Convenience result type for protocol calls.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Ledger plus both engines.
pub struct Protocol<L: TokenLedger> {
    ledger: L,
    oracle: Oracle,
    markets: MarketEngine,
}

impl<L: TokenLedger> Protocol<L> {
    pub fn new(
        ledger: L,
        accounts: Accounts,
        oracle_params: OracleParams,
        market_params: MarketParams,
    ) -> Result<Self> {
        let oracle = Oracle::new(
            accounts.admin,
            accounts.custody,
            accounts.fee_sink,
            oracle_params,
        )?;
        let markets = MarketEngine::new(
            accounts.admin,
            accounts.custody,
            accounts.fee_sink,
            market_params,
        )?;
        Ok(Self {
            ledger,
            oracle,
            markets,
        })
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn oracle(&self) -> &Oracle {
        &self.oracle
    }

    pub fn markets(&self) -> &MarketEngine {
        &self.markets
    }

    // -- administration --------------------------------------------------

    /// Pause both engines.
    pub fn pause(&mut self, caller: Address, now: Timestamp) -> Result<()> {
        self.oracle.pause(caller, now)?;
        self.markets.pause(caller, now)?;
        Ok(())
    }

    /// Resume both engines.
    pub fn resume(&mut self, caller: Address, now: Timestamp) -> Result<()> {
        self.oracle.resume(caller, now)?;
        self.markets.resume(caller, now)?;
        Ok(())
    }

    /// Sweep slashing penalties and trading fees to the fee sink.
    pub fn sweep_fees(&mut self, caller: Address, now: Timestamp) -> Result<Amount> {
        let penalties = match self.oracle.sweep_fees(&mut self.ledger, caller, now) {
            Ok(amount) => amount,
            Err(OracleError::NothingToSweep) => 0,
            Err(err) => return Err(err.into()),
        };
        let fees = match self.markets.sweep_fees(&mut self.ledger, caller, now) {
            Ok(amount) => amount,
            Err(MarketError::NothingToSweep) => 0,
            Err(err) => return Err(err.into()),
        };
        match penalties.saturating_add(fees) {
            0 => Err(ProtocolError::NothingToSweep),
            total => Ok(total),
        }
    }

    // -- oracle ----------------------------------------------------------

    pub fn register_validator(&mut self, caller: Address, stake: Amount, now: Timestamp) -> Result<()> {
        Ok(self
            .oracle
            .register_validator(&mut self.ledger, caller, stake, now)?)
    }

    pub fn add_stake(&mut self, caller: Address, amount: Amount, now: Timestamp) -> Result<Amount> {
        Ok(self.oracle.add_stake(&mut self.ledger, caller, amount, now)?)
    }

    pub fn create_feed(
        &mut self,
        caller: Address,
        name: &str,
        description: &str,
        threshold: u32,
        now: Timestamp,
    ) -> Result<FeedId> {
        Ok(self
            .oracle
            .create_feed(caller, name, description, threshold, now)?)
    }

    pub fn deactivate_feed(&mut self, caller: Address, feed_id: FeedId, now: Timestamp) -> Result<()> {
        Ok(self.oracle.deactivate_feed(caller, feed_id, now)?)
    }

    pub fn submit(
        &mut self,
        caller: Address,
        feed_id: FeedId,
        value: i64,
        source: &str,
        now: Timestamp,
    ) -> Result<SubmitReceipt> {
        Ok(self.oracle.submit(caller, feed_id, value, source, now)?)
    }

    // -- markets ---------------------------------------------------------

    pub fn create_market(
        &mut self,
        creator: Address,
        request: MarketRequest,
        now: Timestamp,
    ) -> Result<MarketId> {
        Ok(self
            .markets
            .create_market(&mut self.ledger, &self.oracle, creator, request, now)?)
    }

    pub fn buy_shares(
        &mut self,
        buyer: Address,
        market_id: MarketId,
        outcome: Outcome,
        shares: u64,
        now: Timestamp,
    ) -> Result<Quote> {
        Ok(self
            .markets
            .buy_shares(&mut self.ledger, buyer, market_id, outcome, shares, now)?)
    }

    pub fn sell_shares(
        &mut self,
        seller: Address,
        market_id: MarketId,
        outcome: Outcome,
        shares: u64,
        now: Timestamp,
    ) -> Result<Quote> {
        Ok(self
            .markets
            .sell_shares(&mut self.ledger, seller, market_id, outcome, shares, now)?)
    }

    pub fn resolve_market(&mut self, market_id: MarketId, now: Timestamp) -> Result<Outcome> {
        Ok(self.markets.resolve_market(&self.oracle, market_id, now)?)
    }

    pub fn claim_winnings(&mut self, holder: Address, market_id: MarketId, now: Timestamp) -> Result<Amount> {
        Ok(self
            .markets
            .claim_winnings(&mut self.ledger, holder, market_id, now)?)
    }

    pub fn cancel_market(&mut self, caller: Address, market_id: MarketId, now: Timestamp) -> Result<()> {
        Ok(self.markets.cancel_market(caller, market_id, now)?)
    }

    pub fn claim_refund(&mut self, holder: Address, market_id: MarketId, now: Timestamp) -> Result<Amount> {
        Ok(self
            .markets
            .claim_refund(&mut self.ledger, holder, market_id, now)?)
    }

    // -- accounting ------------------------------------------------------

    /// Everything both engines owe out of custody.
    pub fn custodied(&self) -> u128 {
        self.oracle.custodied() + self.markets.custodied()
    }

    /// Whether the custody account covers every engine obligation.
    pub fn is_solvent(&self) -> bool {
        u128::from(self.ledger.balance_of(self.oracle.custody())) >= self.custodied()
    }

    /// Drain both engines' outboxes, ordered by timestamp.
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut events = self.oracle.drain_events();
        events.extend(self.markets.drain_events());
        // Stable: within one timestamp, oracle events precede market events.
        events.sort_by_key(|e| e.timestamp);
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veris_ledger::InMemoryLedger;
    use veris_market::{Comparator, MarketMetadata, ResolutionCriterion};
    use veris_types::identity::account_id;
    use veris_types::UNITS_PER_TOKEN;

    fn accounts() -> Accounts {
        Accounts {
            admin: account_id("admin"),
            custody: account_id("custody"),
            fee_sink: account_id("fee-sink"),
        }
    }

    fn funded(labels: &[&str]) -> Protocol<InMemoryLedger> {
        let mut ledger = InMemoryLedger::new();
        for label in labels {
            let who = account_id(label);
            ledger.mint(&who, 1_000_000 * UNITS_PER_TOKEN).expect("mint");
            ledger.approve(&who, &accounts().custody, 1_000_000 * UNITS_PER_TOKEN);
        }
        Protocol::new(
            ledger,
            accounts(),
            OracleParams::default(),
            MarketParams::default(),
        )
        .expect("protocol")
    }

    #[test]
    fn test_pause_covers_both_engines() {
        let mut protocol = funded(&[]);
        protocol.pause(accounts().admin, 1).expect("pause");
        assert!(protocol.oracle().is_paused());
        assert!(protocol.markets().is_paused());
        assert!(matches!(
            protocol.pause(account_id("mallory"), 2),
            Err(ProtocolError::Oracle(OracleError::Unauthorized(_)))
        ));
        protocol.resume(accounts().admin, 3).expect("resume");
        assert!(!protocol.markets().is_paused());
    }

    #[test]
    fn test_end_to_end_through_facade() {
        let mut protocol = funded(&["v1", "trader"]);
        let admin = accounts().admin;
        let v1 = account_id("v1");
        let trader = account_id("trader");
        let stake = protocol.oracle().params().min_stake;

        protocol.register_validator(v1, stake, 0).expect("register");
        let feed = protocol
            .create_feed(admin, "ETH/USD", "ether spot", 1, 0)
            .expect("feed");
        let market = protocol
            .create_market(
                trader,
                MarketRequest {
                    metadata: MarketMetadata {
                        question: "ETH at or above 3000?".to_string(),
                        description: String::new(),
                        category: String::new(),
                        criterion: ResolutionCriterion {
                            comparator: Comparator::AtOrAbove,
                            threshold: 3_000,
                        },
                    },
                    feed_id: feed,
                    duration: 100,
                    liquidity: 100 * UNITS_PER_TOKEN,
                },
                10,
            )
            .expect("market");
        protocol
            .buy_shares(trader, market, Outcome::No, 10, 20)
            .expect("buy");
        protocol.submit(v1, feed, 3_000, "exchange", 105).expect("submit");
        assert_eq!(protocol.resolve_market(market, 110).expect("resolve"), Outcome::Yes);
        assert!(protocol.claim_winnings(trader, market, 120).expect("claim") > 0);
        assert!(protocol.is_solvent());

        let swept = protocol.sweep_fees(v1, 130).expect("sweep");
        assert!(swept > 0);
        assert!(matches!(
            protocol.sweep_fees(v1, 131),
            Err(ProtocolError::NothingToSweep)
        ));
        assert!(protocol.is_solvent());

        let events = protocol.drain_events();
        assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(events.last().map(|e| e.kind.name()), Some("fees_swept"));
    }
}
