//! Integration test crate for the Veris protocol.
//!
//! The library only carries shared fixtures; the tests under `tests/`
//! exercise end-to-end flows across the oracle, market and node crates.
//!
//! ```sh
//! cargo test -p veris-integration-tests
//! ```

use veris_ledger::{InMemoryLedger, TokenLedger};
use veris_market::{Comparator, MarketMetadata, MarketParams, MarketRequest, ResolutionCriterion};
use veris_node::{Accounts, Protocol};
use veris_oracle::OracleParams;
use veris_types::identity::account_id;
use veris_types::{Address, Amount, FeedId, UNITS_PER_TOKEN};

/// Base timestamp for test scenarios.
pub const BASE_TIME: u64 = 1_700_000_000;

/// Tokens minted to every funded test account.
pub const STARTING_BALANCE: Amount = 1_000_000 * UNITS_PER_TOKEN;

pub type TestProtocol = Protocol<InMemoryLedger>;

/// Protocol accounts derived from their usual labels.
pub fn accounts() -> Accounts {
    Accounts {
        admin: account_id("admin"),
        custody: account_id("custody"),
        fee_sink: account_id("fee-sink"),
    }
}

/// A protocol with default parameters and an empty ledger.
pub fn protocol() -> TestProtocol {
    protocol_with(OracleParams::default(), MarketParams::default())
}

pub fn protocol_with(oracle: OracleParams, market: MarketParams) -> TestProtocol {
    Protocol::new(InMemoryLedger::new(), accounts(), oracle, market).expect("protocol")
}

/// Mint [`STARTING_BALANCE`] to `label` and approve custody for all of it.
pub fn fund(protocol: &mut TestProtocol, label: &str) -> Address {
    let who = account_id(label);
    let custody = accounts().custody;
    let ledger = protocol.ledger_mut();
    ledger.mint(&who, STARTING_BALANCE).expect("mint");
    ledger.approve(&who, &custody, STARTING_BALANCE);
    who
}

/// Fund and register `count` validators at the minimum stake.
pub fn register_validators(protocol: &mut TestProtocol, count: usize, now: u64) -> Vec<Address> {
    let stake = protocol.oracle().params().min_stake;
    (0..count)
        .map(|i| {
            let who = fund(protocol, &format!("validator-{i}"));
            protocol
                .register_validator(who, stake, now)
                .expect("register validator");
            who
        })
        .collect()
}

/// Create a feed with the admin account.
pub fn create_feed(protocol: &mut TestProtocol, name: &str, threshold: u32, now: u64) -> FeedId {
    protocol
        .create_feed(accounts().admin, name, "", threshold, now)
        .expect("create feed")
}

/// A market request with the minimum liquidity.
pub fn market_request(
    feed_id: FeedId,
    comparator: Comparator,
    threshold: i64,
    duration: u64,
) -> MarketRequest {
    MarketRequest {
        metadata: MarketMetadata {
            question: format!("feed value {comparator:?} {threshold}?"),
            description: String::new(),
            category: "test".to_string(),
            criterion: ResolutionCriterion {
                comparator,
                threshold,
            },
        },
        feed_id,
        duration,
        liquidity: MarketParams::default().min_liquidity,
    }
}

/// Submit `values` from the first `values.len()` validators in order.
pub fn submit_all(
    protocol: &mut TestProtocol,
    validators: &[Address],
    feed_id: FeedId,
    values: &[i64],
    now: u64,
) {
    for (validator, value) in validators.iter().zip(values) {
        protocol
            .submit(*validator, feed_id, *value, "test", now)
            .expect("submit");
    }
}

/// Token balance of the custody account.
pub fn custody_balance(protocol: &TestProtocol) -> Amount {
    protocol.ledger().balance_of(&accounts().custody)
}
