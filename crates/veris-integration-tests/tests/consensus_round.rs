//! Integration test: Validator consensus rounds end to end.
//!
//! Exercises the oracle through the node facade:
//! 1. Stake-weighted consensus across validators with unequal stakes
//! 2. Reputation rewards, penalties and slashing after resolution
//! 3. Window expiry abandoning a stale round
//! 4. TWAP over several resolutions
//! 5. Custody accounting after slashing and sweeping
//!
//! This test uses veris-oracle, veris-ledger and veris-node.

use veris_integration_tests::{
    accounts, create_feed, custody_balance, fund, protocol, register_validators, submit_all,
    BASE_TIME,
};
use veris_ledger::TokenLedger;
use veris_node::ProtocolError;
use veris_oracle::OracleError;
use veris_types::events::EventKind;

#[test]
fn stake_weighting_pulls_consensus_toward_larger_stake() {
    let mut protocol = protocol();
    let min_stake = protocol.oracle().params().min_stake;
    let whale = fund(&mut protocol, "whale");
    let minnow = fund(&mut protocol, "minnow");
    protocol
        .register_validator(whale, 3 * min_stake, BASE_TIME)
        .expect("register whale");
    protocol
        .register_validator(minnow, min_stake, BASE_TIME)
        .expect("register minnow");

    let feed = create_feed(&mut protocol, "ETH/USD", 2, BASE_TIME);
    protocol
        .submit(whale, feed, 100, "exchange-a", BASE_TIME + 10)
        .expect("whale submit");
    let receipt = protocol
        .submit(minnow, feed, 200, "exchange-b", BASE_TIME + 20)
        .expect("minnow submit");

    // Equal reputation, 3:1 stake: (3 * 100 + 200) / 4.
    let resolution = receipt.resolution.expect("round resolves at threshold");
    assert_eq!(resolution.value, 125);
    assert_eq!(resolution.submissions, 2);
    assert!(resolution.confidence_bps <= 10_000);

    // The whale deviated exactly 20%: untouched. The minnow deviated 60%.
    let whale_record = protocol.oracle().validator(&whale).expect("whale");
    assert_eq!(whale_record.reputation, 500);
    assert_eq!(whale_record.stake, 3 * min_stake);

    let minnow_record = protocol.oracle().validator(&minnow).expect("minnow");
    assert_eq!(minnow_record.slash_count, 1);
    assert_eq!(minnow_record.stake, min_stake - min_stake / 10);
    assert!(!minnow_record.active);
    assert_eq!(protocol.oracle().active_validator_count(), 1);
    assert_eq!(protocol.oracle().penalties_accrued(), min_stake / 10);

    let feed_state = protocol.oracle().feed(&feed).expect("feed");
    assert_eq!(feed_state.last_value, Some(125));
    assert_eq!(feed_state.last_resolved_at, Some(BASE_TIME + 20));
    assert_eq!(feed_state.resolution_count, 1);

    // Custody holds every stake plus the forfeited penalty.
    assert_eq!(u128::from(custody_balance(&protocol)), protocol.custodied());

    let kinds: Vec<&str> = protocol
        .drain_events()
        .iter()
        .map(|e| e.kind.name())
        .collect();
    assert!(kinds.contains(&"feed_resolved"));
    assert!(kinds.contains(&"validator_slashed"));
    assert!(kinds.contains(&"validator_deactivated"));
}

#[test]
fn accurate_validators_gain_reputation() {
    let mut protocol = protocol();
    let validators = register_validators(&mut protocol, 3, BASE_TIME);
    let feed = create_feed(&mut protocol, "BTC/USD", 3, BASE_TIME);

    submit_all(&mut protocol, &validators, feed, &[64_000, 64_050, 63_980], BASE_TIME + 60);
    for validator in &validators {
        let record = protocol.oracle().validator(validator).expect("validator");
        assert_eq!(record.reputation, 510);
        assert_eq!(record.slash_count, 0);
    }
    // A fresh round opened on resolution.
    let round = protocol.oracle().round(&feed).expect("round");
    assert!(round.is_empty());
    assert_eq!(round.opened_at, Some(BASE_TIME + 60));
}

#[test]
fn stale_round_is_abandoned_and_restarted() {
    let mut protocol = protocol();
    let validators = register_validators(&mut protocol, 3, BASE_TIME);
    let feed = create_feed(&mut protocol, "SOL/USD", 2, BASE_TIME);
    let window = protocol.oracle().params().validation_window;

    protocol
        .submit(validators[0], feed, 150, "a", BASE_TIME + 1)
        .expect("first submission");
    protocol.drain_events();

    // One second past the window.
    let late = BASE_TIME + window + 1;
    let err = protocol
        .submit(validators[1], feed, 151, "b", late)
        .expect_err("window closed");
    assert!(matches!(
        err,
        ProtocolError::Oracle(OracleError::ValidationWindowClosed { opened_at, .. })
            if opened_at == BASE_TIME
    ));
    let events = protocol.drain_events();
    assert!(matches!(
        events.as_slice(),
        [event] if matches!(event.kind, EventKind::RoundExpired { discarded: 1, .. })
    ));
    assert!(protocol.oracle().feed(&feed).expect("feed").last_value.is_none());

    // The retry opens a new round; the earlier submitter may submit again.
    let receipt = protocol
        .submit(validators[1], feed, 151, "b", late)
        .expect("retry");
    assert_eq!(receipt.round_size, 1);
    let receipt = protocol
        .submit(validators[0], feed, 149, "a", late + 5)
        .expect("resubmit");
    assert_eq!(receipt.resolution.map(|r| r.value), Some(150));
}

#[test]
fn twap_over_successive_resolutions() {
    let mut protocol = protocol();
    let validators = register_validators(&mut protocol, 2, BASE_TIME);
    let feed = create_feed(&mut protocol, "XAU/USD", 2, BASE_TIME);

    submit_all(&mut protocol, &validators, feed, &[2_000, 2_000], BASE_TIME + 100);
    submit_all(&mut protocol, &validators, feed, &[2_040, 2_040], BASE_TIME + 200);
    submit_all(&mut protocol, &validators, feed, &[2_010, 2_010], BASE_TIME + 400);

    // 2000 held for 100s, then 2040 for 200s.
    let twap = protocol
        .oracle()
        .feed_twap(&feed, BASE_TIME)
        .expect("twap");
    assert_eq!(twap, (2_000 * 100 + 2_040 * 200) / 300);

    // Only one point after the cutoff.
    assert!(matches!(
        protocol.oracle().feed_twap(&feed, BASE_TIME + 300),
        Err(OracleError::InsufficientHistory { .. })
    ));
}

#[test]
fn deactivated_feed_rejects_submissions() {
    let mut protocol = protocol();
    let validators = register_validators(&mut protocol, 1, BASE_TIME);
    let feed = create_feed(&mut protocol, "DOGE/USD", 1, BASE_TIME);

    protocol
        .deactivate_feed(accounts().admin, feed, BASE_TIME + 1)
        .expect("deactivate");
    assert!(matches!(
        protocol.submit(validators[0], feed, 1, "x", BASE_TIME + 2),
        Err(ProtocolError::Oracle(OracleError::FeedInactive(_)))
    ));
    assert!(matches!(
        protocol.deactivate_feed(accounts().admin, feed, BASE_TIME + 3),
        Err(ProtocolError::Oracle(OracleError::FeedInactive(_)))
    ));
    assert!(protocol.oracle().active_feed_ids().is_empty());
}

#[test]
fn penalties_sweep_to_fee_sink() {
    let mut protocol = protocol();
    let validators = register_validators(&mut protocol, 4, BASE_TIME);
    let feed = create_feed(&mut protocol, "ADA/USD", 4, BASE_TIME);
    let min_stake = protocol.oracle().params().min_stake;

    submit_all(&mut protocol, &validators, feed, &[100, 100, 100, 200], BASE_TIME + 5);
    assert_eq!(protocol.oracle().slash_count(&validators[3]), Some(1));

    let anyone = fund(&mut protocol, "anyone");
    let swept = protocol.sweep_fees(anyone, BASE_TIME + 6).expect("sweep");
    assert_eq!(swept, min_stake / 10);
    assert_eq!(
        protocol.ledger().balance_of(&accounts().fee_sink),
        min_stake / 10
    );
    assert_eq!(u128::from(custody_balance(&protocol)), protocol.custodied());
    assert!(matches!(
        protocol.sweep_fees(anyone, BASE_TIME + 7),
        Err(ProtocolError::NothingToSweep)
    ));
}
