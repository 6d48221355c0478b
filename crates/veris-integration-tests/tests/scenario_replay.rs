//! Integration test: Replaying the bundled demo scenario.
//!
//! Runs `demos/binary_market.json` through the node's scenario runner and
//! checks the published event stream:
//! 1. Every step succeeds or fails exactly as scripted
//! 2. Subscribers receive every event in order
//! 3. Category filters select the expected subset
//! 4. Configuration overrides flow into both engines

use std::path::PathBuf;

use veris_node::{EventBus, EventCategory, EventFilter, NodeConfig, Scenario};
use veris_types::events::EventKind;

fn demo_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../demos/binary_market.json")
}

#[test]
fn demo_scenario_runs_clean() {
    let scenario = Scenario::from_file(&demo_path()).expect("load demo");
    let bus = EventBus::new(4096);
    let mut rx = bus.subscribe();

    let report = scenario.run(&NodeConfig::default(), &bus).expect("run demo");
    assert_eq!(report.steps, 50);
    assert_eq!(report.expected_failures, 15);
    assert!(report.solvent);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(events.len(), report.events);
    assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    let count = |name: &str| events.iter().filter(|e| e.kind.name() == name).count();
    assert_eq!(count("validator_registered"), 4);
    assert_eq!(count("market_created"), 2);
    assert_eq!(count("feed_resolved"), 2);
    assert_eq!(count("round_expired"), 1);
    assert_eq!(count("market_resolved"), 1);
    assert_eq!(count("market_cancelled"), 1);
    assert_eq!(count("winnings_claimed"), 2);
    assert_eq!(count("refund_claimed"), 2);
    assert_eq!(count("validator_slashed"), 1);
    assert_eq!(count("validator_deactivated"), 1);

    // The outlier round: the three agreeing validators are left alone.
    let reputation_changes: Vec<(u32, u32)> = events
        .iter()
        .filter_map(|e| match e.kind {
            EventKind::ReputationUpdated {
                old_reputation,
                new_reputation,
                ..
            } => Some((old_reputation, new_reputation)),
            _ => None,
        })
        .collect();
    assert_eq!(reputation_changes.iter().filter(|c| **c == (500, 510)).count(), 4);
    assert_eq!(reputation_changes.iter().filter(|c| **c == (510, 460)).count(), 1);

    // Carol backed NO on the market that resolved YES.
    assert!(report.balances["carol"] < 1_000_000_000);
}

#[tokio::test]
async fn filtered_subscriber_sees_only_market_events() {
    let scenario = Scenario::from_file(&demo_path()).expect("load demo");
    let bus = EventBus::new(4096);
    let mut rx = bus.subscribe();
    let filter = EventFilter {
        categories: Some(vec![EventCategory::Market]),
    };

    let collector = tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Ok(event) = rx.recv().await {
            if filter.matches(&event) {
                seen.push(EventCategory::of(&event.kind));
            }
        }
        seen
    });

    let run_bus = bus.clone();
    let report = tokio::task::spawn_blocking(move || scenario.run(&NodeConfig::default(), &run_bus))
        .await
        .expect("join")
        .expect("run demo");
    drop(bus);

    let seen = collector.await.expect("collector");
    assert!(report.events > seen.len());
    assert!(!seen.is_empty());
    assert!(seen.iter().all(|c| *c == EventCategory::Market));
}

#[test]
fn config_overrides_reach_the_engines() {
    let config = NodeConfig::from_toml(
        r#"
        [market]
        trade_fee_bps = 0

        [oracle.reputation]
        slash_bps = 2000
        "#,
    )
    .expect("config");
    let scenario = Scenario::from_file(&demo_path()).expect("load demo");
    let bus = EventBus::new(4096);
    let mut rx = bus.subscribe();
    let report = scenario.run(&config, &bus).expect("run demo");
    assert!(report.solvent);

    let mut fees = Vec::new();
    let mut slashed = Vec::new();
    while let Ok(event) = rx.try_recv() {
        match event.kind {
            EventKind::SharesBought { fee, .. } | EventKind::SharesSold { fee, .. } => fees.push(fee),
            EventKind::ValidatorSlashed { amount, .. } => slashed.push(amount),
            _ => {}
        }
    }
    assert!(!fees.is_empty());
    assert!(fees.iter().all(|fee| *fee == 0));
    assert_eq!(slashed, vec![200_000_000]);
}
