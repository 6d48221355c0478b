//! veris-node: replay a scenario against the oracle and market engines.
//!
//! ```sh
//! veris-node demos/binary_market.json --config veris.toml --events market,feed
//! ```
//!
//! Every protocol event is printed to stdout as one JSON line; logs go to
//! stderr.

use std::path::PathBuf;

use anyhow::{bail, Context};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use veris_node::{EventBus, EventCategory, EventFilter, NodeConfig, Scenario};

const USAGE: &str = "usage: veris-node <scenario.json> [--config <path>] [--events <category,...>]";

struct Args {
    scenario: PathBuf,
    config: Option<PathBuf>,
    filter: EventFilter,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut scenario = None;
    let mut config = None;
    let mut filter = EventFilter::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                config = Some(PathBuf::from(path));
            }
            "--events" => {
                let list = args.next().context("--events needs a category list")?;
                let categories = list
                    .split(',')
                    .map(|name| {
                        EventCategory::parse(name)
                            .with_context(|| format!("unknown event category {name:?}"))
                    })
                    .collect::<anyhow::Result<Vec<_>>>()?;
                filter.categories = Some(categories);
            }
            "-h" | "--help" => bail!(USAGE),
            other if scenario.is_none() => scenario = Some(PathBuf::from(other)),
            other => bail!("unexpected argument {other:?}\n{USAGE}"),
        }
    }
    let scenario = scenario.context(USAGE)?;
    Ok(Args {
        scenario,
        config,
        filter,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args()?;

    // 1. Load config
    let config = NodeConfig::load(args.config.as_deref())?;

    // 2. Initialize tracing; RUST_LOG wins over the configured level
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.logging.level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Veris node starting");

    // 3. Load the scenario
    let scenario = Scenario::from_file(&args.scenario)?;

    // 4. Create event bus and the printing subscriber
    let bus = EventBus::new(config.logging.event_buffer);
    let mut rx = bus.subscribe();
    let event_filter = args.filter;
    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if !event_filter.matches(&event) {
                        continue;
                    }
                    match serde_json::to_string(&event) {
                        Ok(line) => println!("{line}"),
                        Err(e) => warn!("failed to encode event: {}", e),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event printer lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // 5. Replay on a blocking thread so the printer keeps draining
    let run_config = config.clone();
    let run_bus = bus.clone();
    let report = tokio::task::spawn_blocking(move || scenario.run(&run_config, &run_bus))
        .await
        .context("scenario task panicked")??;

    // Closing the last sender ends the printer loop.
    drop(bus);
    printer.await.context("event printer panicked")?;

    info!(
        scenario = %report.name,
        steps = report.steps,
        expected_failures = report.expected_failures,
        events = report.events,
        solvent = report.solvent,
        "Veris node finished"
    );
    for (label, balance) in &report.balances {
        info!(account = %label, balance, "final balance");
    }
    if !report.solvent {
        bail!("custody does not cover engine obligations");
    }
    Ok(())
}
