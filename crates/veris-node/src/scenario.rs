//! Scripted scenarios.
//!
//! A scenario is a JSON document listing timed actions against a fresh
//! [`Protocol`] backed by an [`InMemoryLedger`]. Accounts are named by
//! label and feeds by name, so scripts stay readable:
//!
//! ```json
//! {
//!   "name": "smoke",
//!   "start_time": 1000,
//!   "steps": [
//!     { "action": "fund", "account": "v1", "amount": 5000000000 },
//!     { "action": "register_validator", "validator": "v1", "stake": 1000000000 },
//!     { "at": 1010, "action": "create_feed", "name": "BTC/USD", "threshold": 1 },
//!     { "action": "pause", "caller": "v1", "expect_error": "Unauthorized" }
//!   ]
//! }
//! ```
//!
//! A step that names `expect_error` must fail with an error whose text
//! contains that string. Any other failure aborts the run.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use veris_ledger::{InMemoryLedger, TokenLedger};
use veris_market::{Comparator, MarketMetadata, MarketRequest, ResolutionCriterion};
use veris_types::identity::{account_id, feed_id, parse_hex_id, short_hex};
use veris_types::{Address, Amount, FeedId, MarketId, Outcome, Timestamp};

use crate::config::{Accounts, NodeConfig};
use crate::events::EventBus;
use crate::protocol::Protocol;

/// A named, timed sequence of actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    /// Clock value before the first step.
    #[serde(default)]
    pub start_time: Timestamp,
    pub steps: Vec<Step>,
}

/// One action plus its timing and expected result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Advance the clock to this time first. Must not go backwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<Timestamp>,
    /// The step must fail with an error containing this text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_error: Option<String>,
    #[serde(flatten)]
    pub action: Action,
}

fn admin_label() -> String {
    "admin".to_string()
}

/// Everything a scenario can do.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Mint tokens and raise the account's allowance to custody by the same amount.
    Fund { account: String, amount: Amount },
    /// Set the account's allowance to custody.
    Approve { account: String, amount: Amount },
    RegisterValidator { validator: String, stake: Amount },
    AddStake { validator: String, amount: Amount },
    CreateFeed {
        #[serde(default = "admin_label")]
        caller: String,
        name: String,
        #[serde(default)]
        description: String,
        threshold: u32,
    },
    DeactivateFeed {
        #[serde(default = "admin_label")]
        caller: String,
        feed: String,
    },
    Submit {
        validator: String,
        feed: String,
        value: i64,
        source: String,
    },
    CreateMarket {
        creator: String,
        feed: String,
        question: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        category: String,
        comparator: Comparator,
        threshold: i64,
        duration: u64,
        liquidity: Amount,
    },
    Buy {
        trader: String,
        market: MarketId,
        outcome: Outcome,
        shares: u64,
    },
    Sell {
        trader: String,
        market: MarketId,
        outcome: Outcome,
        shares: u64,
    },
    Resolve { market: MarketId },
    Claim { holder: String, market: MarketId },
    Cancel {
        #[serde(default = "admin_label")]
        caller: String,
        market: MarketId,
    },
    ClaimRefund { holder: String, market: MarketId },
    Pause {
        #[serde(default = "admin_label")]
        caller: String,
    },
    Resume {
        #[serde(default = "admin_label")]
        caller: String,
    },
    SweepFees {
        #[serde(default = "admin_label")]
        caller: String,
    },
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Action::Fund { .. } => "fund",
            Action::Approve { .. } => "approve",
            Action::RegisterValidator { .. } => "register_validator",
            Action::AddStake { .. } => "add_stake",
            Action::CreateFeed { .. } => "create_feed",
            Action::DeactivateFeed { .. } => "deactivate_feed",
            Action::Submit { .. } => "submit",
            Action::CreateMarket { .. } => "create_market",
            Action::Buy { .. } => "buy",
            Action::Sell { .. } => "sell",
            Action::Resolve { .. } => "resolve",
            Action::Claim { .. } => "claim",
            Action::Cancel { .. } => "cancel",
            Action::ClaimRefund { .. } => "claim_refund",
            Action::Pause { .. } => "pause",
            Action::Resume { .. } => "resume",
            Action::SweepFees { .. } => "sweep_fees",
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    /// Steps executed.
    pub steps: usize,
    /// Steps that failed as expected.
    pub expected_failures: usize,
    /// Events published to the bus.
    pub events: usize,
    /// Final token balance of every labelled account the script touched.
    pub balances: BTreeMap<String, Amount>,
    /// Whether custody covered all engine obligations at the end.
    pub solvent: bool,
}

impl Scenario {
    /// Read a scenario from a JSON file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("parsing scenario {}", path.display()))
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Replay every step against a fresh protocol, publishing events to `bus`.
    pub fn run(&self, config: &NodeConfig, bus: &EventBus) -> anyhow::Result<ScenarioReport> {
        let accounts = config.accounts.resolve()?;
        let protocol = Protocol::new(
            InMemoryLedger::new(),
            accounts,
            config.oracle.clone(),
            config.market.clone(),
        )?;
        let mut runner = Runner {
            protocol,
            accounts,
            now: self.start_time,
            labels: BTreeMap::new(),
            feeds: BTreeMap::new(),
        };

        tracing::info!(scenario = %self.name, steps = self.steps.len(), "scenario starting");
        let mut report = ScenarioReport {
            name: self.name.clone(),
            ..ScenarioReport::default()
        };

        for (index, step) in self.steps.iter().enumerate() {
            let number = index + 1;
            if let Some(at) = step.at {
                if at < runner.now {
                    bail!("step {number}: time {at} is before current time {}", runner.now);
                }
                runner.now = at;
            }

            let result = runner.execute(&step.action);
            match (&step.expect_error, result) {
                (None, Ok(())) => {}
                (None, Err(err)) => {
                    return Err(err.context(format!(
                        "step {number} ({}) at t={} failed",
                        step.action.name(),
                        runner.now
                    )));
                }
                (Some(expected), Ok(())) => {
                    bail!(
                        "step {number} ({}): expected error containing {expected:?}, but it succeeded",
                        step.action.name()
                    );
                }
                (Some(expected), Err(err)) => {
                    let text = format!("{err:#} {:?}", err.root_cause());
                    if !text.contains(expected.as_str()) {
                        bail!(
                            "step {number} ({}): expected error containing {expected:?}, got {text}",
                            step.action.name()
                        );
                    }
                    tracing::debug!(step = number, error = %err, "expected failure");
                    report.expected_failures += 1;
                }
            }
            report.steps += 1;

            let events = runner.protocol.drain_events();
            report.events += events.len();
            bus.emit_all(events);
        }

        report.balances = runner
            .labels
            .iter()
            .map(|(label, address)| (label.clone(), runner.protocol.ledger().balance_of(address)))
            .collect();
        report.solvent = runner.protocol.is_solvent();
        tracing::info!(
            scenario = %self.name,
            steps = report.steps,
            expected_failures = report.expected_failures,
            events = report.events,
            solvent = report.solvent,
            "scenario finished"
        );
        Ok(report)
    }
}

struct Runner {
    protocol: Protocol<InMemoryLedger>,
    accounts: Accounts,
    now: Timestamp,
    labels: BTreeMap<String, Address>,
    feeds: BTreeMap<String, FeedId>,
}

impl Runner {
    /// Map a label to an address. Protocol roles map to the configured
    /// accounts; 64-character hex strings are taken literally.
    fn account(&mut self, label: &str) -> Address {
        let address = match label {
            "admin" => self.accounts.admin,
            "custody" => self.accounts.custody,
            "fee_sink" | "fee-sink" => self.accounts.fee_sink,
            other => parse_hex_id(other).unwrap_or_else(|| account_id(other)),
        };
        self.labels.insert(label.to_string(), address);
        address
    }

    /// Feeds created by the script resolve to their returned id; anything
    /// else falls back to the derived id so lookups can fail naturally.
    fn feed(&self, name: &str) -> FeedId {
        self.feeds
            .get(name.trim())
            .copied()
            .unwrap_or_else(|| feed_id(name.trim()))
    }

    fn execute(&mut self, action: &Action) -> anyhow::Result<()> {
        let now = self.now;
        match action {
            Action::Fund { account, amount } => {
                let who = self.account(account);
                let custody = self.accounts.custody;
                let ledger = self.protocol.ledger_mut();
                ledger.mint(&who, *amount)?;
                let allowance = ledger.allowance(&who, &custody).saturating_add(*amount);
                ledger.approve(&who, &custody, allowance);
            }
            Action::Approve { account, amount } => {
                let who = self.account(account);
                let custody = self.accounts.custody;
                self.protocol.ledger_mut().approve(&who, &custody, *amount);
            }
            Action::RegisterValidator { validator, stake } => {
                let who = self.account(validator);
                self.protocol.register_validator(who, *stake, now)?;
            }
            Action::AddStake { validator, amount } => {
                let who = self.account(validator);
                self.protocol.add_stake(who, *amount, now)?;
            }
            Action::CreateFeed {
                caller,
                name,
                description,
                threshold,
            } => {
                let who = self.account(caller);
                let id = self
                    .protocol
                    .create_feed(who, name, description, *threshold, now)?;
                self.feeds.insert(name.trim().to_string(), id);
            }
            Action::DeactivateFeed { caller, feed } => {
                let who = self.account(caller);
                let id = self.feed(feed);
                self.protocol.deactivate_feed(who, id, now)?;
            }
            Action::Submit {
                validator,
                feed,
                value,
                source,
            } => {
                let who = self.account(validator);
                let id = self.feed(feed);
                let receipt = self.protocol.submit(who, id, *value, source, now)?;
                if let Some(resolution) = receipt.resolution {
                    tracing::info!(
                        feed = short_hex(&id),
                        value = resolution.value,
                        confidence_bps = resolution.confidence_bps,
                        "scenario: feed resolved"
                    );
                }
            }
            Action::CreateMarket {
                creator,
                feed,
                question,
                description,
                category,
                comparator,
                threshold,
                duration,
                liquidity,
            } => {
                let who = self.account(creator);
                let request = MarketRequest {
                    metadata: MarketMetadata {
                        question: question.clone(),
                        description: description.clone(),
                        category: category.clone(),
                        criterion: ResolutionCriterion {
                            comparator: *comparator,
                            threshold: *threshold,
                        },
                    },
                    feed_id: self.feed(feed),
                    duration: *duration,
                    liquidity: *liquidity,
                };
                let market_id = self.protocol.create_market(who, request, now)?;
                tracing::info!(market_id, "scenario: market created");
            }
            Action::Buy {
                trader,
                market,
                outcome,
                shares,
            } => {
                let who = self.account(trader);
                self.protocol
                    .buy_shares(who, *market, *outcome, *shares, now)?;
            }
            Action::Sell {
                trader,
                market,
                outcome,
                shares,
            } => {
                let who = self.account(trader);
                self.protocol
                    .sell_shares(who, *market, *outcome, *shares, now)?;
            }
            Action::Resolve { market } => {
                let outcome = self.protocol.resolve_market(*market, now)?;
                tracing::info!(market_id = *market, %outcome, "scenario: market resolved");
            }
            Action::Claim { holder, market } => {
                let who = self.account(holder);
                self.protocol.claim_winnings(who, *market, now)?;
            }
            Action::Cancel { caller, market } => {
                let who = self.account(caller);
                self.protocol.cancel_market(who, *market, now)?;
            }
            Action::ClaimRefund { holder, market } => {
                let who = self.account(holder);
                self.protocol.claim_refund(who, *market, now)?;
            }
            Action::Pause { caller } => {
                let who = self.account(caller);
                self.protocol.pause(who, now)?;
            }
            Action::Resume { caller } => {
                let who = self.account(caller);
                self.protocol.resume(who, now)?;
            }
            Action::SweepFees { caller } => {
                let who = self.account(caller);
                self.protocol.sweep_fees(who, now)?;
            }
        }
        Ok(())
    }
}
