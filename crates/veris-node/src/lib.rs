//! # veris-node
//!
//! Simulation host for the Veris oracle and prediction markets.
//!
//! The engines are synchronous and take the current time as an argument.
//! The node wires them to a token ledger, loads configuration, replays
//! scripted scenarios against them and publishes the resulting events.
//!
//! ## Modules
//!
//! - [`config`]: TOML configuration
//! - [`events`]: Event broadcast to subscribers
//! - [`protocol`]: Ledger plus both engines behind one facade
//! - [`scenario`]: JSON scenario scripts and their runner

pub mod config;
pub mod events;
pub mod protocol;
pub mod scenario;

pub use config::{Accounts, NodeConfig};
pub use events::{EventBus, EventCategory, EventFilter};
pub use protocol::{Protocol, ProtocolError};
pub use scenario::{Scenario, ScenarioReport};
