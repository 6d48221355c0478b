//! Node configuration file.
//!
//! ```toml
//! [accounts]
//! admin = ""        # empty = derived from the label "admin"
//! custody = ""
//! fee_sink = ""
//!
//! [oracle]
//! min_stake = 1000000000
//! validation_window = 3600
//!
//! [oracle.reputation]
//! slash_bps = 1000
//!
//! [market]
//! trade_fee_bps = 30
//!
//! [logging]
//! level = "info"
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use veris_market::MarketParams;
use veris_oracle::OracleParams;
use veris_types::identity::{account_id, parse_hex_id};
use veris_types::Address;

/// Environment variable naming a config file.
pub const CONFIG_ENV: &str = "VERIS_CONFIG";

/// Complete node configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub accounts: AccountsConfig,
    #[serde(default)]
    pub oracle: OracleParams,
    #[serde(default)]
    pub market: MarketParams,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Protocol account identities as 64-character hex strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountsConfig {
    /// Administrative authority. Empty = derived from "admin".
    #[serde(default)]
    pub admin: String,
    /// Account holding stake, liquidity and fees. Empty = derived from "custody".
    #[serde(default)]
    pub custody: String,
    /// Destination of swept fees and penalties. Empty = derived from "fee-sink".
    #[serde(default)]
    pub fee_sink: String,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Capacity of the event broadcast channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_event_buffer() -> usize {
    1024
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            event_buffer: default_event_buffer(),
        }
    }
}

/// Resolved protocol identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accounts {
    pub admin: Address,
    pub custody: Address,
    pub fee_sink: Address,
}

impl AccountsConfig {
    /// Decode the configured identities, deriving any left empty.
    pub fn resolve(&self) -> anyhow::Result<Accounts> {
        Ok(Accounts {
            admin: resolve_account(&self.admin, "admin")?,
            custody: resolve_account(&self.custody, "custody")?,
            fee_sink: resolve_account(&self.fee_sink, "fee-sink")?,
        })
    }
}

fn resolve_account(value: &str, label: &str) -> anyhow::Result<Address> {
    if value.trim().is_empty() {
        return Ok(account_id(label));
    }
    parse_hex_id(value).with_context(|| format!("accounts.{label}: expected 64 hex characters"))
}

impl NodeConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the file named by
    /// `VERIS_CONFIG` is used if set, and defaults otherwise.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path: Option<PathBuf> = match path {
            Some(p) => Some(p.to_path_buf()),
            None => std::env::var_os(CONFIG_ENV).map(PathBuf::from),
        };
        match path {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Parse a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Parse TOML text.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: NodeConfig = toml::from_str(content)?;
        config.oracle.validate()?;
        config.market.validate()?;
        Ok(config)
    }
}
