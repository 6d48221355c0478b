//! # veris-types
//!
//! Shared domain types used across the Veris workspace: identities, amounts,
//! the binary outcome enum, event records, the administrative authority and
//! the read-only feed interface markets settle against.

pub mod authority;
pub mod events;
pub mod feed;
pub mod identity;

use serde::{Deserialize, Serialize};

/// A 32-byte account identity (validator, trader, custody, fee sink).
pub type Address = [u8; 32];

/// Feed identifier, derived from the feed name.
pub type FeedId = [u8; 32];

/// Sequential market identifier.
pub type MarketId = u64;

/// Ledger time in Unix seconds.
pub type Timestamp = u64;

/// Token amount in base units.
pub type Amount = u64;

/// Base units per whole token (1 token = 1,000,000 units).
pub const UNITS_PER_TOKEN: u64 = 1_000_000;

/// Denominator for all basis-point quantities.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// One hour in seconds.
pub const HOUR_SECS: u64 = 3600;

/// One day in seconds.
pub const DAY_SECS: u64 = 86_400;

/// Side of a binary market.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Yes,
    No,
}

impl Outcome {
    /// The other side of the market.
    pub fn opposite(self) -> Self {
        match self {
            Outcome::Yes => Outcome::No,
            Outcome::No => Outcome::Yes,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Yes => f.write_str("YES"),
            Outcome::No => f.write_str("NO"),
        }
    }
}
