//! Identity derivation and display helpers.
//!
//! All derived identifiers use BLAKE3's key-derivation mode with a registered
//! context string so that ids of different kinds can never collide:
//!
//! ```text
//! feed_id    = BLAKE3::derive_key("Veris v1 feed-id", name)
//! account_id = BLAKE3::derive_key("Veris v1 account-label", label)
//! ```

use crate::{Address, FeedId};

/// Registered BLAKE3 context strings.
pub mod contexts {
    pub const FEED_ID: &str = "Veris v1 feed-id";
    pub const ACCOUNT_LABEL: &str = "Veris v1 account-label";
}

/// Derive the stable feed id from a feed name.
pub fn feed_id(name: &str) -> FeedId {
    blake3::derive_key(contexts::FEED_ID, name.as_bytes())
}

/// Derive a deterministic account identity from a human-readable label.
///
/// Used by simulations and tests to name accounts ("alice", "custody").
pub fn account_id(label: &str) -> Address {
    blake3::derive_key(contexts::ACCOUNT_LABEL, label.as_bytes())
}

/// First eight bytes of an identifier as hex, for log fields.
pub fn short_hex(id: &[u8; 32]) -> String {
    hex::encode(&id[..8])
}

/// Parse a 64-character hex string into a 32-byte identity.
pub fn parse_hex_id(s: &str) -> Option<[u8; 32]> {
    let bytes = hex::decode(s.trim()).ok()?;
    <[u8; 32]>::try_from(bytes.as_slice()).ok()
}

/// Serde adapter encoding 32-byte ids as hex strings.
pub mod hex32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(id))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_hex_id(&s)
            .ok_or_else(|| serde::de::Error::custom("expected 64 hex characters"))
    }
}
