//! The pixel record and its component parts.
//!
//! Ownership facts (`Ownership`) come and go with claims and melts; mint
//! facts (`MintRecord`) are written once at first claim and survive
//! everything after, including melt. The `revision` counter is stamped by
//! the authority on every ownership-affecting transition and is the only
//! recency measure used when merging out-of-order updates.

use crate::tier::Tier;
use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};
use sha2::{
    Digest,
    Sha256,
};
use std::{
    cmp::Ordering,
    fmt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelId {
    pub x: u16,
    pub y: u16,
}

impl PixelId {
    pub fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for PixelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// Row-major, so iterating a sorted set walks the grid top-left to
// bottom-right.
impl Ord for PixelId {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.y, self.x).cmp(&(other.y, other.x))
    }
}

impl PartialOrd for PixelId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Wallet address. Opaque to this crate; the authority is the only party
/// that interprets it.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Wallet(pub String);

impl Wallet {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Wallet {
    fn from(address: &str) -> Self {
        Wallet(address.to_owned())
    }
}

/// Reference to the externally minted token backing a claim: the derived
/// asset id plus the transaction that issued it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRef {
    pub asset_id: String,
    pub tx_ref: String,
}

/// Permanent minting facts, assigned at first claim and never cleared.
/// Sequences are strictly increasing and never reused; `tier_sequence` is
/// scoped to the pixel's tier, `global_sequence` to the whole grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRecord {
    pub minter: Wallet,
    pub tier_sequence: u64,
    pub global_sequence: u64,
}

/// Current-claim facts. `claimed_at` marks the start of the claim epoch and
/// is untouched by transfers; `owned_since` restarts with every owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
    pub owner: Wallet,
    pub owned_since: DateTime<Utc>,
    pub claimed_at: DateTime<Utc>,
    pub token_ref: Option<TokenRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pixel {
    pub id: PixelId,
    pub tier: Tier,
    pub price: u64,
    pub revision: u64,
    pub ownership: Option<Ownership>,
    pub mint: Option<MintRecord>,
    pub created_at: DateTime<Utc>,
}

impl Pixel {
    /// An unclaimed pixel as materialized at grid genesis.
    pub fn genesis(id: PixelId, tier: Tier, price: u64, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            tier,
            price,
            revision: 0,
            ownership: None,
            mint: None,
            created_at,
        }
    }

    pub fn claimed(&self) -> bool {
        self.ownership.is_some()
    }

    pub fn owner(&self) -> Option<&Wallet> {
        self.ownership.as_ref().map(|o| &o.owner)
    }

    pub fn minter(&self) -> Option<&Wallet> {
        self.mint.as_ref().map(|m| &m.minter)
    }
}

/// Derive the 32-byte sub-asset id for the token minted at claim time.
/// Deterministic in the pixel position and the global mint sequence: the
/// asset identity is fixed by the permanent mint facts, while each claim
/// epoch issues it under a fresh transaction reference.
pub fn token_sub_id(id: PixelId, global_sequence: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(id.x.to_be_bytes());
    hasher.update(id.y.to_be_bytes());
    hasher.update(global_sequence.to_be_bytes());
    hasher.finalize().into()
}

/// Hex form used everywhere a token id is displayed or compared.
pub fn token_asset_id(id: PixelId, global_sequence: u64) -> String {
    hex::encode(token_sub_id(id, global_sequence))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_ids_sort_row_major() {
        let mut ids = vec![
            PixelId::new(1, 1),
            PixelId::new(0, 2),
            PixelId::new(2, 0),
            PixelId::new(0, 1),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                PixelId::new(2, 0),
                PixelId::new(0, 1),
                PixelId::new(1, 1),
                PixelId::new(0, 2),
            ]
        );
    }

    #[test]
    fn token_ids_are_stable_and_sequence_scoped() {
        let id = PixelId::new(7, 9);
        assert_eq!(token_asset_id(id, 1), token_asset_id(id, 1));
        assert_ne!(token_asset_id(id, 1), token_asset_id(id, 2));
        assert_eq!(token_asset_id(id, 1).len(), 64);
    }
}
