//! Derived grid-wide statistics.
//!
//! Per-tier capacities are fixed by geometry, so they are derived once from
//! the pricing engine and cached in the aggregator. Everything else is
//! recomputed from the current store contents, either in one full pass or
//! incrementally from changed records; the two paths must agree exactly.

use crate::{
    config::GridConfig,
    pixel::{
        Pixel,
        Wallet,
    },
    tier::{
        Tier,
        tier_of,
    },
};
use itertools::Itertools;
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::{
    BTreeMap,
    HashMap,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasStats {
    pub total_pixels: u64,
    pub claimed_pixels: u64,
    pub remaining_pixels: u64,
    pub total_value_locked: u64,
    pub active_owners: u64,
    pub claimed_by_tier: [u64; 4],
    pub capacity_by_tier: [u64; 4],
}

/// Per-wallet ledger entry. `influence` counts every pixel the wallet ever
/// minted (mint facts are permanent, so this survives melts and transfers
/// away); `value_locked` and `owned` cover current holdings only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerProfile {
    pub influence: u64,
    pub value_locked: u64,
    pub owned: u64,
}

#[derive(Debug, Clone)]
pub struct StatsAggregator {
    total_pixels: u64,
    capacity_by_tier: [u64; 4],
}

impl StatsAggregator {
    /// Walks the grid geometry once to fix the per-tier capacities.
    pub fn new(grid: &GridConfig) -> Self {
        let mut capacity_by_tier = [0u64; 4];
        for y in 0..grid.side {
            for x in 0..grid.side {
                capacity_by_tier[tier_of(x, y, grid).index()] += 1;
            }
        }
        Self {
            total_pixels: grid.total_pixels(),
            capacity_by_tier,
        }
    }

    pub fn capacity_of(&self, tier: Tier) -> u64 {
        self.capacity_by_tier[tier.index()]
    }

    /// Full recompute from a store snapshot.
    pub fn compute(&self, pixels: &[Pixel]) -> CanvasStats {
        let claimed = pixels.iter().filter(|p| p.claimed());
        let claimed_tiers = claimed.clone().map(|p| p.tier).counts();
        let mut claimed_by_tier = [0u64; 4];
        for (tier, count) in claimed_tiers {
            claimed_by_tier[tier.index()] = count as u64;
        }
        let claimed_pixels: u64 = claimed_by_tier.iter().sum();
        let total_value_locked: u64 = claimed.clone().map(|p| p.price).sum();
        let active_owners = claimed.filter_map(|p| p.owner()).unique().count() as u64;
        CanvasStats {
            total_pixels: self.total_pixels,
            claimed_pixels,
            remaining_pixels: self.total_pixels - claimed_pixels,
            total_value_locked,
            active_owners,
            claimed_by_tier,
            capacity_by_tier: self.capacity_by_tier,
        }
    }

    /// Seed the incremental path from a snapshot.
    pub fn running(&self, pixels: &[Pixel]) -> RunningStats {
        let owner_counts = pixels
            .iter()
            .filter_map(|p| p.owner())
            .cloned()
            .counts()
            .into_iter()
            .map(|(owner, count)| (owner, count as u64))
            .collect();
        RunningStats {
            stats: self.compute(pixels),
            owner_counts,
        }
    }

    /// The derived User ledger: influence from permanent mint facts, locked
    /// value and counts from current ownership. Inactive wallets (zero
    /// owned) stay listed as long as any pixel records them as minter.
    pub fn owner_profiles(&self, pixels: &[Pixel]) -> BTreeMap<Wallet, OwnerProfile> {
        let mut profiles: BTreeMap<Wallet, OwnerProfile> = BTreeMap::new();
        for pixel in pixels {
            if let Some(minter) = pixel.minter() {
                profiles.entry(minter.clone()).or_default().influence += pixel.price;
            }
            if let Some(owner) = pixel.owner() {
                let profile = profiles.entry(owner.clone()).or_default();
                profile.value_locked += pixel.price;
                profile.owned += 1;
            }
        }
        profiles
    }
}

/// Incrementally maintained statistics. Feeding every change through
/// `apply` keeps `stats` identical to a full recompute over the same
/// records.
#[derive(Debug, Clone)]
pub struct RunningStats {
    stats: CanvasStats,
    owner_counts: HashMap<Wallet, u64>,
}

impl RunningStats {
    pub fn stats(&self) -> &CanvasStats {
        &self.stats
    }

    pub fn apply(&mut self, old: Option<&Pixel>, new: &Pixel) {
        if let Some(old) = old {
            if old.claimed() {
                self.stats.claimed_pixels -= 1;
                self.stats.remaining_pixels += 1;
                self.stats.claimed_by_tier[old.tier.index()] -= 1;
                self.stats.total_value_locked -= old.price;
            }
            if let Some(owner) = old.owner() {
                self.drop_owner(owner);
            }
        }
        if new.claimed() {
            self.stats.claimed_pixels += 1;
            self.stats.remaining_pixels -= 1;
            self.stats.claimed_by_tier[new.tier.index()] += 1;
            self.stats.total_value_locked += new.price;
        }
        if let Some(owner) = new.owner() {
            let count = self.owner_counts.entry(owner.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                self.stats.active_owners += 1;
            }
        }
    }

    fn drop_owner(&mut self, owner: &Wallet) {
        if let Some(count) = self.owner_counts.get_mut(owner) {
            *count -= 1;
            if *count == 0 {
                self.owner_counts.remove(owner);
                self.stats.active_owners -= 1;
            }
        }
    }
}
