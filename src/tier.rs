//! Scarcity tiers and pricing, derived purely from grid position.
//!
//! A pixel's tier is fixed by its Manhattan distance from the grid center:
//! four concentric bands, nearest band scarcest. The band edges and all
//! prices come from configuration; nothing here is stateful and nothing can
//! fail for in-bounds coordinates.

use crate::config::{
    EconomyConfig,
    GridConfig,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Tier {
    Legendary,
    Epic,
    Rare,
    Common,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Legendary, Tier::Epic, Tier::Rare, Tier::Common];

    /// Index into per-tier tables, nearest band first.
    pub fn index(self) -> usize {
        match self {
            Tier::Legendary => 0,
            Tier::Epic => 1,
            Tier::Rare => 2,
            Tier::Common => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Tier::Legendary => "legendary",
            Tier::Epic => "epic",
            Tier::Rare => "rare",
            Tier::Common => "common",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The three fee-bearing actions of the ownership lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Claim,
    Transfer,
    Melt,
}

/// Manhattan distance from the grid center.
pub fn center_distance(x: u16, y: u16, grid: &GridConfig) -> u64 {
    let (cx, cy) = grid.center();
    u64::from(x.abs_diff(cx)) + u64::from(y.abs_diff(cy))
}

pub fn tier_of(x: u16, y: u16, grid: &GridConfig) -> Tier {
    let distance = center_distance(x, y, grid);
    let [legendary, epic, rare] = grid.tier_thresholds;
    if distance <= legendary {
        Tier::Legendary
    } else if distance <= epic {
        Tier::Epic
    } else if distance <= rare {
        Tier::Rare
    } else {
        Tier::Common
    }
}

/// Fixed lookup; price does not vary within a band.
pub fn price_of(tier: Tier, economy: &EconomyConfig) -> u64 {
    economy.tier_prices[tier.index()]
}

/// Claim costs the full tier price; transfer and melt are flat.
pub fn fee_of(action: ActionKind, tier: Tier, economy: &EconomyConfig) -> u64 {
    match action {
        ActionKind::Claim => price_of(tier, economy),
        ActionKind::Transfer => economy.transfer_fee,
        ActionKind::Melt => economy.melt_fee,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> GridConfig {
        GridConfig::default()
    }

    #[test]
    fn center_is_legendary() {
        assert_eq!(tier_of(25, 25, &grid()), Tier::Legendary);
        assert_eq!(center_distance(25, 25, &grid()), 0);
    }

    #[test]
    fn band_boundaries() {
        // distance 6 is still legendary, 7 starts epic
        assert_eq!(tier_of(25, 31, &grid()), Tier::Legendary);
        assert_eq!(tier_of(25, 32, &grid()), Tier::Epic);
        // distance 12 epic, 13 rare
        assert_eq!(tier_of(25, 37, &grid()), Tier::Epic);
        assert_eq!(tier_of(25, 38, &grid()), Tier::Rare);
        // distance 20 rare, 21 common
        assert_eq!(tier_of(25, 45, &grid()), Tier::Rare);
        assert_eq!(tier_of(25, 46, &grid()), Tier::Common);
    }

    #[test]
    fn corners_are_common() {
        assert_eq!(tier_of(0, 0, &grid()), Tier::Common);
        assert_eq!(tier_of(49, 49, &grid()), Tier::Common);
        assert_eq!(tier_of(0, 49, &grid()), Tier::Common);
        assert_eq!(tier_of(49, 0, &grid()), Tier::Common);
    }

    #[test]
    fn distance_is_symmetric_around_center() {
        let g = grid();
        assert_eq!(tier_of(25, 31, &g), tier_of(31, 25, &g));
        assert_eq!(tier_of(19, 25, &g), tier_of(25, 19, &g));
    }

    #[test]
    fn fees_follow_action_kind() {
        let economy = EconomyConfig::default();
        assert_eq!(fee_of(ActionKind::Claim, Tier::Legendary, &economy), 100_000);
        assert_eq!(fee_of(ActionKind::Claim, Tier::Common, &economy), 1_000);
        for tier in Tier::ALL {
            assert_eq!(fee_of(ActionKind::Transfer, tier, &economy), 500);
            assert_eq!(fee_of(ActionKind::Melt, tier, &economy), 250);
        }
    }
}
