//! Typed push-channel payloads.
//!
//! Delivery is at-least-once and unordered relative to polling, so every
//! event carries the pixel's post-transition `revision`; consumers merge by
//! recency, never by arrival order.

use crate::pixel::{
    MintRecord,
    PixelId,
    TokenRef,
    Wallet,
};
use chrono::{
    DateTime,
    Utc,
};
use serde::{
    Deserialize,
    Serialize,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridEvent {
    PixelClaimed(PixelClaimedEvent),
    PixelTransferred(PixelTransferredEvent),
    PixelMelted(PixelMeltedEvent),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelClaimedEvent {
    pub id: PixelId,
    pub revision: u64,
    pub owner: Wallet,
    pub claimed_at: DateTime<Utc>,
    pub mint: MintRecord,
    pub token_ref: TokenRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelTransferredEvent {
    pub id: PixelId,
    pub revision: u64,
    pub from: Wallet,
    pub to: Wallet,
    pub owned_since: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelMeltedEvent {
    pub id: PixelId,
    pub revision: u64,
    pub previous_owner: Wallet,
}

impl GridEvent {
    pub fn claimed(
        id: PixelId,
        revision: u64,
        owner: Wallet,
        claimed_at: DateTime<Utc>,
        mint: MintRecord,
        token_ref: TokenRef,
    ) -> Self {
        GridEvent::PixelClaimed(PixelClaimedEvent {
            id,
            revision,
            owner,
            claimed_at,
            mint,
            token_ref,
        })
    }

    pub fn transferred(
        id: PixelId,
        revision: u64,
        from: Wallet,
        to: Wallet,
        owned_since: DateTime<Utc>,
    ) -> Self {
        GridEvent::PixelTransferred(PixelTransferredEvent {
            id,
            revision,
            from,
            to,
            owned_since,
        })
    }

    pub fn melted(id: PixelId, revision: u64, previous_owner: Wallet) -> Self {
        GridEvent::PixelMelted(PixelMeltedEvent {
            id,
            revision,
            previous_owner,
        })
    }

    pub fn pixel_id(&self) -> PixelId {
        match self {
            GridEvent::PixelClaimed(ev) => ev.id,
            GridEvent::PixelTransferred(ev) => ev.id,
            GridEvent::PixelMelted(ev) => ev.id,
        }
    }

    pub fn revision(&self) -> u64 {
        match self {
            GridEvent::PixelClaimed(ev) => ev.revision,
            GridEvent::PixelTransferred(ev) => ev.revision,
            GridEvent::PixelMelted(ev) => ev.revision,
        }
    }
}
