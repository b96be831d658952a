use crate::pixel::{
    PixelId,
    Wallet,
};
use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = GridError> = std::result::Result<T, E>;

/// Everything that can go wrong between this client and the authoritative
/// grid. Validation and conflict variants are terminal for the action that
/// raised them; transport and timeout variants are recovered by the next
/// sync cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("coordinates ({x}, {y}) are outside the {side}x{side} grid")]
    OutOfBounds { x: u16, y: u16, side: u16 },

    #[error("unknown pixel {0}")]
    UnknownPixel(PixelId),

    #[error("pixel {id} is already claimed by {owner}")]
    AlreadyClaimed { id: PixelId, owner: Wallet },

    #[error("pixel {0} is not claimed")]
    NotClaimed(PixelId),

    #[error("pixel {id} is not owned by {caller}")]
    NotOwner { id: PixelId, caller: Wallet },

    #[error("fee confirmation missing for pixel {0}")]
    FeeUnconfirmed(PixelId),

    #[error("authority gave no answer within {0:?}")]
    AuthorityTimeout(Duration),

    #[error("transport failure: {0}")]
    Transport(String),
}

impl GridError {
    /// Conflict errors mean the authority (or the local view of it) refused
    /// the action outright; the optimistic write must be rolled back and the
    /// authoritative record adopted.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            GridError::AlreadyClaimed { .. }
                | GridError::NotClaimed(_)
                | GridError::NotOwner { .. }
                | GridError::FeeUnconfirmed(_)
        )
    }

    /// Transient errors carry no verdict about the action itself; the
    /// outcome is unknown until a later snapshot or push event settles it.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GridError::Transport(_) | GridError::AuthorityTimeout(_)
        )
    }
}
