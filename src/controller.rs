//! Claim / transfer / melt workflow.
//!
//! Every action follows the same two-phase shape: validate against the
//! local view, apply an optimistic provisional transition for immediate
//! feedback, submit to the authority, then reconcile — adopt the confirmed
//! record, or roll back and adopt whatever the authority reports instead.
//! A submission that times out is left marked unconfirmed; the next
//! snapshot or push event settles it, success is never assumed locally.

use crate::{
    Result,
    api::{
        QueryApi,
        SubmissionApi,
    },
    config::Config,
    error::GridError,
    pixel::{
        Ownership,
        Pixel,
        PixelId,
        Wallet,
    },
    store::PixelStore,
    tier::{
        ActionKind,
        fee_of,
    },
};
use chrono::Utc;
use std::time::Duration;
use tracing::error;

const ERROR_RING_CAPACITY: usize = 50;

/// A confirmed action: the authoritative record after the transition and
/// the fee it carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    pub pixel: Pixel,
    pub fee: u64,
}

pub struct GridController<A> {
    store: PixelStore,
    authority: A,
    config: Config,
    submit_timeout: Duration,
    status: String,
    errors: Vec<String>,
}

impl<A: SubmissionApi + QueryApi> GridController<A> {
    pub fn new(store: PixelStore, authority: A, config: Config) -> Self {
        let submit_timeout = config.sync.submit_timeout();
        Self {
            store,
            authority,
            config,
            submit_timeout,
            status: String::from("Ready"),
            errors: Vec::new(),
        }
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Most recent errors, newest first.
    pub fn recent_errors(&self) -> impl Iterator<Item = &str> {
        self.errors.iter().rev().map(String::as_str)
    }

    /// Claim an unclaimed pixel. Fee equals the tier price.
    pub async fn claim(
        &mut self,
        x: u16,
        y: u16,
        claimant: Wallet,
    ) -> Result<ActionOutcome> {
        if !self.config.grid.contains(x, y) {
            return Err(GridError::OutOfBounds {
                x,
                y,
                side: self.config.grid.side,
            });
        }
        let id = PixelId::new(x, y);
        let prior = self.store.get(id).ok_or(GridError::UnknownPixel(id))?;
        if let Some(owner) = prior.owner() {
            return Err(GridError::AlreadyClaimed {
                id,
                owner: owner.clone(),
            });
        }
        let fee = fee_of(ActionKind::Claim, prior.tier, &self.config.economy);

        let now = Utc::now();
        let mut provisional = prior.clone();
        provisional.ownership = Some(Ownership {
            owner: claimant.clone(),
            owned_since: now,
            claimed_at: now,
            token_ref: None,
        });
        self.store.apply_provisional(provisional);

        let submitted = {
            let submission = self.authority.submit_claim(x, y, claimant.clone(), None);
            tokio::time::timeout(self.submit_timeout, submission).await
        };
        match submitted {
            Ok(Ok(confirmed)) => {
                self.store.apply_update(confirmed.clone());
                self.status = format!(
                    "Claimed {} ({}) for {}",
                    id, confirmed.tier, fee
                );
                Ok(ActionOutcome {
                    pixel: confirmed,
                    fee,
                })
            }
            Ok(Err(err)) => self.reconcile_rejection(id, prior, err).await,
            Err(_) => self.note_timeout(id, "claim"),
        }
    }

    /// Transfer a pixel the caller owns. Flat fee, mint facts untouched.
    pub async fn transfer(
        &mut self,
        id: PixelId,
        from: Wallet,
        to: Wallet,
    ) -> Result<ActionOutcome> {
        let prior = self.store.get(id).ok_or(GridError::UnknownPixel(id))?;
        let ownership = prior
            .ownership
            .clone()
            .ok_or(GridError::NotClaimed(id))?;
        if ownership.owner != from {
            return Err(GridError::NotOwner { id, caller: from });
        }
        let fee = fee_of(ActionKind::Transfer, prior.tier, &self.config.economy);

        let mut provisional = prior.clone();
        provisional.ownership = Some(Ownership {
            owner: to.clone(),
            owned_since: Utc::now(),
            ..ownership
        });
        self.store.apply_provisional(provisional);

        let submitted = {
            let submission = self.authority.submit_transfer(id, from, to.clone());
            tokio::time::timeout(self.submit_timeout, submission).await
        };
        match submitted {
            Ok(Ok(confirmed)) => {
                self.store.apply_update(confirmed.clone());
                self.status = format!("Transferred {} to {} for {}", id, to, fee);
                Ok(ActionOutcome {
                    pixel: confirmed,
                    fee,
                })
            }
            Ok(Err(err)) => self.reconcile_rejection(id, prior, err).await,
            Err(_) => self.note_timeout(id, "transfer"),
        }
    }

    /// Melt a pixel back into the unclaimed pool. Flat fee; the pixel keeps
    /// its mint history and re-enters at its original tier and price.
    pub async fn melt(&mut self, id: PixelId, owner: Wallet) -> Result<ActionOutcome> {
        let prior = self.store.get(id).ok_or(GridError::UnknownPixel(id))?;
        let current = prior.owner().ok_or(GridError::NotClaimed(id))?;
        if *current != owner {
            return Err(GridError::NotOwner { id, caller: owner });
        }
        let fee = fee_of(ActionKind::Melt, prior.tier, &self.config.economy);

        let mut provisional = prior.clone();
        provisional.ownership = None;
        self.store.apply_provisional(provisional);

        let submitted = {
            let submission = self.authority.submit_melt(id, owner);
            tokio::time::timeout(self.submit_timeout, submission).await
        };
        match submitted {
            Ok(Ok(confirmed)) => {
                self.store.apply_update(confirmed.clone());
                self.status = format!("Melted {} for {}", id, fee);
                Ok(ActionOutcome {
                    pixel: confirmed,
                    fee,
                })
            }
            Ok(Err(err)) => self.reconcile_rejection(id, prior, err).await,
            Err(_) => self.note_timeout(id, "melt"),
        }
    }

    /// Roll the optimistic write back and, on a conflict, adopt whatever
    /// the authority currently reports for the pixel.
    async fn reconcile_rejection(
        &mut self,
        id: PixelId,
        prior: Pixel,
        err: GridError,
    ) -> Result<ActionOutcome> {
        self.store.revert_provisional(prior);
        if err.is_conflict() {
            match self.authority.fetch_pixel(id).await {
                Ok(actual) => {
                    self.store.apply_update(actual);
                }
                Err(fetch_err) => {
                    self.push_error(format!(
                        "refetch after rejection failed for {id}: {fetch_err}"
                    ));
                }
            }
        }
        self.status = format!("Rejected: {err}");
        self.push_error(format!("{id}: {err}"));
        Err(err)
    }

    /// Outcome unknown: keep the provisional record marked pending and let
    /// the next authoritative signal settle it.
    fn note_timeout(&mut self, id: PixelId, action: &str) -> Result<ActionOutcome> {
        let err = GridError::AuthorityTimeout(self.submit_timeout);
        self.status = format!("{action} of {id} unconfirmed; awaiting sync");
        self.push_error(format!("{id}: {err}"));
        Err(err)
    }

    fn push_error(&mut self, message: String) {
        error!("{}", message);
        self.errors.push(message);
        if self.errors.len() > ERROR_RING_CAPACITY {
            let drain = self.errors.len() - ERROR_RING_CAPACITY;
            self.errors.drain(0..drain);
        }
    }
}
