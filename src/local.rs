//! In-process authoritative grid.
//!
//! Stands in for the live authority: the demo binary and the test suite
//! wire the engine's ports straight into this implementation instead of a
//! network transport. It enforces the real conflict semantics (first
//! writer wins, monotonic mint sequences, revision stamping) and
//! broadcasts typed events with at-least-once semantics.

use crate::{
    Result,
    api::{
        EventSource,
        QueryApi,
        SubmissionApi,
    },
    config::{
        EconomyConfig,
        GridConfig,
    },
    error::GridError,
    events::GridEvent,
    pixel::{
        MintRecord,
        Ownership,
        Pixel,
        PixelId,
        TokenRef,
        Wallet,
        token_asset_id,
    },
    stats::{
        CanvasStats,
        StatsAggregator,
    },
    tier::{
        price_of,
        tier_of,
    },
};
use chrono::Utc;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex,
        atomic::{
            AtomicBool,
            Ordering,
        },
    },
};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct LocalAuthority {
    inner: Arc<Mutex<AuthorityInner>>,
    events: broadcast::Sender<GridEvent>,
    feed_down: Arc<AtomicBool>,
    aggregator: Arc<StatsAggregator>,
}

struct AuthorityInner {
    grid: GridConfig,
    pixels: HashMap<PixelId, Pixel>,
    tier_sequences: [u64; 4],
    global_sequence: u64,
    next_tx: u64,
    confirm_fees: bool,
}

impl LocalAuthority {
    pub fn new(grid: GridConfig, economy: EconomyConfig) -> Self {
        let created_at = Utc::now();
        let mut pixels = HashMap::with_capacity(grid.total_pixels() as usize);
        for y in 0..grid.side {
            for x in 0..grid.side {
                let id = PixelId::new(x, y);
                let tier = tier_of(x, y, &grid);
                pixels.insert(
                    id,
                    Pixel::genesis(id, tier, price_of(tier, &economy), created_at),
                );
            }
        }
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let aggregator = Arc::new(StatsAggregator::new(&grid));
        Self {
            inner: Arc::new(Mutex::new(AuthorityInner {
                grid,
                pixels,
                tier_sequences: [0; 4],
                global_sequence: 0,
                next_tx: 0,
                confirm_fees: true,
            })),
            events,
            feed_down: Arc::new(AtomicBool::new(false)),
            aggregator,
        }
    }

    /// Scripting knob: while false, every submission is rejected with a
    /// missing fee confirmation.
    pub fn set_fee_confirmation(&self, confirmed: bool) {
        self.inner.lock().unwrap().confirm_fees = confirmed;
    }

    /// Scripting knob: while down, subscribed feeds error instead of
    /// delivering, and events emitted meanwhile are lost to them.
    pub fn set_feed_down(&self, down: bool) {
        self.feed_down.store(down, Ordering::SeqCst);
    }

    pub fn subscribe_events(&self) -> LocalEventFeed {
        LocalEventFeed {
            sender: self.events.clone(),
            recv: self.events.subscribe(),
            down: Arc::clone(&self.feed_down),
        }
    }

    pub fn pixel(&self, id: PixelId) -> Result<Pixel> {
        self.inner
            .lock()
            .unwrap()
            .pixels
            .get(&id)
            .cloned()
            .ok_or(GridError::UnknownPixel(id))
    }

    pub fn pixels(&self) -> Vec<Pixel> {
        let inner = self.inner.lock().unwrap();
        let mut pixels: Vec<Pixel> = inner.pixels.values().cloned().collect();
        pixels.sort_by_key(|p| p.id);
        pixels
    }

    pub fn stats(&self) -> CanvasStats {
        self.aggregator.compute(&self.pixels())
    }

    /// Authoritative claim. First writer wins; a loser gets the winner back
    /// in the rejection.
    pub fn claim(
        &self,
        x: u16,
        y: u16,
        claimant: &Wallet,
        tx_ref: Option<String>,
    ) -> Result<Pixel> {
        let (pixel, event) = {
            let mut inner = self.inner.lock().unwrap();
            if !inner.grid.contains(x, y) {
                return Err(GridError::OutOfBounds {
                    x,
                    y,
                    side: inner.grid.side,
                });
            }
            let id = PixelId::new(x, y);
            if !inner.confirm_fees {
                return Err(GridError::FeeUnconfirmed(id));
            }
            let mut pixel = inner
                .pixels
                .get(&id)
                .cloned()
                .ok_or(GridError::UnknownPixel(id))?;
            if let Some(owner) = pixel.owner() {
                return Err(GridError::AlreadyClaimed {
                    id,
                    owner: owner.clone(),
                });
            }

            let now = Utc::now();
            let mint = match pixel.mint.clone() {
                // re-claim after a melt: the original mint facts stand
                Some(mint) => mint,
                None => {
                    inner.tier_sequences[pixel.tier.index()] += 1;
                    inner.global_sequence += 1;
                    let mint = MintRecord {
                        minter: claimant.clone(),
                        tier_sequence: inner.tier_sequences[pixel.tier.index()],
                        global_sequence: inner.global_sequence,
                    };
                    pixel.mint = Some(mint.clone());
                    mint
                }
            };
            inner.next_tx += 1;
            let token_ref = TokenRef {
                asset_id: token_asset_id(id, mint.global_sequence),
                tx_ref: tx_ref.unwrap_or_else(|| format!("sim-tx-{}", inner.next_tx)),
            };
            pixel.revision += 1;
            pixel.ownership = Some(Ownership {
                owner: claimant.clone(),
                owned_since: now,
                claimed_at: now,
                token_ref: Some(token_ref.clone()),
            });
            inner.pixels.insert(id, pixel.clone());
            let event = GridEvent::claimed(
                id,
                pixel.revision,
                claimant.clone(),
                now,
                mint,
                token_ref,
            );
            (pixel, event)
        };
        self.publish(event);
        Ok(pixel)
    }

    pub fn transfer(&self, id: PixelId, from: &Wallet, to: &Wallet) -> Result<Pixel> {
        let (pixel, event) = {
            let mut inner = self.inner.lock().unwrap();
            if !inner.confirm_fees {
                return Err(GridError::FeeUnconfirmed(id));
            }
            let mut pixel = inner
                .pixels
                .get(&id)
                .cloned()
                .ok_or(GridError::UnknownPixel(id))?;
            let ownership =
                pixel.ownership.as_mut().ok_or(GridError::NotClaimed(id))?;
            if ownership.owner != *from {
                return Err(GridError::NotOwner {
                    id,
                    caller: from.clone(),
                });
            }
            let now = Utc::now();
            ownership.owner = to.clone();
            ownership.owned_since = now;
            pixel.revision += 1;
            inner.pixels.insert(id, pixel.clone());
            let event =
                GridEvent::transferred(id, pixel.revision, from.clone(), to.clone(), now);
            (pixel, event)
        };
        self.publish(event);
        Ok(pixel)
    }

    pub fn melt(&self, id: PixelId, owner: &Wallet) -> Result<Pixel> {
        let (pixel, event) = {
            let mut inner = self.inner.lock().unwrap();
            if !inner.confirm_fees {
                return Err(GridError::FeeUnconfirmed(id));
            }
            let mut pixel = inner
                .pixels
                .get(&id)
                .cloned()
                .ok_or(GridError::UnknownPixel(id))?;
            let current = pixel.owner().ok_or(GridError::NotClaimed(id))?;
            if current != owner {
                return Err(GridError::NotOwner {
                    id,
                    caller: owner.clone(),
                });
            }
            // back to the unclaimed pool; mint facts stay
            pixel.revision += 1;
            pixel.ownership = None;
            inner.pixels.insert(id, pixel.clone());
            let event = GridEvent::melted(id, pixel.revision, owner.clone());
            (pixel, event)
        };
        self.publish(event);
        Ok(pixel)
    }

    fn publish(&self, event: GridEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

impl QueryApi for LocalAuthority {
    async fn fetch_pixels(&mut self) -> Result<Vec<Pixel>> {
        Ok(self.pixels())
    }

    async fn fetch_pixel(&mut self, id: PixelId) -> Result<Pixel> {
        self.pixel(id)
    }

    async fn fetch_stats(&mut self) -> Result<CanvasStats> {
        Ok(self.stats())
    }
}

impl SubmissionApi for LocalAuthority {
    async fn submit_claim(
        &mut self,
        x: u16,
        y: u16,
        claimant: Wallet,
        tx_ref: Option<String>,
    ) -> Result<Pixel> {
        self.claim(x, y, &claimant, tx_ref)
    }

    async fn submit_transfer(
        &mut self,
        id: PixelId,
        from: Wallet,
        to: Wallet,
    ) -> Result<Pixel> {
        self.transfer(id, &from, &to)
    }

    async fn submit_melt(&mut self, id: PixelId, owner: Wallet) -> Result<Pixel> {
        self.melt(id, &owner)
    }
}

/// Push-channel handle onto a [`LocalAuthority`]. While the authority's
/// feed is scripted down, every poll errors and the subscription is
/// re-created, so events emitted during the outage are genuinely missed —
/// exactly the gap the coordinator's reconciliation refetch must close.
pub struct LocalEventFeed {
    sender: broadcast::Sender<GridEvent>,
    recv: broadcast::Receiver<GridEvent>,
    down: Arc<AtomicBool>,
}

impl LocalEventFeed {
    /// Drops the current subscription while down, so events emitted during
    /// the outage never reach this feed.
    fn offline(&mut self) -> bool {
        if self.down.load(Ordering::SeqCst) {
            self.recv = self.sender.subscribe();
            return true;
        }
        false
    }
}

impl EventSource for LocalEventFeed {
    async fn next_event(&mut self) -> Result<GridEvent> {
        if self.offline() {
            return Err(GridError::Transport("event feed offline".into()));
        }
        match self.recv.recv().await {
            Ok(event) => {
                // the outage may have started while the receive was in flight
                if self.offline() {
                    return Err(GridError::Transport("event feed offline".into()));
                }
                Ok(event)
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => Err(GridError::Transport(
                format!("event feed lagged; {missed} events dropped"),
            )),
            Err(broadcast::error::RecvError::Closed) => {
                Err(GridError::Transport("event feed closed".into()))
            }
        }
    }
}
