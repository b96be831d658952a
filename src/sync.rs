//! Sync coordinator — merges poll snapshots and push events into one
//! refresh policy that keeps the store eventually consistent.
//!
//! Single cooperative select loop. The poll channel refreshes the whole
//! grid on a fixed cadence (skipping ticks while data is fresh); the push
//! channel coalesces event bursts into targeted refetches, which always run
//! regardless of freshness because events carry information the poll
//! cadence cannot anticipate. Push-channel loss suspends that side and
//! leaves polling as the sole source; recovery forces one reconciliation
//! snapshot to close the gap of missed events.

use crate::{
    api::{
        EventSource,
        QueryApi,
    },
    config::SyncConfig,
    error::GridError,
    events::GridEvent,
    pixel::PixelId,
    store::PixelStore,
};
use std::{
    collections::BTreeSet,
    time::Duration,
};
use tokio::{
    sync::watch,
    time::{
        self,
        Instant,
        MissedTickBehavior,
    },
};
use tracing::{
    debug,
    info,
    trace,
    warn,
};

/// Connectivity as seen by this client. `Degraded` only once both channels
/// have been failing longer than the configured grace period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Healthy,
    PushDown,
    Degraded,
}

pub struct SyncCoordinator<Q> {
    store: PixelStore,
    query: Q,
    config: SyncConfig,
    connectivity: watch::Sender<Connectivity>,

    pending: BTreeSet<PixelId>,
    burst_deadline: Option<Instant>,
    force_snapshot: bool,

    last_refresh: Option<Instant>,
    next_poll_allowed: Option<Instant>,
    poll_failures: u32,
    poll_failed_since: Option<Instant>,

    push_healthy: bool,
    push_failures: u32,
    push_failed_since: Option<Instant>,
    push_retry_at: Option<Instant>,
}

impl<Q: QueryApi> SyncCoordinator<Q> {
    pub fn new(store: PixelStore, query: Q, config: SyncConfig) -> Self {
        let (connectivity, _) = watch::channel(Connectivity::Healthy);
        Self {
            store,
            query,
            config,
            connectivity,
            pending: BTreeSet::new(),
            burst_deadline: None,
            force_snapshot: false,
            last_refresh: None,
            next_poll_allowed: None,
            poll_failures: 0,
            poll_failed_since: None,
            push_healthy: true,
            push_failures: 0,
            push_failed_since: None,
            push_retry_at: None,
        }
    }

    /// Watch handle for the degraded-connectivity surface.
    pub fn connectivity(&self) -> watch::Receiver<Connectivity> {
        self.connectivity.subscribe()
    }

    /// Drive the loop until `shutdown` resolves. The event source is a run
    /// parameter so its pending future never borrows the coordinator.
    pub async fn run<E, F>(mut self, mut events: E, shutdown: F)
    where
        E: EventSource,
        F: Future,
    {
        tokio::pin!(shutdown);
        let mut poll = time::interval(self.config.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let burst_at = self.burst_deadline;
            let retry_at = self.push_retry_at;
            tokio::select! {
                _ = &mut shutdown => {
                    info!("sync loop shutting down");
                    break;
                }
                _ = poll.tick() => {
                    self.on_poll_tick().await;
                }
                event = events.next_event(), if retry_at.is_none() => {
                    match event {
                        Ok(event) => self.note_push_event(event),
                        Err(error) => self.on_push_error(error),
                    }
                }
                _ = sleep_until(burst_at), if burst_at.is_some() => {
                    self.burst_deadline = None;
                    if self.force_snapshot {
                        self.refresh_snapshot().await;
                    } else {
                        self.flush_pending().await;
                    }
                }
                _ = sleep_until(retry_at), if retry_at.is_some() => {
                    // backoff elapsed; the next iteration polls the push
                    // channel again
                    self.push_retry_at = None;
                }
            }
        }
    }

    async fn on_poll_tick(&mut self) {
        self.publish_connectivity();
        if let Some(allowed) = self.next_poll_allowed {
            if Instant::now() < allowed {
                return;
            }
        }
        if !self.is_stale() {
            trace!("poll tick skipped; data within stale window");
            return;
        }
        self.refresh_snapshot().await;
    }

    fn is_stale(&self) -> bool {
        self.last_refresh
            .is_none_or(|at| at.elapsed() >= self.config.stale_window())
    }

    /// Record a push event. The refetch itself is deferred to the end of
    /// the coalescing window so a burst collapses into one batch.
    fn note_push_event(&mut self, event: GridEvent) {
        if !self.push_healthy {
            info!("push channel recovered; forcing reconciliation snapshot");
            self.push_healthy = true;
            self.push_failures = 0;
            self.push_failed_since = None;
            self.force_snapshot = true;
            self.publish_connectivity();
        }
        trace!(id = %event.pixel_id(), revision = event.revision(), "push event");
        self.pending.insert(event.pixel_id());
        // window opens at the first event of a burst
        self.burst_deadline
            .get_or_insert_with(|| Instant::now() + self.config.coalesce_window());
    }

    /// One targeted refetch burst; at most one in flight. Ids noted while
    /// the burst runs merge into the next one instead of queueing.
    async fn flush_pending(&mut self) {
        let mut refreshed = 0usize;
        while let Some(id) = self.pending.pop_first() {
            match self.query.fetch_pixel(id).await {
                Ok(pixel) => {
                    self.store.apply_update(pixel);
                    refreshed += 1;
                }
                Err(error) => {
                    // leave the rest to the next snapshot
                    self.pending.insert(id);
                    self.mark_poll_failed(error);
                    return;
                }
            }
        }
        debug!(refreshed, "targeted refetch burst complete");
        self.last_refresh = Some(Instant::now());
        self.mark_poll_ok();
    }

    async fn refresh_snapshot(&mut self) {
        match self.query.fetch_pixels().await {
            Ok(pixels) => {
                debug!(pixels = pixels.len(), "applied authoritative snapshot");
                self.store.replace_all(pixels);
                // the snapshot covers every pending id
                self.pending.clear();
                self.force_snapshot = false;
                self.last_refresh = Some(Instant::now());
                self.mark_poll_ok();
            }
            Err(error) => self.mark_poll_failed(error),
        }
    }

    fn mark_poll_ok(&mut self) {
        self.poll_failures = 0;
        self.poll_failed_since = None;
        self.next_poll_allowed = None;
        self.publish_connectivity();
    }

    fn mark_poll_failed(&mut self, error: GridError) {
        self.poll_failures += 1;
        self.poll_failed_since.get_or_insert_with(Instant::now);
        let delay = self.backoff(self.poll_failures);
        self.next_poll_allowed = Some(Instant::now() + delay);
        warn!(%error, failures = self.poll_failures, ?delay, "query fetch failed; backing off");
        self.publish_connectivity();
    }

    fn on_push_error(&mut self, error: GridError) {
        if self.push_healthy {
            warn!(%error, "push channel lost; polling is the sole source until it recovers");
        } else {
            debug!(%error, "push channel still down");
        }
        self.push_healthy = false;
        self.push_failures += 1;
        self.push_failed_since.get_or_insert_with(Instant::now);
        self.push_retry_at = Some(Instant::now() + self.backoff(self.push_failures));
        self.publish_connectivity();
    }

    fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        let delay = self
            .config
            .retry_backoff()
            .saturating_mul(2u32.saturating_pow(exponent));
        delay.min(self.config.max_backoff())
    }

    fn publish_connectivity(&self) {
        let grace = self.config.grace_period();
        let exceeded =
            |since: Option<Instant>| since.is_some_and(|at| at.elapsed() >= grace);
        let state = if !self.push_healthy
            && exceeded(self.push_failed_since)
            && exceeded(self.poll_failed_since)
        {
            Connectivity::Degraded
        } else if !self.push_healthy {
            Connectivity::PushDown
        } else {
            Connectivity::Healthy
        };
        self.connectivity.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }
}

/// `tokio::time::sleep_until` over an optional deadline; the caller gates
/// the select arm on `is_some`, so the fallback instant is never awaited.
async fn sleep_until(deadline: Option<Instant>) {
    time::sleep_until(deadline.unwrap_or_else(Instant::now)).await
}
