//! Shared fixtures for the integration tests (and anything else that wants
//! a fully wired local grid).

use crate::{
    Result,
    api::{
        EventSource,
        QueryApi,
        SubmissionApi,
    },
    config::Config,
    controller::GridController,
    error::GridError,
    events::GridEvent,
    local::LocalAuthority,
    pixel::{
        Pixel,
        PixelId,
        Wallet,
    },
    stats::CanvasStats,
    store::PixelStore,
};
use std::{
    future::pending,
    sync::{
        Arc,
        atomic::{
            AtomicBool,
            AtomicUsize,
            Ordering,
        },
    },
};
use tokio::sync::mpsc;

pub struct TestContext {
    pub config: Config,
    pub authority: LocalAuthority,
    pub store: PixelStore,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let authority =
            LocalAuthority::new(config.grid.clone(), config.economy.clone());
        let store = PixelStore::with_pixels(authority.pixels());
        Self {
            config,
            authority,
            store,
        }
    }

    pub fn controller(&self) -> GridController<LocalAuthority> {
        GridController::new(
            self.store.clone(),
            self.authority.clone(),
            self.config.clone(),
        )
    }

    pub fn alice(&self) -> Wallet {
        Wallet::from("alice")
    }

    pub fn bob(&self) -> Wallet {
        Wallet::from("bob")
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Query port that counts calls and can be scripted to fail, wrapping the
/// local authority.
#[derive(Clone)]
pub struct CountingQueryApi {
    inner: LocalAuthority,
    snapshot_calls: Arc<AtomicUsize>,
    pixel_calls: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl CountingQueryApi {
    pub fn new(inner: LocalAuthority) -> Self {
        Self {
            inner,
            snapshot_calls: Arc::new(AtomicUsize::new(0)),
            pixel_calls: Arc::new(AtomicUsize::new(0)),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn snapshot_calls(&self) -> usize {
        self.snapshot_calls.load(Ordering::SeqCst)
    }

    pub fn pixel_calls(&self) -> usize {
        self.pixel_calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(GridError::Transport("query api offline".into()))
        } else {
            Ok(())
        }
    }
}

impl QueryApi for CountingQueryApi {
    async fn fetch_pixels(&mut self) -> Result<Vec<Pixel>> {
        self.check()?;
        self.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.inner.pixels())
    }

    async fn fetch_pixel(&mut self, id: PixelId) -> Result<Pixel> {
        self.check()?;
        self.pixel_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.pixel(id)
    }

    async fn fetch_stats(&mut self) -> Result<CanvasStats> {
        self.check()?;
        Ok(self.inner.stats())
    }
}

/// Authority whose submissions never resolve, for exercising the
/// unknown-outcome timeout path; reads pass through.
#[derive(Clone)]
pub struct StalledAuthority {
    pub inner: LocalAuthority,
}

impl SubmissionApi for StalledAuthority {
    async fn submit_claim(
        &mut self,
        _x: u16,
        _y: u16,
        _claimant: Wallet,
        _tx_ref: Option<String>,
    ) -> Result<Pixel> {
        pending().await
    }

    async fn submit_transfer(
        &mut self,
        _id: PixelId,
        _from: Wallet,
        _to: Wallet,
    ) -> Result<Pixel> {
        pending().await
    }

    async fn submit_melt(&mut self, _id: PixelId, _owner: Wallet) -> Result<Pixel> {
        pending().await
    }
}

impl QueryApi for StalledAuthority {
    async fn fetch_pixels(&mut self) -> Result<Vec<Pixel>> {
        Ok(self.inner.pixels())
    }

    async fn fetch_pixel(&mut self, id: PixelId) -> Result<Pixel> {
        self.inner.pixel(id)
    }

    async fn fetch_stats(&mut self) -> Result<CanvasStats> {
        Ok(self.inner.stats())
    }
}

/// Event source fed by hand from a test body.
pub struct ScriptedEventSource {
    recv: mpsc::Receiver<Result<GridEvent>>,
}

impl ScriptedEventSource {
    pub fn new_with_sender() -> (Self, mpsc::Sender<Result<GridEvent>>) {
        let (send, recv) = mpsc::channel(16);
        (Self { recv }, send)
    }
}

impl EventSource for ScriptedEventSource {
    async fn next_event(&mut self) -> Result<GridEvent> {
        match self.recv.recv().await {
            Some(event) => event,
            None => Err(GridError::Transport("no more scripted events".into())),
        }
    }
}
