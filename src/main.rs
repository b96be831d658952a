//! Headless demo: runs the sync engine against an in-process authority
//! while a churn task plays the part of rival clients.

use color_eyre::eyre::{
    Result,
    eyre,
};
use mintgrid::{
    Config,
    GridController,
    LocalAuthority,
    PixelId,
    PixelStore,
    StatsAggregator,
    SyncCoordinator,
    Wallet,
    config::GridConfig,
};
use std::{
    sync::OnceLock,
    time::Duration,
};
use tokio::time;
use tracing::{
    debug,
    info,
    warn,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn init_tracing(log_to_file: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_to_file {
        let (writer, guard) =
            tracing_appender::non_blocking(rolling::daily("logs", "mintgrid.log"));
        let _ = LOG_GUARD.set(guard);
        fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
    } else {
        fmt().with_env_filter(filter).init();
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args: Vec<String> = std::env::args().collect();
    let log_to_file = args.iter().any(|arg| arg == "--log-file");
    let config = match args.iter().position(|arg| arg == "--config") {
        Some(index) => {
            let path = args
                .get(index + 1)
                .ok_or_else(|| eyre!("--config needs a path"))?;
            Config::load(path)?
        }
        None => Config::default(),
    };
    init_tracing(log_to_file);

    let authority = LocalAuthority::new(config.grid.clone(), config.economy.clone());
    let store = PixelStore::with_pixels(authority.pixels());
    let coordinator =
        SyncCoordinator::new(store.clone(), authority.clone(), config.sync.clone());
    let mut connectivity = coordinator.connectivity();
    let events = authority.subscribe_events();

    tokio::spawn(churn(authority.clone(), config.grid.clone()));
    tokio::spawn(report(store.clone(), config.grid.clone()));
    tokio::spawn(demo_player(store.clone(), authority.clone(), config.clone()));
    tokio::spawn(async move {
        while connectivity.changed().await.is_ok() {
            let state = *connectivity.borrow();
            info!(?state, "connectivity changed");
        }
    });

    info!(
        side = config.grid.side,
        pixels = config.grid.total_pixels(),
        "mintgrid demo running; ctrl-c to exit"
    );
    coordinator
        .run(events, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    Ok(())
}

/// Rival clients: every tick, one of a fixed roster claims, transfers, or
/// melts a random pixel directly against the authority, so the coordinator
/// has real races and push traffic to reconcile.
async fn churn(authority: LocalAuthority, grid: GridConfig) {
    const ROSTER: [&str; 6] = ["ada", "grace", "linus", "margaret", "dennis", "barbara"];
    let mut ticker = time::interval(Duration::from_millis(400));
    loop {
        ticker.tick().await;
        let wallet = Wallet::from(ROSTER[rand::random_range(0..ROSTER.len())]);
        let x = rand::random_range(0..grid.side);
        let y = rand::random_range(0..grid.side);
        let id = PixelId::new(x, y);
        let result = match authority.pixel(id) {
            Err(err) => Err(err),
            Ok(pixel) => match pixel.owner().cloned() {
                None => authority.claim(x, y, &wallet, None).map(|_| "claim"),
                Some(owner) if rand::random_bool(0.5) => authority
                    .transfer(id, &owner, &wallet)
                    .map(|_| "transfer"),
                Some(owner) => authority.melt(id, &owner).map(|_| "melt"),
            },
        };
        match result {
            Ok(action) => debug!(%id, %wallet, action, "rival action"),
            Err(err) => debug!(%id, %err, "rival action rejected"),
        }
    }
}

/// Periodic canvas report derived from the client-side store.
async fn report(store: PixelStore, grid: GridConfig) {
    let aggregator = StatsAggregator::new(&grid);
    let mut ticker = time::interval(Duration::from_secs(5));
    loop {
        ticker.tick().await;
        let stats = aggregator.compute(&store.get_all());
        info!(
            claimed = stats.claimed_pixels,
            remaining = stats.remaining_pixels,
            value_locked = stats.total_value_locked,
            owners = stats.active_owners,
            "canvas"
        );
    }
}

/// A scripted local player exercising the optimistic claim workflow; its
/// claims race against the churn task and lose from time to time.
async fn demo_player(store: PixelStore, authority: LocalAuthority, config: Config) {
    time::sleep(Duration::from_secs(1)).await;
    let mut controller = GridController::new(store, authority, config.clone());
    let me = Wallet::from("demo");
    let (cx, cy) = config.grid.center();

    for offset in 0..4u16 {
        match controller.claim(cx + offset, cy, me.clone()).await {
            Ok(outcome) => {
                info!(pixel = %outcome.pixel.id, fee = outcome.fee, "demo claim confirmed");
            }
            Err(err) => warn!(%err, "demo claim rejected"),
        }
        time::sleep(Duration::from_secs(2)).await;
    }

    if let Err(err) = controller
        .transfer(PixelId::new(cx + 1, cy), me.clone(), Wallet::from("ada"))
        .await
    {
        warn!(%err, "demo transfer rejected");
    }
    if let Err(err) = controller.melt(PixelId::new(cx + 2, cy), me.clone()).await {
        warn!(%err, "demo melt rejected");
    }
}
