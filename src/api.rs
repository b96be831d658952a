//! Port traits for the three channels to the authoritative grid.
//!
//! The engine is generic over these seams: the demo binary and the test
//! suite plug in the in-process [`crate::local::LocalAuthority`], a real
//! deployment plugs in network-backed implementations.

use crate::{
    Result,
    events::GridEvent,
    pixel::{
        Pixel,
        PixelId,
        Wallet,
    },
    stats::CanvasStats,
};

/// Poll-channel reads. Snapshots are authoritative-complete; single-record
/// fetches are used for push-triggered targeted refreshes.
pub trait QueryApi {
    /// Full snapshot of every pixel.
    fn fetch_pixels(&mut self) -> impl Future<Output = Result<Vec<Pixel>>>;

    /// Current authoritative record for one pixel.
    fn fetch_pixel(&mut self, id: PixelId) -> impl Future<Output = Result<Pixel>>;

    /// Server-side aggregates, for cross-checking locally derived stats.
    fn fetch_stats(&mut self) -> impl Future<Output = Result<CanvasStats>>;
}

/// Push channel. Errors mean lost connectivity; the caller falls back to
/// polling and reconciles once the channel yields events again.
pub trait EventSource {
    fn next_event(&mut self) -> impl Future<Output = Result<GridEvent>>;
}

/// Write channel. Every call returns the updated authoritative record or a
/// typed rejection; the authority is the sole arbiter of races.
pub trait SubmissionApi {
    fn submit_claim(
        &mut self,
        x: u16,
        y: u16,
        claimant: Wallet,
        tx_ref: Option<String>,
    ) -> impl Future<Output = Result<Pixel>>;

    fn submit_transfer(
        &mut self,
        id: PixelId,
        from: Wallet,
        to: Wallet,
    ) -> impl Future<Output = Result<Pixel>>;

    fn submit_melt(
        &mut self,
        id: PixelId,
        owner: Wallet,
    ) -> impl Future<Output = Result<Pixel>>;
}
