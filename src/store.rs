//! Client-side cache of the whole grid.
//!
//! The grid is small and bounded, so every pixel is materialized; there is
//! no partial or windowed loading. The store is the single shared mutable
//! resource of the client: all mutation goes through the merge/replace
//! operations here, and every mutation notifies subscribers with the set of
//! changed identities so downstream consumers can recompute incrementally.
//!
//! Merge discipline: targeted updates are applied only when their
//! authoritative `revision` is at least the stored one (idempotent, and
//! commutative for out-of-order arrivals); a full snapshot replaces
//! wholesale because it is authoritative-complete. Optimistic writes go
//! through the provisional path, which marks the pixel pending until any
//! authoritative write settles it.

use crate::{
    events::GridEvent,
    pixel::{
        Ownership,
        Pixel,
        PixelId,
    },
};
use std::{
    collections::{
        HashMap,
        HashSet,
    },
    sync::{
        Arc,
        Mutex,
    },
};
use tokio::sync::broadcast;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct PixelStore {
    inner: Arc<Mutex<StoreInner>>,
    changes: broadcast::Sender<Vec<PixelId>>,
}

struct StoreInner {
    pixels: HashMap<PixelId, Pixel>,
    pending: HashSet<PixelId>,
}

impl Default for PixelStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PixelStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                pixels: HashMap::new(),
                pending: HashSet::new(),
            })),
            changes,
        }
    }

    pub fn with_pixels(pixels: Vec<Pixel>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.lock().unwrap();
            inner.pixels = pixels.into_iter().map(|p| (p.id, p)).collect();
        }
        store
    }

    /// Subscribers receive the identities touched by each mutation. A
    /// receiver that lags past the channel capacity should resync from
    /// `get_all`.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<PixelId>> {
        self.changes.subscribe()
    }

    pub fn get(&self, id: PixelId) -> Option<Pixel> {
        self.inner.lock().unwrap().pixels.get(&id).cloned()
    }

    /// Snapshot of every record, in row-major order.
    pub fn get_all(&self) -> Vec<Pixel> {
        let inner = self.inner.lock().unwrap();
        let mut pixels: Vec<Pixel> = inner.pixels.values().cloned().collect();
        pixels.sort_by_key(|p| p.id);
        pixels
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_pending(&self, id: PixelId) -> bool {
        self.inner.lock().unwrap().pending.contains(&id)
    }

    /// Merge a full authoritative record. Returns whether it was applied;
    /// records older than the stored revision are dropped.
    pub fn apply_update(&self, pixel: Pixel) -> bool {
        let id = pixel.id;
        {
            let mut inner = self.inner.lock().unwrap();
            if let Some(existing) = inner.pixels.get(&id) {
                if existing.revision > pixel.revision {
                    return false;
                }
            }
            inner.pending.remove(&id);
            inner.pixels.insert(id, pixel);
        }
        self.notify(vec![id]);
        true
    }

    /// Merge the partial record carried by a push event, overwriting only
    /// the fields the event names. Advisory: an event for a pixel the store
    /// has never seen, or a transfer of a locally unclaimed pixel, is
    /// skipped (the caller refetches instead of trusting the payload).
    pub fn apply_event(&self, event: &GridEvent) -> bool {
        let id = event.pixel_id();
        {
            let mut inner = self.inner.lock().unwrap();
            let Some(pixel) = inner.pixels.get_mut(&id) else {
                return false;
            };
            if pixel.revision > event.revision() {
                return false;
            }
            match event {
                GridEvent::PixelClaimed(ev) => {
                    pixel.ownership = Some(Ownership {
                        owner: ev.owner.clone(),
                        owned_since: ev.claimed_at,
                        claimed_at: ev.claimed_at,
                        token_ref: Some(ev.token_ref.clone()),
                    });
                    // mint facts are write-once
                    if pixel.mint.is_none() {
                        pixel.mint = Some(ev.mint.clone());
                    }
                }
                GridEvent::PixelTransferred(ev) => {
                    let Some(ownership) = pixel.ownership.as_mut() else {
                        return false;
                    };
                    ownership.owner = ev.to.clone();
                    ownership.owned_since = ev.owned_since;
                }
                GridEvent::PixelMelted(_) => {
                    pixel.ownership = None;
                }
            }
            pixel.revision = event.revision();
            inner.pending.remove(&id);
        }
        self.notify(vec![id]);
        true
    }

    /// Replace the whole grid with an authoritative snapshot. Always wins
    /// over earlier targeted updates and clears every provisional marker;
    /// subscribers are told exactly which records differ.
    pub fn replace_all(&self, pixels: Vec<Pixel>) {
        let changed = {
            let mut inner = self.inner.lock().unwrap();
            let incoming: HashMap<PixelId, Pixel> =
                pixels.into_iter().map(|p| (p.id, p)).collect();
            let mut changed: Vec<PixelId> = incoming
                .values()
                .filter(|p| inner.pixels.get(&p.id) != Some(p))
                .map(|p| p.id)
                .collect();
            changed.sort();
            inner.pixels = incoming;
            inner.pending.clear();
            changed
        };
        if !changed.is_empty() {
            self.notify(changed);
        }
    }

    /// Optimistic write: records the provisional state and marks the pixel
    /// pending until an authoritative write settles it.
    pub fn apply_provisional(&self, pixel: Pixel) {
        let id = pixel.id;
        {
            let mut inner = self.inner.lock().unwrap();
            inner.pending.insert(id);
            inner.pixels.insert(id, pixel);
        }
        self.notify(vec![id]);
    }

    /// Roll an optimistic write back to the prior record. A no-op when an
    /// authoritative write already settled the pixel.
    pub fn revert_provisional(&self, prior: Pixel) -> bool {
        let id = prior.id;
        {
            let mut inner = self.inner.lock().unwrap();
            if !inner.pending.remove(&id) {
                return false;
            }
            inner.pixels.insert(id, prior);
        }
        self.notify(vec![id]);
        true
    }

    fn notify(&self, ids: Vec<PixelId>) {
        // no receivers is fine
        let _ = self.changes.send(ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        events::GridEvent,
        pixel::{
            MintRecord,
            TokenRef,
            Wallet,
        },
        tier::Tier,
    };
    use chrono::Utc;

    fn unclaimed(x: u16, y: u16) -> Pixel {
        Pixel::genesis(PixelId::new(x, y), Tier::Common, 1_000, Utc::now())
    }

    fn claimed(x: u16, y: u16, revision: u64, owner: &str) -> Pixel {
        let mut pixel = unclaimed(x, y);
        pixel.revision = revision;
        let now = Utc::now();
        pixel.ownership = Some(Ownership {
            owner: Wallet::from(owner),
            owned_since: now,
            claimed_at: now,
            token_ref: None,
        });
        pixel.mint = Some(MintRecord {
            minter: Wallet::from(owner),
            tier_sequence: 1,
            global_sequence: 1,
        });
        pixel
    }

    #[test]
    fn apply_update_is_idempotent() {
        let store = PixelStore::with_pixels(vec![unclaimed(1, 1)]);
        let update = claimed(1, 1, 3, "alice");

        assert!(store.apply_update(update.clone()));
        let once = store.get_all();
        assert!(store.apply_update(update));
        let twice = store.get_all();

        assert_eq!(once, twice);
    }

    #[test]
    fn stale_revision_is_dropped() {
        let store = PixelStore::with_pixels(vec![unclaimed(1, 1)]);
        assert!(store.apply_update(claimed(1, 1, 5, "alice")));

        // an older record arriving late must not win
        assert!(!store.apply_update(claimed(1, 1, 2, "bob")));
        assert_eq!(
            store.get(PixelId::new(1, 1)).unwrap().owner().unwrap().as_str(),
            "alice"
        );
    }

    #[test]
    fn out_of_order_merges_commute() {
        let newer = claimed(1, 1, 9, "alice");
        let older = claimed(1, 1, 4, "bob");

        let forward = PixelStore::with_pixels(vec![unclaimed(1, 1)]);
        forward.apply_update(older.clone());
        forward.apply_update(newer.clone());

        let backward = PixelStore::with_pixels(vec![unclaimed(1, 1)]);
        backward.apply_update(newer);
        backward.apply_update(older);

        assert_eq!(forward.get_all(), backward.get_all());
    }

    #[test]
    fn snapshot_overrides_targeted_update() {
        let store = PixelStore::with_pixels(vec![unclaimed(1, 1)]);
        store.apply_update(claimed(1, 1, 7, "alice"));

        // the snapshot is authoritative-complete even when a targeted
        // update carried a higher revision earlier
        store.replace_all(vec![unclaimed(1, 1)]);
        assert!(!store.get(PixelId::new(1, 1)).unwrap().claimed());
    }

    #[test]
    fn snapshot_clears_pending_markers() {
        let store = PixelStore::with_pixels(vec![unclaimed(1, 1)]);
        store.apply_provisional(claimed(1, 1, 0, "alice"));
        assert!(store.is_pending(PixelId::new(1, 1)));

        store.replace_all(vec![claimed(1, 1, 1, "alice")]);
        assert!(!store.is_pending(PixelId::new(1, 1)));
    }

    #[test]
    fn revert_is_a_noop_after_authoritative_write() {
        let prior = unclaimed(1, 1);
        let store = PixelStore::with_pixels(vec![prior.clone()]);
        store.apply_provisional(claimed(1, 1, 0, "alice"));
        store.apply_update(claimed(1, 1, 4, "bob"));

        assert!(!store.revert_provisional(prior));
        assert_eq!(
            store.get(PixelId::new(1, 1)).unwrap().owner().unwrap().as_str(),
            "bob"
        );
    }

    #[test]
    fn melt_event_clears_ownership_but_not_mint() {
        let store = PixelStore::with_pixels(vec![claimed(2, 2, 3, "alice")]);
        let event = GridEvent::melted(PixelId::new(2, 2), 4, Wallet::from("alice"));

        assert!(store.apply_event(&event));
        let pixel = store.get(PixelId::new(2, 2)).unwrap();
        assert!(!pixel.claimed());
        assert_eq!(pixel.minter().unwrap().as_str(), "alice");
        assert_eq!(pixel.revision, 4);
    }

    #[test]
    fn claim_event_does_not_rewrite_existing_mint() {
        let store = PixelStore::with_pixels(vec![claimed(2, 2, 3, "alice")]);
        // melt, then a re-claim event by another wallet
        store.apply_event(&GridEvent::melted(
            PixelId::new(2, 2),
            4,
            Wallet::from("alice"),
        ));
        let event = GridEvent::claimed(
            PixelId::new(2, 2),
            5,
            Wallet::from("bob"),
            Utc::now(),
            MintRecord {
                minter: Wallet::from("bob"),
                tier_sequence: 99,
                global_sequence: 99,
            },
            TokenRef {
                asset_id: "feed".into(),
                tx_ref: "tx".into(),
            },
        );

        assert!(store.apply_event(&event));
        let pixel = store.get(PixelId::new(2, 2)).unwrap();
        assert_eq!(pixel.owner().unwrap().as_str(), "bob");
        // original mint facts survive the re-claim
        assert_eq!(pixel.minter().unwrap().as_str(), "alice");
    }

    #[test]
    fn subscribers_see_changed_identities() {
        let untouched = unclaimed(1, 1);
        let store =
            PixelStore::with_pixels(vec![untouched.clone(), unclaimed(2, 1)]);
        let mut changes = store.subscribe();

        let update = claimed(2, 1, 1, "alice");
        store.apply_update(update.clone());
        assert_eq!(changes.try_recv().unwrap(), vec![PixelId::new(2, 1)]);

        // a snapshot identical to the current state notifies nothing
        store.replace_all(vec![untouched, update]);
        assert!(changes.try_recv().is_err());
    }
}
