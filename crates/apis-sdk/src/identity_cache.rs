//! Who-am-i deduplication
//!
//! Concurrent lookups share one in-flight fetch, and a resolved identity is
//! reused for a short window. Failed lookups are not cached.

use crate::types::WhoAmI;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

type SharedFetch = Shared<BoxFuture<'static, Option<WhoAmI>>>;

enum Slot {
    Empty,
    InFlight(SharedFetch),
    Ready { value: WhoAmI, resolved_at: Instant },
}

/// In-flight and short-lived identity cache
pub struct IdentityCache {
    ttl: Duration,
    slot: Mutex<Slot>,
    generation: AtomicU64,
}

impl std::fmt::Debug for IdentityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.slot.lock() {
            Slot::Empty => "empty",
            Slot::InFlight(_) => "in-flight",
            Slot::Ready { .. } => "ready",
        };
        f.debug_struct("IdentityCache")
            .field("ttl", &self.ttl)
            .field("state", &state)
            .finish()
    }
}

impl IdentityCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(Slot::Empty),
            generation: AtomicU64::new(0),
        }
    }

    /// Cached identity, or the result of the shared fetch. `fetch` is only
    /// called when nothing is cached or in flight.
    pub async fn get_or_fetch<F>(&self, fetch: F) -> Option<WhoAmI>
    where
        F: FnOnce() -> BoxFuture<'static, Option<WhoAmI>>,
    {
        let (shared, generation) = {
            let mut slot = self.slot.lock();
            let generation = self.generation.load(Ordering::SeqCst);
            let existing = match &*slot {
                Slot::Ready { value, resolved_at } if resolved_at.elapsed() < self.ttl => {
                    return Some(value.clone());
                }
                Slot::InFlight(shared) => Some(shared.clone()),
                _ => None,
            };

            match existing {
                Some(shared) => {
                    debug!("Joining in-flight identity lookup");
                    (shared, generation)
                }
                None => {
                    let shared = fetch().shared();
                    *slot = Slot::InFlight(shared.clone());
                    (shared, generation)
                }
            }
        };

        let result = shared.clone().await;
        self.settle(&shared, generation, &result);
        result
    }

    /// Move a finished fetch out of the in-flight slot. Any caller that
    /// awaited it may do this, so a dropped starter cannot leave the slot
    /// stuck on a completed fetch.
    fn settle(&self, shared: &SharedFetch, generation: u64, result: &Option<WhoAmI>) {
        let mut slot = self.slot.lock();
        let still_current = self.generation.load(Ordering::SeqCst) == generation
            && matches!(&*slot, Slot::InFlight(current) if current.ptr_eq(shared));
        if still_current {
            *slot = match result {
                Some(value) => Slot::Ready {
                    value: value.clone(),
                    resolved_at: Instant::now(),
                },
                None => Slot::Empty,
            };
        }
    }

    /// Drop the cached identity. A fetch already in flight will not
    /// repopulate the cache.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.slot.lock() = Slot::Empty;
    }
}
