//! Loop-suppression cache for flood searches.
//!
//! Entries are keyed by (target identity, claimed address). A request that
//! matches a live entry is a loop and must not propagate again, but its
//! timestamp is refreshed. Entries go stale after a fixed window; stale
//! slots are reused before the cache grows. Beyond stale-slot reuse the
//! cache is unbounded — sized by traffic, a recorded open design gap.

use std::net::SocketAddr;

use lattice_types::PeerId;

/// Seconds a cache entry stays live (suppressing re-propagation).
pub const SEARCH_WINDOW_SECS: u64 = 30;

struct Entry {
    target: PeerId,
    addr: SocketAddr,
    last_seen: u64,
}

/// Cache of recently seen flood-search requests.
#[derive(Default)]
pub struct SearchCache {
    entries: Vec<Entry>,
}

impl SearchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether (target, addr) was seen within the window, recording
    /// it either way.
    ///
    /// Returns `true` when a live entry already existed — the request is a
    /// loop and must be dropped (its timestamp is refreshed). Returns
    /// `false` when the request is new or its previous sighting had gone
    /// stale; the entry is (re)recorded, overwriting the oldest stale slot
    /// before growing the cache.
    pub fn check_and_record(&mut self, target: &PeerId, addr: SocketAddr, now: u64) -> bool {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.target == *target && e.addr == addr)
        {
            let live = now.saturating_sub(entry.last_seen) < SEARCH_WINDOW_SECS;
            entry.last_seen = now;
            return live;
        }

        let entry = Entry {
            target: *target,
            addr,
            last_seen: now,
        };
        let stale_slot = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| now.saturating_sub(e.last_seen) >= SEARCH_WINDOW_SECS)
            .min_by_key(|(_, e)| e.last_seen)
            .map(|(i, _)| i);
        match stale_slot {
            Some(i) => self.entries[i] = entry,
            None => self.entries.push(entry),
        }
        false
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
