use crate::episode::Episode;
use crate::erb::ReplayBuffer;
use crate::select;
use crate::storage::IndexRecord;
use crate::store::EpisodeStore;
use crate::telemetry::TagMask;

/// A read-only snapshot of the episode store.
///
/// Observers cannot finalize or evict episodes. Snapshotting allocates and is
/// meant for inspection tooling between control cycles.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub persistent: bool,
    /// `None` once the store has run out of ids.
    pub next_id: Option<u32>,
    pub cached: usize,
    pub capacity: usize,
    /// Summaries of every known episode, oldest first.
    pub episodes: Vec<IndexRecord>,
}

pub struct StoreAdapter<'a, const N: usize> {
    store: &'a EpisodeStore<N>,
}

impl<'a, const N: usize> StoreAdapter<'a, N> {
    pub fn new(store: &'a EpisodeStore<N>) -> Self {
        Self { store }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            persistent: self.store.is_persistent(),
            next_id: self.store.next_id(),
            cached: self.store.len(),
            capacity: self.store.capacity(),
            episodes: select::store_records(self.store),
        }
    }

    pub fn episode(&self, id: u32) -> Option<Episode> {
        self.store.get_by_id(id)
    }

    pub fn tagged(&self, mask: TagMask) -> Vec<IndexRecord> {
        select::store_records(self.store)
            .into_iter()
            .filter(|r| r.tag_mask.intersects(mask))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct CaptureSnapshot {
    pub ring_len: usize,
    pub last_seq: u64,
    pub capturing: bool,
    pub post_remaining: Option<usize>,
    pub debounce_remaining: usize,
    pub store: StoreSnapshot,
}

pub struct CaptureAdapter<'a, const R: usize, const S: usize> {
    erb: &'a ReplayBuffer<R, S>,
}

impl<'a, const R: usize, const S: usize> CaptureAdapter<'a, R, S> {
    pub fn new(erb: &'a ReplayBuffer<R, S>) -> Self {
        Self { erb }
    }

    pub fn snapshot(&self) -> CaptureSnapshot {
        let capture = self.erb.capture();
        CaptureSnapshot {
            ring_len: self.erb.ring().len(),
            last_seq: self.erb.ring().last_seq(),
            capturing: capture.is_capturing(),
            post_remaining: capture.post_remaining(),
            debounce_remaining: capture.debounce_remaining(),
            store: StoreAdapter::new(self.erb.store()).snapshot(),
        }
    }
}
