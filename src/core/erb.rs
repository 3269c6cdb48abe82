use crate::capture::EpisodeCapture;
use crate::config::CaptureSettings;
use crate::ring::{TickRing, TICK_RING_CAPACITY};
use crate::store::{EpisodeStore, STORE_CAPACITY};
use crate::telemetry::{TagMask, TickSnapshot};

/// Ring, capture and store wired together for the control loop.
///
/// Single writer: call [`ReplayBuffer::push_tick`] and then
/// [`ReplayBuffer::maybe_capture`] once per cycle from the same thread.
/// Readers inspect the store between cycles.
#[derive(Debug)]
pub struct ReplayBuffer<const R: usize = TICK_RING_CAPACITY, const S: usize = STORE_CAPACITY> {
    ring: TickRing<R>,
    capture: EpisodeCapture,
    store: EpisodeStore<S>,
}

impl<const R: usize, const S: usize> ReplayBuffer<R, S> {
    pub fn new(capture: EpisodeCapture, store: EpisodeStore<S>) -> Self {
        Self {
            ring: TickRing::new(),
            capture,
            store,
        }
    }

    pub fn from_settings(settings: &CaptureSettings, store: EpisodeStore<S>) -> Self {
        Self::new(EpisodeCapture::new(settings.pre, settings.post), store)
    }

    pub fn push_tick(&mut self, snapshot: TickSnapshot) {
        self.ring.push(snapshot);
    }

    /// Advance capture with this cycle's tag. Returns the id of an episode
    /// finalized during this call.
    pub fn maybe_capture(&mut self, tag: TagMask) -> Option<u32> {
        let episode = self.capture.step(&self.ring, tag)?;
        self.store.finalize(episode)
    }

    pub fn ring(&self) -> &TickRing<R> {
        &self.ring
    }

    pub fn capture(&self) -> &EpisodeCapture {
        &self.capture
    }

    pub fn store(&self) -> &EpisodeStore<S> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut EpisodeStore<S> {
        &mut self.store
    }

    pub fn into_store(self) -> EpisodeStore<S> {
        self.store
    }
}
