use serde::{Deserialize, Serialize};

use crate::telemetry::{TagMask, TickSnapshot};

/// Maximum number of ticks in one episode.
pub const EPISODE_MAX_LEN: usize = 128;

/// A bounded run of ticks captured around a trigger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    ticks: Vec<TickSnapshot>,
    tag: TagMask,
}

impl Episode {
    pub fn new(tag: TagMask) -> Self {
        Self {
            ticks: Vec::with_capacity(EPISODE_MAX_LEN),
            tag,
        }
    }

    /// Build from existing ticks, dropping anything past [`EPISODE_MAX_LEN`].
    /// Ticks are sanitized as by [`Episode::push`].
    pub fn from_ticks(ticks: Vec<TickSnapshot>, tag: TagMask) -> Self {
        let mut episode = Self::new(tag);
        for tick in ticks {
            if !episode.push(tick) {
                break;
            }
        }
        episode
    }

    /// Append a tick. Returns `false` (and drops the tick) once full.
    ///
    /// Non-finite fields take the previous tick's value, or zero for the
    /// first tick, so every stored tick is finite.
    pub fn push(&mut self, tick: TickSnapshot) -> bool {
        if self.is_full() {
            return false;
        }
        let tick = tick.sanitized(self.ticks.last());
        self.ticks.push(tick);
        true
    }

    pub fn ticks(&self) -> &[TickSnapshot] {
        &self.ticks
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ticks.len() >= EPISODE_MAX_LEN
    }

    pub fn tag(&self) -> TagMask {
        self.tag
    }

    pub fn set_tag(&mut self, tag: TagMask) {
        self.tag = tag;
    }

    /// Largest absolute filter delta across the episode.
    pub fn delta_max(&self) -> f32 {
        self.ticks
            .iter()
            .map(|t| t.filter_delta.abs())
            .fold(0.0, f32::max)
    }

    pub fn alpha_mean(&self) -> f32 {
        if self.ticks.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.ticks.iter().map(|t| t.filter_alpha).sum();
        sum / self.ticks.len() as f32
    }
}

impl AsRef<Episode> for Episode {
    fn as_ref(&self) -> &Episode {
        self
    }
}

/// A finalized episode with its stable id.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeRecord {
    pub id: u32,
    pub episode: Episode,
}

impl AsRef<Episode> for EpisodeRecord {
    fn as_ref(&self) -> &Episode {
        &self.episode
    }
}
