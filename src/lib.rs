//! # liminal
//!
//! Episodic replay buffer and seeded auto-tuner for a telemetry smoothing
//! filter.
//!
//! Every control cycle pushes a [`telemetry::TickSnapshot`] into a bounded
//! ring. When an upstream detector raises a trigger tag, the capture state
//! machine freezes a window of ticks around the trigger into an
//! [`episode::Episode`], which the [`store::EpisodeStore`] persists and
//! caches. The [`autotune::AutoTuner`] later replays stored episodes to
//! search for the filter parameters with the lowest loss.
//!
//! ## Quick Start
//!
//! ```
//! use liminal::prelude::*;
//!
//! let mut erb: ReplayBuffer = ReplayBuffer::new(EpisodeCapture::new(4, 2), EpisodeStore::in_memory());
//! for i in 0..8 {
//!     erb.push_tick(TickSnapshot { consent: 0.1 * i as f32, ..TickSnapshot::default() });
//!     let tag = if i == 4 { TagMask::SPIKE } else { TagMask::NONE };
//!     erb.maybe_capture(tag);
//! }
//!
//! let mut tuner: AutoTuner = AutoTuner::new();
//! let best = tuner.search_store(erb.store(), 0, &TuneSpace::default(), 20, 5, 42);
//! let mut filter = TrsFilter::default();
//! tuner.apply(&best, &mut filter).unwrap();
//! ```
//!
//! ## Modules
//!
//! - [`ring`], [`capture`], [`store`]: the capture pipeline, glued by [`erb`]
//! - [`autotune`]: evaluation and seeded search
//! - [`storage`], [`profile`], [`replay`]: files under the logs directory
//! - [`observer`]: read-only inspection adapters

#[path = "core/telemetry.rs"]
pub mod telemetry;

#[path = "core/ring.rs"]
pub mod ring;

#[path = "core/episode.rs"]
pub mod episode;

#[path = "core/capture.rs"]
pub mod capture;

#[path = "core/storage.rs"]
pub mod storage;

#[path = "core/store.rs"]
pub mod store;

#[path = "core/select.rs"]
pub mod select;

#[path = "core/erb.rs"]
pub mod erb;

#[path = "core/filter.rs"]
pub mod filter;

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/autotune.rs"]
pub mod autotune;

#[path = "core/profile.rs"]
pub mod profile;

#[path = "core/replay.rs"]
pub mod replay;

pub mod config;
pub mod error;
pub mod observer;

/// Prelude module for convenient imports.
///
/// ```
/// use liminal::prelude::*;
/// ```
pub mod prelude {
    pub use crate::autotune::{AutoTuner, RankedResults, TuneConfig, TuneResult, TuneSpace};
    pub use crate::capture::EpisodeCapture;
    pub use crate::config::{AppPaths, ErbConfig};
    pub use crate::episode::{Episode, EpisodeRecord};
    pub use crate::erb::ReplayBuffer;
    pub use crate::error::{ErbError, Result};
    pub use crate::filter::{SmoothingFilter, TrsFilter};
    pub use crate::ring::TickRing;
    pub use crate::select::EpisodeSelector;
    pub use crate::store::EpisodeStore;
    pub use crate::telemetry::{TagMask, TickSnapshot};
}
