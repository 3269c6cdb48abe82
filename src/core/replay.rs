//! Drive stored episodes back through a smoothing filter and trace the
//! outcome, one JSON line per tick, into `erb_replay.jsonl`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::episode::Episode;
use crate::error::{ErbError, Result};
use crate::filter::SmoothingFilter;
use crate::select::{self, EpisodeSelector};
use crate::storage::{self, LOG_LIMIT_BYTES, REPLAY_FILE};
use crate::store::EpisodeStore;

const MODE_LABEL_MAX: usize = 63;

/// `{"tick","src_idx","delta","alpha","err_after","mode"}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayTraceLine {
    pub tick: u32,
    pub src_idx: u32,
    pub delta: f32,
    pub alpha: f32,
    pub err_after: f32,
    pub mode: String,
}

/// Quotes become `'`, an empty label becomes `unknown`.
pub fn sanitize_mode_label(mode: &str) -> String {
    if mode.is_empty() {
        return "unknown".to_string();
    }
    mode.chars()
        .take(MODE_LABEL_MAX)
        .map(|c| if c == '"' { '\'' } else { c })
        .collect()
}

fn six_decimals(v: f32) -> f32 {
    if v.is_finite() {
        (v * 1e6).round() / 1e6
    } else {
        0.0
    }
}

fn unit(v: f32, fallback: f32) -> f32 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        fallback
    }
}

/// Size-capped append-only replay trace.
#[derive(Debug, Clone)]
pub struct ReplayLog {
    path: PathBuf,
    limit: u64,
}

impl ReplayLog {
    pub fn new(logs_dir: &Path) -> Self {
        Self {
            path: logs_dir.join(REPLAY_FILE),
            limit: LOG_LIMIT_BYTES,
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, line: &ReplayTraceLine) -> Result<()> {
        let json = serde_json::to_string(line)?;
        storage::append_line(&self.path, &json, self.limit)
    }
}

/// Replay one episode through `filter`, returning a trace line per tick.
///
/// When `log` is given every line is also appended to it; the first write
/// failure is logged and tracing to disk stops for the rest of the episode.
pub fn replay_episode<F: SmoothingFilter>(
    episode: &Episode,
    src_idx: u32,
    mode: &str,
    filter: &mut F,
    log: Option<&ReplayLog>,
) -> Vec<ReplayTraceLine> {
    let mode = sanitize_mode_label(mode);
    let mut log = log;
    let mut lines = Vec::with_capacity(episode.len());

    for (tick, snap) in episode.ticks().iter().enumerate() {
        let influence = unit(snap.influence, 0.0);
        let harmony = unit(snap.harmony, influence);
        let consent = unit(snap.consent, 0.0);
        let out = filter.step(influence, harmony, consent);

        let line = ReplayTraceLine {
            tick: tick as u32,
            src_idx,
            delta: six_decimals(out.delta),
            alpha: six_decimals(filter.alpha()),
            err_after: six_decimals((unit(out.consent, 0.0) - unit(out.influence, 0.0)).abs()),
            mode: mode.clone(),
        };
        if let Some(sink) = log {
            if let Err(e) = sink.append(&line) {
                warn!("replay trace disabled for episode {src_idx}: {e}");
                log = None;
            }
        }
        lines.push(line);
    }
    lines
}

/// Replay every episode `selector` picks, in index order, through one
/// continuing `filter`. Returns the number of episodes replayed.
pub fn replay_selected<F: SmoothingFilter, const N: usize>(
    store: &EpisodeStore<N>,
    selector: EpisodeSelector,
    filter: &mut F,
    log: Option<&ReplayLog>,
) -> Result<usize> {
    let records = select::store_records(store);
    let ids = selector.select(&records);
    if ids.is_empty() {
        return Err(ErbError::NoEpisodes);
    }
    let label = selector.label();
    let mut replayed = 0;
    for id in ids {
        let Some(episode) = store.get_by_id(id) else {
            warn!("unable to load episode {id}");
            continue;
        };
        info!("replaying episode {id} ({} ticks) mode={label}", episode.len());
        replay_episode(&episode, id, &label, filter, log);
        replayed += 1;
    }
    Ok(replayed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::TrsFilter;
    use crate::telemetry::{TagMask, TickSnapshot};
    use std::fs;

    fn episode(values: &[(f32, f32, f32)], tag: TagMask) -> Episode {
        let mut ep = Episode::new(tag);
        for &(influence, harmony, consent) in values {
            ep.push(TickSnapshot {
                influence,
                harmony,
                consent,
                ..TickSnapshot::default()
            });
        }
        ep
    }

    #[test]
    fn mode_labels_are_sanitized() {
        assert_eq!(sanitize_mode_label(""), "unknown");
        assert_eq!(sanitize_mode_label(r#"tag:"x""#), "tag:'x'");
        assert_eq!(sanitize_mode_label(&"a".repeat(100)).len(), 63);
    }

    #[test]
    fn replay_traces_each_tick() {
        let ep = episode(&[(0.2, 0.5, 0.9), (0.4, 0.5, 0.4)], TagMask::SPIKE);
        let mut filter = TrsFilter::init(0.5, 0);
        let lines = replay_episode(&ep, 7, "idx:7", &mut filter, None);

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].tick, 0);
        assert_eq!(lines[1].src_idx, 7);
        assert_eq!(lines[0].alpha, 0.5);
        // First step from a zeroed EMA: (0.1, 0.25, 0.45).
        assert!((lines[0].delta - 0.45).abs() < 1e-6);
        assert!((lines[0].err_after - 0.35).abs() < 1e-6);
        assert_eq!(lines[0].mode, "idx:7");
    }

    #[test]
    fn replay_log_line_format() {
        let dir = tempfile::tempdir().unwrap();
        let log = ReplayLog::new(dir.path());
        let ep = episode(&[(0.5, 0.5, 0.5)], TagMask::ALIGN);
        let mut filter = TrsFilter::init(0.3, 1);
        replay_episode(&ep, 3, "", &mut filter, Some(&log));

        let text = fs::read_to_string(log.path()).unwrap();
        assert_eq!(
            text,
            "{\"tick\":0,\"src_idx\":3,\"delta\":0.0,\"alpha\":0.3,\"err_after\":0.0,\"mode\":\"unknown\"}\n"
        );
    }

    #[test]
    fn replay_selected_walks_matching_episodes() {
        let dir = tempfile::tempdir().unwrap();
        let mut store: EpisodeStore<4> = EpisodeStore::open(dir.path());
        store.finalize(episode(&[(0.1, 0.1, 0.1); 3], TagMask::SPIKE));
        store.finalize(episode(&[(0.2, 0.2, 0.2); 2], TagMask::ALIGN));
        store.finalize(episode(&[(0.3, 0.3, 0.3); 4], TagMask::SPIKE));

        let log = ReplayLog::new(dir.path());
        let mut filter = TrsFilter::default();
        let n = replay_selected(&store, EpisodeSelector::Tag(TagMask::SPIKE), &mut filter, Some(&log)).unwrap();
        assert_eq!(n, 2);

        let lines: Vec<ReplayTraceLine> = fs::read_to_string(log.path())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 7);
        assert!(lines.iter().all(|l| l.mode == "tag:SPIKE"));
        assert_eq!(lines[3].src_idx, 2);

        assert!(matches!(
            replay_selected(&store, EpisodeSelector::Id(42), &mut filter, None),
            Err(ErbError::NoEpisodes)
        ));
    }
}
