use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::episode::EpisodeRecord;
use crate::error::ErbError;
use crate::storage::IndexRecord;
use crate::store::EpisodeStore;
use crate::telemetry::TagMask;

/// Which persisted episodes a replay or tuning run works on.
///
/// Text form: `latest`, `all`, `idx:N` or `tag:SPEC` (see [`TagMask::parse`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EpisodeSelector {
    /// The episode with the highest id.
    #[default]
    Latest,
    Id(u32),
    /// Every episode sharing at least one bit with the mask, in index order.
    Tag(TagMask),
    All,
}

impl EpisodeSelector {
    /// Label used in replay trace lines.
    pub fn label(&self) -> String {
        match self {
            EpisodeSelector::Latest => "latest".to_string(),
            EpisodeSelector::Id(id) => format!("idx:{id}"),
            EpisodeSelector::Tag(mask) if mask.is_empty() => "tag:0".to_string(),
            EpisodeSelector::Tag(mask) => format!("tag:{}", mask.label()),
            EpisodeSelector::All => "ALL".to_string(),
        }
    }

    /// Ids of matching records. Empty when nothing matches.
    pub fn select(&self, records: &[IndexRecord]) -> Vec<u32> {
        match *self {
            EpisodeSelector::Latest => records.iter().map(|r| r.idx).max().into_iter().collect(),
            EpisodeSelector::Id(id) => records
                .iter()
                .find(|r| r.idx == id)
                .map(|r| r.idx)
                .into_iter()
                .collect(),
            EpisodeSelector::Tag(mask) => records
                .iter()
                .filter(|r| r.tag_mask.intersects(mask))
                .map(|r| r.idx)
                .collect(),
            EpisodeSelector::All => records.iter().map(|r| r.idx).collect(),
        }
    }

    /// Like [`EpisodeSelector::select`], but falls back to the latest episode
    /// when nothing matches and keeps at most `select_n` ids (`0` = no cap).
    pub fn select_for_tuning(&self, records: &[IndexRecord], select_n: usize) -> Vec<u32> {
        let mut ids = self.select(records);
        if ids.is_empty() && *self != EpisodeSelector::Latest {
            debug!("selector {} matched nothing, using latest", self.label());
            ids = EpisodeSelector::Latest.select(records);
        }
        if select_n > 0 {
            ids.truncate(select_n);
        }
        ids
    }
}

impl fmt::Display for EpisodeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for EpisodeSelector {
    type Err = ErbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ErbError::InvalidSelector(s.to_string());
        if s.eq_ignore_ascii_case("latest") {
            return Ok(EpisodeSelector::Latest);
        }
        if s.eq_ignore_ascii_case("all") {
            return Ok(EpisodeSelector::All);
        }
        if let Some(id) = s.strip_prefix("idx:") {
            return id.trim().parse().map(EpisodeSelector::Id).map_err(|_| invalid());
        }
        if let Some(spec) = s.strip_prefix("tag:") {
            let mask = TagMask::parse(spec);
            if mask.is_empty() {
                return Err(invalid());
            }
            return Ok(EpisodeSelector::Tag(mask));
        }
        Err(invalid())
    }
}

impl TryFrom<String> for EpisodeSelector {
    type Error = ErbError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EpisodeSelector> for String {
    fn from(sel: EpisodeSelector) -> Self {
        sel.label()
    }
}

/// Summaries of the episodes a store knows about, oldest first: the
/// persisted index, or the cache when the store has no directory.
pub fn store_records<const N: usize>(store: &EpisodeStore<N>) -> Vec<IndexRecord> {
    if store.is_persistent() {
        return store.read_index();
    }
    let mut records: Vec<IndexRecord> = store
        .iter_recent()
        .map(|r| IndexRecord::summarize(r.id, &r.episode))
        .collect();
    records.reverse();
    records
}

/// Load the episodes `selector` picks for a tuning run. Ids whose episode
/// cannot be loaded are skipped with a warning.
pub fn load_for_tuning<const N: usize>(
    store: &EpisodeStore<N>,
    selector: EpisodeSelector,
    select_n: usize,
) -> Vec<EpisodeRecord> {
    let records = store_records(store);
    selector
        .select_for_tuning(&records, select_n)
        .into_iter()
        .filter_map(|id| match store.get_by_id(id) {
            Some(episode) => Some(EpisodeRecord { id, episode }),
            None => {
                warn!("unable to load episode {id}");
                None
            }
        })
        .collect()
}
