use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::episode::{Episode, EpisodeRecord};
use crate::error::{ErbError, Result};
use crate::ring::RingBuffer;
use crate::storage::{self, IndexRecord, INDEX_FILE, LOG_LIMIT_BYTES};

/// Finalized episodes kept in memory.
pub const STORE_CAPACITY: usize = 32;

/// Finalized episodes: a bounded in-memory cache in front of durable files.
///
/// When opened on a directory, every finalized episode is written to its own
/// file and summarized in the append-only index; those files are the source
/// of truth. The cache only serves fast lookups and silently drops the oldest
/// record once `N` are held. If the directory cannot be used the store keeps
/// working purely in memory.
#[derive(Debug)]
pub struct EpisodeStore<const N: usize = STORE_CAPACITY> {
    cache: RingBuffer<EpisodeRecord, N>,
    /// `None` once every id has been handed out.
    next_id: Option<u32>,
    logs_dir: Option<PathBuf>,
    index_limit: u64,
}

impl<const N: usize> Default for EpisodeStore<N> {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl<const N: usize> EpisodeStore<N> {
    pub fn in_memory() -> Self {
        Self {
            cache: RingBuffer::new(),
            next_id: Some(0),
            logs_dir: None,
            index_limit: LOG_LIMIT_BYTES,
        }
    }

    /// Open (or create) a store rooted at `logs_dir`.
    ///
    /// Recovers the next id from the index and the episode files on disk and
    /// reloads the most recent `N` episodes. Never fails: unusable
    /// directories degrade to an in-memory store, unreadable episodes are
    /// skipped.
    pub fn open(logs_dir: impl Into<PathBuf>) -> Self {
        let dir = logs_dir.into();
        let mut store = Self::in_memory();
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!("episode store running without persistence: cannot create {dir:?}: {e}");
            return store;
        }

        let index_ids = read_ids(&dir.join(INDEX_FILE));
        let file_max = max_episode_file_id(&dir);
        store.next_id = index_ids
            .iter()
            .copied()
            .chain(file_max)
            .max()
            .map_or(Some(0), |max| max.checked_add(1));
        store.logs_dir = Some(dir);

        let skip = index_ids.len().saturating_sub(N);
        let mut reloaded = 0usize;
        for &id in &index_ids[skip..] {
            match store.load_episode(id) {
                Ok(episode) => {
                    store.cache.push(EpisodeRecord { id, episode });
                    reloaded += 1;
                }
                Err(e) => debug!("skipping episode {id} on reload: {e}"),
            }
        }
        info!(
            "episode store opened: next_id={:?} reloaded={}",
            store.next_id, reloaded
        );
        store
    }

    /// Override the index size cap (bytes).
    pub fn with_index_limit(mut self, limit: u64) -> Self {
        self.index_limit = limit;
        self
    }

    pub fn is_persistent(&self) -> bool {
        self.logs_dir.is_some()
    }

    pub fn logs_dir(&self) -> Option<&Path> {
        self.logs_dir.as_deref()
    }

    /// Id the next finalized episode will receive, `None` once the id
    /// space is exhausted.
    pub fn next_id(&self) -> Option<u32> {
        self.next_id
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Assign the next id, persist the episode and cache it.
    ///
    /// Persistence failures are logged; the episode is still cached and the
    /// id is still consumed. Once ids run out the episode is dropped and
    /// `None` is returned, since an id is never handed out twice.
    pub fn finalize(&mut self, episode: Episode) -> Option<u32> {
        let Some(id) = self.next_id else {
            warn!("episode id space exhausted, dropping episode");
            return None;
        };
        self.next_id = id.checked_add(1);

        if let Some(dir) = &self.logs_dir {
            if let Err(e) = persist(dir, id, &episode, self.index_limit) {
                warn!("failed to persist episode {id}: {e}");
            }
        }
        info!(
            "episode {id} finalized: len={} tag={}",
            episode.len(),
            episode.tag()
        );
        self.cache.push(EpisodeRecord { id, episode });
        Some(id)
    }

    /// `idx` records back from the newest (0 = newest).
    pub fn get_by_recency(&self, idx: usize) -> Option<&EpisodeRecord> {
        self.cache.get_recent(idx)
    }

    pub fn id_at(&self, idx: usize) -> Option<u32> {
        self.get_by_recency(idx).map(|r| r.id)
    }

    /// Look up by id, falling back to the episode file when not cached.
    pub fn get_by_id(&self, id: u32) -> Option<Episode> {
        if let Some(rec) = self.cache.iter().find(|r| r.id == id) {
            return Some(rec.episode.clone());
        }
        self.load_episode(id).ok()
    }

    /// Cached records, newest first.
    pub fn iter_recent(&self) -> impl Iterator<Item = &EpisodeRecord> + '_ {
        self.cache.iter().rev()
    }

    /// Up to `n` newest cached episodes (`n == 0` means all).
    pub fn recent_episodes(&self, n: usize) -> Vec<&Episode> {
        let take = if n == 0 { self.len() } else { n };
        self.iter_recent().take(take).map(|r| &r.episode).collect()
    }

    /// Read the episode file for `id`.
    pub fn load_episode(&self, id: u32) -> Result<Episode> {
        let dir = self.logs_dir.as_ref().ok_or(ErbError::NotPersistent)?;
        let path = dir.join(storage::episode_file_name(id));
        let file = File::open(&path).map_err(|e| ErbError::io(&path, e))?;
        let episode = storage::read_episode(BufReader::new(file)).map_err(|e| ErbError::io(&path, e))?;
        if episode.is_empty() {
            return Err(ErbError::MalformedEpisode { path });
        }
        Ok(episode)
    }

    /// Every well-formed record of the persisted index.
    pub fn read_index(&self) -> Vec<IndexRecord> {
        match &self.logs_dir {
            Some(dir) => match File::open(dir.join(INDEX_FILE)) {
                Ok(f) => storage::read_index_records(BufReader::new(f)),
                Err(_) => Vec::new(),
            },
            None => Vec::new(),
        }
    }
}

fn persist(dir: &Path, id: u32, episode: &Episode, index_limit: u64) -> Result<()> {
    let path = dir.join(storage::episode_file_name(id));
    let file = File::create(&path).map_err(|e| ErbError::io(&path, e))?;
    let mut w = BufWriter::new(file);
    storage::write_episode(&mut w, episode).map_err(|e| ErbError::io(&path, e))?;
    w.flush().map_err(|e| ErbError::io(&path, e))?;

    let line = IndexRecord::summarize(id, episode).to_line()?;
    storage::append_line(&dir.join(INDEX_FILE), &line, index_limit)
}

fn read_ids(index: &Path) -> Vec<u32> {
    match File::open(index) {
        Ok(f) => storage::read_index_ids(BufReader::new(f)),
        Err(_) => Vec::new(),
    }
}

fn max_episode_file_id(dir: &Path) -> Option<u32> {
    fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .filter_map(|e| storage::parse_episode_file_name(e.file_name().to_str()?))
        .max()
}
