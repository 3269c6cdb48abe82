//! Runtime configuration and on-disk locations.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::autotune::TuneSpace;
use crate::error::{ErbError, Result};
use crate::select::EpisodeSelector;

pub const ENV_ERB_PRE: &str = "LIMINAL_ERB_PRE";
pub const ENV_ERB_POST: &str = "LIMINAL_ERB_POST";
pub const ENV_TUNE_TRIALS: &str = "LIMINAL_TUNE_TRIALS";
pub const ENV_TUNE_REFINE: &str = "LIMINAL_TUNE_REFINE";
pub const ENV_TUNE_SEED: &str = "LIMINAL_TUNE_SEED";
pub const ENV_TUNE_SOURCE: &str = "LIMINAL_TUNE_SOURCE";
pub const ENV_DATA_DIR: &str = "LIMINAL_DATA_DIR";

fn default_pre() -> usize {
    24
}
fn default_post() -> usize {
    32
}
fn default_trials() -> usize {
    60
}
fn default_refine() -> usize {
    10
}
fn default_max_runs() -> usize {
    200
}
fn default_seed() -> u64 {
    42
}

/// Capture windows, in ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSettings {
    #[serde(default = "default_pre")]
    pub pre: usize,
    #[serde(default = "default_post")]
    pub post: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            pre: default_pre(),
            post: default_post(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuneSettings {
    #[serde(default)]
    pub source: EpisodeSelector,
    /// Keep at most this many selected episodes (0 = all).
    #[serde(default)]
    pub select_n: usize,
    #[serde(default = "default_trials")]
    pub trials: usize,
    #[serde(default = "default_refine")]
    pub local_refine: usize,
    /// Upper bound on `trials + local_refine`.
    #[serde(default = "default_max_runs")]
    pub max_runs: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub space: TuneSpace,
}

impl Default for TuneSettings {
    fn default() -> Self {
        Self {
            source: EpisodeSelector::default(),
            select_n: 0,
            trials: default_trials(),
            local_refine: default_refine(),
            max_runs: default_max_runs(),
            seed: default_seed(),
            space: TuneSpace::default(),
        }
    }
}

impl TuneSettings {
    /// `(trials, local_refine)` after applying `max_runs`. At least one trial
    /// always runs; refinement gets whatever budget the trials leave.
    pub fn budget(&self) -> (usize, usize) {
        let max_runs = self.max_runs.max(1);
        let trials = self.trials.max(1).min(max_runs);
        let refine = self.local_refine.min(max_runs - trials);
        (trials, refine)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErbConfig {
    #[serde(default)]
    pub capture: CaptureSettings,
    #[serde(default)]
    pub tune: TuneSettings,
}

impl ErbConfig {
    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load `path` if it exists, otherwise defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => {
                let cfg = Self::from_json(&text)?;
                info!("loaded config from {path:?}");
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ErbError::io(path, e)),
        }
    }

    /// Config file from `paths` (if any), then process environment overrides.
    pub fn new_from_env(paths: &AppPaths) -> Result<Self> {
        let mut cfg = Self::load_or_default(&paths.config_file())?;
        cfg.apply_env_with(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    /// Apply `LIMINAL_*` overrides read through `lookup`. Values that do not
    /// parse are ignored with a warning.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!("ignoring {key}={raw:?}: not a valid value");
                    None
                }
            }
        }

        if let Some(v) = parsed(ENV_ERB_PRE, lookup(ENV_ERB_PRE)) {
            self.capture.pre = v;
        }
        if let Some(v) = parsed(ENV_ERB_POST, lookup(ENV_ERB_POST)) {
            self.capture.post = v;
        }
        if let Some(v) = parsed(ENV_TUNE_TRIALS, lookup(ENV_TUNE_TRIALS)) {
            self.tune.trials = v;
        }
        if let Some(v) = parsed(ENV_TUNE_REFINE, lookup(ENV_TUNE_REFINE)) {
            self.tune.local_refine = v;
        }
        if let Some(v) = parsed(ENV_TUNE_SEED, lookup(ENV_TUNE_SEED)) {
            self.tune.seed = v;
        }
        if let Some(v) = parsed(ENV_TUNE_SOURCE, lookup(ENV_TUNE_SOURCE)) {
            self.tune.source = v;
        }
    }
}

/// Where configuration and episode logs live.
///
/// Defaults to `<platform data dir>/liminal`; `LIMINAL_DATA_DIR` or
/// [`AppPaths::with_root`] override it.
#[derive(Debug, Clone)]
pub struct AppPaths {
    data_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Result<Self> {
        let data_dir = match std::env::var_os(ENV_DATA_DIR) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => Self::default_data_dir()?,
        };
        Ok(Self::with_root(data_dir))
    }

    pub fn with_root(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn default_data_dir() -> Result<PathBuf> {
        let base = dirs::data_dir().ok_or(ErbError::NoDataDir)?;
        Ok(base.join("liminal"))
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    pub fn profile_file(&self) -> PathBuf {
        self.data_dir.join("tune_profile.json")
    }
}
