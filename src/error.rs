use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ErbError {
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("episode file {path:?} holds no readable ticks")]
    MalformedEpisode { path: PathBuf },

    #[error("profile {path:?} is missing field `{field}`")]
    InvalidProfile { path: PathBuf, field: &'static str },

    #[error("filter rejected configuration alpha={alpha} warmup={warmup}")]
    FilterRejected { alpha: f32, warmup: u32 },

    #[error("unrecognized episode selector {0:?} (expected latest, all, idx:N or tag:SPEC)")]
    InvalidSelector(String),

    #[error("could not determine a data directory")]
    NoDataDir,

    #[error("no episodes available")]
    NoEpisodes,

    #[error("episode store has no backing directory")]
    NotPersistent,
}

impl ErbError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ErbError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = ErbError> = std::result::Result<T, E>;
