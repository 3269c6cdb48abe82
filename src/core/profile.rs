//! Tune profiles and tune reports.
//!
//! A profile is a small JSON object,
//! `{"trs_alpha":..,"trs_warmup":..,"allow_align":..,"loss":..}`, where
//! `loss` is only present when the profile came out of a search. Reports go
//! to the logs directory: the top ranked results are appended to
//! `tune_report.jsonl` and the best one overwrites `tune_best.json`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::autotune::{TuneConfig, TuneResult};
use crate::error::{ErbError, Result};
use crate::filter::MAX_WARMUP;
use crate::storage::{self, LOG_LIMIT_BYTES, TUNE_BEST_FILE, TUNE_REPORT_FILE};

/// Results written per report.
pub const REPORT_TOP: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TuneProfile {
    pub trs_alpha: f32,
    pub trs_warmup: u32,
    pub allow_align: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss: Option<f32>,
}

impl TuneProfile {
    pub fn from_config(config: &TuneConfig) -> Self {
        Self {
            trs_alpha: config.filter_alpha,
            trs_warmup: config.warmup_cycles,
            allow_align: config.allow_align,
            loss: None,
        }
    }

    /// Profile of a search result; the loss is kept only if finite.
    pub fn from_result(result: &TuneResult) -> Self {
        Self {
            loss: result.is_evaluated().then_some(result.loss),
            ..Self::from_config(&result.config)
        }
    }

    pub fn config(&self) -> TuneConfig {
        TuneConfig {
            filter_alpha: self.trs_alpha,
            warmup_cycles: self.trs_warmup,
            allow_align: self.allow_align,
        }
    }
}

pub fn save_profile(path: &Path, profile: &TuneProfile) -> Result<()> {
    let mut json = serde_json::to_string(profile)?;
    json.push('\n');
    fs::write(path, json).map_err(|e| ErbError::io(path, e))?;
    info!(
        "saved tune profile to {path:?} (alpha={:.4} warmup={} allow_align={:.4})",
        profile.trs_alpha, profile.trs_warmup, profile.allow_align
    );
    Ok(())
}

/// Load a profile. `trs_alpha`, `trs_warmup` and `allow_align` are required;
/// a fractional warmup is rounded to the nearest cycle.
pub fn load_profile(path: &Path) -> Result<TuneProfile> {
    let text = fs::read_to_string(path).map_err(|e| ErbError::io(path, e))?;
    let value: Value = serde_json::from_str(&text)?;
    let missing = |field| ErbError::InvalidProfile {
        path: path.to_path_buf(),
        field,
    };
    let float = |field: &'static str| value.get(field).and_then(Value::as_f64).ok_or_else(|| missing(field));

    let trs_alpha = float("trs_alpha")? as f32;
    let trs_warmup = match value.get("trs_warmup").and_then(Value::as_u64) {
        Some(w) => w.min(u64::from(MAX_WARMUP)) as u32,
        None => float("trs_warmup")?.round().clamp(0.0, f64::from(MAX_WARMUP)) as u32,
    };
    let allow_align = float("allow_align")? as f32;
    let loss = value.get("loss").and_then(Value::as_f64).map(|l| l as f32);

    let profile = TuneProfile {
        trs_alpha,
        trs_warmup,
        allow_align,
        loss,
    };
    info!(
        "loaded tune profile {path:?} (alpha={:.4} warmup={} allow_align={:.4})",
        profile.trs_alpha, profile.trs_warmup, profile.allow_align
    );
    Ok(profile)
}

#[derive(Serialize)]
struct ReportLine<'a> {
    mode: &'a str,
    rank: usize,
    loss: f32,
    delta_mean: f32,
    harm_mean: f32,
    consent_mean: f32,
    misalign_rate: f32,
    cfg: TuneProfile,
}

#[derive(Serialize)]
struct BestLine {
    trs_alpha: f32,
    trs_warmup: u32,
    allow_align: f32,
    loss: f32,
    delta_mean: f32,
    harm_mean: f32,
    consent_mean: f32,
    misalign_rate: f32,
}

/// Append the top [`REPORT_TOP`] evaluated results (rank 0 = best) to the
/// report log and overwrite the best-result file. Returns how many lines
/// were appended.
pub fn write_tune_report(logs_dir: &Path, ranked: &[TuneResult]) -> Result<usize> {
    let top: Vec<&TuneResult> = ranked
        .iter()
        .filter(|r| r.is_evaluated())
        .take(REPORT_TOP)
        .collect();
    let Some(best) = top.first() else {
        return Ok(0);
    };
    fs::create_dir_all(logs_dir).map_err(|e| ErbError::io(logs_dir, e))?;

    let report_path = logs_dir.join(TUNE_REPORT_FILE);
    for (rank, r) in top.iter().enumerate() {
        let line = ReportLine {
            mode: "erb",
            rank,
            loss: r.loss,
            delta_mean: r.delta_mean,
            harm_mean: r.harmony_mean,
            consent_mean: r.consent_mean,
            misalign_rate: r.misalign_rate,
            cfg: TuneProfile::from_config(&r.config),
        };
        storage::append_line(&report_path, &serde_json::to_string(&line)?, LOG_LIMIT_BYTES)?;
    }

    let best_path = logs_dir.join(TUNE_BEST_FILE);
    let best_line = BestLine {
        trs_alpha: best.config.filter_alpha,
        trs_warmup: best.config.warmup_cycles,
        allow_align: best.config.allow_align,
        loss: best.loss,
        delta_mean: best.delta_mean,
        harm_mean: best.harmony_mean,
        consent_mean: best.consent_mean,
        misalign_rate: best.misalign_rate,
    };
    let mut json = serde_json::to_string(&best_line)?;
    json.push('\n');
    fs::write(&best_path, json).map_err(|e| ErbError::io(&best_path, e))?;
    Ok(top.len())
}
