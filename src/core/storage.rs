//! On-disk formats for episodes and their index.
//!
//! - Episode file (`erb_episode_NNNNNN.csv`): a `#tag=<mask>` comment line,
//!   then one `index,amp,tempo,consent,influence,harmony,dream,delta,alpha`
//!   line per tick with six decimals.
//! - Index (`erb_index.jsonl`): one [`IndexRecord`] JSON object per line.
//!
//! Readers are lenient: malformed lines are skipped, not fatal.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::episode::{Episode, EPISODE_MAX_LEN};
use crate::error::{ErbError, Result};
use crate::telemetry::{TagMask, TickSnapshot};

pub const INDEX_FILE: &str = "erb_index.jsonl";
pub const REPLAY_FILE: &str = "erb_replay.jsonl";
pub const TUNE_REPORT_FILE: &str = "tune_report.jsonl";
pub const TUNE_BEST_FILE: &str = "tune_best.json";

const EPISODE_PREFIX: &str = "erb_episode_";
const EPISODE_SUFFIX: &str = ".csv";

/// Append-only logs are truncated once they grow past this size.
pub const LOG_LIMIT_BYTES: u64 = 5 * 1024 * 1024;

pub fn episode_file_name(id: u32) -> String {
    format!("{EPISODE_PREFIX}{id:06}{EPISODE_SUFFIX}")
}

/// Inverse of [`episode_file_name`].
pub fn parse_episode_file_name(name: &str) -> Option<u32> {
    name.strip_prefix(EPISODE_PREFIX)?
        .strip_suffix(EPISODE_SUFFIX)?
        .parse()
        .ok()
}

pub fn write_episode<W: Write>(w: &mut W, episode: &Episode) -> io::Result<()> {
    writeln!(w, "#tag={}", episode.tag().bits())?;
    for (i, tick) in episode.ticks().iter().enumerate() {
        write!(w, "{i}")?;
        for v in tick.to_array() {
            write!(w, ",{v:.6}")?;
        }
        writeln!(w)?;
    }
    Ok(())
}

/// Read an episode, skipping lines that do not parse. At most
/// [`EPISODE_MAX_LEN`] ticks are kept. `NaN`/`inf` fields parse but are
/// sanitized against the previous tick.
pub fn read_episode<R: BufRead>(r: R) -> io::Result<Episode> {
    let mut tag = TagMask::NONE;
    let mut ticks = Vec::new();
    for line in r.lines() {
        let line = line?;
        let line = line.trim();
        if let Some(comment) = line.strip_prefix('#') {
            if let Some(mask) = comment.strip_prefix("tag=").and_then(|v| v.trim().parse().ok()) {
                tag = TagMask::from_bits(mask);
            }
            continue;
        }
        match parse_tick_line(line) {
            Some(tick) if ticks.len() < EPISODE_MAX_LEN => ticks.push(tick),
            Some(_) => {}
            None => {
                if !line.is_empty() {
                    debug!("skipping malformed episode line: {line:?}");
                }
            }
        }
    }
    Ok(Episode::from_ticks(ticks, tag))
}

fn parse_tick_line(line: &str) -> Option<TickSnapshot> {
    let mut fields = line.split(',').map(str::trim);
    fields.next()?.parse::<usize>().ok()?;
    let mut values = [0.0f32; TickSnapshot::FIELD_COUNT];
    for v in &mut values {
        *v = fields.next()?.parse().ok()?;
    }
    if fields.next().is_some() {
        return None;
    }
    Some(TickSnapshot::from_array(values))
}

/// One line of the episode index.
///
/// Field order is the line grammar:
/// `{"idx":..,"len":..,"tag":"..","tag_mask":..,"delta_max":..,"alpha_mean":..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub idx: u32,
    pub len: usize,
    pub tag: String,
    pub tag_mask: TagMask,
    pub delta_max: f32,
    #[serde(default)]
    pub alpha_mean: f32,
}

impl IndexRecord {
    pub fn summarize(id: u32, episode: &Episode) -> Self {
        Self {
            idx: id,
            len: episode.len(),
            tag: episode.tag().label(),
            tag_mask: episode.tag(),
            delta_max: episode.delta_max(),
            alpha_mean: episode.alpha_mean(),
        }
    }

    /// The record as one index line, without the trailing newline.
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Deserialize)]
struct IdProbe {
    idx: u32,
}

/// Parse every well-formed index record, in file order.
pub fn read_index_records<R: BufRead>(r: R) -> Vec<IndexRecord> {
    r.lines()
        .map_while(|l| l.ok())
        .filter_map(|line| match serde_json::from_str::<IndexRecord>(&line) {
            Ok(rec) => Some(rec),
            Err(e) => {
                debug!("skipping malformed index line ({e}): {line:?}");
                None
            }
        })
        .collect()
}

/// Ids found in the index, in file order. Only the `idx` field has to be
/// readable for a line to count.
pub fn read_index_ids<R: BufRead>(r: R) -> Vec<u32> {
    r.lines()
        .map_while(|l| l.ok())
        .filter_map(|line| serde_json::from_str::<IdProbe>(&line).ok())
        .map(|p| p.idx)
        .collect()
}

/// Truncate `path` if it has grown beyond `limit` bytes.
pub fn trim_if_oversized(path: &Path, limit: u64) -> Result<bool> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() > limit => {
            File::create(path).map_err(|e| ErbError::io(path, e))?;
            Ok(true)
        }
        Ok(_) => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ErbError::io(path, e)),
    }
}

/// Append one line to a size-capped log, creating it if needed.
pub fn append_line(path: &Path, line: &str, limit: u64) -> Result<()> {
    trim_if_oversized(path, limit)?;
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ErbError::io(path, e))?;
    writeln!(f, "{line}").map_err(|e| ErbError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_episode() -> Episode {
        let mut ep = Episode::new(TagMask::SPIKE | TagMask::ALIGN);
        for i in 0..3 {
            ep.push(TickSnapshot::from_array([
                i as f32, 0.5, 0.25, 0.75, 0.6, 1.0, -0.125, 0.3,
            ]));
        }
        ep
    }

    #[test]
    fn episode_file_name_roundtrip() {
        assert_eq!(episode_file_name(7), "erb_episode_000007.csv");
        assert_eq!(parse_episode_file_name("erb_episode_000007.csv"), Some(7));
        assert_eq!(parse_episode_file_name("erb_episode_1234567.csv"), Some(1_234_567));
        assert_eq!(parse_episode_file_name("erb_index.jsonl"), None);
    }

    #[test]
    fn episode_file_format() {
        let mut buf = Vec::new();
        write_episode(&mut buf, &sample_episode()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("#tag=3"));
        assert_eq!(
            lines.next(),
            Some("0,0.000000,0.500000,0.250000,0.750000,0.600000,1.000000,-0.125000,0.300000")
        );
    }

    #[test]
    fn episode_read_back_preserves_tag_and_len() {
        let ep = sample_episode();
        let mut buf = Vec::new();
        write_episode(&mut buf, &ep).unwrap();
        let back = read_episode(Cursor::new(buf)).unwrap();
        assert_eq!(back.tag(), ep.tag());
        assert_eq!(back.len(), ep.len());
        assert_eq!(back.ticks()[2].amp, 2.0);
    }

    #[test]
    fn episode_reader_skips_malformed_lines() {
        let text = "#tag=4\n0,1,2,3,4,5,6,7,8\ngarbage\n1,1,2,3\n2,1,2,3,4,5,6,7,8\n";
        let ep = read_episode(Cursor::new(text)).unwrap();
        assert_eq!(ep.tag(), TagMask::LOW_HARM);
        assert_eq!(ep.len(), 2);
    }

    #[test]
    fn episode_reader_sanitizes_non_finite_fields() {
        let text = concat!(
            "#tag=1\n",
            "0,NaN,inf,0.1,0.2,0.3,0,0.01,0.3\n",
            "1,1.5,2,0.1,0.2,0.3,0,0.02,0.4\n",
            "2,-infinity,NaN,0.1,0.2,0.3,0,0.03,nan\n",
        );
        let ep = read_episode(Cursor::new(text)).unwrap();
        assert_eq!(ep.len(), 3);
        assert!(ep.ticks().iter().all(TickSnapshot::is_finite));
        assert_eq!((ep.ticks()[0].amp, ep.ticks()[0].tempo), (0.0, 0.0));
        assert_eq!((ep.ticks()[2].amp, ep.ticks()[2].tempo), (1.5, 2.0));
        assert_eq!(ep.ticks()[2].filter_alpha, 0.4);
    }

    #[test]
    fn index_line_grammar() {
        let rec = IndexRecord::summarize(12, &sample_episode());
        let line = rec.to_line().unwrap();
        assert!(line.starts_with(r#"{"idx":12,"len":3,"tag":"SPIKE|ALIGN","tag_mask":3,"delta_max":0.125,"alpha_mean":"#));
        assert!(line.ends_with('}'));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn index_reader_tolerates_bad_lines_and_missing_alpha() {
        let text = concat!(
            r#"{"idx":0,"len":4,"tag":"SPIKE","tag_mask":1,"delta_max":0.1,"alpha_mean":0.3}"#,
            "\nnot json\n",
            r#"{"idx":1,"len":2,"tag":"ALIGN","tag_mask":2,"delta_max":0.2}"#,
            "\n",
            r#"{"idx":5,"len":"broken"}"#,
            "\n"
        );
        let recs = read_index_records(Cursor::new(text));
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[1].alpha_mean, 0.0);

        let ids = read_index_ids(Cursor::new(text));
        assert_eq!(ids, vec![0, 1, 5]);
    }

    #[test]
    fn append_line_truncates_oversized_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        append_line(&path, "aaaaaaaaaa", 8).unwrap();
        append_line(&path, "b", 8).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "b\n");
    }
}
