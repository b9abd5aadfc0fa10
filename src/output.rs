use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AlignmentError, MatchRole};
use crate::types::{Match, SegmentSpan};

/// Per-match output files end with this; the matcher ignores them as inputs.
pub const TIMESTAMPS_SUFFIX: &str = "_timestamps.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub text: String,
    /// `[start, end]` in seconds, two decimals.
    pub timings: [f64; 2],
    pub timings_str: [String; 2],
    pub uroman_tokens: String,
}

impl From<SegmentSpan> for Section {
    fn from(span: SegmentSpan) -> Self {
        Self {
            text: span.text,
            timings: [span.start_time_sec, span.end_time_sec],
            timings_str: [span.start_time_str, span.end_time_str],
            uroman_tokens: span.romanized_tokens,
        }
    }
}

/// Persisted alignment of one match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileTimestamps {
    pub audio_file: String,
    pub text_file: String,
    pub sections: Vec<Section>,
}

/// Bundles ordered segment spans with the files they were aligned from.
pub fn assemble(item: &Match, spans: Vec<SegmentSpan>) -> Result<FileTimestamps, AlignmentError> {
    let missing = |missing| AlignmentError::Matching {
        base_name: item.base_name.clone(),
        missing,
    };
    let audio = item.audio.as_ref().ok_or_else(|| missing(MatchRole::Audio))?;
    let text = item.text.as_ref().ok_or_else(|| missing(MatchRole::Text))?;
    Ok(FileTimestamps {
        audio_file: audio.path.to_string_lossy().into_owned(),
        text_file: text.path.to_string_lossy().into_owned(),
        sections: spans.into_iter().map(Section::from).collect(),
    })
}

pub fn timestamps_path(output_dir: &Path, base_name: &str) -> PathBuf {
    output_dir.join(format!("{base_name}{TIMESTAMPS_SUFFIX}"))
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), AlignmentError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| AlignmentError::json("serialize timestamps", e))?;
    std::fs::write(path, json).map_err(|e| AlignmentError::io("write timestamps", e))
}

/// Loads a previously written result; `None` when the file is absent or empty.
pub fn read_existing(path: &Path) -> Result<Option<FileTimestamps>, AlignmentError> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(AlignmentError::io("read existing timestamps", e)),
    };
    if data.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&data)
        .map(Some)
        .map_err(|e| AlignmentError::json("parse existing timestamps", e))
}

/// `HH:MM:SS,mmm`.
pub fn format_srt_time(sec: f64) -> String {
    let total_ms = (sec.max(0.0) * 1000.0).round() as u64;
    let (hours, rest) = (total_ms / 3_600_000, total_ms % 3_600_000);
    let (minutes, rest) = (rest / 60_000, rest % 60_000);
    format!("{hours:02}:{minutes:02}:{:02},{:03}", rest / 1000, rest % 1000)
}

pub fn render_srt(timestamps: &FileTimestamps) -> String {
    let mut out = String::new();
    for (i, section) in timestamps.sections.iter().enumerate() {
        let _ = write!(
            out,
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_srt_time(section.timings[0]),
            format_srt_time(section.timings[1]),
            section.text
        );
    }
    out
}
