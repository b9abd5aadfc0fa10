use std::path::PathBuf;

use crate::error::AlignmentError;

/// Romanized form of the leading sentinel token.
pub const SENTINEL: &str = "<star>";

/// One unit the acoustic model aligns against: a romanized word, or the
/// leading sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub index: usize,
    pub raw_text: String,
    pub normalized: String,
    pub romanized: String,
    /// Owning segment; `None` only for the sentinel.
    pub segment: Option<usize>,
}

impl Token {
    pub fn sentinel() -> Self {
        Self {
            index: 0,
            raw_text: String::new(),
            normalized: SENTINEL.to_string(),
            romanized: SENTINEL.to_string(),
            segment: None,
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.segment.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment {
    pub index: usize,
    pub raw_text: String,
    /// Romanized form of the whole segment, as handed to the model.
    pub romanized: String,
    /// Ascending token indices; empty when nothing in the segment is alignable.
    pub token_indices: Vec<usize>,
}

/// Sentinel-prefixed tokens plus the acoustic symbol ids each one expands to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSequence {
    pub tokens: Vec<Token>,
    pub symbols: Vec<Vec<usize>>,
    pub segments: Vec<TextSegment>,
}

/// Frame-indexed log-probabilities over the acoustic vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct EmissionMatrix {
    log_probs: Vec<Vec<f32>>,
    vocab_size: usize,
    stride_ms: f64,
}

impl EmissionMatrix {
    pub fn new(log_probs: Vec<Vec<f32>>, stride_ms: f64) -> Result<Self, AlignmentError> {
        let vocab_size = log_probs.first().map(Vec::len).unwrap_or(0);
        if let Some((frame, row)) = log_probs
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != vocab_size)
        {
            return Err(AlignmentError::invalid_input(format!(
                "emission row {frame} has {} columns, expected {vocab_size}",
                row.len()
            )));
        }
        if !(stride_ms.is_finite() && stride_ms > 0.0) {
            return Err(AlignmentError::invalid_input(format!(
                "emission stride must be a positive number of ms, got {stride_ms}"
            )));
        }
        Ok(Self {
            log_probs,
            vocab_size,
            stride_ms,
        })
    }

    pub fn num_frames(&self) -> usize {
        self.log_probs.len()
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn stride_ms(&self) -> f64 {
        self.stride_ms
    }

    pub fn rows(&self) -> &[Vec<f32>] {
        &self.log_probs
    }

    #[inline]
    pub fn log_prob(&self, frame: usize, symbol: usize) -> f32 {
        self.log_probs[frame][symbol]
    }

    pub fn duration_ms(&self) -> f64 {
        self.num_frames() as f64 * self.stride_ms
    }
}

/// Frames `[start_frame, end_frame)` owned by one token.
///
/// `voiced_*` narrows that to the frames spent on the token's own symbols;
/// it equals the full span when the vocabulary has no blank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSpan {
    pub token_index: usize,
    pub start_frame: usize,
    pub end_frame: usize,
    pub voiced_start: usize,
    pub voiced_end: usize,
}

impl TokenSpan {
    pub fn len(&self) -> usize {
        self.end_frame - self.start_frame
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Timed text for one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentSpan {
    pub segment_index: usize,
    pub text: String,
    pub start_time_sec: f64,
    pub end_time_sec: f64,
    pub start_time_str: String,
    pub end_time_str: String,
    pub romanized_tokens: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MediaFile {
    pub name: String,
    pub path: PathBuf,
}

impl MediaFile {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

/// Audio and text inputs sharing one base name; either side may be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub base_name: String,
    pub audio: Option<MediaFile>,
    pub text: Option<MediaFile>,
}

impl Match {
    pub fn is_complete(&self) -> bool {
        self.audio.is_some() && self.text.is_some()
    }
}
