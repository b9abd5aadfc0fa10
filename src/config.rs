use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::AlignmentError;

/// Where a plain-text input is split into segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Separator {
    #[default]
    LineBreak,
    LeftBracket,
    DownArrow,
}

impl Separator {
    pub fn as_str(self) -> &'static str {
        match self {
            Separator::LineBreak => "lineBreak",
            Separator::LeftBracket => "leftBracket",
            Separator::DownArrow => "downArrow",
        }
    }

    /// The literal marker a segment boundary is written as.
    pub fn marker(self) -> &'static str {
        match self {
            Separator::LineBreak => "\n",
            Separator::LeftBracket => "[",
            Separator::DownArrow => "⬇️",
        }
    }
}

impl FromStr for Separator {
    type Err = AlignmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lineBreak" | "linebreak" | "line-break" => Ok(Separator::LineBreak),
            "leftBracket" | "leftbracket" | "left-bracket" | "[" => Ok(Separator::LeftBracket),
            "downArrow" | "downarrow" | "down-arrow" | "⬇️" | "⬇" => Ok(Separator::DownArrow),
            other => Err(AlignmentError::configuration(format!(
                "unknown separator '{other}', expected lineBreak, leftBracket or downArrow"
            ))),
        }
    }
}

/// How silence between adjacent segments is handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SilencePadding {
    /// Split every gap at its midpoint.
    Even,
    /// Keep the raw alignment boundaries.
    Disabled,
    /// Each side may take at most this many milliseconds of a gap.
    Capped(u64),
}

impl SilencePadding {
    pub fn from_ms(max_silence_padding_ms: i64) -> Result<Self, AlignmentError> {
        match max_silence_padding_ms {
            -1 => Ok(SilencePadding::Even),
            0 => Ok(SilencePadding::Disabled),
            ms if ms > 0 => Ok(SilencePadding::Capped(ms as u64)),
            other => Err(AlignmentError::configuration(format!(
                "max silence padding must be -1, 0 or a positive number of ms, got {other}"
            ))),
        }
    }
}

/// Per-run settings, built once and passed by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignConfig {
    pub separator: Separator,
    pub language: Option<String>,
    pub max_silence_padding_ms: i64,
}

impl AlignConfig {
    pub const DEFAULT_MAX_SILENCE_PADDING_MS: i64 = -1;

    pub fn silence_padding(&self) -> Result<SilencePadding, AlignmentError> {
        SilencePadding::from_ms(self.max_silence_padding_ms)
    }

    /// Fails fast on anything that would otherwise fail every item.
    pub fn validate(&self, languages: Option<&LanguageTable>) -> Result<(), AlignmentError> {
        self.silence_padding()?;
        if let Some(code) = self.language.as_deref() {
            validate_language_code(code)?;
            if let Some(table) = languages {
                table.require_alignable(code)?;
            }
        }
        Ok(())
    }
}

impl Default for AlignConfig {
    fn default() -> Self {
        Self {
            separator: Separator::default(),
            language: None,
            max_silence_padding_ms: Self::DEFAULT_MAX_SILENCE_PADDING_MS,
        }
    }
}

fn validate_language_code(code: &str) -> Result<(), AlignmentError> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_lowercase()) {
        Ok(())
    } else {
        Err(AlignmentError::configuration(format!(
            "invalid language code '{code}', expected an ISO 639-3 code such as 'eng'"
        )))
    }
}

/// Where emissions come from and how the audio must be shaped for them.
#[derive(Debug, Clone)]
pub struct EmissionConfig {
    pub model_path: String,
    pub vocab_path: String,
    pub device: String,
    pub expected_sample_rate_hz: u32,
    /// Milliseconds per emission frame; derived from audio length when unset.
    pub frame_stride_ms: Option<f64>,
}

impl EmissionConfig {
    pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 16_000;
}

impl Default for EmissionConfig {
    fn default() -> Self {
        Self {
            model_path: String::new(),
            vocab_path: String::new(),
            device: "cpu".to_string(),
            expected_sample_rate_hz: Self::DEFAULT_SAMPLE_RATE_HZ,
            frame_stride_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LanguageEntry {
    pub iso: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub align: bool,
}

/// Languages the acoustic model can align, keyed by ISO 639-3 code.
#[derive(Debug, Clone, Default)]
pub struct LanguageTable {
    entries: Vec<LanguageEntry>,
}

impl LanguageTable {
    pub fn new(entries: Vec<LanguageEntry>) -> Self {
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self, AlignmentError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| AlignmentError::io("read language table", e))?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self, AlignmentError> {
        let entries: Vec<LanguageEntry> = serde_json::from_str(data)
            .map_err(|e| AlignmentError::json("parse language table", e))?;
        Ok(Self::new(entries))
    }

    pub fn get(&self, iso: &str) -> Option<&LanguageEntry> {
        self.entries.iter().find(|entry| entry.iso == iso)
    }

    pub fn require_alignable(&self, iso: &str) -> Result<&LanguageEntry, AlignmentError> {
        match self.get(iso) {
            Some(entry) if entry.align => Ok(entry),
            Some(_) => Err(AlignmentError::configuration(format!(
                "language '{iso}' is known but not supported for alignment"
            ))),
            None => Err(AlignmentError::configuration(format!(
                "language '{iso}' is not in the language table"
            ))),
        }
    }
}
