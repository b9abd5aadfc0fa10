use std::collections::HashMap;
use std::path::Path;

use crate::error::AlignmentError;
use crate::types::SENTINEL;

const BLANK_SYMBOLS: [&str; 2] = ["<blank>", "<pad>"];

/// Maps romanized text to the acoustic model's emission columns.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    ids: HashMap<String, usize>,
    blank_id: Option<usize>,
    sentinel_id: usize,
}

impl Vocabulary {
    pub fn from_map(ids: HashMap<String, usize>) -> Result<Self, AlignmentError> {
        let blank_id = BLANK_SYMBOLS.iter().find_map(|s| ids.get(*s).copied());
        let sentinel_id = ids.get(SENTINEL).copied().or(blank_id).ok_or_else(|| {
            AlignmentError::configuration(format!(
                "vocabulary has neither a '{SENTINEL}' nor a blank symbol"
            ))
        })?;
        Ok(Self {
            ids,
            blank_id,
            sentinel_id,
        })
    }

    /// Loads either a JSON object (`{"a": 5, ...}`) or a line-per-symbol
    /// dictionary where the line number is the id and anything after the
    /// first whitespace (a count column) is ignored.
    pub fn load(path: &Path) -> Result<Self, AlignmentError> {
        let data =
            std::fs::read_to_string(path).map_err(|e| AlignmentError::io("read vocabulary", e))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
            || data.trim_start().starts_with('{');
        if is_json {
            Self::from_json(&data)
        } else {
            Self::from_dictionary(&data)
        }
    }

    pub fn from_json(data: &str) -> Result<Self, AlignmentError> {
        let ids: HashMap<String, usize> =
            serde_json::from_str(data).map_err(|e| AlignmentError::json("parse vocabulary", e))?;
        Self::from_map(ids)
    }

    pub fn from_dictionary(data: &str) -> Result<Self, AlignmentError> {
        let mut ids = HashMap::new();
        for (id, line) in data.lines().enumerate() {
            let symbol = line.split_whitespace().next().unwrap_or("");
            if symbol.is_empty() {
                continue;
            }
            ids.entry(symbol.to_string()).or_insert(id);
        }
        Self::from_map(ids)
    }

    pub fn id(&self, symbol: &str) -> Option<usize> {
        self.ids.get(symbol).copied()
    }

    pub fn blank_id(&self) -> Option<usize> {
        self.blank_id
    }

    pub fn sentinel_id(&self) -> usize {
        self.sentinel_id
    }

    /// Largest id + 1; emissions must have at least this many columns.
    pub fn min_emission_width(&self) -> usize {
        self.ids.values().copied().max().map_or(0, |m| m + 1)
    }

    /// Symbol ids for one romanized token, one per known character.
    /// Characters the model has no column for are dropped.
    pub fn resolve(&self, romanized: &str) -> Vec<usize> {
        if romanized == SENTINEL {
            return vec![self.sentinel_id];
        }
        let mut buf = [0u8; 4];
        romanized
            .chars()
            .filter(|c| !c.is_whitespace())
            .filter_map(|c| self.id(c.encode_utf8(&mut buf)))
            .collect()
    }
}
