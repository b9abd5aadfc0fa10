use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{AlignmentError, MatchRole};
use crate::output::TIMESTAMPS_SUFFIX;
use crate::types::{Match, MediaFile};

pub const AUDIO_EXTENSIONS: [&str; 9] = ["mp3", "wav", "flac", "m4a", "ogg", "opus", "aac", "webm", "mp4"];
pub const TEXT_EXTENSIONS: [&str; 2] = ["txt", "json"];

/// A base name that only has one side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchIssue {
    pub base_name: String,
    pub missing: MatchRole,
}

impl From<&MatchIssue> for AlignmentError {
    fn from(issue: &MatchIssue) -> Self {
        AlignmentError::Matching {
            base_name: issue.base_name.clone(),
            missing: issue.missing,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchReport {
    /// One entry per base name, ordered by base name; includes incomplete ones.
    pub matches: Vec<Match>,
    pub issues: Vec<MatchIssue>,
}

impl MatchReport {
    pub fn complete(&self) -> impl Iterator<Item = &Match> {
        self.matches.iter().filter(|m| m.is_complete())
    }
}

fn role_of(name: &str) -> Option<MatchRole> {
    if name.ends_with(TIMESTAMPS_SUFFIX) {
        return None;
    }
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MatchRole::Audio)
    } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        Some(MatchRole::Text)
    } else {
        None
    }
}

fn base_name(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(name)
}

/// Pairs audio and text files that share a base name.
///
/// Files with other extensions, and our own timestamp outputs, are ignored. When several files claim the
/// same role for one base name, the first by path wins and the rest are
/// left out, so no file appears in two matches.
pub fn match_files(files: &[MediaFile]) -> MatchReport {
    let mut sorted: Vec<&MediaFile> = files.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.name.cmp(&b.name)));

    let mut groups: BTreeMap<String, Match> = BTreeMap::new();
    for file in sorted {
        let Some(role) = role_of(&file.name) else {
            tracing::debug!(file = file.name.as_str(), "matching: ignoring unsupported file");
            continue;
        };
        let key = base_name(&file.name).to_string();
        let entry = groups.entry(key.clone()).or_insert_with(|| Match {
            base_name: key,
            audio: None,
            text: None,
        });
        let slot = match role {
            MatchRole::Audio => &mut entry.audio,
            MatchRole::Text => &mut entry.text,
        };
        if let Some(existing) = slot {
            tracing::warn!(
                base_name = entry.base_name.as_str(),
                kept = %existing.path.display(),
                ignored = %file.path.display(),
                role = role.as_str(),
                "matching: duplicate file for base name"
            );
            continue;
        }
        *slot = Some(file.clone());
    }

    let matches: Vec<Match> = groups.into_values().collect();
    let issues = matches
        .iter()
        .filter_map(|m| match (&m.audio, &m.text) {
            (None, _) => Some(MatchIssue {
                base_name: m.base_name.clone(),
                missing: MatchRole::Audio,
            }),
            (_, None) => Some(MatchIssue {
                base_name: m.base_name.clone(),
                missing: MatchRole::Text,
            }),
            _ => None,
        })
        .collect();

    MatchReport { matches, issues }
}

/// Lists every file below `root` with its absolute path.
pub fn discover_files(root: &Path) -> Result<Vec<MediaFile>, AlignmentError> {
    let root = std::fs::canonicalize(root).map_err(|e| AlignmentError::io("resolve input folder", e))?;
    let mut files = Vec::new();
    let mut pending = vec![root];
    while let Some(dir) = pending.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| AlignmentError::io("list input folder", e))?;
        for entry in entries {
            let entry = entry.map_err(|e| AlignmentError::io("read folder entry", e))?;
            let file_type = entry
                .file_type()
                .map_err(|e| AlignmentError::io("read folder entry", e))?;
            let path = entry.path();
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                files.push(MediaFile::new(entry.file_name().to_string_lossy(), path));
            }
        }
    }
    files.sort();
    Ok(files)
}
