use std::path::Path;

use serde::Deserialize;

use crate::config::Separator;
use crate::error::AlignmentError;
use crate::types::TextSegment;

#[derive(Debug, Deserialize)]
struct ChapterText {
    verses: Vec<ChapterVerse>,
}

#[derive(Debug, Deserialize)]
struct ChapterVerse {
    text: String,
}

/// Splits `content` at every `separator` marker.
///
/// Markers are dropped, pieces are trimmed and empty pieces discarded.
pub fn split_segments(content: &str, separator: Separator) -> Vec<TextSegment> {
    let pieces: Vec<&str> = match separator {
        Separator::LineBreak => content.lines().collect(),
        other => content.split(other.marker()).collect(),
    };
    into_segments(pieces)
}

/// Segments a chapter JSON document, one segment per verse.
pub fn chapter_segments(json: &str) -> Result<Vec<TextSegment>, AlignmentError> {
    let chapter: ChapterText =
        serde_json::from_str(json).map_err(|e| AlignmentError::json("parse chapter text", e))?;
    Ok(into_segments(chapter.verses.iter().map(|v| v.text.as_str())))
}

/// Reads a text input; `.json` files are chapter documents, anything else
/// is split on `separator`.
pub fn load_segments(path: &Path, separator: Separator) -> Result<Vec<TextSegment>, AlignmentError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| AlignmentError::io("read text input", e))?;
    let is_chapter = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let segments = if is_chapter {
        chapter_segments(&content)?
    } else {
        split_segments(&content, separator)
    };
    tracing::debug!(
        path = %path.display(),
        separator = separator.as_str(),
        chapter = is_chapter,
        segments = segments.len(),
        "segmenter: loaded text"
    );
    Ok(segments)
}

fn into_segments<'a>(pieces: impl IntoIterator<Item = &'a str>) -> Vec<TextSegment> {
    pieces
        .into_iter()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .enumerate()
        .map(|(index, piece)| TextSegment {
            index,
            raw_text: piece.to_string(),
            romanized: String::new(),
            token_indices: Vec::new(),
        })
        .collect()
}
