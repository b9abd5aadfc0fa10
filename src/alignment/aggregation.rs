use crate::config::SilencePadding;
use crate::types::{SegmentSpan, TokenSequence, TokenSpan};

/// Seconds at the start of `frame`; affine in both arguments.
pub fn frame_to_time_sec(frame: usize, stride_ms: f64) -> f64 {
    frame as f64 * stride_ms / 1000.0
}

pub fn round_2dp(sec: f64) -> f64 {
    (sec * 100.0).round() / 100.0
}

/// `HH:MM:SS`, truncated to whole seconds.
pub fn format_hms(sec: f64) -> String {
    let total = sec.max(0.0).floor() as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// Millisecond boundaries of one segment before conversion to seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Bounds {
    start_ms: f64,
    end_ms: f64,
}

/// How far the edges on either side of a gap may move into it.
///
/// `shared` is false for the trailing gap, which has only one claimant.
fn gap_shares(gap_ms: f64, padding: SilencePadding, shared: bool) -> f64 {
    if gap_ms <= 0.0 {
        return 0.0;
    }
    let available = if shared { gap_ms / 2.0 } else { gap_ms };
    match padding {
        SilencePadding::Disabled => 0.0,
        SilencePadding::Even => available,
        SilencePadding::Capped(max_ms) => available.min(max_ms as f64),
    }
}

/// Hands out silence around the aligned segments.
///
/// `leading_ms` is where the sentinel's speech ends and `trailing_ms` where
/// the audio ends. Each interior gap is shared by its two neighbours; the
/// leading gap is shared with the sentinel, and the trailing gap belongs to
/// the last segment alone.
fn apply_padding(bounds: &mut [Bounds], leading_ms: f64, trailing_ms: f64, padding: SilencePadding) {
    let Some(first) = bounds.first_mut() else {
        return;
    };
    first.start_ms -= gap_shares(first.start_ms - leading_ms, padding, true);

    for i in 0..bounds.len().saturating_sub(1) {
        let gap = bounds[i + 1].start_ms - bounds[i].end_ms;
        if gap <= 0.0 {
            continue;
        }
        let take = gap_shares(gap, padding, true);
        if matches!(padding, SilencePadding::Even) {
            // share one midpoint so rounding can never open or overlap the edges
            let mid = bounds[i].end_ms + gap / 2.0;
            bounds[i].end_ms = mid;
            bounds[i + 1].start_ms = mid;
        } else {
            bounds[i].end_ms += take;
            bounds[i + 1].start_ms -= take;
        }
    }

    if let Some(last) = bounds.last_mut() {
        last.end_ms += gap_shares(trailing_ms - last.end_ms, padding, false);
    }
}

/// Merges token spans per segment, converts frames to time and applies
/// the silence padding policy.
///
/// Segment boundaries are taken from the voiced part of each token span;
/// segments without tokens get a zero-length span at the previous boundary.
pub fn aggregate_segments(
    sequence: &TokenSequence,
    spans: &[TokenSpan],
    stride_ms: f64,
    total_frames: usize,
    padding: SilencePadding,
) -> Vec<SegmentSpan> {
    let to_ms = |frame: usize| frame as f64 * stride_ms;

    let leading_ms = spans.first().map_or(0.0, |s| to_ms(s.voiced_end));
    let trailing_ms = to_ms(total_frames);

    let mut aligned: Vec<(usize, Bounds)> = sequence
        .segments
        .iter()
        .filter_map(|segment| {
            let owned = segment.token_indices.iter().filter_map(|&t| spans.get(t));
            let start = owned.clone().map(|s| s.voiced_start).min()?;
            let end = owned.map(|s| s.voiced_end).max()?;
            Some((
                segment.index,
                Bounds {
                    start_ms: to_ms(start),
                    end_ms: to_ms(end),
                },
            ))
        })
        .collect();

    let mut bounds: Vec<Bounds> = aligned.iter().map(|(_, b)| *b).collect();
    apply_padding(&mut bounds, leading_ms, trailing_ms, padding);
    for ((_, slot), padded) in aligned.iter_mut().zip(bounds) {
        *slot = padded;
    }

    let mut out = Vec::with_capacity(sequence.segments.len());
    let mut aligned_iter = aligned.into_iter().peekable();
    let mut cursor_ms = leading_ms;
    for segment in &sequence.segments {
        let bounds = match aligned_iter.peek() {
            Some((index, b)) if *index == segment.index => {
                let b = *b;
                aligned_iter.next();
                b
            }
            _ => {
                tracing::debug!(
                    segment = segment.index,
                    at_ms = cursor_ms,
                    "aggregation: segment has no alignable tokens"
                );
                Bounds {
                    start_ms: cursor_ms,
                    end_ms: cursor_ms,
                }
            }
        };
        cursor_ms = bounds.end_ms;

        let start_sec = round_2dp(bounds.start_ms / 1000.0);
        let end_sec = round_2dp(bounds.end_ms / 1000.0).max(start_sec);
        out.push(SegmentSpan {
            segment_index: segment.index,
            text: segment.raw_text.clone(),
            start_time_sec: start_sec,
            end_time_sec: end_sec,
            start_time_str: format_hms(start_sec),
            end_time_str: format_hms(end_sec),
            romanized_tokens: spaced_chars(&segment.romanized),
        });
    }
    out
}

/// `"hello world"` -> `"h e l l o w o r l d"`.
fn spaced_chars(romanized: &str) -> String {
    let mut out = String::with_capacity(romanized.len() * 2);
    for c in romanized.chars().filter(|c| !c.is_whitespace()) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push(c);
    }
    out
}
