use crate::alignment::viterbi::AlignmentPath;
use crate::error::AlignmentError;
use crate::types::TokenSpan;

/// Collapses a frame path into one span per token.
///
/// Spans come out in token order and tile `[0, frames)` with no gaps;
/// blank frames count toward the span of the token before them but not
/// toward its voiced range.
pub fn token_spans(path: &AlignmentPath, num_tokens: usize) -> Result<Vec<TokenSpan>, AlignmentError> {
    let mut spans: Vec<Option<TokenSpan>> = vec![None; num_tokens];

    for (frame, &state_idx) in path.frame_states.iter().enumerate() {
        let state = path.states[state_idx];
        let slot = spans.get_mut(state.token).ok_or_else(|| {
            AlignmentError::invalid_input(format!(
                "path refers to token {} but only {num_tokens} tokens exist",
                state.token
            ))
        })?;
        let span = slot.get_or_insert(TokenSpan {
            token_index: state.token,
            start_frame: frame,
            end_frame: frame + 1,
            voiced_start: frame,
            voiced_end: frame,
        });
        span.end_frame = frame + 1;
        if !state.is_blank {
            if span.voiced_end == span.voiced_start {
                span.voiced_start = frame;
            }
            span.voiced_end = frame + 1;
        }
    }

    spans
        .into_iter()
        .enumerate()
        .map(|(token, span)| {
            span.ok_or_else(|| {
                AlignmentError::invalid_input(format!("token {token} received no frames"))
            })
        })
        .collect()
}
