use crate::error::AlignmentError;
use crate::types::EmissionMatrix;

const STAY: u8 = 0;
const ADVANCE: u8 = 1;
const SKIP_BLANK: u8 = 2;

/// One trellis column: a symbol of a token, or an optional blank between
/// two symbols. Blanks belong to the token before them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignState {
    pub token: usize,
    pub symbol: usize,
    pub is_blank: bool,
}

/// Best monotonic frame-to-state assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentPath {
    pub states: Vec<AlignState>,
    /// State index occupied by each frame.
    pub frame_states: Vec<usize>,
    pub score: f64,
}

/// Flattens per-token symbol ids into trellis states.
///
/// With a blank id, an optional blank state goes between consecutive symbols
/// and after the last one, except next to a symbol that already is the blank.
pub fn build_states(symbols: &[Vec<usize>], blank_id: Option<usize>) -> Vec<AlignState> {
    let symbol_count: usize = symbols.iter().map(Vec::len).sum();
    let mut states: Vec<AlignState> = Vec::with_capacity(symbol_count * 2);
    for (token, token_symbols) in symbols.iter().enumerate() {
        for &symbol in token_symbols {
            if let (Some(blank), Some(prev)) = (blank_id, states.last().copied()) {
                if symbol != blank && prev.symbol != blank {
                    states.push(AlignState {
                        token: prev.token,
                        symbol: blank,
                        is_blank: true,
                    });
                }
            }
            states.push(AlignState {
                token,
                symbol,
                is_blank: false,
            });
        }
    }
    if let (Some(blank), Some(last)) = (blank_id, states.last().copied()) {
        if last.symbol != blank {
            states.push(AlignState {
                token: last.token,
                symbol: blank,
                is_blank: true,
            });
        }
    }
    states
}

/// Fewest frames any path through `states` can use.
///
/// Every symbol state needs a frame; a blank is only unavoidable between two
/// identical symbols.
pub fn min_frames_required(states: &[AlignState]) -> usize {
    let symbols = states.iter().filter(|s| !s.is_blank).count();
    let forced_blanks = (1..states.len().saturating_sub(1))
        .filter(|&i| states[i].is_blank && states[i - 1].symbol == states[i + 1].symbol)
        .count();
    symbols + forced_blanks
}

/// Forced alignment of `states` against `emissions`.
///
/// `S[f][s]` is the best log score of being in state `s` at frame `f`. A
/// state is entered by staying, by advancing from `s-1`, or by skipping an
/// optional blank at `s-1`. On equal scores the move that makes more
/// progress wins. Only states that are reachable from frame 0 and can still
/// reach a final state are evaluated.
pub fn forced_align_viterbi(
    emissions: &EmissionMatrix,
    states: &[AlignState],
) -> Result<AlignmentPath, AlignmentError> {
    let f_len = emissions.num_frames();
    let s_len = states.len();
    let required = min_frames_required(states);
    if s_len == 0 || f_len < required || f_len == 0 {
        return Err(AlignmentError::Infeasible {
            frames: f_len,
            required: required.max(1),
        });
    }
    if let Some(bad) = states.iter().find(|s| s.symbol >= emissions.vocab_size()) {
        return Err(AlignmentError::invalid_input(format!(
            "symbol id {} is outside the emission vocabulary of {}",
            bad.symbol,
            emissions.vocab_size()
        )));
    }

    // Paths may end on the last state, or on the symbol before a trailing blank.
    let final_floor = if states[s_len - 1].is_blank && s_len >= 2 {
        s_len - 2
    } else {
        s_len - 1
    };

    let mut prev = vec![f64::NEG_INFINITY; s_len];
    let mut curr = vec![f64::NEG_INFINITY; s_len];
    let mut bp = vec![STAY; f_len * s_len];

    prev[0] = f64::from(emissions.log_prob(0, states[0].symbol));
    let mut prev_start = 0usize;
    let mut prev_end = 0usize;

    for f in 1..f_len {
        let remaining = f_len - 1 - f;
        let curr_start = final_floor.saturating_sub(2 * remaining);
        let curr_end = (2 * f).min(s_len - 1);
        curr.fill(f64::NEG_INFINITY);

        let bp_offset = f * s_len;
        for s in curr_start..=curr_end {
            let (best, step) = best_transition(&prev, s, prev_start, prev_end, states);
            curr[s] = best + f64::from(emissions.log_prob(f, states[s].symbol));
            bp[bp_offset + s] = step;
        }

        std::mem::swap(&mut prev, &mut curr);
        prev_start = curr_start;
        prev_end = curr_end;
    }

    let mut s = s_len - 1;
    if final_floor < s && prev[final_floor] > prev[s] {
        s = final_floor;
    }
    let score = prev[s];
    if !score.is_finite() {
        return Err(AlignmentError::Infeasible {
            frames: f_len,
            required,
        });
    }

    let mut frame_states = vec![0usize; f_len];
    frame_states[f_len - 1] = s;
    for f in (1..f_len).rev() {
        s = match bp[f * s_len + s] {
            ADVANCE => s - 1,
            SKIP_BLANK => s - 2,
            _ => s,
        };
        frame_states[f - 1] = s;
    }
    debug_assert_eq!(frame_states[0], 0, "backtrace must start in the first state");

    tracing::debug!(
        frames = f_len,
        states = s_len,
        score,
        "viterbi: aligned"
    );

    Ok(AlignmentPath {
        states: states.to_vec(),
        frame_states,
        score,
    })
}

#[inline(always)]
fn best_transition(
    prev: &[f64],
    s: usize,
    prev_start: usize,
    prev_end: usize,
    states: &[AlignState],
) -> (f64, u8) {
    let in_window = |p: usize| p >= prev_start && p <= prev_end;
    let mut best = f64::NEG_INFINITY;
    let mut step = STAY;

    if in_window(s) {
        best = prev[s];
    }

    if s >= 1 && in_window(s - 1) && prev[s - 1] >= best && prev[s - 1] > f64::NEG_INFINITY {
        best = prev[s - 1];
        step = ADVANCE;
    }

    if s >= 2
        && states[s - 1].is_blank
        && !states[s].is_blank
        && states[s].symbol != states[s - 2].symbol
        && in_window(s - 2)
        && prev[s - 2] >= best
        && prev[s - 2] > f64::NEG_INFINITY
    {
        best = prev[s - 2];
        step = SKIP_BLANK;
    }

    (best, step)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_symbol_states(n: usize) -> Vec<AlignState> {
        build_states(&(0..n).map(|i| vec![i]).collect::<Vec<_>>(), None)
    }

    fn emissions(rows: Vec<Vec<f32>>) -> EmissionMatrix {
        EmissionMatrix::new(rows, 20.0).unwrap()
    }

    #[test]
    fn build_states_without_blank_is_flat() {
        let states = build_states(&[vec![0], vec![1, 2]], None);
        assert_eq!(states.len(), 3);
        assert_eq!(states.iter().map(|s| s.token).collect::<Vec<_>>(), vec![0, 1, 1]);
        assert!(states.iter().all(|s| !s.is_blank));
    }

    #[test]
    fn build_states_inserts_blanks_owned_by_previous_token() {
        // sentinel is the blank itself, so no blank right after it
        let states = build_states(&[vec![0], vec![1, 2], vec![3]], Some(0));
        let layout: Vec<(usize, usize, bool)> =
            states.iter().map(|s| (s.token, s.symbol, s.is_blank)).collect();
        assert_eq!(
            layout,
            vec![
                (0, 0, false),
                (1, 1, false),
                (1, 0, true),
                (1, 2, false),
                (1, 0, true),
                (2, 3, false),
                (2, 0, true),
            ]
        );
    }

    #[test]
    fn repeated_symbols_force_a_blank_frame() {
        let states = build_states(&[vec![5], vec![1, 1]], Some(0));
        // 5, b, 1, b, 1, b
        assert_eq!(min_frames_required(&states), 4);
        let no_blank = build_states(&[vec![5], vec![1, 1]], None);
        assert_eq!(min_frames_required(&no_blank), 3);
    }

    #[test]
    fn fewer_frames_than_tokens_is_infeasible() {
        let e = emissions(vec![vec![0.0; 3]; 2]);
        let err = forced_align_viterbi(&e, &single_symbol_states(3)).unwrap_err();
        assert!(matches!(err, AlignmentError::Infeasible { frames: 2, required: 3 }));
    }

    #[test]
    fn empty_states_are_infeasible() {
        let e = emissions(vec![vec![0.0; 3]; 4]);
        assert!(matches!(
            forced_align_viterbi(&e, &[]),
            Err(AlignmentError::Infeasible { .. })
        ));
    }

    #[test]
    fn unreachable_final_state_is_infeasible() {
        let mut rows = vec![vec![0.0f32; 2]; 3];
        for row in &mut rows {
            row[1] = f32::NEG_INFINITY;
        }
        let e = emissions(rows);
        assert!(matches!(
            forced_align_viterbi(&e, &single_symbol_states(2)),
            Err(AlignmentError::Infeasible { .. })
        ));
    }

    #[test]
    fn out_of_range_symbol_is_invalid_input() {
        let e = emissions(vec![vec![0.0; 2]; 4]);
        let states = build_states(&[vec![0], vec![7]], None);
        assert!(matches!(
            forced_align_viterbi(&e, &states),
            Err(AlignmentError::InvalidInput { .. })
        ));
    }

    #[test]
    fn follows_peaked_emissions() {
        // frame 0 -> sym0, frames 1..=5 -> sym1, frames 6..=9 -> sym2
        let rows: Vec<Vec<f32>> = (0..10)
            .map(|f| {
                let hot = match f {
                    0 => 0,
                    1..=5 => 1,
                    _ => 2,
                };
                (0..3).map(|s| if s == hot { -0.01 } else { -8.0 }).collect()
            })
            .collect();
        let path = forced_align_viterbi(&emissions(rows), &single_symbol_states(3)).unwrap();
        assert_eq!(path.frame_states, vec![0, 1, 1, 1, 1, 1, 2, 2, 2, 2]);
    }

    #[test]
    fn ties_prefer_advancing() {
        // flat emissions: every path scores the same. The backtrace leaves a
        // state as soon as a tie allows, so later tokens keep one frame each
        // and the sentinel absorbs the rest.
        let e = emissions(vec![vec![-1.0; 3]; 5]);
        let path = forced_align_viterbi(&e, &single_symbol_states(3)).unwrap();
        assert_eq!(path.frame_states, vec![0, 0, 0, 1, 2]);
    }

    #[test]
    fn exact_fit_assigns_one_frame_per_state() {
        let e = emissions(vec![vec![-2.0; 4]; 4]);
        let path = forced_align_viterbi(&e, &single_symbol_states(4)).unwrap();
        assert_eq!(path.frame_states, vec![0, 1, 2, 3]);
    }

    #[test]
    fn blank_frames_between_symbols() {
        // vocab: 0 blank, 1 'a', 2 'b'; audio: a a _ _ b
        let rows = vec![
            vec![-9.0, -0.1, -9.0],
            vec![-9.0, -0.1, -9.0],
            vec![-0.1, -9.0, -9.0],
            vec![-0.1, -9.0, -9.0],
            vec![-9.0, -9.0, -0.1],
        ];
        let states = build_states(&[vec![1], vec![2]], Some(0));
        let path = forced_align_viterbi(&emissions(rows), &states).unwrap();
        let symbols: Vec<usize> = path
            .frame_states
            .iter()
            .map(|&s| path.states[s].symbol)
            .collect();
        assert_eq!(symbols, vec![1, 1, 0, 0, 2]);
    }

    #[test]
    fn skip_blank_between_distinct_symbols() {
        let rows = vec![vec![-0.1, -9.0], vec![-9.0, -0.1]];
        let e = EmissionMatrix::new(
            rows.into_iter()
                .map(|mut r| {
                    r.insert(0, -20.0);
                    r
                })
                .collect(),
            20.0,
        )
        .unwrap();
        // symbols 1 then 2 with an optional blank (0) between
        let states = build_states(&[vec![1], vec![2]], Some(0));
        let path = forced_align_viterbi(&e, &states).unwrap();
        assert_eq!(path.states[path.frame_states[0]].symbol, 1);
        assert_eq!(path.states[path.frame_states[1]].symbol, 2);
    }

    #[test]
    fn alignment_is_deterministic() {
        let rows: Vec<Vec<f32>> = (0..40)
            .map(|f| (0..5).map(|s| -(((f * 7 + s * 3) % 11) as f32) / 3.0).collect())
            .collect();
        let e = emissions(rows);
        let states = build_states(&[vec![0], vec![1, 2], vec![3], vec![4, 1]], None);
        let a = forced_align_viterbi(&e, &states).unwrap();
        let b = forced_align_viterbi(&e, &states).unwrap();
        assert_eq!(a, b);
    }
}
