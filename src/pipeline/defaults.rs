use crate::alignment::viterbi::{forced_align_viterbi, AlignState, AlignmentPath};
use crate::error::AlignmentError;
use crate::pipeline::traits::SequenceAligner;
use crate::types::EmissionMatrix;

pub struct ViterbiSequenceAligner;

impl SequenceAligner for ViterbiSequenceAligner {
    fn align_path(
        &self,
        emissions: &EmissionMatrix,
        states: &[AlignState],
    ) -> Result<AlignmentPath, AlignmentError> {
        forced_align_viterbi(emissions, states)
    }
}
