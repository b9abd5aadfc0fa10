use std::path::Path;

use crate::alignment::viterbi::{AlignState, AlignmentPath};
use crate::alignment::vocabulary::Vocabulary;
use crate::error::AlignmentError;
use crate::pipeline::audio::{ScopedWav, Waveform};
use crate::pipeline::progress::ProgressEvent;
use crate::types::EmissionMatrix;

pub trait Normalizer: Send + Sync {
    fn normalize(&self, raw: &str, language: Option<&str>) -> Result<String, AlignmentError>;
}

/// Output is one-to-one with `normalized`, in order.
pub trait Romanizer: Send + Sync {
    fn romanize(
        &self,
        normalized: &[String],
        language: Option<&str>,
    ) -> Result<Vec<String>, AlignmentError>;
}

pub trait EmissionProvider: Send + Sync {
    fn infer(
        &self,
        waveform: &Waveform,
        vocab: &Vocabulary,
    ) -> Result<EmissionMatrix, AlignmentError>;

    fn label(&self) -> String;
}

/// Decodes any supported input into a mono PCM WAV at `sample_rate_hz`.
pub trait Transcoder: Send + Sync {
    fn transcode(&self, input: &Path, sample_rate_hz: u32) -> Result<ScopedWav, AlignmentError>;
}

pub trait SequenceAligner: Send + Sync {
    fn align_path(
        &self,
        emissions: &EmissionMatrix,
        states: &[AlignState],
    ) -> Result<AlignmentPath, AlignmentError>;
}

pub trait ProgressSink: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}
