use std::path::Path;

use crate::alignment::vocabulary::Vocabulary;
use crate::config::EmissionConfig;
use crate::error::AlignmentError;
use crate::pipeline::audio::FfmpegTranscoder;
use crate::pipeline::defaults::ViterbiSequenceAligner;
use crate::pipeline::emission::{build_emission_provider, EmissionKind};
use crate::pipeline::progress::TracingProgress;
use crate::pipeline::runtime::{TimestampAligner, TimestampAlignerParts};
use crate::pipeline::traits::{
    EmissionProvider, Normalizer, ProgressSink, Romanizer, SequenceAligner, Transcoder,
};
use crate::text::normalizer::{AsciiFoldRomanizer, BasicNormalizer};

pub struct TimestampAlignerBuilder {
    config: EmissionConfig,
    emission_kind: EmissionKind,
    vocab: Option<Vocabulary>,
    emission_provider: Option<Box<dyn EmissionProvider>>,
    normalizer: Option<Box<dyn Normalizer>>,
    romanizer: Option<Box<dyn Romanizer>>,
    transcoder: Option<Box<dyn Transcoder>>,
    sequence_aligner: Option<Box<dyn SequenceAligner>>,
    progress: Option<Box<dyn ProgressSink>>,
}

impl TimestampAlignerBuilder {
    pub fn new(config: EmissionConfig) -> Self {
        Self {
            config,
            emission_kind: EmissionKind::Precomputed,
            vocab: None,
            emission_provider: None,
            normalizer: None,
            romanizer: None,
            transcoder: None,
            sequence_aligner: None,
            progress: None,
        }
    }

    pub fn with_emission_kind(mut self, emission_kind: EmissionKind) -> Self {
        self.emission_kind = emission_kind;
        self
    }

    /// Uses `vocab` instead of loading `config.vocab_path`.
    pub fn with_vocabulary(mut self, vocab: Vocabulary) -> Self {
        self.vocab = Some(vocab);
        self
    }

    pub fn with_emission_provider(mut self, emission_provider: Box<dyn EmissionProvider>) -> Self {
        self.emission_provider = Some(emission_provider);
        self
    }

    pub fn with_normalizer(mut self, normalizer: Box<dyn Normalizer>) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn with_romanizer(mut self, romanizer: Box<dyn Romanizer>) -> Self {
        self.romanizer = Some(romanizer);
        self
    }

    pub fn with_transcoder(mut self, transcoder: Box<dyn Transcoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    pub fn with_sequence_aligner(mut self, sequence_aligner: Box<dyn SequenceAligner>) -> Self {
        self.sequence_aligner = Some(sequence_aligner);
        self
    }

    pub fn with_progress(mut self, progress: Box<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn build(self) -> Result<TimestampAligner, AlignmentError> {
        let vocab = match self.vocab {
            Some(vocab) => vocab,
            None if self.config.vocab_path.is_empty() => {
                return Err(AlignmentError::configuration("no vocabulary path configured"))
            }
            None => Vocabulary::load(Path::new(&self.config.vocab_path))?,
        };
        let expected_sample_rate_hz = if self.config.expected_sample_rate_hz == 0 {
            EmissionConfig::DEFAULT_SAMPLE_RATE_HZ
        } else {
            self.config.expected_sample_rate_hz
        };

        let emission_provider = match self.emission_provider {
            Some(provider) => provider,
            None => build_emission_provider(self.emission_kind, &self.config)?,
        };
        tracing::debug!(
            provider = %emission_provider.label(),
            blank = ?vocab.blank_id(),
            sentinel = vocab.sentinel_id(),
            expected_sample_rate_hz,
            "builder: aligner ready"
        );

        Ok(TimestampAligner::from_parts(TimestampAlignerParts {
            vocab,
            expected_sample_rate_hz,
            emission_provider,
            normalizer: self.normalizer.unwrap_or_else(|| Box::new(BasicNormalizer)),
            romanizer: self.romanizer.unwrap_or_else(|| Box::new(AsciiFoldRomanizer)),
            transcoder: self
                .transcoder
                .unwrap_or_else(|| Box::new(FfmpegTranscoder::new())),
            sequence_aligner: self
                .sequence_aligner
                .unwrap_or_else(|| Box::new(ViterbiSequenceAligner)),
            progress: self.progress.unwrap_or_else(|| Box::new(TracingProgress)),
        }))
    }
}
