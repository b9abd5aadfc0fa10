use crate::alignment::aggregation::aggregate_segments;
use crate::alignment::spans::token_spans;
use crate::alignment::tokenization::build_token_sequence;
use crate::alignment::viterbi::build_states;
use crate::alignment::vocabulary::Vocabulary;
use crate::config::AlignConfig;
use crate::error::{AlignmentError, MatchRole};
use crate::output::{assemble, FileTimestamps};
use crate::pipeline::audio::{read_wav, Waveform};
use crate::pipeline::progress::{ItemStatus, ProgressEvent, Stage};
use crate::pipeline::traits::{
    EmissionProvider, Normalizer, ProgressSink, Romanizer, SequenceAligner, Transcoder,
};
use crate::text::segmenter::load_segments;
use crate::types::{EmissionMatrix, Match, SegmentSpan, TextSegment};

/// Aligns one match at a time: text and audio in, timed sections out.
///
/// Holds no per-match state, so one instance can serve several threads.
pub struct TimestampAligner {
    vocab: Vocabulary,
    expected_sample_rate_hz: u32,
    normalizer: Box<dyn Normalizer>,
    romanizer: Box<dyn Romanizer>,
    transcoder: Box<dyn Transcoder>,
    emission_provider: Box<dyn EmissionProvider>,
    sequence_aligner: Box<dyn SequenceAligner>,
    progress: Box<dyn ProgressSink>,
}

pub(crate) struct TimestampAlignerParts {
    pub vocab: Vocabulary,
    pub expected_sample_rate_hz: u32,
    pub normalizer: Box<dyn Normalizer>,
    pub romanizer: Box<dyn Romanizer>,
    pub transcoder: Box<dyn Transcoder>,
    pub emission_provider: Box<dyn EmissionProvider>,
    pub sequence_aligner: Box<dyn SequenceAligner>,
    pub progress: Box<dyn ProgressSink>,
}

impl TimestampAligner {
    pub(crate) fn from_parts(parts: TimestampAlignerParts) -> Self {
        Self {
            vocab: parts.vocab,
            expected_sample_rate_hz: parts.expected_sample_rate_hz,
            normalizer: parts.normalizer,
            romanizer: parts.romanizer,
            transcoder: parts.transcoder,
            emission_provider: parts.emission_provider,
            sequence_aligner: parts.sequence_aligner,
            progress: parts.progress,
        }
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn expected_sample_rate_hz(&self) -> u32 {
        self.expected_sample_rate_hz
    }

    pub(crate) fn report(&self, stage: Stage, item: &str, status: ItemStatus) {
        self.progress.report(&ProgressEvent::new(stage, item, status));
    }

    /// Runs one complete match end to end.
    ///
    /// The decoded intermediate WAV lives only inside this call.
    pub fn align_match(
        &self,
        item: &Match,
        config: &AlignConfig,
    ) -> Result<FileTimestamps, AlignmentError> {
        self.align_match_tracked(item, config, &mut Stage::Segmenting)
    }

    /// Like [`Self::align_match`], leaving in `stage` the last stage that
    /// was started, which is the one that failed on error.
    pub(crate) fn align_match_tracked(
        &self,
        item: &Match,
        config: &AlignConfig,
        stage: &mut Stage,
    ) -> Result<FileTimestamps, AlignmentError> {
        let missing = |missing| AlignmentError::Matching {
            base_name: item.base_name.clone(),
            missing,
        };
        *stage = Stage::Matching;
        let audio = item.audio.as_ref().ok_or_else(|| missing(MatchRole::Audio))?;
        let text = item.text.as_ref().ok_or_else(|| missing(MatchRole::Text))?;
        let name = item.base_name.as_str();

        self.enter(stage, Stage::Segmenting, name);
        let segments = load_segments(&text.path, config.separator)?;

        self.enter(stage, Stage::Transcoding, name);
        let wav = self
            .transcoder
            .transcode(&audio.path, self.expected_sample_rate_hz)?;
        let mut waveform = read_wav(wav.path())?;
        drop(wav);
        // providers key precomputed data on the source media, not the temp file
        waveform.source = Some(audio.path.clone());

        let spans = self.align_waveform_tracked(name, segments, &waveform, config, stage)?;

        tracing::info!(
            item = name,
            sections = spans.len(),
            audio = %audio.path.display(),
            "aligned match"
        );
        assemble(item, spans)
    }

    /// Aligns already segmented text against decoded audio.
    pub fn align_waveform(
        &self,
        item: &str,
        segments: Vec<TextSegment>,
        waveform: &Waveform,
        config: &AlignConfig,
    ) -> Result<Vec<SegmentSpan>, AlignmentError> {
        self.align_waveform_tracked(item, segments, waveform, config, &mut Stage::Inference)
    }

    fn align_waveform_tracked(
        &self,
        item: &str,
        segments: Vec<TextSegment>,
        waveform: &Waveform,
        config: &AlignConfig,
        stage: &mut Stage,
    ) -> Result<Vec<SegmentSpan>, AlignmentError> {
        if waveform.is_empty() {
            return Err(AlignmentError::invalid_input(format!("audio for '{item}' has no samples")));
        }
        if waveform.sample_rate_hz != self.expected_sample_rate_hz {
            tracing::warn!(
                item,
                expected_rate_hz = self.expected_sample_rate_hz,
                actual_rate_hz = waveform.sample_rate_hz,
                "audio sample rate differs from what the emission provider expects"
            );
        }

        self.enter(stage, Stage::Inference, item);
        let emissions = self.emission_provider.infer(waveform, &self.vocab)?;
        tracing::debug!(
            item,
            provider = %self.emission_provider.label(),
            frames = emissions.num_frames(),
            stride_ms = emissions.stride_ms(),
            "runtime: emissions ready"
        );

        self.enter(stage, Stage::Alignment, item);
        self.align_emissions(segments, &emissions, config)
    }

    fn enter(&self, stage: &mut Stage, next: Stage, item: &str) {
        *stage = next;
        self.report(next, item, ItemStatus::Started);
    }

    /// Tokenizes `segments`, runs forced alignment over `emissions` and
    /// returns one timed span per segment, in order.
    pub fn align_emissions(
        &self,
        segments: Vec<TextSegment>,
        emissions: &EmissionMatrix,
        config: &AlignConfig,
    ) -> Result<Vec<SegmentSpan>, AlignmentError> {
        let padding = config.silence_padding()?;
        let sequence = build_token_sequence(
            segments,
            self.normalizer.as_ref(),
            self.romanizer.as_ref(),
            &self.vocab,
            config.language.as_deref(),
        )?;
        if sequence.tokens.len() < 2 {
            return Err(AlignmentError::Infeasible {
                frames: emissions.num_frames(),
                required: 0,
            });
        }

        let states = build_states(&sequence.symbols, self.vocab.blank_id());
        let path = self.sequence_aligner.align_path(emissions, &states)?;
        let spans = token_spans(&path, sequence.tokens.len())?;
        tracing::debug!(
            tokens = sequence.tokens.len(),
            states = states.len(),
            frames = emissions.num_frames(),
            score = path.score,
            "runtime: token spans ready"
        );

        Ok(aggregate_segments(
            &sequence,
            &spans,
            emissions.stride_ms(),
            emissions.num_frames(),
            padding,
        ))
    }
}
