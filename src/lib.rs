pub mod alignment;
pub mod config;
pub mod error;
pub mod matching;
pub mod output;
pub mod pipeline;
pub mod text;
pub mod types;

pub use alignment::vocabulary::Vocabulary;
pub use config::{AlignConfig, EmissionConfig, LanguageTable, Separator, SilencePadding};
pub use error::{AlignmentError, MatchRole};
pub use matching::{discover_files, match_files, MatchIssue, MatchReport};
pub use output::{FileTimestamps, Section};
pub use pipeline::audio::{FfmpegTranscoder, ScopedWav, Waveform};
pub use pipeline::batch::{BatchOptions, BatchRunner, BatchSummary, ItemOutcome, ItemReport};
pub use pipeline::builder::TimestampAlignerBuilder;
pub use pipeline::emission::{EmissionKind, SafetensorsEmissionProvider};
#[cfg(feature = "onnx")]
pub use pipeline::emission::OnnxEmissionProvider;
pub use pipeline::progress::{ItemStatus, ProgressEvent, Stage};
pub use pipeline::runtime::TimestampAligner;
pub use pipeline::traits::{
    EmissionProvider, Normalizer, ProgressSink, Romanizer, SequenceAligner, Transcoder,
};
pub use types::{EmissionMatrix, Match, MediaFile, SegmentSpan, TextSegment, Token, TokenSpan};
