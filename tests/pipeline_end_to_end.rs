use std::collections::HashMap;
use std::path::Path;
use std::sync::mpsc::Receiver;

use hound::{SampleFormat, WavSpec, WavWriter};
use tempfile::TempDir;
use verse_align::pipeline::progress::ChannelProgress;
use verse_align::{
    discover_files, match_files, AlignConfig, AlignmentError, BatchOptions, BatchRunner,
    EmissionConfig, EmissionMatrix, EmissionProvider, FileTimestamps, ItemOutcome, ItemStatus,
    MatchRole, ProgressEvent, ScopedWav, Separator, Stage, TimestampAligner,
    TimestampAlignerBuilder, Transcoder, Vocabulary, Waveform,
};

const STRIDE_MS: f64 = 20.0;
const SAMPLES_PER_FRAME: usize = 320;
const VOCAB_JSON: &str = r#"{"<blank>": 0, "<star>": 1, "h": 2, "e": 3, "l": 4,
    "o": 5, "w": 6, "r": 7, "d": 8}"#;

/// Writes a silent WAV per input instead of calling ffmpeg.
struct SilentTranscoder {
    dir: TempDir,
    frames: usize,
}

impl Transcoder for SilentTranscoder {
    fn transcode(&self, input: &Path, sample_rate_hz: u32) -> Result<ScopedWav, AlignmentError> {
        let stem = input.file_stem().unwrap().to_string_lossy().into_owned();
        let path = self.dir.path().join(format!("{stem}.wav"));
        let spec = WavSpec {
            channels: 1,
            sample_rate: sample_rate_hz,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..self.frames * SAMPLES_PER_FRAME {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
        Ok(ScopedWav::borrowed(path))
    }
}

/// Serves fixed emissions keyed by the audio file stem.
struct ScriptedEmissions {
    by_stem: HashMap<String, EmissionMatrix>,
}

impl EmissionProvider for ScriptedEmissions {
    fn infer(
        &self,
        waveform: &Waveform,
        _vocab: &Vocabulary,
    ) -> Result<EmissionMatrix, AlignmentError> {
        let stem = waveform
            .source
            .as_deref()
            .and_then(Path::file_stem)
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.by_stem.get(&stem).cloned().ok_or_else(|| AlignmentError::EmissionProvider {
            context: "scripted lookup",
            message: format!("no emissions for '{stem}'"),
        })
    }

    fn label(&self) -> String {
        "scripted".to_string()
    }
}

/// One frame per listed symbol, strongly peaked on it.
fn peaked(frame_symbols: &[usize]) -> EmissionMatrix {
    let rows = frame_symbols
        .iter()
        .map(|&target| {
            (0..9)
                .map(|sym| if sym == target { -0.01 } else { -10.0 })
                .collect()
        })
        .collect();
    EmissionMatrix::new(rows, STRIDE_MS).unwrap()
}

// <star> | h e l _ l o _ _ | w o r l d _
const HELLO_WORLD_FRAMES: [usize; 15] = [1, 2, 3, 4, 0, 4, 5, 0, 0, 6, 5, 7, 4, 8, 0];

/// Fails every transcode, as a missing or broken ffmpeg would.
struct BrokenTranscoder;

impl Transcoder for BrokenTranscoder {
    fn transcode(&self, input: &Path, _sample_rate_hz: u32) -> Result<ScopedWav, AlignmentError> {
        Err(AlignmentError::Transcode {
            message: format!("cannot decode {}", input.display()),
        })
    }
}

fn build_aligner(progress: ChannelProgress) -> TimestampAligner {
    build_aligner_with(
        progress,
        Box::new(SilentTranscoder {
            dir: tempfile::tempdir().unwrap(),
            frames: HELLO_WORLD_FRAMES.len(),
        }),
    )
}

fn build_aligner_with(progress: ChannelProgress, transcoder: Box<dyn Transcoder>) -> TimestampAligner {
    let mut by_stem = HashMap::new();
    by_stem.insert("verse1".to_string(), peaked(&HELLO_WORLD_FRAMES));
    // fewer frames than "hello" has letters
    by_stem.insert("verse3".to_string(), peaked(&[1, 2, 3]));

    TimestampAlignerBuilder::new(EmissionConfig::default())
        .with_vocabulary(Vocabulary::from_json(VOCAB_JSON).unwrap())
        .with_emission_provider(Box::new(ScriptedEmissions { by_stem }))
        .with_transcoder(transcoder)
        .with_progress(Box::new(progress))
        .build()
        .unwrap()
}

fn input_folder() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("verse1.mp3"), b"fake").unwrap();
    std::fs::write(dir.path().join("verse1.txt"), "Hello,\n\nWorld!\n").unwrap();
    std::fs::write(dir.path().join("verse2.mp3"), b"fake").unwrap();
    std::fs::write(dir.path().join("verse3.mp3"), b"fake").unwrap();
    std::fs::write(dir.path().join("verse3.txt"), "Hello world").unwrap();
    dir
}

fn drain(rx: &Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    rx.try_iter().collect()
}

fn failed_stages(events: &[ProgressEvent]) -> Vec<(&str, Stage)> {
    events
        .iter()
        .filter(|e| matches!(e.status, ItemStatus::Failed(_)))
        .map(|e| (e.item.as_str(), e.stage))
        .collect()
}

fn timings(ts: &FileTimestamps) -> Vec<[f64; 2]> {
    ts.sections.iter().map(|s| s.timings).collect()
}

#[test]
fn batch_aligns_skips_and_isolates_failures() {
    let input = input_folder();
    let output = tempfile::tempdir().unwrap();
    let (tx, rx) = std::sync::mpsc::channel();
    let aligner = build_aligner(ChannelProgress::new(tx));
    let report = match_files(&discover_files(input.path()).unwrap());
    assert_eq!(report.issues.len(), 1);

    let runner = BatchRunner::new(
        &aligner,
        BatchOptions {
            output_dir: output.path().to_path_buf(),
            write_srt: true,
        },
    );
    let summary = runner.run(&report, &AlignConfig::default(), None).unwrap();
    assert_eq!(summary.succeeded(), 1);
    assert_eq!(summary.failed(), 2);
    assert!(summary.has_failures());

    let names: Vec<&str> = summary.items.iter().map(|i| i.base_name.as_str()).collect();
    assert_eq!(names, ["verse1", "verse2", "verse3"]);
    assert!(matches!(
        summary.items[1].outcome,
        ItemOutcome::Failed(AlignmentError::Matching {
            missing: MatchRole::Text,
            ..
        })
    ));
    assert!(matches!(
        summary.items[2].outcome,
        ItemOutcome::Failed(AlignmentError::Infeasible { frames: 3, .. })
    ));

    let ItemOutcome::Aligned(ts) = &summary.items[0].outcome else {
        panic!("verse1 should align");
    };
    assert!(ts.audio_file.ends_with("verse1.mp3"));
    assert!(ts.text_file.ends_with("verse1.txt"));
    assert_eq!(ts.sections.len(), 2);
    assert_eq!(ts.sections[0].text, "Hello,");
    assert_eq!(ts.sections[0].uroman_tokens, "h e l l o");
    // hello is voiced over frames 1..7, world over 9..14; the gap splits at 160 ms
    // and the trailing blank frame goes to the last section
    assert_eq!(timings(ts), vec![[0.02, 0.16], [0.16, 0.3]]);
    assert_eq!(ts.sections[1].timings_str, ["00:00:00".to_string(), "00:00:00".to_string()]);

    let written = std::fs::read_to_string(output.path().join("verse1_timestamps.json")).unwrap();
    let parsed: FileTimestamps = serde_json::from_str(&written).unwrap();
    assert_eq!(&parsed, ts);
    let srt = std::fs::read_to_string(output.path().join("verse1.srt")).unwrap();
    assert!(srt.starts_with("1\n00:00:00,020 --> 00:00:00,160\nHello,\n\n2\n"));
    assert!(!output.path().join("verse3_timestamps.json").exists());

    let events = drain(&rx);
    let finished: Vec<(&str, &ItemStatus)> = events
        .iter()
        .filter(|e| e.status != ItemStatus::Started)
        .map(|e| (e.item.as_str(), &e.status))
        .collect();
    assert_eq!(finished.len(), 3);
    assert_eq!(finished[0], ("verse1", &ItemStatus::Succeeded));
    assert!(matches!(finished[1], ("verse2", ItemStatus::Failed(_))));
    assert!(matches!(finished[2], ("verse3", ItemStatus::Failed(_))));
    assert_eq!(
        failed_stages(&events),
        vec![("verse2", Stage::Matching), ("verse3", Stage::Alignment)]
    );

    // a second run reuses the stored result
    let again = runner.run(&report, &AlignConfig::default(), None).unwrap();
    assert_eq!(again.succeeded(), 0);
    assert_eq!(again.skipped(), 1);
    assert_eq!(again.timestamps(), vec![ts]);
    assert!(drain(&rx)
        .iter()
        .any(|e| e.item == "verse1" && e.status == ItemStatus::Skipped));
}

#[test]
fn failures_are_reported_at_the_stage_that_failed() {
    let input = tempfile::tempdir().unwrap();
    std::fs::write(input.path().join("verse4.mp3"), b"fake").unwrap();
    std::fs::write(input.path().join("verse4.json"), "{ not a chapter").unwrap();
    // no scripted emissions exist for this stem
    std::fs::write(input.path().join("verse5.mp3"), b"fake").unwrap();
    std::fs::write(input.path().join("verse5.txt"), "Hello").unwrap();
    let output = tempfile::tempdir().unwrap();
    let (tx, rx) = std::sync::mpsc::channel();
    let aligner = build_aligner(ChannelProgress::new(tx));
    let report = match_files(&discover_files(input.path()).unwrap());
    let options = BatchOptions {
        output_dir: output.path().to_path_buf(),
        write_srt: false,
    };

    let summary = BatchRunner::new(&aligner, options.clone())
        .run(&report, &AlignConfig::default(), None)
        .unwrap();
    assert_eq!(summary.failed(), 2);
    assert_eq!(
        failed_stages(&drain(&rx)),
        vec![("verse4", Stage::Segmenting), ("verse5", Stage::Inference)]
    );

    let (tx, rx) = std::sync::mpsc::channel();
    let broken = build_aligner_with(ChannelProgress::new(tx), Box::new(BrokenTranscoder));
    let summary = BatchRunner::new(&broken, options)
        .run(&report, &AlignConfig::default(), None)
        .unwrap();
    assert!(matches!(
        summary.items[1].outcome,
        ItemOutcome::Failed(AlignmentError::Transcode { .. })
    ));
    assert_eq!(
        failed_stages(&drain(&rx)),
        vec![("verse4", Stage::Segmenting), ("verse5", Stage::Transcoding)]
    );
}

#[test]
fn padding_disabled_keeps_voiced_boundaries() {
    let input = input_folder();
    let output = tempfile::tempdir().unwrap();
    let (tx, _rx) = std::sync::mpsc::channel();
    let aligner = build_aligner(ChannelProgress::new(tx));
    let report = match_files(&discover_files(input.path()).unwrap());
    let config = AlignConfig {
        max_silence_padding_ms: 0,
        ..AlignConfig::default()
    };
    let summary = BatchRunner::new(
        &aligner,
        BatchOptions {
            output_dir: output.path().to_path_buf(),
            write_srt: false,
        },
    )
    .run(&report, &config, None)
    .unwrap();
    let ts = summary.timestamps()[0];
    assert_eq!(timings(ts), vec![[0.02, 0.14], [0.18, 0.28]]);
    assert!(!output.path().join("verse1.srt").exists());
}

#[test]
fn capped_padding_leaves_remaining_silence() {
    let (tx, _rx) = std::sync::mpsc::channel();
    let aligner = build_aligner(ChannelProgress::new(tx));
    let config = AlignConfig {
        max_silence_padding_ms: 10,
        ..AlignConfig::default()
    };
    let segments = verse_align::text::segmenter::split_segments("hello\nworld", Separator::LineBreak);
    let spans = aligner
        .align_emissions(segments, &peaked(&HELLO_WORLD_FRAMES), &config)
        .unwrap();
    assert_eq!((spans[0].start_time_sec, spans[0].end_time_sec), (0.02, 0.15));
    assert_eq!((spans[1].start_time_sec, spans[1].end_time_sec), (0.17, 0.29));
}

#[test]
fn configuration_error_aborts_before_any_item() {
    let input = input_folder();
    let output = tempfile::tempdir().unwrap();
    let (tx, rx) = std::sync::mpsc::channel();
    let aligner = build_aligner(ChannelProgress::new(tx));
    let report = match_files(&discover_files(input.path()).unwrap());
    let config = AlignConfig {
        max_silence_padding_ms: -7,
        ..AlignConfig::default()
    };
    let err = BatchRunner::new(
        &aligner,
        BatchOptions {
            output_dir: output.path().to_path_buf(),
            write_srt: false,
        },
    )
    .run(&report, &config, None)
    .unwrap_err();
    assert!(err.is_fatal());
    assert!(drain(&rx).is_empty());
    assert!(!output.path().join("verse1_timestamps.json").exists());
}

#[test]
fn text_with_nothing_alignable_is_infeasible() {
    let (tx, _rx) = std::sync::mpsc::channel();
    let aligner = build_aligner(ChannelProgress::new(tx));
    let segments = verse_align::text::segmenter::split_segments("123\n456", Separator::LineBreak);
    let err = aligner
        .align_emissions(segments, &peaked(&HELLO_WORLD_FRAMES), &AlignConfig::default())
        .unwrap_err();
    assert!(matches!(err, AlignmentError::Infeasible { .. }));
}

#[test]
fn aligner_is_shareable_across_threads() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<TimestampAligner>();
}
