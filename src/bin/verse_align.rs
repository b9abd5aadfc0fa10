use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use verse_align::text::normalizer::CommandRomanizer;
use verse_align::{
    discover_files, match_files, AlignConfig, BatchOptions, BatchRunner, EmissionConfig,
    EmissionKind, FfmpegTranscoder, ItemStatus, LanguageTable, ProgressEvent, ProgressSink,
    Separator, TimestampAlignerBuilder,
};

#[derive(Debug, Parser)]
#[command(name = "verse-align")]
#[command(about = "Align verse/line text files to matching audio recordings")]
struct Args {
    /// Folder containing matching audio and text files.
    #[arg(short, long, env = "VERSE_ALIGN_INPUT")]
    input: PathBuf,
    /// JSON file receiving the timestamps of every match.
    #[arg(short, long, env = "VERSE_ALIGN_OUTPUT", default_value = "timestamps.json")]
    output: PathBuf,
    /// Folder for per-match results; defaults to the output file's folder.
    #[arg(long, env = "VERSE_ALIGN_CACHE_DIR")]
    cache_dir: Option<PathBuf>,
    /// lineBreak, leftBracket or downArrow.
    #[arg(short, long, env = "VERSE_ALIGN_SEPARATOR", default_value = "lineBreak")]
    separator: Separator,
    /// ISO 639-3 code of the text language.
    #[arg(short, long, env = "VERSE_ALIGN_LANGUAGE")]
    language: Option<String>,
    /// -1 shares silence evenly, 0 keeps raw boundaries, N caps each side at N ms.
    #[arg(
        short,
        long,
        env = "VERSE_ALIGN_MAX_SILENCE_PADDING_MS",
        default_value_t = AlignConfig::DEFAULT_MAX_SILENCE_PADDING_MS,
        allow_negative_numbers = true
    )]
    max_silence_padding_ms: i64,
    /// Acoustic vocabulary: JSON map or one symbol per line.
    #[arg(long, env = "VERSE_ALIGN_VOCAB")]
    vocab: PathBuf,
    /// Folder of `<audio stem>.safetensors` logits.
    #[arg(long, env = "VERSE_ALIGN_EMISSIONS_DIR", conflicts_with = "onnx_model")]
    emissions_dir: Option<PathBuf>,
    /// Exported CTC model; needs the `onnx` feature.
    #[arg(long, env = "VERSE_ALIGN_ONNX_MODEL")]
    onnx_model: Option<PathBuf>,
    #[arg(long, env = "VERSE_ALIGN_DEVICE", default_value = "cpu")]
    device: String,
    /// Milliseconds per emission frame; derived from audio length when unset.
    #[arg(long, env = "VERSE_ALIGN_STRIDE_MS")]
    stride_ms: Option<f64>,
    #[arg(long, env = "VERSE_ALIGN_SAMPLE_RATE", default_value_t = EmissionConfig::DEFAULT_SAMPLE_RATE_HZ)]
    sample_rate: u32,
    /// External romanizer reading lines on stdin, e.g. uroman.pl.
    #[arg(long, env = "VERSE_ALIGN_ROMANIZER")]
    romanizer: Option<PathBuf>,
    #[arg(long = "romanizer-arg", allow_hyphen_values = true)]
    romanizer_args: Vec<String>,
    #[arg(long, env = "VERSE_ALIGN_FFMPEG", default_value = "ffmpeg")]
    ffmpeg: PathBuf,
    /// Language table JSON: `[{"iso", "name", "align"}]`.
    #[arg(long, env = "VERSE_ALIGN_LANGUAGES")]
    languages: Option<PathBuf>,
    /// Also write `<base name>.srt` per match.
    #[arg(long, env = "VERSE_ALIGN_SRT", default_value_t = false)]
    srt: bool,
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Drives the progress bar and prints one status line per finished item.
struct BarProgress {
    bar: ProgressBar,
}

impl ProgressSink for BarProgress {
    fn report(&self, event: &ProgressEvent) {
        match &event.status {
            ItemStatus::Started => {
                self.bar
                    .set_message(format!("{} ({})", event.item, event.stage.as_str()));
            }
            ItemStatus::Succeeded => {
                self.bar.println(format!("aligned  {}", event.item));
                self.bar.inc(1);
            }
            ItemStatus::Skipped => {
                self.bar.println(format!("skipped  {} (already done)", event.item));
                self.bar.inc(1);
            }
            ItemStatus::Failed(reason) => {
                self.bar.println(format!("failed   {}: {reason}", event.item));
                self.bar.inc(1);
            }
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);
    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();
}

/// `Ok(false)` when at least one match failed.
fn run(args: Args) -> Result<bool> {
    let config = AlignConfig {
        separator: args.separator,
        language: args.language.clone(),
        max_silence_padding_ms: args.max_silence_padding_ms,
    };
    let languages = args
        .languages
        .as_deref()
        .map(LanguageTable::load)
        .transpose()
        .context("failed to load language table")?;
    config.validate(languages.as_ref())?;

    let (emission_kind, model_path) = match (&args.onnx_model, &args.emissions_dir) {
        (Some(model), _) => (EmissionKind::Onnx, model.clone()),
        (None, Some(dir)) => (EmissionKind::Precomputed, dir.clone()),
        (None, None) => anyhow::bail!("one of --emissions-dir or --onnx-model is required"),
    };
    let emission_config = EmissionConfig {
        model_path: model_path.to_string_lossy().into_owned(),
        vocab_path: args.vocab.to_string_lossy().into_owned(),
        device: args.device.clone(),
        expected_sample_rate_hz: args.sample_rate,
        frame_stride_ms: args.stride_ms,
    };

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );

    let mut builder = TimestampAlignerBuilder::new(emission_config)
        .with_emission_kind(emission_kind)
        .with_transcoder(Box::new(FfmpegTranscoder::with_program(&args.ffmpeg)))
        .with_progress(Box::new(BarProgress { bar: bar.clone() }));
    if let Some(program) = &args.romanizer {
        builder = builder.with_romanizer(Box::new(
            CommandRomanizer::new(program).with_args(args.romanizer_args.iter().cloned()),
        ));
    }
    let aligner = builder.build().context("failed to set up aligner")?;

    let files = discover_files(&args.input)
        .with_context(|| format!("failed to read input folder {}", args.input.display()))?;
    let report = match_files(&files);
    for issue in &report.issues {
        tracing::warn!(
            base_name = issue.base_name.as_str(),
            missing = issue.missing.as_str(),
            "can't find a match"
        );
    }
    bar.set_length(report.matches.len() as u64);

    let cache_dir = args
        .cache_dir
        .clone()
        .unwrap_or_else(|| parent_or_current(&args.output));
    let runner = BatchRunner::new(
        &aligner,
        BatchOptions {
            output_dir: cache_dir,
            write_srt: args.srt,
        },
    );
    let summary = runner.run(&report, &config, languages.as_ref())?;
    bar.finish_with_message("done");

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    verse_align::output::write_json(&args.output, &summary.timestamps())
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    eprintln!(
        "{} aligned, {} skipped, {} failed",
        summary.succeeded(),
        summary.skipped(),
        summary.failed()
    );
    Ok(!summary.has_failures())
}

fn parent_or_current(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
