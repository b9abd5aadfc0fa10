use std::path::{Path, PathBuf};
use std::process::Command;

use hound::{SampleFormat, WavReader};
use tempfile::TempDir;

use crate::error::AlignmentError;
use crate::pipeline::traits::Transcoder;

/// Mono samples in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate_hz: u32,
    /// File the samples were decoded from, when there is one.
    pub source: Option<PathBuf>,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate_hz: u32) -> Self {
        Self {
            samples,
            sample_rate_hz,
            source: None,
        }
    }

    pub fn duration_ms(&self) -> f64 {
        if self.sample_rate_hz == 0 {
            return 0.0;
        }
        self.samples.len() as f64 * 1000.0 / self.sample_rate_hz as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Decoded WAV on disk. A temporary file is removed when this is dropped,
/// whichever way the caller leaves.
#[derive(Debug)]
pub struct ScopedWav {
    path: PathBuf,
    _dir: Option<TempDir>,
}

impl ScopedWav {
    fn in_temp_dir(dir: TempDir, file_name: &str) -> Self {
        Self {
            path: dir.path().join(file_name),
            _dir: Some(dir),
        }
    }

    /// Refers to an existing file that must outlive this value and is not
    /// deleted.
    pub fn borrowed(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _dir: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Shells out to `ffmpeg` for decoding, resampling and downmixing.
pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self::with_program("ffmpeg")
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcoder for FfmpegTranscoder {
    fn transcode(&self, input: &Path, sample_rate_hz: u32) -> Result<ScopedWav, AlignmentError> {
        let dir = tempfile::Builder::new()
            .prefix("verse-align-")
            .tempdir()
            .map_err(|e| AlignmentError::io("create transcode directory", e))?;
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        let wav = ScopedWav::in_temp_dir(dir, &format!("{stem}_output.wav"));

        let output = Command::new(&self.program)
            .args(["-y", "-nostdin", "-loglevel", "error", "-i"])
            .arg(input)
            .args(["-ac", "1", "-ar"])
            .arg(sample_rate_hz.to_string())
            .args(["-c:a", "pcm_s16le"])
            .arg(wav.path())
            .output()
            .map_err(|e| {
                AlignmentError::transcode(format!(
                    "failed to start '{}': {e}",
                    self.program.display()
                ))
            })?;
        if !output.status.success() {
            return Err(AlignmentError::transcode(format!(
                "'{}' exited with {} for {}: {}",
                self.program.display(),
                output.status,
                input.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        tracing::debug!(
            input = %input.display(),
            output = %wav.path().display(),
            sample_rate_hz,
            "audio: transcoded"
        );
        Ok(wav)
    }
}

/// Reads a PCM or float WAV file, mixing channels down to mono.
pub fn read_wav(path: &Path) -> Result<Waveform, AlignmentError> {
    let reader = WavReader::open(path)
        .map_err(|e| AlignmentError::invalid_input(format!("failed to open WAV {}: {e}", path.display())))?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AlignmentError::invalid_input(format!("failed to read WAV samples: {e}")))?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AlignmentError::invalid_input(format!("failed to read WAV samples: {e}")))?
        }
    };

    let samples = if channels > 1 {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    } else {
        interleaved
    };

    Ok(Waveform {
        samples,
        sample_rate_hz: spec.sample_rate,
        source: Some(path.to_path_buf()),
    })
}

#[cfg(test)]
mod tests {
    use hound::{WavSpec, WavWriter};

    use super::*;

    fn write_wav(path: &Path, channels: u16, samples: &[i16]) {
        let spec = WavSpec {
            channels,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).expect("create wav");
        for &s in samples {
            writer.write_sample(s).expect("write sample");
        }
        writer.finalize().expect("finalize wav");
    }

    #[test]
    fn read_wav_scales_and_downmixes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stereo.wav");
        write_wav(&path, 2, &[16_384, 0, -16_384, -16_384]);
        let wave = read_wav(&path).unwrap();
        assert_eq!(wave.sample_rate_hz, 16_000);
        assert_eq!(wave.samples.len(), 2);
        approx::assert_abs_diff_eq!(wave.samples[0], 0.25, epsilon = 1e-4);
        approx::assert_abs_diff_eq!(wave.samples[1], -0.5, epsilon = 1e-4);
        assert_eq!(wave.source.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn read_wav_rejects_non_wav() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.wav");
        std::fs::write(&path, b"not a wav").expect("write");
        assert!(matches!(
            read_wav(&path),
            Err(AlignmentError::InvalidInput { .. })
        ));
    }

    #[test]
    fn duration_follows_sample_rate() {
        let wave = Waveform::new(vec![0.0; 8_000], 16_000);
        approx::assert_abs_diff_eq!(wave.duration_ms(), 500.0);
    }

    #[test]
    fn scoped_wav_removes_temp_dir_on_drop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dir_path = dir.path().to_path_buf();
        let wav = ScopedWav::in_temp_dir(dir, "x_output.wav");
        std::fs::write(wav.path(), b"data").expect("write");
        assert!(wav.path().exists());
        drop(wav);
        assert!(!dir_path.exists());
    }

    #[test]
    fn borrowed_wav_is_left_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("keep.wav");
        std::fs::write(&path, b"data").expect("write");
        drop(ScopedWav::borrowed(&path));
        assert!(path.exists());
    }

    #[test]
    fn missing_ffmpeg_is_transcode_error() {
        let transcoder = FfmpegTranscoder::with_program("/nonexistent/ffmpeg");
        let err = transcoder
            .transcode(Path::new("/tmp/in.mp3"), 16_000)
            .unwrap_err();
        assert!(matches!(err, AlignmentError::Transcode { .. }));
    }
}
