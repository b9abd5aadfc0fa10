use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor, D};

use crate::alignment::vocabulary::Vocabulary;
use crate::config::EmissionConfig;
use crate::error::AlignmentError;
use crate::pipeline::audio::Waveform;
use crate::pipeline::traits::EmissionProvider;
use crate::types::EmissionMatrix;

const LOGIT_TENSOR_NAMES: [&str; 2] = ["logits", "emissions"];

/// Where emissions come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmissionKind {
    /// Logits computed ahead of time, one safetensors file per audio file.
    #[default]
    Precomputed,
    /// An exported ONNX CTC model run on the waveform.
    Onnx,
}

pub(crate) fn build_emission_provider(
    kind: EmissionKind,
    config: &EmissionConfig,
) -> Result<Box<dyn EmissionProvider>, AlignmentError> {
    if config.model_path.is_empty() {
        return Err(AlignmentError::configuration(
            "no emissions directory or model path configured",
        ));
    }
    match kind {
        EmissionKind::Precomputed => {
            let mut provider = SafetensorsEmissionProvider::new(&config.model_path);
            if let Some(stride_ms) = config.frame_stride_ms {
                provider = provider.with_stride_ms(stride_ms);
            }
            Ok(Box::new(provider))
        }
        EmissionKind::Onnx => build_onnx_provider(config),
    }
}

#[cfg(feature = "onnx")]
fn build_onnx_provider(config: &EmissionConfig) -> Result<Box<dyn EmissionProvider>, AlignmentError> {
    let mut provider = OnnxEmissionProvider::load(config)?;
    if let Some(stride_ms) = config.frame_stride_ms {
        provider = provider.with_stride_ms(stride_ms);
    }
    Ok(Box::new(provider))
}

#[cfg(not(feature = "onnx"))]
fn build_onnx_provider(_config: &EmissionConfig) -> Result<Box<dyn EmissionProvider>, AlignmentError> {
    Err(AlignmentError::configuration(
        "ONNX emissions need a build with the `onnx` feature",
    ))
}

/// Reads logits precomputed by an external acoustic model from
/// `<dir>/<audio stem>.safetensors` and turns them into log-probabilities.
pub struct SafetensorsEmissionProvider {
    dir: PathBuf,
    stride_ms: Option<f64>,
}

impl SafetensorsEmissionProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            stride_ms: None,
        }
    }

    /// Fixed frame stride; without one the stride is audio duration / frames.
    pub fn with_stride_ms(mut self, stride_ms: f64) -> Self {
        self.stride_ms = Some(stride_ms);
        self
    }

    fn logits_path(&self, waveform: &Waveform) -> Result<PathBuf, AlignmentError> {
        let stem = waveform
            .source
            .as_deref()
            .and_then(Path::file_stem)
            .ok_or_else(|| {
                AlignmentError::emission("locate logits", "waveform has no source file name")
            })?;
        let mut file_name = stem.to_os_string();
        file_name.push(".safetensors");
        Ok(self.dir.join(file_name))
    }
}

impl EmissionProvider for SafetensorsEmissionProvider {
    fn infer(
        &self,
        waveform: &Waveform,
        vocab: &Vocabulary,
    ) -> Result<EmissionMatrix, AlignmentError> {
        let path = self.logits_path(waveform)?;
        let mut tensors = candle_core::safetensors::load(&path, &Device::Cpu)
            .map_err(|e| AlignmentError::emission("load safetensors", e))?;
        let logits = LOGIT_TENSOR_NAMES
            .iter()
            .find_map(|name| tensors.remove(*name))
            .ok_or_else(|| {
                AlignmentError::emission(
                    "load safetensors",
                    format!("{} has no 'logits' or 'emissions' tensor", path.display()),
                )
            })?;

        let mut log_probs = logits_to_log_probs(&logits)?;
        append_sentinel_column(&mut log_probs, vocab);
        let stride_ms = resolve_stride_ms(self.stride_ms, waveform, log_probs.len())?;
        let emissions = EmissionMatrix::new(log_probs, stride_ms)?;
        check_vocab_width(&emissions, vocab)?;

        tracing::debug!(
            path = %path.display(),
            frames = emissions.num_frames(),
            vocab_size = emissions.vocab_size(),
            stride_ms,
            "emission: loaded precomputed logits"
        );
        Ok(emissions)
    }

    fn label(&self) -> String {
        format!("safetensors:{}", self.dir.display())
    }
}

/// `[F, V]` or `[1, F, V]` logits to row-major log-probabilities.
fn logits_to_log_probs(logits: &Tensor) -> Result<Vec<Vec<f32>>, AlignmentError> {
    let logits = match logits.dims() {
        [_, _] => logits.clone(),
        [1, _, _] => logits
            .squeeze(0)
            .map_err(|e| AlignmentError::emission("squeeze batch", e))?,
        dims => {
            return Err(AlignmentError::emission(
                "read logits",
                format!("unsupported logits shape {dims:?}; expected [F, V] or [1, F, V]"),
            ))
        }
    };
    let log_probs = logits
        .to_dtype(DType::F32)
        .and_then(|t| candle_nn::ops::log_softmax(&t, D::Minus1))
        .map_err(|e| AlignmentError::emission("log_softmax", e))?;
    log_probs
        .to_vec2::<f32>()
        .map_err(|e| AlignmentError::emission("to_vec2", e))
}

pub(crate) fn resolve_stride_ms(
    configured: Option<f64>,
    waveform: &Waveform,
    frames: usize,
) -> Result<f64, AlignmentError> {
    if let Some(stride_ms) = configured {
        return Ok(stride_ms);
    }
    if frames == 0 || waveform.is_empty() {
        return Err(AlignmentError::invalid_input(
            "cannot derive frame stride from empty audio or emissions",
        ));
    }
    Ok(waveform.duration_ms() / frames as f64)
}

/// Dictionaries that list `<star>` right after the model's own labels need
/// one column the model never produces. It is filled with log-probability 0
/// so the sentinel absorbs whatever the text does not cover.
pub(crate) fn append_sentinel_column(rows: &mut [Vec<f32>], vocab: &Vocabulary) {
    let sentinel = vocab.sentinel_id();
    if vocab.blank_id() == Some(sentinel) || rows.iter().any(|row| row.len() != sentinel) {
        return;
    }
    for row in rows.iter_mut() {
        row.push(0.0);
    }
    tracing::debug!(column = sentinel, "emission: appended sentinel column");
}

pub(crate) fn check_vocab_width(
    emissions: &EmissionMatrix,
    vocab: &Vocabulary,
) -> Result<(), AlignmentError> {
    let needed = vocab.min_emission_width();
    if emissions.num_frames() > 0 && emissions.vocab_size() < needed {
        return Err(AlignmentError::emission(
            "check vocabulary",
            format!(
                "emissions have {} columns but the vocabulary needs {needed}",
                emissions.vocab_size()
            ),
        ));
    }
    Ok(())
}

/// Runs an exported CTC acoustic model on the waveform.
#[cfg(feature = "onnx")]
pub struct OnnxEmissionProvider {
    session: std::sync::Mutex<ort::session::Session>,
    device_label: String,
    stride_ms: Option<f64>,
}

#[cfg(feature = "onnx")]
impl OnnxEmissionProvider {
    pub fn load(config: &EmissionConfig) -> Result<Self, AlignmentError> {
        let device_label = parse_onnx_device(config.device.as_str())?;
        let execution_providers = match device_label {
            "cuda" => vec![
                ort::ep::CUDA::default().build(),
                ort::ep::CPU::default().build(),
            ],
            _ => vec![ort::ep::CPU::default().build()],
        };
        let session = ort::session::Session::builder()
            .map_err(|e| AlignmentError::emission("onnx session builder", e))?
            .with_execution_providers(execution_providers)
            .map_err(|e| AlignmentError::emission("onnx execution providers", e))?
            .commit_from_file(Path::new(&config.model_path))
            .map_err(|e| AlignmentError::emission("onnx model load", e))?;

        tracing::info!(
            inputs = session.inputs().len(),
            outputs = session.outputs().len(),
            model_path = %config.model_path,
            device = device_label,
            "emission: ONNX model loaded"
        );
        Ok(Self {
            session: std::sync::Mutex::new(session),
            device_label: device_label.to_string(),
            stride_ms: None,
        })
    }

    pub fn with_stride_ms(mut self, stride_ms: f64) -> Self {
        self.stride_ms = Some(stride_ms);
        self
    }
}

#[cfg(feature = "onnx")]
impl EmissionProvider for OnnxEmissionProvider {
    fn infer(
        &self,
        waveform: &Waveform,
        vocab: &Vocabulary,
    ) -> Result<EmissionMatrix, AlignmentError> {
        if waveform.is_empty() {
            return Err(AlignmentError::invalid_input("audio has no samples"));
        }
        let normalized = normalize_audio(&waveform.samples);
        let input = ort::value::TensorRef::from_array_view(([1usize, normalized.len()], &normalized[..]))
            .map_err(|e| AlignmentError::emission("onnx input tensor", e))?;
        let mut session = self
            .session
            .lock()
            .map_err(|_| AlignmentError::emission("onnx session lock", "session mutex poisoned"))?;
        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| AlignmentError::emission("onnx forward pass", e))?;
        if outputs.len() == 0 {
            return Err(AlignmentError::emission(
                "onnx forward pass",
                "model produced no outputs",
            ));
        }
        let (shape, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| AlignmentError::emission("onnx extract logits", e))?;
        let dims: Vec<i64> = shape.iter().copied().collect();
        let (frames, vocab_size) = parse_logits_shape(&dims, logits.len())?;
        let mut log_probs: Vec<Vec<f32>> = logits
            .chunks(vocab_size)
            .take(frames)
            .map(log_softmax_row)
            .collect();
        append_sentinel_column(&mut log_probs, vocab);

        let stride_ms = resolve_stride_ms(self.stride_ms, waveform, frames)?;
        let emissions = EmissionMatrix::new(log_probs, stride_ms)?;
        check_vocab_width(&emissions, vocab)?;
        Ok(emissions)
    }

    fn label(&self) -> String {
        format!("onnx:{}", self.device_label)
    }
}

#[cfg(feature = "onnx")]
fn parse_onnx_device(device: &str) -> Result<&'static str, AlignmentError> {
    if device.eq_ignore_ascii_case("cpu") {
        Ok("cpu")
    } else if device.eq_ignore_ascii_case("cuda") {
        Ok("cuda")
    } else {
        Err(AlignmentError::configuration(format!(
            "unsupported ONNX device '{device}', expected 'cpu' or 'cuda'"
        )))
    }
}

#[cfg(feature = "onnx")]
fn parse_logits_shape(dims: &[i64], len: usize) -> Result<(usize, usize), AlignmentError> {
    let positive = |value: i64, name: &str| -> Result<usize, AlignmentError> {
        usize::try_from(value)
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| {
                AlignmentError::emission(
                    "onnx logits shape",
                    format!("{name} dimension must be > 0, got {value}"),
                )
            })
    };
    let (frames, vocab_size) = match dims {
        [1, t, v] | [t, v] => (positive(*t, "time")?, positive(*v, "vocab")?),
        [batch, _, _] => {
            return Err(AlignmentError::emission(
                "onnx logits shape",
                format!("batch size must be 1, got {batch}"),
            ))
        }
        _ => {
            return Err(AlignmentError::emission(
                "onnx logits shape",
                format!("unsupported rank {}; expected [1, T, V] or [T, V]", dims.len()),
            ))
        }
    };
    if frames.checked_mul(vocab_size) != Some(len) {
        return Err(AlignmentError::emission(
            "onnx logits shape",
            format!("shape/data mismatch: {frames}x{vocab_size} for {len} values"),
        ));
    }
    Ok((frames, vocab_size))
}

#[cfg(feature = "onnx")]
fn log_softmax_row(logits: &[f32]) -> Vec<f32> {
    let max_logit = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let sum_exp: f64 = logits.iter().map(|&x| ((x - max_logit) as f64).exp()).sum();
    let log_denom = max_logit + sum_exp.ln() as f32;
    logits.iter().map(|&x| x - log_denom).collect()
}

/// Zero mean, unit variance, as wav2vec2-style models expect.
#[cfg(feature = "onnx")]
fn normalize_audio(samples: &[f32]) -> Vec<f32> {
    let n = samples.len() as f64;
    let mean = samples.iter().map(|&x| x as f64).sum::<f64>() / n;
    let var = samples
        .iter()
        .map(|&x| (x as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    let std = var.sqrt().max(1e-7);
    samples
        .iter()
        .map(|&x| ((x as f64 - mean) / std) as f32)
        .collect()
}
