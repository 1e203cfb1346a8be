//! ONNX Runtime backends for the liveness and emotion models.
//!
//! `Session::run` needs exclusive access, so each backend keeps a small pool
//! of ORT sessions for the same model. A run takes whichever session is idle
//! and only waits when every one of them is busy.

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use image::imageops::{self, FilterType};
use image::RgbImage;
use moodgate_core::{EmotionLabel, EmotionModel, EmotionScores, LivenessModel, ModelError};
use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;
use thiserror::Error;

use crate::integrity::ModelIntegrityError;

/// Side length of the grayscale emotion model input.
const EMOTION_INPUT_SIZE: u32 = 48;

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error(transparent)]
    Integrity(#[from] ModelIntegrityError),
    #[error("failed to load ONNX model {path}: {message}")]
    Runtime { path: PathBuf, message: String },
    #[error("liveness threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OnnxOptions {
    /// Intra-op threads per session.
    pub intra_threads: usize,
    /// ORT sessions kept per model (at least one).
    pub sessions: usize,
    /// Minimum probability of the live class for a real verdict.
    pub liveness_threshold: f32,
    /// Index of the live class in the liveness model output.
    pub liveness_real_index: usize,
}

impl Default for OnnxOptions {
    fn default() -> Self {
        Self {
            intra_threads: 1,
            sessions: 2,
            liveness_threshold: 0.5,
            liveness_real_index: 1,
        }
    }
}

fn load_error<E: Display>(path: &Path) -> impl FnOnce(E) -> ModelLoadError + '_ {
    move |err| ModelLoadError::Runtime {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn inference_error<E: Display>(err: E) -> ModelError {
    ModelError::Inference(err.to_string())
}

fn build_session(path: &Path, intra_threads: usize) -> Result<Session, ModelLoadError> {
    let session = Session::builder()
        .map_err(load_error(path))?
        .with_intra_threads(intra_threads.max(1))
        .map_err(load_error(path))?
        .commit_from_file(path)
        .map_err(load_error(path))?;
    Ok(session)
}

/// Interchangeable instances of one model.
struct SessionPool<T> {
    slots: Vec<Mutex<T>>,
    next: AtomicUsize,
}

impl<T> SessionPool<T> {
    /// Build `count.max(1)` instances with `make`.
    fn build<E>(count: usize, mut make: impl FnMut() -> Result<T, E>) -> Result<Self, E> {
        let slots = (0..count.max(1))
            .map(|_| make().map(Mutex::new))
            .collect::<Result<Vec<_>, E>>()?;
        Ok(Self {
            slots,
            next: AtomicUsize::new(0),
        })
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    /// Run `f` on an idle instance, or wait for one picked round-robin.
    fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        for slot in &self.slots {
            if let Ok(mut guard) = slot.try_lock() {
                return f(&mut guard);
            }
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        let mut guard = self.slots[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

fn build_pool(path: &Path, options: &OnnxOptions) -> Result<SessionPool<Session>, ModelLoadError> {
    SessionPool::build(options.sessions, || build_session(path, options.intra_threads))
}

/// Run one pooled session on a single input tensor and copy out the first output.
fn run_single(pool: &SessionPool<Session>, input: Array4<f32>) -> Result<Vec<f32>, ModelError> {
    let tensor = Tensor::from_array(input).map_err(inference_error)?;
    pool.with(|session| -> Result<Vec<f32>, ModelError> {
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(inference_error)?;
        let (_shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(inference_error)?;
        Ok(data.to_vec())
    })
}

/// Passive liveness classifier (anti-spoofing CNN).
///
/// Input: NCHW `[1, 3, H, W]` RGB scaled to `[0, 1]` at the analysis resolution.
/// Output: class logits or probabilities; the live class sits at
/// `liveness_real_index`.
pub struct OnnxLivenessModel {
    sessions: SessionPool<Session>,
    threshold: f32,
    real_index: usize,
}

impl OnnxLivenessModel {
    pub fn load(path: &Path, options: &OnnxOptions) -> Result<Self, ModelLoadError> {
        let threshold = options.liveness_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ModelLoadError::InvalidThreshold(threshold));
        }
        let sessions = build_pool(path, options)?;
        tracing::info!(path = %path.display(), threshold, sessions = sessions.len(), "liveness model loaded");
        Ok(Self {
            sessions,
            threshold,
            real_index: options.liveness_real_index,
        })
    }
}

impl LivenessModel for OnnxLivenessModel {
    fn is_real(&self, image: &RgbImage) -> Result<bool, ModelError> {
        let output = run_single(&self.sessions, rgb_nchw(image))?;
        live_verdict(&output, self.real_index, self.threshold)
    }
}

/// Seven-class facial expression classifier.
///
/// Input: NHWC `[1, 48, 48, 1]` grayscale scaled to `[0, 1]`. The whole
/// analysis image is classified; no face has to be located first.
/// Output: seven scores in [`EmotionLabel::ALL`] order.
pub struct OnnxEmotionModel {
    sessions: SessionPool<Session>,
}

impl OnnxEmotionModel {
    pub fn load(path: &Path, options: &OnnxOptions) -> Result<Self, ModelLoadError> {
        let sessions = build_pool(path, options)?;
        tracing::info!(path = %path.display(), sessions = sessions.len(), "emotion model loaded");
        Ok(Self {
            sessions,
        })
    }
}

impl EmotionModel for OnnxEmotionModel {
    fn classify(&self, image: &RgbImage) -> Result<EmotionScores, ModelError> {
        let output = run_single(&self.sessions, gray_nhwc(image, EMOTION_INPUT_SIZE))?;
        emotion_scores(&output)
    }
}

fn rgb_nchw(image: &RgbImage) -> Array4<f32> {
    let (width, height) = image.dimensions();
    Array4::from_shape_fn(
        (1, 3, height as usize, width as usize),
        |(_, c, y, x)| image.get_pixel(x as u32, y as u32)[c] as f32 / 255.0,
    )
}

fn gray_nhwc(image: &RgbImage, size: u32) -> Array4<f32> {
    let gray = imageops::grayscale(image);
    let gray = imageops::resize(&gray, size, size, FilterType::Triangle);
    Array4::from_shape_fn((1, size as usize, size as usize, 1), |(_, y, x, _)| {
        gray.get_pixel(x as u32, y as u32)[0] as f32 / 255.0
    })
}

/// Interpret `values` as probabilities if they already are, else apply softmax.
fn to_probabilities(values: &[f32]) -> Vec<f32> {
    let sum: f32 = values.iter().sum();
    let is_distribution = values.iter().all(|v| (0.0..=1.0).contains(v)) && (sum - 1.0).abs() < 1e-3;
    if is_distribution {
        return values.to_vec();
    }
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = values.iter().map(|v| (v - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

fn live_verdict(output: &[f32], real_index: usize, threshold: f32) -> Result<bool, ModelError> {
    if output.len() < 2 || real_index >= output.len() {
        return Err(ModelError::InvalidOutput(format!(
            "liveness output has {} classes, live class index is {real_index}",
            output.len()
        )));
    }
    let probabilities = to_probabilities(output);
    let p_real = probabilities[real_index];
    if !p_real.is_finite() {
        return Err(ModelError::InvalidOutput("liveness probability is not finite".into()));
    }
    Ok(p_real >= threshold)
}

fn emotion_scores(output: &[f32]) -> Result<EmotionScores, ModelError> {
    if output.len() != EmotionLabel::ALL.len() {
        return Err(ModelError::InvalidOutput(format!(
            "expected {} emotion scores, got {}",
            EmotionLabel::ALL.len(),
            output.len()
        )));
    }
    Ok(EmotionLabel::ALL
        .iter()
        .zip(to_probabilities(output))
        .map(|(label, p)| (*label, p * 100.0))
        .collect())
}
