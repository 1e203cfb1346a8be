use thiserror::Error;

use crate::emotion::EmotionLabel;
use crate::frame::FrameError;

/// Error returned by a model backend for a single invocation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("unexpected model output: {0}")]
    InvalidOutput(String),
}

/// Failure of one analysis cycle.
///
/// Never escapes the pipeline: the cached result is switched to the error
/// label and the next sampled frame is the retry.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] FrameError),
    #[error("liveness check failed: {0}")]
    Liveness(#[source] ModelError),
    #[error("emotion classification failed: {0}")]
    Emotion(#[source] ModelError),
    #[error("emotion model returned no scores")]
    EmptyScores,
    #[error("emotion score for {label} is not finite")]
    NonFiniteScore { label: EmotionLabel },
}
