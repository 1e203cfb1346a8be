//! moodgate-core — per-frame liveness gating and emotion classification.
//!
//! Every incoming frame is counted and annotated with the most recent
//! analysis result. Only every `sampling_interval`-th frame is down-scaled
//! and pushed through the liveness gate and, when the gate passes, the
//! emotion classifier. Model backends live behind the [`LivenessModel`] and
//! [`EmotionModel`] traits so the pipeline never depends on a runtime.

pub mod cache;
pub mod config;
pub mod emotion;
pub mod error;
pub mod frame;
pub mod liveness;
pub mod memory;
pub mod overlay;
pub mod pipeline;
pub mod resource;
pub mod sampling;

pub use cache::{AnalysisResult, CachedResult, ResultCache};
pub use config::{ConfigError, OverlayConfig, PipelineConfig, Preset};
pub use emotion::{EmotionClassifier, EmotionLabel, EmotionModel, EmotionReading, EmotionScores};
pub use error::{AnalysisError, ModelError};
pub use frame::{Frame, FrameError};
pub use liveness::{LivenessGate, LivenessModel};
pub use overlay::{AnnotatedFrame, AnnotationRenderer, OverlayError};
pub use pipeline::{FramePipeline, ProcessedFrame, Session, SessionStats, Stage};
pub use resource::SharedResource;
pub use sampling::{should_analyze, FrameCounter};
