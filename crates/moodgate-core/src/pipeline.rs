use std::num::NonZeroU32;

use serde::Serialize;
use uuid::Uuid;

use crate::cache::{AnalysisResult, ResultCache};
use crate::config::{ConfigError, PipelineConfig};
use crate::emotion::{EmotionClassifier, EmotionReading};
use crate::error::AnalysisError;
use crate::frame::Frame;
use crate::liveness::LivenessGate;
use crate::overlay::{AnnotatedFrame, AnnotationRenderer};
use crate::sampling::FrameCounter;

/// Where a frame ended up in the per-frame state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Not sampled; rendered from the cached result.
    Skipped,
    /// Sampled, gate passed, emotion classified.
    Real,
    /// Sampled, gate rejected the face.
    Fake,
    /// Sampled, analysis failed.
    Failed,
}

/// Result of feeding one frame through the pipeline.
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    /// 1-based arrival index within the session.
    pub index: u64,
    pub stage: Stage,
    pub annotated: AnnotatedFrame,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub frames: u64,
    pub analyses: u64,
    pub real: u64,
    pub fake: u64,
    pub failures: u64,
}

/// Mutable state of one video connection.
///
/// Owned by whoever drives the connection and passed to
/// [`FramePipeline::process`] by mutable reference; dropped with the
/// connection.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    counter: FrameCounter,
    cache: ResultCache,
    stats: SessionStats,
}

impl Session {
    pub fn new(sampling_interval: NonZeroU32) -> Self {
        Self {
            id: Uuid::new_v4(),
            counter: FrameCounter::new(sampling_interval),
            cache: ResultCache::new(),
            stats: SessionStats::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn frame_count(&self) -> u64 {
        self.counter.count()
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }
}

enum Analysis {
    Real(EmotionReading),
    Fake,
    Failed {
        error: AnalysisError,
        /// Verdict produced by the gate before the failure, if it ran.
        verdict: Option<bool>,
    },
}

/// Shared, immutable per-frame orchestration.
///
/// One pipeline serves any number of sessions concurrently; all per-session
/// state lives in [`Session`].
pub struct FramePipeline {
    gate: LivenessGate,
    classifier: EmotionClassifier,
    renderer: AnnotationRenderer,
    sampling_interval: NonZeroU32,
    analysis_size: (u32, u32),
}

impl FramePipeline {
    pub fn new(
        config: &PipelineConfig,
        gate: LivenessGate,
        classifier: EmotionClassifier,
        renderer: AnnotationRenderer,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            gate,
            classifier,
            renderer,
            sampling_interval: config.sampling_interval,
            analysis_size: config.analysis_resolution(),
        })
    }

    pub fn sampling_interval(&self) -> NonZeroU32 {
        self.sampling_interval
    }

    pub fn new_session(&self) -> Session {
        Session::new(self.sampling_interval)
    }

    /// Count, maybe analyze, and annotate one frame.
    ///
    /// Always returns exactly one annotated frame. Analysis failures are
    /// folded into the session cache and never surface here.
    pub fn process(&self, session: &mut Session, frame: &Frame) -> ProcessedFrame {
        let sampled = session.counter.tick();
        let index = session.counter.count();
        session.stats.frames += 1;

        let stage = if sampled {
            session.stats.analyses += 1;
            self.commit(session, index, self.analyze(frame))
        } else {
            Stage::Skipped
        };

        let annotated = self.renderer.render(frame, session.cache.read());
        ProcessedFrame {
            index,
            stage,
            annotated,
        }
    }

    /// Resize, gate, classify. The analysis copy is dropped on return.
    fn analyze(&self, frame: &Frame) -> Analysis {
        let (width, height) = self.analysis_size;
        let small = match frame.downscale(width, height) {
            Ok(small) => small,
            Err(err) => {
                return Analysis::Failed {
                    error: err.into(),
                    verdict: None,
                }
            }
        };

        match self.gate.check(&small) {
            Err(error) => Analysis::Failed {
                error,
                verdict: None,
            },
            Ok(false) => Analysis::Fake,
            Ok(true) => match self.classifier.classify(&small) {
                Ok(reading) => Analysis::Real(reading),
                Err(error) => Analysis::Failed {
                    error,
                    verdict: Some(true),
                },
            },
        }
    }

    fn commit(&self, session: &mut Session, index: u64, analysis: Analysis) -> Stage {
        match analysis {
            Analysis::Real(reading) => {
                tracing::debug!(
                    session = %session.id,
                    frame = index,
                    emotion = %reading.label,
                    score = reading.score,
                    "analysis: real"
                );
                session.cache.update(AnalysisResult::real(reading));
                session.stats.real += 1;
                Stage::Real
            }
            Analysis::Fake => {
                tracing::debug!(session = %session.id, frame = index, "analysis: fake");
                session.cache.update(AnalysisResult::fake());
                session.stats.fake += 1;
                Stage::Fake
            }
            Analysis::Failed { error, verdict } => {
                tracing::warn!(session = %session.id, frame = index, error = %error, "analysis failed");
                // Keep the verdict from the latest gate that actually ran.
                let verdict = verdict.unwrap_or(session.cache.verdict());
                session.cache.update(AnalysisResult::failed(verdict));
                session.stats.failures += 1;
                Stage::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OverlayConfig, Preset};
    use crate::emotion::{EmotionLabel, EmotionScores};
    use crate::error::ModelError;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn frame() -> Frame {
        Frame::new(RgbImage::from_pixel(64, 48, Rgb([90, 90, 90])))
    }

    fn happy() -> EmotionScores {
        [(EmotionLabel::Happy, 82.3), (EmotionLabel::Sad, 17.7)]
            .into_iter()
            .collect()
    }

    fn pipeline(gate: LivenessGate, classifier: EmotionClassifier, interval: u32) -> FramePipeline {
        let config = PipelineConfig {
            sampling_interval: NonZeroU32::new(interval).unwrap(),
            ..Preset::MemoryConservative.config()
        };
        FramePipeline::new(
            &config,
            gate,
            classifier,
            AnnotationRenderer::plain(&OverlayConfig::default()),
        )
        .unwrap()
    }

    #[test]
    fn test_fresh_session_defaults() {
        let p = pipeline(
            LivenessGate::from_fn(|_| Ok(true)),
            EmotionClassifier::from_fn(|_| Ok(happy())),
            10,
        );
        let session = p.new_session();
        assert_eq!(session.frame_count(), 0);
        assert!(session.cache().verdict());
        assert_eq!(session.cache().label(), "Initializing...");
        assert_eq!(session.cache().score(), 0.0);
    }

    #[test]
    fn test_gate_short_circuits_classifier() {
        let classified = Arc::new(AtomicUsize::new(0));
        let counter = classified.clone();
        let p = pipeline(
            LivenessGate::from_fn(|_| Ok(false)),
            EmotionClassifier::from_fn(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(happy())
            }),
            1,
        );
        let mut session = p.new_session();
        for _ in 0..5 {
            let out = p.process(&mut session, &frame());
            assert_eq!(out.stage, Stage::Fake);
        }
        assert_eq!(classified.load(Ordering::SeqCst), 0);
        assert_eq!(session.cache().label(), "Fake Face");
        assert_eq!(session.cache().score(), 0.0);
        assert!(!session.cache().verdict());
    }

    #[test]
    fn test_models_see_analysis_resolution() {
        let p = pipeline(
            LivenessGate::from_fn(|img| Ok(img.dimensions() == (96, 96))),
            EmotionClassifier::from_fn(|img| {
                assert_eq!(img.dimensions(), (96, 96));
                Ok(happy())
            }),
            1,
        );
        let mut session = p.new_session();
        let out = p.process(&mut session, &frame());
        assert_eq!(out.stage, Stage::Real);
        assert_eq!(out.annotated.image.dimensions(), (64, 48));
    }

    #[test]
    fn test_gate_failure_preserves_previous_verdict() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let p = pipeline(
            LivenessGate::from_fn(move |_| match seen.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(false),
                _ => Err(ModelError::Inference("runtime unavailable".into())),
            }),
            EmotionClassifier::from_fn(|_| Ok(happy())),
            1,
        );
        let mut session = p.new_session();
        assert_eq!(p.process(&mut session, &frame()).stage, Stage::Fake);

        let out = p.process(&mut session, &frame());
        assert_eq!(out.stage, Stage::Failed);
        assert!(!session.cache().verdict());
        assert_eq!(session.cache().label(), "Error");
        assert_eq!(out.annotated.caption, "Error (0.0%) | ❌ Fake");
    }

    #[test]
    fn test_classifier_failure_keeps_fresh_real_verdict() {
        let gate_calls = Arc::new(AtomicUsize::new(0));
        let seen = gate_calls.clone();
        let p = pipeline(
            LivenessGate::from_fn(move |_| Ok(seen.fetch_add(1, Ordering::SeqCst) > 0)),
            EmotionClassifier::from_fn(|_| Err(ModelError::Inference("bad tensor".into()))),
            1,
        );
        let mut session = p.new_session();
        assert_eq!(p.process(&mut session, &frame()).stage, Stage::Fake);

        // Gate now says real, classifier fails: verdict is the one just computed.
        let out = p.process(&mut session, &frame());
        assert_eq!(out.stage, Stage::Failed);
        assert!(session.cache().verdict());
        assert_eq!(out.annotated.caption, "Error (0.0%) | ✅ Real");
    }

    #[test]
    fn test_malformed_frame_still_renders() {
        let p = pipeline(
            LivenessGate::from_fn(|_| Ok(true)),
            EmotionClassifier::from_fn(|_| Ok(happy())),
            1,
        );
        let mut session = p.new_session();
        let out = p.process(&mut session, &Frame::new(RgbImage::new(0, 0)));
        assert_eq!(out.stage, Stage::Failed);
        assert_eq!(out.annotated.caption, "Error (0.0%) | ✅ Real");
        assert_eq!(session.stats().failures, 1);
    }

    #[test]
    fn test_stats_track_outcomes() {
        let p = pipeline(
            LivenessGate::from_fn(|_| Ok(true)),
            EmotionClassifier::from_fn(|_| Ok(happy())),
            10,
        );
        let mut session = p.new_session();
        for _ in 0..35 {
            p.process(&mut session, &frame());
        }
        assert_eq!(
            session.stats(),
            SessionStats {
                frames: 35,
                analyses: 3,
                real: 3,
                fake: 0,
                failures: 0,
            }
        );
    }

    #[test]
    fn test_sessions_are_independent() {
        let p = pipeline(
            LivenessGate::from_fn(|_| Ok(true)),
            EmotionClassifier::from_fn(|_| Ok(happy())),
            10,
        );
        let mut first = p.new_session();
        let mut second = p.new_session();
        assert_ne!(first.id(), second.id());

        for _ in 0..10 {
            p.process(&mut first, &frame());
        }
        let out = p.process(&mut second, &frame());
        assert_eq!(first.cache().label(), "happy");
        assert_eq!(second.cache().label(), "Initializing...");
        assert_eq!(out.index, 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig {
            analysis_height: 0,
            ..PipelineConfig::default()
        };
        let result = FramePipeline::new(
            &config,
            LivenessGate::from_fn(|_| Ok(true)),
            EmotionClassifier::from_fn(|_| Ok(happy())),
            AnnotationRenderer::plain(&config.overlay),
        );
        assert!(matches!(result, Err(ConfigError::ZeroResolution { .. })));
    }
}
