//! Liveness gate ahead of emotion classification.
//!
//! The gate asks a liveness model whether the down-scaled analysis image
//! shows a live subject. A negative verdict short-circuits the cycle: the
//! emotion classifier is not invoked and the frame is reported as fake.
//!
//! # Model contract
//!
//! - **Input:** the analysis copy of the frame at the configured analysis
//!   resolution. It is only borrowed for the duration of the call, so a model
//!   cannot hold on to the buffer across frames.
//! - **Output:** a binary real/fake verdict. Confidence stays inside the
//!   backend.
//! - **Failure:** any [`ModelError`] is reported as an analysis failure for
//!   that cycle, never as a crash.

use std::sync::Arc;

use image::RgbImage;

use crate::error::{AnalysisError, ModelError};

/// A liveness classifier. Implementations must be side-effect free with
/// respect to the image and safe to share across sessions.
pub trait LivenessModel: Send + Sync {
    fn is_real(&self, image: &RgbImage) -> Result<bool, ModelError>;
}

impl<F> LivenessModel for F
where
    F: Fn(&RgbImage) -> Result<bool, ModelError> + Send + Sync,
{
    fn is_real(&self, image: &RgbImage) -> Result<bool, ModelError> {
        self(image)
    }
}

/// Binary gate wrapping a shared [`LivenessModel`].
#[derive(Clone)]
pub struct LivenessGate {
    model: Arc<dyn LivenessModel>,
}

impl LivenessGate {
    pub fn new(model: Arc<dyn LivenessModel>) -> Self {
        Self { model }
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&RgbImage) -> Result<bool, ModelError> + Send + Sync + 'static,
    {
        Self::new(Arc::new(f))
    }

    /// Run the liveness model on the analysis image.
    pub fn check(&self, image: &RgbImage) -> Result<bool, AnalysisError> {
        let verdict = self.model.is_real(image).map_err(AnalysisError::Liveness)?;
        tracing::trace!(verdict, "liveness verdict");
        Ok(verdict)
    }
}

impl std::fmt::Debug for LivenessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivenessGate").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn image() -> RgbImage {
        RgbImage::new(96, 96)
    }

    #[test]
    fn test_real_verdict_passes_through() {
        let gate = LivenessGate::from_fn(|_| Ok(true));
        assert!(gate.check(&image()).unwrap());
    }

    #[test]
    fn test_fake_verdict_passes_through() {
        let gate = LivenessGate::from_fn(|_| Ok(false));
        assert!(!gate.check(&image()).unwrap());
    }

    #[test]
    fn test_model_error_becomes_liveness_failure() {
        let gate = LivenessGate::from_fn(|_| Err(ModelError::Inference("session closed".into())));
        let err = gate.check(&image()).unwrap_err();
        assert!(matches!(err, AnalysisError::Liveness(ModelError::Inference(_))));
    }

    #[test]
    fn test_model_sees_analysis_resolution() {
        let gate = LivenessGate::from_fn(|img| Ok(img.dimensions() == (96, 96)));
        assert!(gate.check(&image()).unwrap());
        assert!(!gate.check(&RgbImage::new(224, 224)).unwrap());
    }

    #[test]
    fn test_gate_clones_share_model() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let gate = LivenessGate::from_fn(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        });
        let other = gate.clone();
        gate.check(&image()).unwrap();
        other.check(&image()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
