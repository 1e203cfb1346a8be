use std::path::PathBuf;
use std::sync::Arc;

use moodgate_core::{EmotionClassifier, LivenessGate, SharedResource};

use crate::integrity::verify_models_dir;
use crate::manifest::ModelManifest;
use crate::onnx::{ModelLoadError, OnnxEmotionModel, OnnxLivenessModel, OnnxOptions};

/// Where the models live and how to load them.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub model_dir: PathBuf,
    pub manifest: ModelManifest,
    /// Check SHA-256 of every model file before loading.
    pub verify_integrity: bool,
    pub options: OnnxOptions,
}

impl ModelConfig {
    pub fn liveness_path(&self) -> PathBuf {
        self.model_dir.join(&self.manifest.liveness.file)
    }

    pub fn emotion_path(&self) -> PathBuf {
        self.model_dir.join(&self.manifest.emotion.file)
    }
}

/// Both loaded models. Built once per process and shared read-only.
pub struct ModelSet {
    liveness: Arc<OnnxLivenessModel>,
    emotion: Arc<OnnxEmotionModel>,
}

static MODELS: SharedResource<ModelSet> = SharedResource::new();

impl ModelSet {
    /// Verify (optionally) and load both models. Expensive.
    pub fn load(config: &ModelConfig) -> Result<Self, ModelLoadError> {
        if config.verify_integrity {
            verify_models_dir(&config.model_dir, &config.manifest)?;
        }
        let liveness = OnnxLivenessModel::load(&config.liveness_path(), &config.options)?;
        let emotion = OnnxEmotionModel::load(&config.emotion_path(), &config.options)?;
        Ok(Self {
            liveness: Arc::new(liveness),
            emotion: Arc::new(emotion),
        })
    }

    /// Process-wide model set, loaded on first call.
    ///
    /// Later calls return the already loaded set regardless of `config`. A
    /// failed load is returned to the caller and not cached.
    pub fn shared(config: &ModelConfig) -> Result<Arc<Self>, ModelLoadError> {
        MODELS.get_or_try_init(|| {
            tracing::info!(dir = %config.model_dir.display(), "loading models");
            Self::load(config)
        })
    }

    pub fn gate(&self) -> LivenessGate {
        LivenessGate::new(self.liveness.clone())
    }

    pub fn classifier(&self) -> EmotionClassifier {
        EmotionClassifier::new(self.emotion.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::ModelIntegrityError;

    fn config(dir: &str) -> ModelConfig {
        let sum = "0".repeat(64);
        ModelConfig {
            model_dir: PathBuf::from(dir),
            manifest: ModelManifest::from_toml_str(&format!(
                "[liveness]\nfile = \"live.onnx\"\nsha256 = \"{sum}\"\n\
                 [emotion]\nfile = \"mood.onnx\"\nsha256 = \"{sum}\"\n"
            ))
            .unwrap(),
            verify_integrity: true,
            options: OnnxOptions::default(),
        }
    }

    #[test]
    fn paths_join_model_dir() {
        let config = config("/opt/moodgate/models");
        assert_eq!(config.liveness_path(), PathBuf::from("/opt/moodgate/models/live.onnx"));
        assert_eq!(config.emotion_path(), PathBuf::from("/opt/moodgate/models/mood.onnx"));
    }

    #[test]
    fn missing_models_fail_load_and_are_not_cached() {
        let config = config("/nonexistent/moodgate/models");
        for _ in 0..2 {
            let err = ModelSet::shared(&config).err().unwrap();
            assert!(matches!(
                err,
                ModelLoadError::Integrity(ModelIntegrityError::MissingModel { .. })
            ));
        }
    }
}
