use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;

use moodgate_core::{ConfigError, PipelineConfig, Preset};
use moodgate_models::{ManifestError, ModelConfig, ModelManifest, OnnxOptions};

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Sampling interval, analysis resolution and overlay settings.
    pub pipeline: PipelineConfig,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the model manifest (default: `{model_dir}/models.toml`).
    pub manifest_path: PathBuf,
    /// Whether to verify model checksums before loading.
    pub verify_models: bool,
    /// Minimum live-class probability for a real verdict.
    pub liveness_threshold: f32,
    /// ONNX Runtime intra-op threads per model session.
    pub intra_threads: usize,
    /// ORT sessions kept per model; frames from different sessions only
    /// wait on each other when all of them are busy.
    pub model_sessions: usize,
    /// Frame directories to stream, one session each.
    pub sources: Vec<PathBuf>,
    /// Root directory for annotated output frames.
    pub output_dir: PathBuf,
    /// Frames between memory diagnostics (0 disables them).
    pub diagnostics_every: u64,
    /// Frames that may queue up in front of a session thread.
    pub queue_depth: usize,
}

impl Config {
    /// Load configuration from `MOODGATE_*` environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let preset = match lookup("MOODGATE_PRESET") {
            Some(name) => name.parse::<Preset>()?,
            None => Preset::default(),
        };
        let mut pipeline = preset.config();

        if let Some(raw) = lookup("MOODGATE_SAMPLING_INTERVAL") {
            if let Ok(n) = raw.trim().parse::<u32>() {
                pipeline.sampling_interval = NonZeroU32::new(n).ok_or(ConfigError::ZeroInterval)?;
            }
        }
        pipeline.analysis_width = parse_or(&lookup, "MOODGATE_ANALYSIS_WIDTH", pipeline.analysis_width);
        pipeline.analysis_height =
            parse_or(&lookup, "MOODGATE_ANALYSIS_HEIGHT", pipeline.analysis_height);
        pipeline.overlay.font_path = lookup("MOODGATE_FONT_PATH").map(PathBuf::from);
        pipeline.validate()?;

        let model_dir = lookup("MOODGATE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(moodgate_models::default_model_dir);
        let manifest_path = lookup("MOODGATE_MANIFEST")
            .map(PathBuf::from)
            .unwrap_or_else(|| model_dir.join("models.toml"));

        let sources = lookup("MOODGATE_SOURCES")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            pipeline,
            model_dir,
            manifest_path,
            verify_models: lookup("MOODGATE_VERIFY_MODELS")
                .map(|v| v != "0")
                .unwrap_or(true),
            liveness_threshold: parse_or(&lookup, "MOODGATE_LIVENESS_THRESHOLD", 0.5),
            intra_threads: parse_or(&lookup, "MOODGATE_INTRA_THREADS", 1),
            model_sessions: parse_or::<_, usize>(&lookup, "MOODGATE_MODEL_SESSIONS", 2).max(1),
            sources,
            output_dir: lookup("MOODGATE_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("moodgate-out")),
            diagnostics_every: parse_or(&lookup, "MOODGATE_DIAGNOSTICS_EVERY", 300),
            queue_depth: parse_or::<_, usize>(&lookup, "MOODGATE_QUEUE_DEPTH", 4).max(1),
        })
    }

    /// Read the manifest and assemble the model loading configuration.
    pub fn model_config(&self) -> Result<ModelConfig, ManifestError> {
        let manifest = ModelManifest::load(&self.manifest_path)?;
        Ok(ModelConfig {
            model_dir: self.model_dir.clone(),
            manifest,
            verify_integrity: self.verify_models,
            options: OnnxOptions {
                intra_threads: self.intra_threads,
                sessions: self.model_sessions,
                liveness_threshold: self.liveness_threshold,
                ..OnnxOptions::default()
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
