//! moodgate-models — model files and inference backends.
//!
//! The liveness and emotion models are described by a TOML manifest
//! (file name, download URL, SHA-256). Files are verified against the
//! manifest before they are handed to ONNX Runtime, and the loaded models
//! are held in a process-wide registry shared by every session.

use std::path::PathBuf;

pub mod integrity;
pub mod manifest;
pub mod onnx;
pub mod registry;

pub use integrity::{sha256_file_hex, verify_file_sha256, verify_models_dir, ModelIntegrityError};
pub use manifest::{ManifestError, ModelFile, ModelManifest, ModelRole};
pub use onnx::{ModelLoadError, OnnxEmotionModel, OnnxLivenessModel, OnnxOptions};
pub use registry::{ModelConfig, ModelSet};

/// Determine the default model directory.
///
/// When running as root (UID 0), defaults to `/var/lib/moodgate/models` (system-wide).
/// Otherwise defaults to `$XDG_DATA_HOME/moodgate/models` (~/.local/share/moodgate/models).
pub fn default_model_dir() -> PathBuf {
    if is_root() {
        PathBuf::from("/var/lib/moodgate/models")
    } else {
        let data_home = std::env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            format!("{home}/.local/share")
        });
        PathBuf::from(data_home).join("moodgate/models")
    }
}

fn is_root() -> bool {
    // SAFETY: geteuid is always safe to call.
    unsafe { libc::geteuid() == 0 }
}
