//! Model manifest.
//!
//! ```toml
//! [liveness]
//! file = "liveness.onnx"
//! url = "https://example.org/models/liveness.onnx"
//! sha256 = "<64 hex digits>"
//!
//! [emotion]
//! file = "emotion.onnx"
//! url = "https://example.org/models/emotion.onnx"
//! sha256 = "<64 hex digits>"
//! ```

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid sha256 for {role} model: {value:?} (expected 64 hex digits)")]
    InvalidChecksum { role: ModelRole, value: String },
    #[error("invalid file name for {role} model: {value:?}")]
    InvalidFileName { role: ModelRole, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    Liveness,
    Emotion,
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelRole::Liveness => "liveness",
            ModelRole::Emotion => "emotion",
        })
    }
}

/// Model file descriptor: file name, download URL, expected SHA-256 checksum.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelFile {
    pub file: String,
    pub url: Option<String>,
    pub sha256: String,
    /// Human-readable size shown while downloading.
    pub size_display: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelManifest {
    pub liveness: ModelFile,
    pub emotion: ModelFile,
}

impl ModelManifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ManifestError> {
        let mut manifest: Self = toml::from_str(text)?;
        for (role, model) in [
            (ModelRole::Liveness, &mut manifest.liveness),
            (ModelRole::Emotion, &mut manifest.emotion),
        ] {
            model.sha256 = model.sha256.trim().to_ascii_lowercase();
            if model.sha256.len() != 64 || !model.sha256.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(ManifestError::InvalidChecksum {
                    role,
                    value: model.sha256.clone(),
                });
            }
            // Files must land inside the model directory.
            let mut components = Path::new(&model.file).components();
            let single_name = matches!(
                (components.next(), components.next()),
                (Some(Component::Normal(_)), None)
            );
            if !single_name {
                return Err(ManifestError::InvalidFileName {
                    role,
                    value: model.file.clone(),
                });
            }
        }
        Ok(manifest)
    }

    pub fn entries(&self) -> [(ModelRole, &ModelFile); 2] {
        [
            (ModelRole::Liveness, &self.liveness),
            (ModelRole::Emotion, &self.emotion),
        ]
    }

    pub fn get(&self, role: ModelRole) -> &ModelFile {
        match role {
            ModelRole::Liveness => &self.liveness,
            ModelRole::Emotion => &self.emotion,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIVENESS_SUM: &str = "f43c5c4c751977f33591518fe370b5c3d0d383fa0ceae6c91f1bf7ad64814aee";
    const EMOTION_SUM: &str = "3b9c4346fbead3ae18ec46b6e9a2094dc56a50a8396f02322897f224cf3078d6";

    fn manifest_text(liveness_file: &str, liveness_sum: &str) -> String {
        format!(
            r#"
[liveness]
file = "{liveness_file}"
url = "https://models.example/liveness.onnx"
sha256 = "{liveness_sum}"
size_display = "2 MB"

[emotion]
file = "emotion.onnx"
sha256 = "{EMOTION_SUM}"
"#
        )
    }

    #[test]
    fn parses_manifest() {
        let manifest =
            ModelManifest::from_toml_str(&manifest_text("liveness.onnx", LIVENESS_SUM)).unwrap();
        assert_eq!(manifest.liveness.file, "liveness.onnx");
        assert_eq!(manifest.liveness.size_display.as_deref(), Some("2 MB"));
        assert_eq!(manifest.emotion.url, None);
        assert_eq!(manifest.get(ModelRole::Emotion).sha256, EMOTION_SUM);
        let roles: Vec<_> = manifest.entries().iter().map(|(role, _)| *role).collect();
        assert_eq!(roles, vec![ModelRole::Liveness, ModelRole::Emotion]);
    }

    #[test]
    fn normalizes_checksum_case() {
        let upper = LIVENESS_SUM.to_ascii_uppercase();
        let manifest = ModelManifest::from_toml_str(&manifest_text("liveness.onnx", &upper)).unwrap();
        assert_eq!(manifest.liveness.sha256, LIVENESS_SUM);
    }

    #[test]
    fn rejects_short_checksum() {
        let err = ModelManifest::from_toml_str(&manifest_text("liveness.onnx", "abc123")).unwrap_err();
        assert!(matches!(
            err,
            ManifestError::InvalidChecksum {
                role: ModelRole::Liveness,
                ..
            }
        ));
    }

    #[test]
    fn rejects_paths_outside_model_dir() {
        for bad in ["../liveness.onnx", "/etc/liveness.onnx", "nested/liveness.onnx", "..", ""] {
            let err = ModelManifest::from_toml_str(&manifest_text(bad, LIVENESS_SUM)).unwrap_err();
            assert!(matches!(err, ManifestError::InvalidFileName { .. }), "{bad}");
        }
    }

    #[test]
    fn rejects_missing_section() {
        let err = ModelManifest::from_toml_str("[liveness]\nfile = \"a.onnx\"\nsha256 = \"00\"\n")
            .unwrap_err();
        assert!(matches!(err, ManifestError::Parse(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = ModelManifest::load(Path::new("/nonexistent/moodgate/models.toml")).unwrap_err();
        assert!(matches!(err, ManifestError::Io { .. }));
    }
}
