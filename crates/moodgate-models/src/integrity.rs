use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::manifest::{ModelManifest, ModelRole};

#[derive(Error, Debug)]
pub enum ModelIntegrityError {
    #[error("{role} model file not found: {name} ({path})")]
    MissingModel {
        role: ModelRole,
        name: String,
        path: PathBuf,
    },

    #[error("failed to open model file: {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read model file: {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "{role} model checksum mismatch for {name} ({path})\n  expected: {expected}\n  got:      {got}"
    )]
    ChecksumMismatch {
        role: ModelRole,
        name: String,
        path: PathBuf,
        expected: String,
        got: String,
    },
}

/// Compute SHA-256 hex digest of a file.
pub fn sha256_file_hex(path: &Path) -> Result<String, ModelIntegrityError> {
    let mut file = fs::File::open(path).map_err(|source| ModelIntegrityError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = file
            .read(&mut buf)
            .map_err(|source| ModelIntegrityError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

pub fn verify_file_sha256(
    role: ModelRole,
    path: &Path,
    expected_sha256: &str,
) -> Result<(), ModelIntegrityError> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if !path.exists() {
        return Err(ModelIntegrityError::MissingModel {
            role,
            name,
            path: path.to_path_buf(),
        });
    }

    let digest = sha256_file_hex(path)?;
    if !digest.eq_ignore_ascii_case(expected_sha256) {
        return Err(ModelIntegrityError::ChecksumMismatch {
            role,
            name,
            path: path.to_path_buf(),
            expected: expected_sha256.to_string(),
            got: digest,
        });
    }

    Ok(())
}

/// Verify every model listed in `manifest` under `model_dir`.
pub fn verify_models_dir(
    model_dir: &Path,
    manifest: &ModelManifest,
) -> Result<(), ModelIntegrityError> {
    for (role, model) in manifest.entries() {
        let path = model_dir.join(&model.file);
        verify_file_sha256(role, &path, &model.sha256)?;
        tracing::debug!(%role, path = %path.display(), "model checksum ok");
    }

    Ok(())
}
