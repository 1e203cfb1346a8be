//! `moodgate verify`: per-model integrity report.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use moodgate_models::{verify_file_sha256, ModelIntegrityError, ModelManifest};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum Status {
    Ok,
    Missing,
    Mismatch,
    Unreadable,
}

#[derive(Debug, Serialize)]
struct ModelReport {
    role: String,
    file: String,
    path: PathBuf,
    status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

fn check(dir: &Path, manifest: &ModelManifest) -> Vec<ModelReport> {
    manifest
        .entries()
        .into_iter()
        .map(|(role, model)| {
            let path = dir.join(&model.file);
            let (status, detail) = match verify_file_sha256(role, &path, &model.sha256) {
                Ok(()) => (Status::Ok, None),
                Err(ModelIntegrityError::MissingModel { .. }) => (Status::Missing, None),
                Err(ModelIntegrityError::ChecksumMismatch { got, .. }) => {
                    (Status::Mismatch, Some(format!("got {got}")))
                }
                Err(e) => (Status::Unreadable, Some(e.to_string())),
            };
            ModelReport {
                role: role.to_string(),
                file: model.file.clone(),
                path,
                status,
                detail,
            }
        })
        .collect()
}

pub fn run(dir: &Path, manifest: &ModelManifest, json: bool) -> Result<()> {
    let reports = check(dir, manifest);

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        println!("Model directory: {}", dir.display());
        for report in &reports {
            let status = match report.status {
                Status::Ok => "ok",
                Status::Missing => "MISSING",
                Status::Mismatch => "CHECKSUM MISMATCH",
                Status::Unreadable => "UNREADABLE",
            };
            print!("  {:<9} {:<24} {status}", report.role, report.file);
            match &report.detail {
                Some(detail) => println!(" ({detail})"),
                None => println!(),
            }
        }
    }

    let bad = reports.iter().filter(|r| r.status != Status::Ok).count();
    if bad > 0 {
        bail!("{bad} model(s) failed verification; run `moodgate setup`");
    }
    Ok(())
}
