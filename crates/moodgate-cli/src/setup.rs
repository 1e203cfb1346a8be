//! `moodgate setup`: downloads the ONNX models listed in the manifest.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use moodgate_models::{sha256_file_hex, ModelFile, ModelManifest, ModelRole};

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Download a single model file with progress output.
fn download_model(role: ModelRole, model: &ModelFile, dest: &Path) -> Result<()> {
    let Some(url) = model.url.as_deref() else {
        bail!(
            "{role} model {} is missing and the manifest has no url for it",
            model.file
        );
    };
    let tmp_path = part_path(dest);

    match &model.size_display {
        Some(size) => println!("  downloading {} ({size})...", model.file),
        None => println!("  downloading {}...", model.file),
    }
    tracing::debug!(%role, url, "download started");

    let resp = ureq::get(url)
        .call()
        .with_context(|| format!("failed to download {url}"))?;

    let content_length = resp
        .headers()
        .get("Content-Length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let mut reader = resp.into_body().into_reader();
    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("failed to create {}", tmp_path.display()))?;

    let mut buf = [0u8; 65536];
    let mut total: u64 = 0;
    let mut last_pct: u64 = 0;

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])?;
        total += n as u64;

        if let Some(len) = content_length.filter(|len| *len > 0) {
            let pct = (total * 100) / len;
            if pct / 10 > last_pct / 10 {
                print!("  {pct}%\r");
                io::stdout().flush().ok();
                last_pct = pct;
            }
        }
    }

    file.flush()?;
    drop(file);

    print!("  verifying checksum... ");
    io::stdout().flush().ok();
    let digest = sha256_file_hex(&tmp_path)?;
    if !digest.eq_ignore_ascii_case(&model.sha256) {
        fs::remove_file(&tmp_path).ok();
        bail!(
            "checksum mismatch for {}:\n  expected: {}\n  got:      {}",
            model.file,
            model.sha256,
            digest
        );
    }
    println!("ok");

    fs::rename(&tmp_path, dest).with_context(|| {
        format!(
            "failed to rename {} -> {}",
            tmp_path.display(),
            dest.display()
        )
    })?;

    Ok(())
}

/// Whether `dest` already holds the expected model.
fn already_present(model: &ModelFile, dest: &Path) -> bool {
    if !dest.exists() {
        return false;
    }
    match sha256_file_hex(dest) {
        Ok(digest) if digest.eq_ignore_ascii_case(&model.sha256) => true,
        Ok(_) => {
            println!("  {} exists but checksum differs, re-downloading", model.file);
            false
        }
        Err(_) => {
            println!("  {} exists but is unreadable, re-downloading", model.file);
            false
        }
    }
}

/// Run the setup command: download and verify ONNX models.
pub fn run(dir: &Path, manifest: &ModelManifest) -> Result<()> {
    println!("Model directory: {}", dir.display());

    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory {}", dir.display()))?;

    let mut downloaded = 0;
    let mut skipped = 0;

    for (role, model) in manifest.entries() {
        let dest = dir.join(&model.file);
        if already_present(model, &dest) {
            println!("  {} already present (checksum ok)", model.file);
            skipped += 1;
            continue;
        }

        download_model(role, model, &dest)?;
        downloaded += 1;
    }

    println!();
    if downloaded > 0 {
        println!("Setup complete: {downloaded} model(s) downloaded, {skipped} already present.");
    } else {
        println!("All models already present. Nothing to download.");
    }

    Ok(())
}
