//! Frame sources and display sinks, plus the pump that connects them to a
//! session. Capture and display hardware stay outside the daemon: frames are
//! read from a directory and annotated frames are written to one.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use moodgate_core::memory::{format_bytes, resident_set_bytes};
use moodgate_core::{AnnotatedFrame, Frame, SessionStats};
use tokio::sync::mpsc;

use crate::engine::SessionHandle;

const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Delivers raw frames in arrival order.
pub trait FrameSource {
    /// `None` once the stream has ended.
    fn next_frame(&mut self) -> Option<Result<Frame>>;
}

/// Receives one annotated frame per input frame.
pub trait FrameSink {
    fn show(&mut self, index: u64, frame: AnnotatedFrame) -> Result<()>;
}

/// Image files of a directory, in lexical file name order.
pub struct DirectorySource {
    paths: std::vec::IntoIter<PathBuf>,
}

impl DirectorySource {
    pub fn open(dir: &Path) -> Result<Self> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("failed to read frame directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_frame_file(path))
            .collect();
        paths.sort();
        tracing::debug!(dir = %dir.display(), frames = paths.len(), "frame directory opened");
        Ok(Self {
            paths: paths.into_iter(),
        })
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for DirectorySource {
    fn next_frame(&mut self) -> Option<Result<Frame>> {
        let path = self.paths.next()?;
        Some(
            image::open(&path)
                .map(|img| Frame::new(img.into_rgb8()))
                .with_context(|| format!("failed to decode frame {}", path.display())),
        )
    }
}

/// Writes annotated frames as `frame_{index:06}.png`.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn create(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        Ok(Self { dir })
    }
}

impl FrameSink for DirectorySink {
    fn show(&mut self, index: u64, frame: AnnotatedFrame) -> Result<()> {
        let path = self.dir.join(format!("frame_{index:06}.png"));
        frame
            .image
            .save(&path)
            .with_context(|| format!("failed to write frame {}", path.display()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PumpOptions {
    /// Frames buffered between each stage.
    pub queue_depth: usize,
    /// Frames between memory diagnostics (0 disables them).
    pub diagnostics_every: u64,
}

/// Stream every frame of `source` through `session` into `sink`.
///
/// Decoding and encoding run on the blocking pool, analysis on the session
/// thread. A source item that fails to decode never becomes a frame: it is
/// logged and skipped, does not advance the session's frame index and gets
/// no output. Sink errors end the stream. Returns the session counters.
pub async fn pump<S, K>(
    source: S,
    sink: K,
    session: SessionHandle,
    options: PumpOptions,
    stop: Arc<AtomicBool>,
) -> Result<SessionStats>
where
    S: FrameSource + Send + 'static,
    K: FrameSink + Send + 'static,
{
    let depth = options.queue_depth.max(1);
    let (frame_tx, mut frame_rx) = mpsc::channel(depth);
    let (out_tx, out_rx) = mpsc::channel(depth);
    let reader = tokio::task::spawn_blocking(move || read_frames(source, frame_tx));
    let writer = tokio::task::spawn_blocking(move || write_frames(sink, out_rx));

    while let Some(next) = frame_rx.recv().await {
        if stop.load(Ordering::Relaxed) {
            tracing::info!(session = %session.id(), "stream interrupted");
            break;
        }
        let frame = match next {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(session = %session.id(), error = %format!("{err:#}"), "skipping frame");
                continue;
            }
        };

        let processed = session.process(frame).await?;
        tracing::trace!(
            session = %session.id(),
            frame = processed.index,
            stage = ?processed.stage,
            caption = %processed.annotated.caption,
            "frame rendered"
        );

        if options.diagnostics_every > 0 && processed.index % options.diagnostics_every == 0 {
            match resident_set_bytes() {
                Some(rss) => tracing::info!(
                    session = %session.id(),
                    frame = processed.index,
                    rss = %format_bytes(rss),
                    "memory"
                ),
                None => tracing::debug!("resident set size unavailable"),
            }
        }

        if out_tx.send((processed.index, processed.annotated)).await.is_err() {
            // Writer stopped; its error is reported below.
            break;
        }
    }

    drop(frame_rx);
    drop(out_tx);
    reader.await.context("frame reader panicked")?;
    writer.await.context("frame writer panicked")??;

    Ok(session.stats().await?)
}

fn read_frames<S: FrameSource>(mut source: S, tx: mpsc::Sender<Result<Frame>>) {
    while let Some(next) = source.next_frame() {
        if tx.blocking_send(next).is_err() {
            break;
        }
    }
}

fn write_frames<K: FrameSink>(
    mut sink: K,
    mut rx: mpsc::Receiver<(u64, AnnotatedFrame)>,
) -> Result<()> {
    while let Some((index, frame)) = rx.blocking_recv() {
        sink.show(index, frame)?;
    }
    Ok(())
}
