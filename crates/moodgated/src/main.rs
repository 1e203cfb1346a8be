use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use moodgate_core::{AnnotationRenderer, FramePipeline, SessionStats};
use moodgate_models::ModelSet;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod stream;

use config::Config;
use stream::{DirectorySink, DirectorySource, PumpOptions};

/// Per-session summary printed when a stream ends.
#[derive(Serialize)]
struct SessionReport {
    session: String,
    source: PathBuf,
    output: PathBuf,
    stats: SessionStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("moodgated starting");

    let config = Config::from_env().context("invalid MOODGATE_* configuration")?;
    tracing::info!(
        sampling_interval = config.pipeline.sampling_interval.get(),
        analysis_width = config.pipeline.analysis_width,
        analysis_height = config.pipeline.analysis_height,
        model_dir = %config.model_dir.display(),
        sources = config.sources.len(),
        "configuration loaded"
    );

    let model_config = config.model_config().with_context(|| {
        format!(
            "failed to read model manifest {}",
            config.manifest_path.display()
        )
    })?;
    let models = match ModelSet::shared(&model_config) {
        Ok(models) => models,
        Err(e) => {
            tracing::error!(error = %e, "failed to load models");
            return Err(e).context("run `moodgate setup` to download the models");
        }
    };

    let renderer = match AnnotationRenderer::new(&config.pipeline.overlay) {
        Ok(renderer) => renderer,
        Err(e) => {
            tracing::warn!(error = %e, "overlay font unavailable, captions disabled");
            AnnotationRenderer::plain(&config.pipeline.overlay)
        }
    };
    if !renderer.has_font() {
        tracing::warn!("no TrueType font found, drawing status strip only");
    }

    let pipeline = Arc::new(FramePipeline::new(
        &config.pipeline,
        models.gate(),
        models.classifier(),
        renderer,
    )?);

    if config.sources.is_empty() {
        tracing::warn!("no frame sources configured (set MOODGATE_SOURCES)");
        return Ok(());
    }

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, finishing sessions");
                stop.store(true, Ordering::Relaxed);
            }
        });
    }

    let options = PumpOptions {
        queue_depth: config.queue_depth,
        diagnostics_every: config.diagnostics_every,
    };

    let mut sessions = JoinSet::new();
    for source_dir in &config.sources {
        let source = DirectorySource::open(source_dir)?;
        let session = engine::spawn_session(pipeline.clone(), config.queue_depth)?;
        let output = config.output_dir.join(session.id().simple().to_string());
        let sink = DirectorySink::create(output.clone())?;
        tracing::info!(
            session = %session.id(),
            source = %source_dir.display(),
            output = %output.display(),
            "streaming"
        );

        let id = session.id();
        let source_dir = source_dir.clone();
        let stop = stop.clone();
        sessions.spawn(async move {
            let result = stream::pump(source, sink, session, options, stop).await;
            (id, source_dir, output, result)
        });
    }

    let mut failed = 0usize;
    while let Some(joined) = sessions.join_next().await {
        let (id, source, output, result) = joined.context("session task panicked")?;
        match result {
            Ok(stats) => {
                let report = SessionReport {
                    session: id.to_string(),
                    source,
                    output,
                    stats,
                };
                println!("{}", serde_json::to_string(&report)?);
            }
            Err(e) => {
                failed += 1;
                tracing::error!(session = %id, source = %source.display(), error = %format!("{e:#}"), "session failed");
            }
        }
    }

    tracing::info!("moodgated shutting down");

    if failed > 0 {
        anyhow::bail!("{failed} session(s) failed");
    }
    Ok(())
}
