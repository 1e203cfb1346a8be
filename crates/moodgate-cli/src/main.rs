use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use moodgate_models::ModelManifest;
use tracing_subscriber::EnvFilter;

mod setup;
mod verify;

#[derive(Parser, Debug)]
#[command(name = "moodgate", about = "Moodgate model setup and diagnostics", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download and verify the liveness and emotion models
    Setup(ModelArgs),
    /// Check model files against the manifest
    Verify {
        #[command(flatten)]
        models: ModelArgs,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Model directory (default: /var/lib/moodgate/models as root, else $XDG_DATA_HOME/moodgate/models)
    #[arg(long, value_name = "DIR")]
    model_dir: Option<PathBuf>,
    /// Model manifest (default: <model-dir>/models.toml)
    #[arg(long, value_name = "FILE")]
    manifest: Option<PathBuf>,
}

impl ModelArgs {
    fn resolve(self) -> Result<(PathBuf, ModelManifest)> {
        let dir = self
            .model_dir
            .unwrap_or_else(moodgate_models::default_model_dir);
        let manifest_path = self.manifest.unwrap_or_else(|| dir.join("models.toml"));
        let manifest = ModelManifest::load(&manifest_path)
            .with_context(|| format!("failed to load manifest {}", manifest_path.display()))?;
        Ok((dir, manifest))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Setup(models) => {
            let (dir, manifest) = models.resolve()?;
            setup::run(&dir, &manifest)
        }
        Command::Verify { models, json } => {
            let (dir, manifest) = models.resolve()?;
            verify::run(&dir, &manifest, json)
        }
    }
}
