use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use registry_core::BlobTransfer;
use registry_importer::Importer;

mod config;
mod filesystem;

use crate::config::{Config, RepositoryBackend};
use crate::filesystem::{FilesystemBlobTransfer, FilesystemContentStore, FilesystemRepositorySource};

#[derive(Parser)]
struct Cli {
    #[arg(short, long)]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending schema migrations and exit.
    Migrate,
    /// Run the one-shot filesystem importer (C6).
    Import,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(true)
        .compact()
        .init();

    let config_path = cli.config_file.unwrap_or_else(|| "./dev-config.yml".into());
    let raw = std::fs::read_to_string(&config_path)?;
    let config: Config = serde_yaml::from_str(&raw)?;

    let pool = match &config.backend {
        RepositoryBackend::Postgres(pg_config) => pg_config.new_metadata().await?,
    };

    match cli.command {
        Command::Migrate => {
            pool.migrate_up().await?;
            tracing::info!("migrations applied");
        }
        Command::Import => {
            let content_store = Arc::new(FilesystemContentStore::new(config.source.root.clone()));
            let transfer: Option<Arc<dyn BlobTransfer>> = config.source.destination_root.clone().map(|dest| {
                Arc::new(FilesystemBlobTransfer::new(content_store.clone(), dest)) as Arc<dyn BlobTransfer>
            });
            let source = Arc::new(FilesystemRepositorySource::new(config.source.root.clone()));

            let importer = Importer::new(pool, content_store, transfer, source, config.importer);
            let counts = importer.run().await?;
            tracing::info!(?counts, "import finished");
        }
    }

    Ok(())
}
