use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::{Parser, Subcommand};
use spaces_uploader::{Credentials, UploadManager, UploaderConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroize;

const TRACING_TARGET_CLI: &str = "spaces_uploader::cli";

#[derive(Parser)]
#[command(name = "spaces-uploader", version, about = "Multipart uploads to S3-compatible spaces")]
struct Cli {
    /// Access key for the space.
    #[arg(long, env = "SPACES_ACCESS_KEY", hide_env_values = true)]
    access_key: String,

    /// Secret key for the space.
    #[arg(long, env = "SPACES_SECRET_KEY", hide_env_values = true)]
    secret_key: String,

    #[command(flatten)]
    config: UploaderConfig,

    #[command(subcommand)]
    command: Command,
}

impl std::fmt::Debug for Cli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cli")
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("config", &self.config)
            .field("command", &self.command)
            .finish()
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload a file as a multipart upload.
    Upload {
        /// File to upload.
        file: PathBuf,

        /// Object key to upload as. Defaults to the file name.
        #[arg(long)]
        name: Option<String>,

        /// Abort uploads left in flight by earlier runs first.
        #[arg(long)]
        clean: bool,
    },
    /// Abort uploads left in flight by earlier runs.
    Cleanup,
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(error) = run().await {
        tracing::error!(target: TRACING_TARGET_CLI, error = %format!("{error:#}"), "upload failed");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let mut cli = Cli::parse();

    let credentials = Credentials::new(&cli.access_key, &cli.secret_key);
    cli.access_key.zeroize();
    cli.secret_key.zeroize();

    let mut manager = UploadManager::new(credentials?, cli.config)
        .context("invalid uploader configuration")?;

    manager.events_mut().on_status(|status| {
        tracing::info!(
            target: TRACING_TARGET_CLI,
            "File Upload Status: Part {}/{} ({}/{})",
            status.part_number,
            status.estimated_parts,
            status.bytes_uploaded,
            status.total_bytes
        );
    });
    manager.events_mut().on_failure(|failure| {
        tracing::warn!(target: TRACING_TARGET_CLI, cause = %failure.cause, "{}", failure.message);
    });

    let result = match cli.command {
        Command::Upload { file, name, clean } => upload(&manager, file, name, clean).await,
        Command::Cleanup => manager
            .cleanup_previous_attempts()
            .await
            .context("unable to clean up previous attempts"),
    };

    manager.dispose();
    result
}

async fn upload(
    manager: &UploadManager,
    file: PathBuf,
    name: Option<String>,
    clean: bool,
) -> anyhow::Result<()> {
    let name = match name {
        Some(name) => name,
        None => file
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_owned)
            .context("cannot derive an upload name, pass --name")?,
    };

    if clean {
        manager
            .cleanup_previous_attempts()
            .await
            .context("unable to clean up previous attempts")?;
    }

    let upload_id = manager
        .upload_file(&file, &name)
        .await
        .with_context(|| format!("unable to upload `{}`", file.display()))?;

    tracing::info!(target: TRACING_TARGET_CLI, %upload_id, key = %name, "File upload complete");
    Ok(())
}

/// Initializes tracing with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_keys() {
        let cli = Cli::try_parse_from([
            "spaces-uploader",
            "--access-key",
            "DO00VISIBLE",
            "--secret-key",
            "visible/secret",
            "--space",
            "media",
            "cleanup",
        ])
        .unwrap();

        let rendered = format!("{cli:?}");
        assert!(!rendered.contains("DO00VISIBLE"));
        assert!(!rendered.contains("visible/secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
