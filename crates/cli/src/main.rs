//! Command-line client for uprelay.

mod api_client;

use anyhow::{Context, Result};
use api_client::{ApiClient, ProgressResponse};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

const DEFAULT_SERVER: &str = "http://127.0.0.1:3000";

/// How long to wait for the progress stream to close after the upload
/// request itself returned.
const WATCH_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "uprelay")]
#[command(about = "Upload files through uprelay and follow their progress")]
#[command(version)]
struct Cli {
    /// Server base URL
    #[arg(long, global = true, env = "UPRELAY_SERVER", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a file and print progress until it is stored
    Upload {
        /// File to upload
        file: PathBuf,
        /// Upload ID to use instead of a generated one
        #[arg(long)]
        id: Option<String>,
        /// Return as soon as the server accepts the file, without
        /// following progress
        #[arg(long = "async", default_value_t = false)]
        async_mode: bool,
        /// Do not draw the progress bar
        #[arg(long, default_value_t = false)]
        quiet: bool,
    },
    /// Print the current progress of an upload
    Progress {
        /// Upload ID
        id: String,
    },
    /// Follow the progress event stream of an upload until it ends
    Watch {
        /// Upload ID
        id: String,
    },
    /// Request a ticket for uploading directly to storage
    UploadUrl {
        /// Object name to reserve
        #[arg(long)]
        file_name: Option<String>,
    },
    /// Check server health and version
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let client = ApiClient::new(&cli.server)?;

    match cli.command {
        Commands::Upload {
            file,
            id,
            async_mode,
            quiet,
        } => handle_upload(&client, file, id, async_mode, quiet).await,
        Commands::Progress { id } => {
            let progress = client.progress(&id).await?;
            print_progress(&id, &progress);
            Ok(())
        }
        Commands::Watch { id } => {
            let last = client
                .watch(&id, |percent| println!("{percent}%"))
                .await?;
            if last.is_none() {
                anyhow::bail!("no progress reported for {id}");
            }
            Ok(())
        }
        Commands::UploadUrl { file_name } => {
            let ticket = client.upload_url(file_name.as_deref()).await?;
            println!("Upload URL: {}", ticket.upload_url);
            if let Some(token) = &ticket.authorization_token {
                println!("Authorization: {token}");
            }
            println!("Bucket: {}", ticket.bucket_name);
            println!("Download URL: {}", ticket.download_url);
            if let Some(name) = &ticket.file_name {
                println!("File name: {name}");
            }
            if let Some(url) = &ticket.public_url {
                println!("Public URL: {url}");
            }
            Ok(())
        }
        Commands::Health => {
            let health = client.health().await?;
            println!(
                "{} (version {}, provider {})",
                health.status, health.version, health.provider
            );
            Ok(())
        }
    }
}

async fn handle_upload(
    client: &ApiClient,
    file: PathBuf,
    id: Option<String>,
    async_mode: bool,
    quiet: bool,
) -> Result<()> {
    let upload_id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
    tracing::debug!(upload_id = %upload_id, file = %file.display(), "Starting upload");

    if async_mode {
        let response = client.upload(&file, &upload_id, true).await?;
        println!("Upload ID: {}", response.upload_id);
        println!("Follow with: uprelay watch {}", response.upload_id);
        return Ok(());
    }

    let bar = progress_bar(quiet);

    // Subscribe first so no progress is missed.
    let watcher = {
        let client = client.clone();
        let upload_id = upload_id.clone();
        let bar = bar.clone();
        tokio::spawn(async move {
            client
                .watch(&upload_id, |percent| bar.set_position(u64::from(percent)))
                .await
        })
    };

    let response = match client.upload(&file, &upload_id, false).await {
        Ok(response) => response,
        Err(e) => {
            watcher.abort();
            bar.abandon();
            return Err(e);
        }
    };

    match tokio::time::timeout(WATCH_DRAIN_TIMEOUT, watcher).await {
        Ok(Ok(Err(e))) => tracing::warn!(error = %e, "Progress stream failed"),
        Ok(Err(e)) => tracing::warn!(error = %e, "Progress watcher panicked"),
        Err(_) => tracing::warn!("Progress stream did not close in time"),
        Ok(Ok(Ok(_))) => {}
    }
    bar.finish();

    let file_url = response
        .file_url
        .with_context(|| format!("server returned no file URL for {}", response.upload_id))?;

    println!("Upload ID: {}", response.upload_id);
    println!("File URL: {file_url}");
    Ok(())
}

/// Percent bar on stderr, hidden when quiet or not attached to a terminal.
fn progress_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(100);
    match ProgressStyle::with_template("{spinner:.cyan} [{bar:30.green/dim}] {pos:>3}% ({elapsed})") {
        Ok(style) => bar.set_style(style.progress_chars("━━─")),
        Err(e) => tracing::debug!(error = %e, "Falling back to the default progress style"),
    }
    bar
}

fn print_progress(id: &str, progress: &ProgressResponse) {
    println!("Upload ID: {id}");
    println!("Status: {}", progress.status);
    println!("Progress: {}% ({:.3})", progress.percent, progress.progress);
    if let Some(url) = &progress.file_url {
        println!("File URL: {url}");
    }
    if let Some(error) = &progress.error {
        println!("Error: {error}");
    }
}
