//! Fetch command - download, verify and extract the assets of a manifest.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use mird_fetch::progress::format_bytes;
use mird_fetch::{AcquireOptions, ConsoleProgress, DownloadManager, HttpClient, Manifest};

use crate::config::{MirdConfig, SAVE_DIR_ENV};
use crate::output::Output;

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Manifest file (.json or .toml)
    pub manifest: PathBuf,

    /// Directory to save the dataset to
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Only fetch these manifest keys (repeatable)
    #[arg(short = 's', long = "select", value_name = "KEY", action = clap::ArgAction::Append)]
    pub select: Vec<String>,

    /// Re-download files that already exist
    #[arg(short = 'f', long)]
    pub force: bool,

    /// Delete archives after extracting them
    #[arg(long)]
    pub cleanup: bool,

    /// Number of concurrent transfers
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// Disable progress bars
    #[arg(long)]
    pub no_progress: bool,
}

impl FetchArgs {
    fn options(&self, config: &MirdConfig, info: Option<String>) -> AcquireOptions {
        let mut options = AcquireOptions::new()
            .with_force_overwrite(self.force || config.acquire.force_overwrite)
            .with_cleanup(self.cleanup || config.acquire.cleanup)
            .with_jobs(self.jobs.or(config.acquire.jobs).unwrap_or(1));

        if !self.select.is_empty() {
            options = options.with_selection(self.select.iter().cloned());
        }
        if let Some(info) = info {
            options = options.with_info_message(info);
        }
        options
    }
}

pub async fn execute(args: FetchArgs, config: &MirdConfig, output: &Output) -> Result<i32> {
    let (manifest, info) = Manifest::load(&args.manifest)
        .with_context(|| format!("Failed to load manifest {}", args.manifest.display()))?;

    let save_dir = config.save_dir(args.output.as_deref(), std::env::var(SAVE_DIR_ENV).ok());

    let client = HttpClient::with_config(config.http_config()).context("Failed to create HTTP client")?;
    let progress = Arc::new(ConsoleProgress::new(!args.no_progress && !output.is_quiet()));
    let manager = DownloadManager::new(Arc::new(client)).with_progress(progress);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupted, stopping transfers");
                cancel.cancel();
            }
        });
    }

    let options = args.options(config, info).with_cancel(cancel);
    let report = manager.acquire(&manifest, &save_dir, &options).await?;

    if let Some(message) = &report.info_message {
        output.info(message);
        return Ok(0);
    }

    for asset in &report.assets {
        let mut detail = if asset.skipped {
            "already present".to_string()
        } else {
            format_bytes(asset.bytes)
        };
        if asset.extracted {
            detail.push_str(", extracted");
        }
        output.list_item("✓", &format!("{} -> {} ({})", asset.name, asset.path.display(), detail));
    }

    output.success(&format!(
        "Acquired {} asset(s) into {}",
        report.assets.len(),
        save_dir.display()
    ));

    Ok(0)
}
