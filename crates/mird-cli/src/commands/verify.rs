//! Verify command - check the files already on disk against a manifest.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use mird_fetch::{DownloadManager, LocalState, Manifest};

use crate::config::{MirdConfig, SAVE_DIR_ENV};
use crate::output::{table_row, Output};

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Manifest file (.json or .toml)
    pub manifest: PathBuf,

    /// Directory the dataset was saved to
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Only check these manifest keys (repeatable)
    #[arg(short = 's', long = "select", value_name = "KEY", action = clap::ArgAction::Append)]
    pub select: Vec<String>,
}

pub async fn execute(args: VerifyArgs, config: &MirdConfig, output: &Output) -> Result<i32> {
    let (manifest, _) = Manifest::load(&args.manifest)
        .with_context(|| format!("Failed to load manifest {}", args.manifest.display()))?;
    let save_dir = config.save_dir(args.output.as_deref(), std::env::var(SAVE_DIR_ENV).ok());

    let selection = (!args.select.is_empty()).then_some(args.select.as_slice());
    let statuses = DownloadManager::verify_local(&manifest, &save_dir, selection).await?;

    let width = statuses.iter().map(|s| s.name.len()).max().unwrap_or(0) + 2;
    let mut problems = 0;

    for status in &statuses {
        let state = match &status.state {
            LocalState::Valid => "ok".to_string(),
            LocalState::Missing => {
                problems += 1;
                "missing".to_string()
            }
            LocalState::Mismatch { actual } => {
                problems += 1;
                format!("checksum mismatch ({})", actual)
            }
        };
        let path = status.path.display().to_string();
        output.result(&table_row(&[status.name.as_str(), state.as_str(), path.as_str()], &[width, 12]));
    }

    if problems > 0 {
        output.warning(&format!("{} of {} asset(s) need to be fetched again", problems, statuses.len()));
        return Ok(1);
    }

    output.success(&format!("All {} asset(s) verified", statuses.len()));
    Ok(0)
}
