//! List command - show the assets declared in a manifest.

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};

use mird_fetch::{ArchiveKind, Manifest};

use crate::output::{table_row, Output};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Manifest file (.json or .toml)
    pub manifest: PathBuf,
}

pub fn execute(args: ListArgs, output: &Output) -> Result<i32> {
    let (manifest, info) = Manifest::load(&args.manifest)
        .with_context(|| format!("Failed to load manifest {}", args.manifest.display()))?;

    if manifest.is_empty() {
        match info {
            Some(message) => output.info(&message),
            None => output.info("Manifest declares no assets"),
        }
        return Ok(0);
    }

    let width = manifest.keys().map(str::len).max().unwrap_or(0) + 2;

    for asset in manifest.iter() {
        let kind = ArchiveKind::classify(&asset.url);
        let destination = asset.local_path(Path::new("")).display().to_string();
        output.result(&table_row(
            &[asset.name.as_str(), kind.as_str(), destination.as_str(), asset.url.as_str()],
            &[width, 7, 40],
        ));
    }

    Ok(0)
}
