//! Checksum command - print MD5 digests of local files.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use mird_fetch::downloader::md5_digest;

use crate::output::Output;

#[derive(Args, Debug)]
pub struct ChecksumArgs {
    /// Files to hash
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

pub async fn execute(args: ChecksumArgs, output: &Output) -> Result<i32> {
    for file in &args.files {
        let digest = md5_digest(file)
            .await
            .with_context(|| format!("Failed to hash {}", file.display()))?;
        output.result(&format!("{}  {}", digest, file.display()));
    }
    Ok(0)
}
