//! Fetcher for a single remote asset.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::http::{HttpClient, HttpError};
use crate::manifest::RemoteAsset;
use crate::progress::ProgressSink;
use crate::{AcquireError, Result};

use super::checksum;

/// Outcome of fetching one asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Where the verified file lives
    pub path: PathBuf,
    /// Whether the network transfer was skipped because the file already existed
    pub skipped: bool,
    /// Bytes written by this fetch (0 when skipped)
    pub bytes: u64,
}

/// Create `dir` and its parents if missing.
pub async fn ensure_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| AcquireError::Filesystem {
            path: dir.to_path_buf(),
            source,
        })
}

/// File downloader for HTTP resources
pub struct FileDownloader {
    http_client: Arc<HttpClient>,
}

impl FileDownloader {
    /// Create a new file downloader
    pub fn new(http_client: Arc<HttpClient>) -> Self {
        Self { http_client }
    }

    /// Fetch `asset` below `save_root` and verify its checksum.
    ///
    /// An existing file is reused unless `force_overwrite` is set, but its
    /// checksum is checked either way.
    pub async fn fetch(
        &self,
        asset: &RemoteAsset,
        save_root: &Path,
        force_overwrite: bool,
        progress: &dyn ProgressSink,
    ) -> Result<PathBuf> {
        self.fetch_with_cancel(asset, save_root, force_overwrite, progress, None)
            .await
            .map(|outcome| outcome.path)
    }

    /// Same as [`FileDownloader::fetch`], with cancellation and a detailed outcome.
    pub async fn fetch_with_cancel(
        &self,
        asset: &RemoteAsset,
        save_root: &Path,
        force_overwrite: bool,
        progress: &dyn ProgressSink,
        cancel: Option<&CancellationToken>,
    ) -> Result<FetchOutcome> {
        let download_dir = asset.download_dir(save_root);
        ensure_dir(&download_dir).await?;

        let local_path = download_dir.join(&asset.filename);
        let exists = tokio::fs::try_exists(&local_path).await?;

        let (skipped, bytes) = if exists && !force_overwrite {
            log::debug!("{} already exists, skipping download", local_path.display());
            (true, 0)
        } else {
            log::info!("Downloading {} to {}", asset.url, local_path.display());
            let bytes = self
                .http_client
                .download(&asset.url, &local_path, &asset.name, progress, cancel)
                .await
                .map_err(|e| match e {
                    HttpError::Cancelled { .. } => AcquireError::Cancelled,
                    other => AcquireError::FetchFailed {
                        url: asset.url.clone(),
                        reason: other.to_string(),
                    },
                })?;
            log::debug!("Downloaded {} bytes from {}", bytes, asset.url);
            (false, bytes)
        };

        let actual = checksum::digest_matching(&local_path, &asset.checksum).await?;
        if !actual.eq_ignore_ascii_case(&asset.checksum) {
            return Err(AcquireError::ChecksumMismatch {
                path: local_path,
                expected: asset.checksum.clone(),
                actual,
            });
        }

        Ok(FetchOutcome {
            path: local_path,
            skipped,
            bytes,
        })
    }
}
