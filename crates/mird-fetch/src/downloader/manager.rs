//! Acquisition orchestrator: drives fetch and extraction over a manifest.

use futures_util::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::http::HttpClient;
use crate::manifest::{Manifest, RemoteAsset};
use crate::progress::{NoProgress, ProgressSink};
use crate::{AcquireError, Result};

use super::archive::{ArchiveExtractor, ArchiveKind};
use super::checksum;
use super::file::{ensure_dir, FileDownloader};

/// Groups are processed in this order.
const KIND_ORDER: [ArchiveKind; 3] = [ArchiveKind::Zip, ArchiveKind::Tar, ArchiveKind::Plain];

/// Options for one acquisition run
#[derive(Debug, Clone)]
pub struct AcquireOptions {
    /// Keys to acquire; `None` means every asset in the manifest
    pub selection: Option<Vec<String>>,
    /// Message surfaced when the manifest has nothing to download
    pub info_message: Option<String>,
    /// Re-download files that already exist
    pub force_overwrite: bool,
    /// Remove archives after a successful extraction
    pub cleanup: bool,
    /// Maximum concurrent transfers within a group (1 = sequential)
    pub jobs: usize,
    /// Aborts transfers and extraction when cancelled
    pub cancel: Option<CancellationToken>,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            selection: None,
            info_message: None,
            force_overwrite: false,
            cleanup: false,
            jobs: 1,
            cancel: None,
        }
    }
}

impl AcquireOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_selection<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selection = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_info_message(mut self, message: impl Into<String>) -> Self {
        self.info_message = Some(message.into());
        self
    }

    pub fn with_force_overwrite(mut self, force_overwrite: bool) -> Self {
        self.force_overwrite = force_overwrite;
        self
    }

    pub fn with_cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Result of acquiring one asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquiredAsset {
    pub name: String,
    pub path: PathBuf,
    pub kind: ArchiveKind,
    /// The file already existed and no transfer happened
    pub skipped: bool,
    /// Archive contents were unpacked next to the file
    pub extracted: bool,
    pub bytes: u64,
}

/// Result of an acquisition run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquireReport {
    /// Set when the manifest was empty and an info message was supplied
    pub info_message: Option<String>,
    /// Acquired assets in processing order (zip, tar, then plain)
    pub assets: Vec<AcquiredAsset>,
}

/// On-disk state of one asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalState {
    Valid,
    Missing,
    Mismatch { actual: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAssetStatus {
    pub name: String,
    pub path: PathBuf,
    pub state: LocalState,
}

/// Download manager for manifest acquisition
pub struct DownloadManager {
    file_downloader: FileDownloader,
    progress: Arc<dyn ProgressSink>,
}

impl DownloadManager {
    /// Create a new download manager that reports no progress
    pub fn new(http_client: Arc<HttpClient>) -> Self {
        Self {
            file_downloader: FileDownloader::new(http_client),
            progress: Arc::new(NoProgress),
        }
    }

    /// Report transfer progress to `progress`
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Acquire the selected assets of `manifest` into `save_root`.
    ///
    /// Stops at the first failing asset. Files fetched before the failure stay
    /// on disk, so calling this again only transfers what is still missing.
    pub async fn acquire(
        &self,
        manifest: &Manifest,
        save_root: &Path,
        options: &AcquireOptions,
    ) -> Result<AcquireReport> {
        ensure_dir(save_root).await?;

        if manifest.is_empty() {
            if let Some(message) = &options.info_message {
                log::info!("{}", message);
            }
            return Ok(AcquireReport {
                info_message: options.info_message.clone(),
                assets: Vec::new(),
            });
        }

        let selected = Self::resolve(manifest, options.selection.as_deref(), save_root)?;

        log::info!(
            "Starting to download {:?} to {}",
            selected.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(),
            save_root.display()
        );

        let run_cancel = Self::run_token(options.cancel.as_ref());
        // Stops extractions still running on blocking threads once this returns
        let _stop_on_exit = run_cancel.clone().drop_guard();

        let mut report = AcquireReport::default();

        for kind in KIND_ORDER {
            let group: Vec<&RemoteAsset> = selected
                .iter()
                .copied()
                .filter(|asset| ArchiveKind::classify(&asset.url) == kind)
                .collect();

            if group.is_empty() {
                continue;
            }

            log::debug!("Processing {} {} asset(s)", group.len(), kind);

            let acquired: Vec<AcquiredAsset> = stream::iter(group)
                .map(|asset| self.acquire_one(asset, kind, save_root, options, &run_cancel))
                .buffered(options.jobs.max(1))
                .try_collect()
                .await?;

            report.assets.extend(acquired);
        }

        Ok(report)
    }

    /// Token for one run: cancelled with the caller's token, and on its own
    /// when the run ends without cancelling the caller's.
    fn run_token(parent: Option<&CancellationToken>) -> CancellationToken {
        parent.map(CancellationToken::child_token).unwrap_or_default()
    }

    /// Validate the selection and the selected assets before any transfer.
    fn resolve<'a>(
        manifest: &'a Manifest,
        selection: Option<&[String]>,
        save_root: &Path,
    ) -> Result<Vec<&'a RemoteAsset>> {
        let mut seen = HashSet::new();
        let selected: Vec<&RemoteAsset> = manifest
            .select(selection)?
            .into_iter()
            .filter(|asset| seen.insert(asset.name.clone()))
            .collect();

        let mut paths = HashSet::new();
        for asset in &selected {
            asset.validate()?;
            if !paths.insert(asset.local_path(save_root)) {
                return Err(AcquireError::InvalidAsset {
                    name: asset.name.clone(),
                    reason: format!(
                        "destination {} is shared with another asset",
                        asset.local_path(save_root).display()
                    ),
                });
            }
        }

        Ok(selected)
    }

    async fn acquire_one(
        &self,
        asset: &RemoteAsset,
        kind: ArchiveKind,
        save_root: &Path,
        options: &AcquireOptions,
        cancel: &CancellationToken,
    ) -> Result<AcquiredAsset> {
        if cancel.is_cancelled() {
            return Err(AcquireError::Cancelled);
        }

        let outcome = self
            .file_downloader
            .fetch_with_cancel(asset, save_root, options.force_overwrite, &*self.progress, Some(cancel))
            .await?;

        let extracted = match kind {
            ArchiveKind::Zip | ArchiveKind::Tar => {
                Self::extract(outcome.path.clone(), kind, options.cleanup, cancel.clone()).await?;
                true
            }
            ArchiveKind::Plain => false,
        };

        Ok(AcquiredAsset {
            name: asset.name.clone(),
            path: outcome.path,
            kind,
            skipped: outcome.skipped,
            extracted,
            bytes: outcome.bytes,
        })
    }

    async fn extract(
        path: PathBuf,
        kind: ArchiveKind,
        cleanup: bool,
        cancel: CancellationToken,
    ) -> Result<()> {
        log::info!("Extracting {}", path.display());
        let archive_path = path.clone();
        tokio::task::spawn_blocking(move || {
            ArchiveExtractor::extract_with_cancel(&archive_path, kind, cleanup, Some(&cancel))
        })
        .await
        .map_err(|e| AcquireError::ExtractionFailed {
            path,
            reason: format!("extraction task failed: {}", e),
        })?
    }

    /// Check what is already on disk for the selected assets, without network access.
    ///
    /// Archives removed by a cleanup run report as missing.
    pub async fn verify_local(
        manifest: &Manifest,
        save_root: &Path,
        selection: Option<&[String]>,
    ) -> Result<Vec<LocalAssetStatus>> {
        let mut statuses = Vec::new();

        for asset in manifest.select(selection)? {
            let path = asset.local_path(save_root);
            let state = if !tokio::fs::try_exists(&path).await? {
                LocalState::Missing
            } else {
                let actual = checksum::digest_matching(&path, &asset.checksum).await?;
                if actual.eq_ignore_ascii_case(&asset.checksum) {
                    LocalState::Valid
                } else {
                    LocalState::Mismatch { actual }
                }
            };

            statuses.push(LocalAssetStatus {
                name: asset.name.clone(),
                path,
                state,
            });
        }

        Ok(statuses)
    }
}
