//! Manifest-driven acquisition of remote dataset files.
//!
//! Given a [`Manifest`] of remote files (URL, filename, checksum and an
//! optional destination subdirectory), [`DownloadManager::acquire`] fetches
//! each file, verifies its checksum and unpacks zip and tar archives in place,
//! leaving a layout dataset loaders can read directly.

pub mod downloader;
pub mod error;
pub mod http;
pub mod manifest;
pub mod progress;

pub use downloader::{
    AcquireOptions, AcquireReport, AcquiredAsset, ArchiveExtractor, ArchiveKind, DownloadManager,
    FileDownloader, LocalAssetStatus, LocalState,
};
pub use error::{AcquireError, Result};
pub use http::{HttpClient, HttpClientConfig};
pub use manifest::{Manifest, RemoteAsset};
pub use progress::{ConsoleProgress, NoProgress, ProgressSink};
