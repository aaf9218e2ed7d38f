//! Asset downloading and extraction module.
//!
//! This module fetches remote assets over HTTP, verifies their checksums and
//! unpacks archives next to where they were saved.

mod archive;
mod checksum;
mod file;
mod manager;

pub use archive::{ArchiveExtractor, ArchiveKind};
pub use checksum::{digest, digest_matching, md5_digest, verify, ChecksumType};
pub use file::{ensure_dir, FetchOutcome, FileDownloader};
pub use manager::{
    AcquireOptions, AcquireReport, AcquiredAsset, DownloadManager, LocalAssetStatus, LocalState,
};
