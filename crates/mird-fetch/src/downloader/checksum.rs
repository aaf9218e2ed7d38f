//! Checksum computation and verification for fetched files.

use md5::Md5;
use sha2::{Digest, Sha256, Sha512};
use std::io::ErrorKind;
use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::{AcquireError, Result};

const CHUNK_SIZE: usize = 64 * 1024;

/// Supported checksum types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumType {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl ChecksumType {
    /// Detect checksum type from length of hex string
    pub fn from_hex_length(len: usize) -> Option<Self> {
        match len {
            32 => Some(ChecksumType::Md5),
            40 => Some(ChecksumType::Sha1),
            64 => Some(ChecksumType::Sha256),
            128 => Some(ChecksumType::Sha512),
            _ => None,
        }
    }
}

/// Stream `path` through the hasher `D` chunk by chunk.
async fn hash_file<D: Digest>(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = D::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(to_hex(&hasher.finalize()))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Compute the lowercase hex digest of a file.
pub async fn digest(path: &Path, checksum_type: ChecksumType) -> Result<String> {
    match checksum_type {
        ChecksumType::Md5 => hash_file::<Md5>(path).await,
        ChecksumType::Sha1 => hash_file::<sha1::Sha1>(path).await,
        ChecksumType::Sha256 => hash_file::<Sha256>(path).await,
        ChecksumType::Sha512 => hash_file::<Sha512>(path).await,
    }
}

/// Compute the MD5 digest of a file
pub async fn md5_digest(path: &Path) -> Result<String> {
    digest(path, ChecksumType::Md5).await
}

fn checksum_type_for(expected: &str) -> Result<ChecksumType> {
    ChecksumType::from_hex_length(expected.len()).ok_or_else(|| AcquireError::InvalidAsset {
        name: expected.to_string(),
        reason: format!("checksum has unsupported length {}", expected.len()),
    })
}

/// Compute the digest of `path` with the algorithm implied by `expected`.
pub async fn digest_matching(path: &Path, expected: &str) -> Result<String> {
    digest(path, checksum_type_for(expected)?).await
}

/// Verify checksum of a file.
///
/// A missing file is reported as `Ok(false)` rather than an error.
pub async fn verify(path: &Path, expected: &str) -> Result<bool> {
    let checksum_type = checksum_type_for(expected)?;

    match digest(path, checksum_type).await {
        Ok(actual) => Ok(actual.eq_ignore_ascii_case(expected)),
        Err(AcquireError::Io(e)) if e.kind() == ErrorKind::NotFound => {
            log::warn!("Cannot verify {}: file does not exist", path.display());
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
