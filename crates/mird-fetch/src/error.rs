use std::path::PathBuf;
use thiserror::Error;

const ISSUE_TRACKER: &str = "https://github.com/mir-dataset-loaders/mirdata/issues";

#[derive(Error, Debug)]
pub enum AcquireError {
    // Selection errors
    #[error("Unknown manifest key '{key}' (available: {})", available.join(", "))]
    UnknownKey { key: String, available: Vec<String> },

    // Manifest errors
    #[error("Invalid asset '{name}': {reason}")]
    InvalidAsset { name: String, reason: String },

    #[error("Failed to load manifest {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },

    // Network errors
    #[error("Failed to download {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    // Integrity errors
    #[error("{path} has a checksum ({actual}) differing from expected ({expected}), file may be corrupted")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // Extraction errors
    #[error("Failed to extract {path}: {reason}")]
    ExtractionFailed { path: PathBuf, reason: String },

    // Filesystem errors
    #[error("Failed to create {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

impl AcquireError {
    /// Actionable hint to show next to the error message.
    pub fn remediation(&self) -> Option<String> {
        match self {
            AcquireError::FetchFailed { .. } => Some(format!(
                "This is usually a transient network issue, please try again in a few minutes. \
                 If it persists, raise an issue at {} and tag it with 'broken-link'.",
                ISSUE_TRACKER
            )),
            AcquireError::ChecksumMismatch { .. } => Some(format!(
                "The file may be corrupted or the mirror may be stale. Re-run with force overwrite; \
                 if the mismatch persists, raise an issue at {} and tag it with 'broken-link'.",
                ISSUE_TRACKER
            )),
            AcquireError::ExtractionFailed { .. } => Some(
                "The archive is corrupt or uses an unsupported format. It was left in place; \
                 re-run with force overwrite to download it again."
                    .to_string(),
            ),
            AcquireError::UnknownKey { .. } => {
                Some("Select only keys that exist in the manifest.".to_string())
            }
            AcquireError::Filesystem { .. } => {
                Some("Check free disk space and write permissions of the target directory.".to_string())
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AcquireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_key_lists_available() {
        let err = AcquireError::UnknownKey {
            key: "nope".to_string(),
            available: vec!["audio".to_string(), "annotations".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Unknown manifest key 'nope' (available: audio, annotations)"
        );
    }

    #[test]
    fn test_checksum_mismatch_names_both_digests() {
        let err = AcquireError::ChecksumMismatch {
            path: PathBuf::from("/tmp/out/a.zip"),
            expected: "aaaa".to_string(),
            actual: "bbbb".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/tmp/out/a.zip"));
        assert!(msg.contains("aaaa"));
        assert!(msg.contains("bbbb"));
    }

    #[test]
    fn test_remediation_distinguishes_failures() {
        let fetch = AcquireError::FetchFailed {
            url: "http://x/a.zip".to_string(),
            reason: "timeout".to_string(),
        };
        let integrity = AcquireError::ChecksumMismatch {
            path: PathBuf::from("a.zip"),
            expected: "a".to_string(),
            actual: "b".to_string(),
        };
        let extraction = AcquireError::ExtractionFailed {
            path: PathBuf::from("a.zip"),
            reason: "bad header".to_string(),
        };

        assert!(fetch.remediation().unwrap().contains("try again"));
        assert!(integrity.remediation().unwrap().contains("stale"));
        assert!(extraction.remediation().unwrap().contains("unsupported"));
        assert!(AcquireError::Cancelled.remediation().is_none());
    }
}
