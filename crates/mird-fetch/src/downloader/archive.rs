//! Archive classification and in-place extraction (zip, tar, tar.gz).

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tokio_util::sync::CancellationToken;

use crate::{AcquireError, Result};

/// Container format of a remote asset, decided from its URL alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    Zip,
    /// Plain or compressed tar
    Tar,
    /// Not an archive, nothing to extract
    Plain,
}

impl ArchiveKind {
    /// Classify a URL by the suffix of its path.
    ///
    /// Query strings and fragments are ignored. Never looks at file contents.
    pub fn classify(url: &str) -> Self {
        let path = match url::Url::parse(url) {
            Ok(parsed) => parsed.path().to_lowercase(),
            Err(_) => url.to_lowercase(),
        };

        if path.ends_with(".zip") {
            ArchiveKind::Zip
        } else if path.ends_with(".tar.gz") || path.ends_with(".tar") {
            ArchiveKind::Tar
        } else {
            ArchiveKind::Plain
        }
    }

    pub fn is_archive(self) -> bool {
        !matches!(self, ArchiveKind::Plain)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArchiveKind::Zip => "zip",
            ArchiveKind::Tar => "tar",
            ArchiveKind::Plain => "plain",
        }
    }
}

impl std::fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compression wrapped around a tar stream, detected from magic bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TarCompression {
    None,
    Gzip,
    Bzip2,
    Xz,
}

impl TarCompression {
    fn detect(header: &[u8]) -> Self {
        if header.starts_with(&[0x1f, 0x8b]) {
            TarCompression::Gzip
        } else if header.starts_with(b"BZh") {
            TarCompression::Bzip2
        } else if header.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
            TarCompression::Xz
        } else {
            TarCompression::None
        }
    }
}

/// Archive extractor
pub struct ArchiveExtractor;

impl ArchiveExtractor {
    /// Extract `archive_path` into its own directory.
    ///
    /// With `cleanup`, the archive is removed once extraction succeeded. On
    /// failure the archive is always left in place.
    pub fn extract(archive_path: &Path, kind: ArchiveKind, cleanup: bool) -> Result<()> {
        Self::extract_with_cancel(archive_path, kind, cleanup, None)
    }

    /// Same as [`ArchiveExtractor::extract`], checking `cancel` between entries.
    pub fn extract_with_cancel(
        archive_path: &Path,
        kind: ArchiveKind,
        cleanup: bool,
        cancel: Option<&CancellationToken>,
    ) -> Result<()> {
        let dest_dir = match archive_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let result = match kind {
            ArchiveKind::Zip => Self::extract_zip(archive_path, dest_dir, cancel),
            ArchiveKind::Tar => Self::extract_tar(archive_path, dest_dir, cancel),
            ArchiveKind::Plain => return Ok(()),
        };

        result.map_err(|e| match e {
            AcquireError::Cancelled | AcquireError::ExtractionFailed { .. } => e,
            other => AcquireError::ExtractionFailed {
                path: archive_path.to_path_buf(),
                reason: other.to_string(),
            },
        })?;

        log::debug!("Extracted {} into {}", archive_path.display(), dest_dir.display());

        if cleanup {
            // A cancelled run keeps its archives
            Self::check_cancelled(cancel)?;
            std::fs::remove_file(archive_path).map_err(|e| AcquireError::ExtractionFailed {
                path: archive_path.to_path_buf(),
                reason: format!("extracted, but failed to remove archive: {}", e),
            })?;
            log::debug!("Removed {}", archive_path.display());
        }

        Ok(())
    }

    fn check_cancelled(cancel: Option<&CancellationToken>) -> Result<()> {
        match cancel {
            Some(token) if token.is_cancelled() => Err(AcquireError::Cancelled),
            _ => Ok(()),
        }
    }

    fn failed(archive_path: &Path, reason: impl Into<String>) -> AcquireError {
        AcquireError::ExtractionFailed {
            path: archive_path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Extract a zip archive, keeping entry paths as they are
    fn extract_zip(
        archive_path: &Path,
        dest_dir: &Path,
        cancel: Option<&CancellationToken>,
    ) -> Result<()> {
        let file = File::open(archive_path)?;
        let reader = BufReader::new(file);
        let mut archive = zip::ZipArchive::new(reader)
            .map_err(|e| Self::failed(archive_path, format!("failed to open zip: {}", e)))?;

        for i in 0..archive.len() {
            Self::check_cancelled(cancel)?;

            let mut entry = archive
                .by_index(i)
                .map_err(|e| Self::failed(archive_path, format!("failed to read zip entry: {}", e)))?;

            // Rejects absolute paths and `..` traversal
            let relative_path = entry.enclosed_name().ok_or_else(|| {
                Self::failed(
                    archive_path,
                    format!("entry '{}' escapes the destination directory", entry.name()),
                )
            })?;

            if relative_path.as_os_str().is_empty() {
                continue;
            }

            let outpath = dest_dir.join(&relative_path);

            if entry.is_dir() {
                std::fs::create_dir_all(&outpath)?;
                continue;
            }

            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let mut outfile = File::create(&outpath)?;
            std::io::copy(&mut entry, &mut outfile)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode))?;
                }
            }
        }

        Ok(())
    }

    /// Extract a tar archive, transparently decompressing it
    fn extract_tar(
        archive_path: &Path,
        dest_dir: &Path,
        cancel: Option<&CancellationToken>,
    ) -> Result<()> {
        let file = File::open(archive_path)?;
        let mut reader = BufReader::new(file);
        let compression = TarCompression::detect(reader.fill_buf()?);

        match compression {
            TarCompression::None => Self::extract_tar_reader(reader, archive_path, dest_dir, cancel),
            TarCompression::Gzip => {
                Self::extract_tar_reader(GzDecoder::new(reader), archive_path, dest_dir, cancel)
            }
            TarCompression::Bzip2 => {
                use bzip2::read::BzDecoder;
                Self::extract_tar_reader(BzDecoder::new(reader), archive_path, dest_dir, cancel)
            }
            TarCompression::Xz => {
                use xz2::read::XzDecoder;
                Self::extract_tar_reader(XzDecoder::new(reader), archive_path, dest_dir, cancel)
            }
        }
    }

    fn extract_tar_reader<R: Read>(
        reader: R,
        archive_path: &Path,
        dest_dir: &Path,
        cancel: Option<&CancellationToken>,
    ) -> Result<()> {
        let mut archive = tar::Archive::new(reader);

        let entries = archive
            .entries()
            .map_err(|e| Self::failed(archive_path, format!("failed to read tar: {}", e)))?;

        for entry in entries {
            Self::check_cancelled(cancel)?;

            let mut entry = entry
                .map_err(|e| Self::failed(archive_path, format!("failed to read tar entry: {}", e)))?;

            let unpacked = entry
                .unpack_in(dest_dir)
                .map_err(|e| Self::failed(archive_path, format!("failed to extract: {}", e)))?;

            if !unpacked {
                let name = entry
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                return Err(Self::failed(
                    archive_path,
                    format!("entry '{}' escapes the destination directory", name),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for (name, content) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
    }

    fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *content).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn test_classify_by_suffix() {
        assert_eq!(ArchiveKind::classify("https://zenodo.org/record/1/files/audio.zip"), ArchiveKind::Zip);
        assert_eq!(ArchiveKind::classify("https://example.org/data.tar.gz"), ArchiveKind::Tar);
        assert_eq!(ArchiveKind::classify("https://example.org/data.tar"), ArchiveKind::Tar);
        assert_eq!(ArchiveKind::classify("https://example.org/index.json"), ArchiveKind::Plain);
        assert_eq!(ArchiveKind::classify("https://example.org/data.gz"), ArchiveKind::Plain);
        assert_eq!(ArchiveKind::classify("https://example.org/data"), ArchiveKind::Plain);
    }

    #[test]
    fn test_classify_ignores_query_and_case() {
        assert_eq!(ArchiveKind::classify("https://example.org/A.ZIP?download=1"), ArchiveKind::Zip);
        assert_eq!(ArchiveKind::classify("https://example.org/a.tar.gz#frag"), ArchiveKind::Tar);
        assert_eq!(ArchiveKind::classify("https://example.org/a.zip.md5"), ArchiveKind::Plain);
    }

    #[test]
    fn test_classify_unparseable_url() {
        assert_eq!(ArchiveKind::classify("files/a.zip"), ArchiveKind::Zip);
        assert_eq!(ArchiveKind::classify("files/a.csv"), ArchiveKind::Plain);
    }

    #[test]
    fn test_zip_extracts_alongside_archive() {
        let temp = TempDir::new().unwrap();
        let sub = temp.path().join("sub");
        std::fs::create_dir_all(&sub).unwrap();
        let archive = sub.join("archive.zip");
        write_zip(&archive, &[("data/x.csv", b"a,b\n1,2\n"), ("readme.txt", b"hi")]);

        ArchiveExtractor::extract(&archive, ArchiveKind::Zip, false).unwrap();

        assert_eq!(std::fs::read(sub.join("data/x.csv")).unwrap(), b"a,b\n1,2\n");
        assert_eq!(std::fs::read(sub.join("readme.txt")).unwrap(), b"hi");
        assert!(!sub.join("archive").exists());
        assert!(archive.exists());
    }

    #[test]
    fn test_zip_cleanup_removes_archive() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("a.zip");
        write_zip(&archive, &[("x.txt", b"x")]);

        ArchiveExtractor::extract(&archive, ArchiveKind::Zip, true).unwrap();

        assert!(temp.path().join("x.txt").exists());
        assert!(!archive.exists());
    }

    #[test]
    fn test_corrupt_zip_keeps_archive() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("broken.zip");
        std::fs::write(&archive, b"this is not a zip file").unwrap();

        let err = ArchiveExtractor::extract(&archive, ArchiveKind::Zip, true).unwrap_err();

        match err {
            AcquireError::ExtractionFailed { path, .. } => assert_eq!(path, archive),
            other => panic!("Expected ExtractionFailed, got {:?}", other),
        }
        assert!(archive.exists());
    }

    #[test]
    fn test_zip_traversal_rejected() {
        let temp = TempDir::new().unwrap();
        let inner = temp.path().join("inner");
        std::fs::create_dir_all(&inner).unwrap();
        let archive = inner.join("evil.zip");
        write_zip(&archive, &[("../escaped.txt", b"nope")]);

        let err = ArchiveExtractor::extract(&archive, ArchiveKind::Zip, false).unwrap_err();
        assert!(matches!(err, AcquireError::ExtractionFailed { .. }));
        assert!(!temp.path().join("escaped.txt").exists());
    }

    #[test]
    fn test_plain_tar_extracts() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("data.tar");
        std::fs::write(&archive, tar_bytes(&[("annotations/a.lab", b"0.0 1.0 C")])).unwrap();

        ArchiveExtractor::extract(&archive, ArchiveKind::Tar, false).unwrap();

        assert_eq!(
            std::fs::read(temp.path().join("annotations/a.lab")).unwrap(),
            b"0.0 1.0 C"
        );
    }

    #[test]
    fn test_gzipped_tar_extracts_and_cleans_up() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("data.tar.gz");

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar_bytes(&[("audio/1.wav", b"RIFF")])).unwrap();
        std::fs::write(&archive, encoder.finish().unwrap()).unwrap();

        ArchiveExtractor::extract(&archive, ArchiveKind::Tar, true).unwrap();

        assert_eq!(std::fs::read(temp.path().join("audio/1.wav")).unwrap(), b"RIFF");
        assert!(!archive.exists());
    }

    #[test]
    fn test_corrupt_tar_keeps_archive() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("data.tar");
        std::fs::write(&archive, vec![b'A'; 1024]).unwrap();

        let err = ArchiveExtractor::extract(&archive, ArchiveKind::Tar, true).unwrap_err();
        assert!(matches!(err, AcquireError::ExtractionFailed { .. }));
        assert!(archive.exists());
    }

    #[test]
    fn test_plain_kind_is_noop() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("index.json");
        std::fs::write(&file, b"{}").unwrap();

        ArchiveExtractor::extract(&file, ArchiveKind::Plain, true).unwrap();

        // Plain files are never removed
        assert!(file.exists());
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_cancelled_extraction_keeps_archive() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("a.zip");
        write_zip(&archive, &[("x.txt", b"x")]);

        let token = CancellationToken::new();
        token.cancel();

        let err =
            ArchiveExtractor::extract_with_cancel(&archive, ArchiveKind::Zip, true, Some(&token)).unwrap_err();
        assert!(matches!(err, AcquireError::Cancelled));
        assert!(archive.exists());
        assert!(!temp.path().join("x.txt").exists());
    }

    #[test]
    fn test_cancel_after_extraction_skips_cleanup() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("empty.zip");
        write_zip(&archive, &[]);

        // No entries, so cancellation is only noticed before removing the archive
        let token = CancellationToken::new();
        token.cancel();

        let err =
            ArchiveExtractor::extract_with_cancel(&archive, ArchiveKind::Zip, true, Some(&token)).unwrap_err();
        assert!(matches!(err, AcquireError::Cancelled));
        assert!(archive.exists());
    }

    #[test]
    fn test_tar_compression_detection() {
        assert_eq!(TarCompression::detect(&[0x1f, 0x8b, 0x08]), TarCompression::Gzip);
        assert_eq!(TarCompression::detect(b"BZh91AY"), TarCompression::Bzip2);
        assert_eq!(
            TarCompression::detect(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]),
            TarCompression::Xz
        );
        assert_eq!(TarCompression::detect(b"ustar"), TarCompression::None);
        assert_eq!(TarCompression::detect(&[]), TarCompression::None);
    }
}
