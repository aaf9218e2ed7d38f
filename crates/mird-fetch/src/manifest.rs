//! Manifest of remote assets.
//!
//! A manifest maps logical keys (`"audio"`, `"annotations"`, ...) to the
//! remote files that make up a dataset. Keys keep their insertion order so
//! every run walks the assets in the same sequence.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use crate::downloader::ChecksumType;
use crate::{AcquireError, Result};

/// One remote file to acquire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteAsset {
    /// Logical key inside the manifest
    #[serde(skip)]
    pub name: String,
    /// Basename written under the destination directory
    pub filename: String,
    /// Source URL
    pub url: String,
    /// Expected hex digest of the file contents
    pub checksum: String,
    /// Optional path below the save root
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "destination_dir")]
    pub destination_subdir: Option<PathBuf>,
}

impl RemoteAsset {
    pub fn new(
        name: impl Into<String>,
        filename: impl Into<String>,
        url: impl Into<String>,
        checksum: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            filename: filename.into(),
            url: url.into(),
            checksum: checksum.into(),
            destination_subdir: None,
        }
    }

    pub fn with_destination_subdir(mut self, subdir: impl Into<PathBuf>) -> Self {
        self.destination_subdir = Some(subdir.into());
        self
    }

    /// Directory the asset (and anything extracted from it) lands in.
    pub fn download_dir(&self, save_root: &Path) -> PathBuf {
        match &self.destination_subdir {
            Some(subdir) => save_root.join(subdir),
            None => save_root.to_path_buf(),
        }
    }

    /// Path of the fetched file before any extraction.
    pub fn local_path(&self, save_root: &Path) -> PathBuf {
        self.download_dir(save_root).join(&self.filename)
    }

    /// Check the record invariants.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(self.invalid("url is empty"));
        }
        if self.filename.is_empty() {
            return Err(self.invalid("filename is empty"));
        }

        // The filename must be a single normal path component
        let mut components = Path::new(&self.filename).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => {}
            _ => {
                return Err(self.invalid(&format!(
                    "filename '{}' must be a plain file name",
                    self.filename
                )))
            }
        }

        if let Some(subdir) = &self.destination_subdir {
            let escapes = subdir
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
            if escapes {
                return Err(self.invalid(&format!(
                    "destination '{}' must be a relative path inside the save directory",
                    subdir.display()
                )));
            }
        }

        if !self.checksum.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(self.invalid("checksum is not a hex string"));
        }
        if ChecksumType::from_hex_length(self.checksum.len()).is_none() {
            return Err(self.invalid(&format!(
                "checksum has unsupported length {}",
                self.checksum.len()
            )));
        }

        Ok(())
    }

    fn invalid(&self, reason: &str) -> AcquireError {
        AcquireError::InvalidAsset {
            name: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Row of a static manifest table: `(name, filename, url, checksum, destination_subdir)`.
pub type AssetRow<'a> = (&'a str, &'a str, &'a str, &'a str, Option<&'a str>);

/// Insertion-ordered mapping of logical keys to remote assets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    assets: IndexMap<String, RemoteAsset>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an asset under its own name. Keys must be unique.
    pub fn insert(&mut self, asset: RemoteAsset) -> Result<()> {
        if self.assets.contains_key(&asset.name) {
            return Err(AcquireError::InvalidAsset {
                name: asset.name,
                reason: "duplicate manifest key".to_string(),
            });
        }
        self.assets.insert(asset.name.clone(), asset);
        Ok(())
    }

    pub fn from_assets<I>(assets: I) -> Result<Self>
    where
        I: IntoIterator<Item = RemoteAsset>,
    {
        let mut manifest = Self::new();
        for asset in assets {
            manifest.insert(asset)?;
        }
        Ok(manifest)
    }

    /// Build a manifest from a static declaration table.
    pub fn from_table(rows: &[AssetRow<'_>]) -> Result<Self> {
        Self::from_assets(rows.iter().map(|(name, filename, url, checksum, subdir)| {
            let asset = RemoteAsset::new(*name, *filename, *url, *checksum);
            match subdir {
                Some(subdir) => asset.with_destination_subdir(*subdir),
                None => asset,
            }
        }))
    }

    pub fn get(&self, key: &str) -> Option<&RemoteAsset> {
        self.assets.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.assets.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.assets.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteAsset> {
        self.assets.values()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Resolve a selection to assets, failing on the first unknown key.
    /// `None` selects every asset in insertion order.
    pub fn select(&self, selection: Option<&[String]>) -> Result<Vec<&RemoteAsset>> {
        match selection {
            None => Ok(self.iter().collect()),
            Some(keys) => keys
                .iter()
                .map(|key| {
                    self.get(key).ok_or_else(|| AcquireError::UnknownKey {
                        key: key.clone(),
                        available: self.keys().map(str::to_string).collect(),
                    })
                })
                .collect(),
        }
    }
}

/// On-disk manifest document (JSON or TOML).
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ManifestDocument {
    /// Message shown when there is nothing to download
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,

    #[serde(default)]
    pub assets: IndexMap<String, RemoteAsset>,
}

impl ManifestDocument {
    /// Load a manifest document; the format is chosen from the file extension.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| AcquireError::Manifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let parsed = if is_toml {
            toml::from_str::<ManifestDocument>(&content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str::<ManifestDocument>(&content).map_err(|e| e.to_string())
        };

        parsed.map_err(|reason| AcquireError::Manifest {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Turn the document into a validated manifest.
    pub fn into_manifest(self) -> Result<(Manifest, Option<String>)> {
        let manifest = Manifest::from_assets(self.assets.into_iter().map(|(name, mut asset)| {
            asset.name = name;
            asset
        }))?;
        for asset in manifest.iter() {
            asset.validate()?;
        }
        Ok((manifest, self.info))
    }
}

impl Manifest {
    /// Load and validate a manifest file, returning it with its info message.
    pub fn load(path: &Path) -> Result<(Self, Option<String>)> {
        ManifestDocument::load(path)?.into_manifest()
    }
}
