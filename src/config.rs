//! Bundle configuration.
//!
//! A [`BundleConfig`] fixes everything about a bundle that does not come
//! from the request: canvas size, output resolutions, naming, manifest
//! metadata and worker limits. It serializes to JSON so deployments can keep
//! it in a file.
//!
//! # Example
//!
//! ```
//! use appicon_forge::BundleConfig;
//!
//! let config = BundleConfig::from_json(r#"{ "resolutions": [64, 256, 128] }"#).unwrap();
//! assert_eq!(config.resolutions(), vec![256, 128, 64]);
//! assert_eq!(config.canonical_size, 1024);
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::BundleError;
use crate::resample::ResampleFilter;

/// Output resolutions of a visionOS app icon, largest first.
pub const DEFAULT_RESOLUTIONS: [u32; 6] = [1024, 512, 256, 128, 64, 32];

pub const DEFAULT_CANONICAL_SIZE: u32 = 1024;

/// Immutable configuration for building icon bundles.
///
/// # JSON Format
///
/// ```json
/// {
///   "canonicalSize": 1024,
///   "resolutions": [1024, 512, 256, 128, 64, 32],
///   "bundleName": "AppIcon",
///   "assetFolder": "Assets.xcassets/AppIcon.appiconset",
///   "filter": "lanczos3",
///   "workerThreads": 4
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BundleConfig {
    /// Side length of the square working canvas.
    pub canonical_size: u32,

    /// Output sizes. Order is irrelevant; see [`BundleConfig::resolutions`].
    #[serde(rename = "resolutions")]
    pub resolution_list: Vec<u32>,

    /// File name prefix, e.g. `AppIcon` in `AppIcon-512-Layer1.png`.
    pub bundle_name: String,

    /// Folder inside the archive holding the images and manifest.
    pub asset_folder: String,

    pub manifest_name: String,
    pub readme_path: String,

    /// Suggested download name for the archive.
    pub archive_name: String,

    pub idiom: String,
    pub platform: String,
    pub scale: String,
    pub author: String,
    pub version: u32,

    pub filter: ResampleFilter,

    /// Size of the render worker pool. `None` uses one worker per core.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_threads: Option<usize>,

    /// Directory holding session staging folders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging_root: Option<PathBuf>,

    /// Layout of the one-shot logo image set.
    pub imageset: ImageSetLayout,
}

/// Layout of a single-resolution image set holding a background and a logo.
///
/// # JSON Format
///
/// ```json
/// {
///   "folder": "Logo.imageset",
///   "backgroundName": "Background.png",
///   "logoName": "Logo.png",
///   "archiveName": "LogoAssets.zip"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageSetLayout {
    pub folder: String,
    pub background_name: String,
    pub logo_name: String,
    pub manifest_name: String,
    pub archive_name: String,
    pub idiom: String,
    pub scale: String,
    pub author: String,
    pub version: u32,
}

impl Default for ImageSetLayout {
    fn default() -> Self {
        Self {
            folder: "Logo.imageset".into(),
            background_name: "Background.png".into(),
            logo_name: "Logo.png".into(),
            manifest_name: "Contents.json".into(),
            archive_name: "LogoAssets.zip".into(),
            idiom: "universal".into(),
            scale: "1x".into(),
            author: "xcode".into(),
            version: 1,
        }
    }
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            canonical_size: DEFAULT_CANONICAL_SIZE,
            resolution_list: DEFAULT_RESOLUTIONS.to_vec(),
            bundle_name: "AppIcon".into(),
            asset_folder: "Assets.xcassets/AppIcon.appiconset".into(),
            manifest_name: "Contents.json".into(),
            readme_path: "README.md".into(),
            archive_name: "visionOS-AppIcon-Assets.zip".into(),
            idiom: "universal".into(),
            platform: "ios".into(),
            scale: "1x".into(),
            author: "visionos-logo-generator".into(),
            version: 1,
            filter: ResampleFilter::default(),
            worker_threads: None,
            staging_root: None,
            imageset: ImageSetLayout::default(),
        }
    }
}

impl BundleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_canonical_size(mut self, size: u32) -> Self {
        self.canonical_size = size;
        self
    }

    pub fn with_resolutions(mut self, resolutions: impl Into<Vec<u32>>) -> Self {
        self.resolution_list = resolutions.into();
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    pub fn with_staging_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    /// Output resolutions, largest first.
    pub fn resolutions(&self) -> Vec<u32> {
        let mut sizes = self.resolution_list.clone();
        sizes.sort_unstable_by(|a, b| b.cmp(a));
        sizes
    }

    /// Staging root, defaulting to a folder under the system temp dir.
    pub fn staging_root(&self) -> PathBuf {
        self.staging_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("appicon-forge"))
    }

    pub fn validate(&self) -> Result<(), BundleError> {
        if self.canonical_size == 0 {
            return Err(BundleError::input("canonical size must be at least 1"));
        }
        if self.resolution_list.is_empty() {
            return Err(BundleError::input("at least one resolution is required"));
        }
        if self.resolution_list.contains(&0) {
            return Err(BundleError::input("resolutions must be at least 1"));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.resolution_list.iter().find(|size| !seen.insert(**size)) {
            return Err(BundleError::input(format!("duplicate resolution {dup}")));
        }
        if self.worker_threads == Some(0) {
            return Err(BundleError::input("worker threads must be >= 1 when set"));
        }
        if self.bundle_name.is_empty() {
            return Err(BundleError::input("bundle name must not be empty"));
        }
        if self.imageset.background_name == self.imageset.logo_name {
            return Err(BundleError::input("image set background and logo names must differ"));
        }
        Ok(())
    }

    /// Serializes the config to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serializes the config to a pretty-printed JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserializes a config from a JSON string. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Loads and validates a config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BundleError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            BundleError::input(format!("cannot read config {}: {e}", path.display()))
        })?;
        let config = Self::from_json(&json)
            .map_err(|e| BundleError::input(format!("invalid config {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }
}
