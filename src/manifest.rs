//! Asset-catalog manifest (`Contents.json`) and the README shipped with a
//! bundle.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{BundleConfig, ImageSetLayout};
use crate::layer::{LayerAdjustment, LayerRole};

// ============================================================================
// Manifest
// ============================================================================

/// One image entry in the manifest.
///
/// Image sets carry neither `platform` nor `size`; app icon sets carry both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub filename: String,
    pub idiom: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    pub scale: String,
    /// `"<n>x<n>"` in pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

impl ManifestEntry {
    /// Builds the entry for `filename` at `resolution` using config metadata.
    pub fn new(config: &BundleConfig, filename: impl Into<String>, resolution: u32) -> Self {
        Self {
            filename: filename.into(),
            idiom: config.idiom.clone(),
            platform: Some(config.platform.clone()),
            scale: config.scale.clone(),
            size: Some(format!("{resolution}x{resolution}")),
        }
    }

    /// Builds a size-less image set entry.
    pub fn image(layout: &ImageSetLayout, filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            idiom: layout.idiom.clone(),
            platform: None,
            scale: layout.scale.clone(),
            size: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestInfo {
    pub author: String,
    pub version: u32,
}

/// Machine-readable listing of every packaged image.
///
/// # JSON Format
///
/// ```json
/// {
///   "images": [
///     {
///       "filename": "AppIcon-1024-Background.png",
///       "idiom": "universal",
///       "platform": "ios",
///       "scale": "1x",
///       "size": "1024x1024"
///     }
///   ],
///   "info": { "author": "visionos-logo-generator", "version": 1 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub images: Vec<ManifestEntry>,
    pub info: ManifestInfo,
}

impl Manifest {
    pub fn new(config: &BundleConfig) -> Self {
        Self::with_info(ManifestInfo {
            author: config.author.clone(),
            version: config.version,
        })
    }

    pub fn with_info(info: ManifestInfo) -> Self {
        Self {
            images: Vec::new(),
            info,
        }
    }

    pub fn push(&mut self, entry: ManifestEntry) {
        self.images.push(entry);
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.images.iter().map(|entry| entry.filename.as_str())
    }

    /// Serializes the manifest to a pretty-printed JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Stable file name for one layer at one resolution.
pub fn asset_filename(bundle_name: &str, resolution: u32, role: LayerRole) -> String {
    format!("{bundle_name}-{resolution}-{}.png", role.file_label())
}

// ============================================================================
// README
// ============================================================================

/// Human-readable summary of the adjustments applied to a bundle.
///
/// Informational only; it never influences the rendered images.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleNotes {
    pub layer1: LayerAdjustment,
    pub layer2: Option<LayerAdjustment>,
    pub asset_folder: String,
    pub generated_at: DateTime<Utc>,
}

impl BundleNotes {
    pub fn to_markdown(&self) -> String {
        let mut out = String::from("# visionOS App Icon Assets\n\n## Layer Adjustments Applied\n");
        push_adjustment(&mut out, "Layer 1 (Main Icon)", &self.layer1);
        if let Some(layer2) = &self.layer2 {
            out.push('\n');
            push_adjustment(&mut out, "Layer 2 (Secondary Element)", layer2);
        }
        let top_folder = self
            .asset_folder
            .split('/')
            .next()
            .unwrap_or(&self.asset_folder);
        out.push_str(&format!(
            "\n## Usage\nDrag the {top_folder} folder into your Xcode project.\n\nGenerated: {}\n",
            self.generated_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        ));
        out
    }
}

fn push_adjustment(out: &mut String, title: &str, adjustment: &LayerAdjustment) {
    out.push_str(&format!(
        "### {title}\n- Scale: {}%\n- X Position: {}px\n- Y Position: {}px\n",
        adjustment.scale, adjustment.x, adjustment.y
    ));
}
