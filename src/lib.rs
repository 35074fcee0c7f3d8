//! appicon-forge: layered app icon rendering and asset-catalog bundling
//!
//! This crate takes a background and one or two foreground icon layers,
//! applies per-layer scale and offset adjustments on a square canvas, and
//! packages every layer at every configured resolution into a zip holding an
//! asset-catalog folder, a `Contents.json` manifest and a README.
//!
//! # Example
//!
//! ```
//! use appicon_forge::{AssetAssembler, BundleConfig, LayerAdjustment, LayerSet, ZipArchiveWriter};
//! use image::{Rgba, RgbaImage};
//!
//! let config = BundleConfig::new().with_canonical_size(128).with_resolutions([128, 64]);
//! let assembler = AssetAssembler::new(config).unwrap();
//!
//! let layers = LayerSet::new(
//!     RgbaImage::from_pixel(128, 128, Rgba([30, 64, 175, 255])),
//!     RgbaImage::from_pixel(64, 64, Rgba([255, 255, 255, 255])),
//! )
//! .with_layer1_adjustment(LayerAdjustment::new(60.0, 0.0, -8.0));
//!
//! let bundle = assembler.assemble(&layers).unwrap();
//! let names: Vec<_> = bundle.manifest.filenames().collect();
//! assert_eq!(names[0], "AppIcon-128-Background.png");
//!
//! let zip = assembler.package(&bundle, ZipArchiveWriter::new()).unwrap();
//! ```
//!
//! # Preview and Finalize
//!
//! For a two-step flow where layers are generated first and adjusted later,
//! use [`IconPipeline`]. Previews are staged on disk under a session and
//! referenced by [`StagedRef`]; finalize requests may also carry images
//! inline as base64.
//!
//! ```
//! use appicon_forge::{BundleError, FinalizeRequest};
//!
//! let json = r#"{
//!     "images": {
//!         "background": { "kind": "inline", "data": "" },
//!         "layer1": { "kind": "inline", "data": "" }
//!     },
//!     "adjustments": { "layer1": { "scale": -5 } }
//! }"#;
//! let err = FinalizeRequest::from_json(json).unwrap_err();
//! assert!(matches!(err, BundleError::Input(_)));
//! ```

mod archive;
mod assembler;
mod codec;
mod config;
mod error;
mod generate;
mod layer;
mod manifest;
mod pipeline;
mod request;
mod resample;
mod session;
mod transform;

pub use archive::{ArchiveError, ArchiveWriter, ZipArchiveWriter};
pub use assembler::{AssetAssembler, AssetBundle, RenderedAsset};
pub use codec::{CodecError, LayerImage, decode, encode_png};
pub use config::{BundleConfig, DEFAULT_CANONICAL_SIZE, DEFAULT_RESOLUTIONS, ImageSetLayout};
pub use error::{BundleError, BundleResult, ErrorClass};
pub use generate::{BackgroundTheme, LayerPrompts, LayerSource, SourceError, foreground_prompt};
pub use layer::{
    Degradation, LayerAdjustment, LayerRole, LayerSet, LayerSpec, RenderStage, Rendered,
};
pub use manifest::{BundleNotes, Manifest, ManifestEntry, ManifestInfo, asset_filename};
pub use pipeline::IconPipeline;
pub use request::{
    Adjustments, FinalizeOutput, FinalizeRequest, LayerImages, LayerReference, PreviewHandle,
};
pub use resample::{FilterResampler, Resample, ResampleError, ResampleFilter, Resampler};
pub use session::{SessionId, SessionState, SessionStore, StagedRef, StagingError};
pub use transform::{LayerTransformer, Placement, composite_over};
