//! Multi-resolution asset assembly.
//!
//! The [`AssetAssembler`] turns a [`LayerSet`] into one PNG per
//! (resolution, role) pair plus a manifest and README, and hands the result
//! to an [`ArchiveWriter`].
//!
//! # Pipeline
//!
//! 1. **Decode** - mandatory layers must decode, otherwise assembly aborts
//! 2. **Transform** - each foreground layer is placed on the canonical canvas
//! 3. **Resample** - every layer is resized to every configured resolution
//!
//! Steps 2 and 3 run on a bounded worker pool. Results are collected in job
//! order, so file and manifest ordering never depend on scheduling.
//!
//! # Example
//!
//! ```
//! use appicon_forge::{AssetAssembler, BundleConfig, LayerAdjustment, LayerSet, ZipArchiveWriter};
//! use image::{Rgba, RgbaImage};
//!
//! let config = BundleConfig::new().with_canonical_size(64).with_resolutions([64, 32]);
//! let assembler = AssetAssembler::new(config).unwrap();
//!
//! let layers = LayerSet::new(
//!     RgbaImage::from_pixel(64, 64, Rgba([255, 0, 0, 255])),
//!     RgbaImage::from_pixel(64, 64, Rgba([0, 0, 255, 255])),
//! )
//! .with_layer1_adjustment(LayerAdjustment::new(50.0, 0.0, 0.0));
//!
//! let bundle = assembler.assemble(&layers).unwrap();
//! assert_eq!(bundle.assets.len(), 4);
//!
//! let zip_bytes = assembler.package(&bundle, ZipArchiveWriter::new()).unwrap();
//! assert!(!zip_bytes.is_empty());
//! ```

use chrono::{DateTime, Utc};
use image::RgbaImage;
use rayon::prelude::*;

use crate::archive::ArchiveWriter;
use crate::codec::{self, LayerImage};
use crate::config::BundleConfig;
use crate::error::{BundleError, BundleResult};
use crate::layer::{
    Degradation, LayerAdjustment, LayerRole, LayerSet, LayerSpec, RenderStage, Rendered,
};
use crate::manifest::{BundleNotes, Manifest, ManifestEntry, ManifestInfo, asset_filename};
use crate::resample::{FilterResampler, Resampler};
use crate::transform::{LayerTransformer, composite_over};

// ============================================================================
// Output Types
// ============================================================================

/// One packaged image.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedAsset {
    pub filename: String,
    pub role: LayerRole,
    pub resolution: u32,
    /// Encoded PNG bytes.
    pub bytes: Vec<u8>,
}

/// Everything produced by one assembly pass.
#[derive(Debug, Clone)]
pub struct AssetBundle {
    /// Images, ordered by resolution (descending) then role.
    pub assets: Vec<RenderedAsset>,
    /// Entries in 1:1 correspondence with `assets`.
    pub manifest: Manifest,
    pub notes: BundleNotes,
    /// Items that fell back to a best-effort result.
    pub degradations: Vec<Degradation>,
}

impl AssetBundle {
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }

    pub fn asset(&self, filename: &str) -> Option<&RenderedAsset> {
        self.assets.iter().find(|asset| asset.filename == filename)
    }
}

/// A layer ready for resampling.
struct PreparedLayer {
    role: LayerRole,
    image: LayerImage,
}

// ============================================================================
// AssetAssembler
// ============================================================================

/// Renders, resamples and packages icon layers.
pub struct AssetAssembler {
    config: BundleConfig,
    transformer: LayerTransformer,
    resampler: Resampler,
    pool: rayon::ThreadPool,
}

impl AssetAssembler {
    /// Creates an assembler using the config's resampling filter.
    pub fn new(config: BundleConfig) -> BundleResult<Self> {
        let resampler = Resampler::new(FilterResampler::new(config.filter));
        Self::with_resampler(config, resampler)
    }

    /// Creates an assembler with a custom resampling backend.
    pub fn with_resampler(config: BundleConfig, resampler: Resampler) -> BundleResult<Self> {
        config.validate()?;
        let pool = build_thread_pool(config.worker_threads)?;
        Ok(Self {
            transformer: LayerTransformer::new(config.canonical_size),
            config,
            resampler,
            pool,
        })
    }

    pub fn config(&self) -> &BundleConfig {
        &self.config
    }

    /// Assembles a bundle stamped with the current time.
    pub fn assemble(&self, layers: &LayerSet) -> BundleResult<AssetBundle> {
        self.assemble_at(layers, Utc::now())
    }

    /// Assembles a bundle whose README is stamped with `generated_at`.
    ///
    /// Identical inputs always yield identical file names, manifest and
    /// image bytes; only the README depends on `generated_at`.
    #[tracing::instrument(skip_all, fields(layer2 = layers.has_layer2()))]
    pub fn assemble_at(
        &self,
        layers: &LayerSet,
        generated_at: DateTime<Utc>,
    ) -> BundleResult<AssetBundle> {
        let mut degradations = Vec::new();
        let prepared = self.prepare_layers(layers, &mut degradations)?;
        let resolutions = self.config.resolutions();

        let jobs: Vec<(u32, &PreparedLayer)> = resolutions
            .iter()
            .flat_map(|size| prepared.iter().map(move |layer| (*size, layer)))
            .collect();

        let rendered = self.pool.install(|| {
            jobs.par_iter()
                .map(|(size, layer)| self.render_asset(layer, *size))
                .collect::<Vec<_>>()
        });

        let mut assets = Vec::with_capacity(rendered.len());
        let mut manifest = Manifest::new(&self.config);
        for item in rendered {
            let (asset, entry, degradation) = item?;
            assets.push(asset);
            manifest.push(entry);
            degradations.extend(degradation);
        }

        tracing::info!(
            files = assets.len(),
            degraded = degradations.len(),
            "assembled icon bundle"
        );

        Ok(AssetBundle {
            assets,
            manifest,
            notes: BundleNotes {
                layer1: layers
                    .adjustment(LayerRole::Layer1)
                    .unwrap_or(LayerAdjustment::IDENTITY),
                layer2: layers
                    .has_layer2()
                    .then(|| layers.adjustment(LayerRole::Layer2).unwrap_or_default()),
                asset_folder: self.config.asset_folder.clone(),
                generated_at,
            },
            degradations,
        })
    }

    /// Writes a bundle into `writer`: images, then manifest, then README.
    pub fn package<W: ArchiveWriter>(&self, bundle: &AssetBundle, mut writer: W) -> BundleResult<Vec<u8>> {
        let folder = self.config.asset_folder.trim_end_matches('/');
        for asset in &bundle.assets {
            writer.add(&format!("{folder}/{}", asset.filename), &asset.bytes)?;
        }

        let manifest = bundle
            .manifest
            .to_json_pretty()
            .map_err(|e| BundleError::assembly(format!("failed to serialize manifest: {e}")))?;
        writer.add(
            &format!("{folder}/{}", self.config.manifest_name),
            manifest.as_bytes(),
        )?;
        writer.add(&self.config.readme_path, bundle.notes.to_markdown().as_bytes())?;

        Ok(writer.finish()?)
    }

    /// Manifest of the one-shot logo image set.
    pub fn imageset_manifest(&self) -> Manifest {
        let layout = &self.config.imageset;
        let mut manifest = Manifest::with_info(ManifestInfo {
            author: layout.author.clone(),
            version: layout.version,
        });
        manifest.push(ManifestEntry::image(layout, layout.background_name.clone()));
        manifest.push(ManifestEntry::image(layout, layout.logo_name.clone()));
        manifest
    }

    /// Packages a background and a logo, as generated, into an image set.
    ///
    /// Both images must decode; their bytes are stored unchanged.
    #[tracing::instrument(skip_all)]
    pub fn package_imageset<W: ArchiveWriter>(
        &self,
        background: &[u8],
        logo: &[u8],
        mut writer: W,
    ) -> BundleResult<Vec<u8>> {
        let layout = &self.config.imageset;
        for (role, bytes) in [(LayerRole::Background, background), (LayerRole::Layer1, logo)] {
            codec::decode(bytes).map_err(|e| {
                BundleError::assembly(format!("{role} layer could not be decoded: {e}"))
            })?;
        }

        let folder = layout.folder.trim_end_matches('/');
        writer.add(&format!("{folder}/{}", layout.background_name), background)?;
        writer.add(&format!("{folder}/{}", layout.logo_name), logo)?;

        let manifest = self
            .imageset_manifest()
            .to_json_pretty()
            .map_err(|e| BundleError::assembly(format!("failed to serialize manifest: {e}")))?;
        writer.add(&format!("{folder}/{}", layout.manifest_name), manifest.as_bytes())?;

        tracing::info!(folder, "packaged logo image set");
        Ok(writer.finish()?)
    }

    /// Composites all transformed layers at canonical size, background first.
    pub fn flatten(&self, layers: &LayerSet) -> BundleResult<RgbaImage> {
        let mut degradations = Vec::new();
        let prepared = self.prepare_layers(layers, &mut degradations)?;
        let size = self.config.canonical_size;

        let mut canvas = RgbaImage::new(size, size);
        for layer in &prepared {
            let rendered = self.resampler.resize(&layer.image, size);
            match rendered.value().to_rgba() {
                Ok(pixels) => {
                    if !composite_over(&mut canvas, &pixels) {
                        tracing::warn!(role = %layer.role, size = ?pixels.dimensions(), "skipping mis-sized layer in flattened preview");
                    }
                }
                Err(err) => {
                    tracing::warn!(role = %layer.role, error = %err, "skipping layer in flattened preview");
                }
            }
        }
        Ok(canvas)
    }

    /// Decodes and transforms every layer.
    fn prepare_layers(
        &self,
        layers: &LayerSet,
        degradations: &mut Vec<Degradation>,
    ) -> BundleResult<Vec<PreparedLayer>> {
        let specs = layers.specs();
        let transformed = self.pool.install(|| {
            specs
                .par_iter()
                .map(|spec| self.prepare_layer(spec))
                .collect::<Vec<_>>()
        });

        let mut prepared = Vec::with_capacity(transformed.len());
        for item in transformed {
            let (role, rendered) = item?;
            if let Rendered::Degraded { reason, .. } = &rendered {
                tracing::warn!(%role, %reason, "layer transform degraded, using untransformed source");
                degradations.push(Degradation {
                    stage: RenderStage::Transform,
                    role,
                    resolution: None,
                    reason: reason.clone(),
                });
            }
            prepared.push(PreparedLayer {
                role,
                image: rendered.into_inner(),
            });
        }
        Ok(prepared)
    }

    fn prepare_layer(&self, spec: &LayerSpec) -> BundleResult<(LayerRole, Rendered<LayerImage>)> {
        // The background is never repositioned.
        let adjustment = match spec.role {
            LayerRole::Background => None,
            _ => spec.adjustment.filter(|adj| !adj.is_identity()),
        };

        let decoded = match spec.source.to_rgba() {
            Ok(pixels) => Some(pixels),
            Err(err) if spec.role.is_mandatory() => {
                return Err(BundleError::assembly(format!(
                    "{} layer could not be decoded: {err}",
                    spec.role
                )));
            }
            Err(err) => {
                tracing::warn!(role = %spec.role, error = %err, "optional layer could not be decoded");
                None
            }
        };

        // Untouched layers keep the bytes they arrived in.
        if adjustment.is_none() {
            return Ok((spec.role, Rendered::Clean(spec.source.clone())));
        }

        let source = decoded.map_or_else(|| spec.source.clone(), LayerImage::Decoded);
        Ok((spec.role, self.transformer.transform(&source, adjustment.as_ref())))
    }

    fn render_asset(
        &self,
        layer: &PreparedLayer,
        size: u32,
    ) -> BundleResult<(RenderedAsset, ManifestEntry, Option<Degradation>)> {
        let filename = asset_filename(&self.config.bundle_name, size, layer.role);
        let rendered = self.resampler.resize(&layer.image, size);

        let degradation = rendered.reason().map(|reason| {
            tracing::warn!(role = %layer.role, size, %reason, "resize degraded, packaging unresized image");
            Degradation {
                stage: RenderStage::Resize,
                role: layer.role,
                resolution: Some(size),
                reason: reason.to_string(),
            }
        });

        let bytes = rendered
            .value()
            .to_png_bytes()
            .map_err(|e| BundleError::assembly(format!("{filename}: {e}")))?;

        let entry = ManifestEntry::new(&self.config, filename.clone(), size);
        let asset = RenderedAsset {
            filename,
            role: layer.role,
            resolution: size,
            bytes,
        };
        Ok((asset, entry, degradation))
    }
}

impl std::fmt::Debug for AssetAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetAssembler")
            .field("config", &self.config)
            .field("threads", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}

fn build_thread_pool(threads: Option<usize>) -> BundleResult<rayon::ThreadPool> {
    let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("appicon-render-{i}"));
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| BundleError::assembly(format!("failed to build render thread pool: {e}")))
}

// ============================================================================
// Tests
// ============================================================================
