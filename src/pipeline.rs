//! End-to-end preview and finalize flow.
//!
//! An [`IconPipeline`] ties the staging store to the assembler:
//!
//! 1. **Preview** - layers are generated (or supplied) and staged in a fresh
//!    session; the caller gets a [`PreviewHandle`]
//! 2. **Finalize** - references are resolved, the bundle is assembled and
//!    archived, and the preview session is cleaned up
//!
//! # Example
//!
//! ```
//! use appicon_forge::{BundleConfig, FinalizeRequest, IconPipeline, LayerAdjustment};
//! use image::{Rgba, RgbaImage};
//!
//! # let staging = std::env::temp_dir().join("appicon-forge-doctest");
//! let config = BundleConfig::new()
//!     .with_canonical_size(32)
//!     .with_resolutions([32, 16])
//!     .with_staging_root(staging);
//! let pipeline = IconPipeline::new(config).unwrap();
//!
//! let png = |color| {
//!     let mut bytes = Vec::new();
//!     RgbaImage::from_pixel(32, 32, Rgba(color))
//!         .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
//!         .unwrap();
//!     bytes
//! };
//!
//! let handle = pipeline.stage_preview(&png([255, 0, 0, 255]), &png([0, 0, 255, 255]), None).unwrap();
//! let request = FinalizeRequest::new(handle.images(), LayerAdjustment::new(50.0, 0.0, 0.0));
//! let output = pipeline.finalize(&request).unwrap();
//!
//! assert_eq!(output.manifest.len(), 4);
//! assert_eq!(output.file_name, "visionOS-AppIcon-Assets.zip");
//! ```

use chrono::{DateTime, Utc};

use crate::archive::ZipArchiveWriter;
use crate::assembler::AssetAssembler;
use crate::codec;
use crate::config::BundleConfig;
use crate::error::{BundleError, BundleResult};
use crate::generate::{LayerPrompts, LayerSource, foreground_prompt};
use crate::layer::LayerRole;
use crate::request::{FinalizeOutput, FinalizeRequest, PreviewHandle};
use crate::resample::Resampler;
use crate::session::{SessionId, SessionStore, StagingError};

/// Preview-then-finalize orchestration over one staging root.
#[derive(Debug)]
pub struct IconPipeline {
    store: SessionStore,
    assembler: AssetAssembler,
}

impl IconPipeline {
    /// Creates a pipeline whose staging root comes from `config`.
    pub fn new(config: BundleConfig) -> BundleResult<Self> {
        let assembler = AssetAssembler::new(config)?;
        Self::from_parts(assembler)
    }

    /// Creates a pipeline with a custom resampling backend.
    pub fn with_resampler(config: BundleConfig, resampler: Resampler) -> BundleResult<Self> {
        let assembler = AssetAssembler::with_resampler(config, resampler)?;
        Self::from_parts(assembler)
    }

    fn from_parts(assembler: AssetAssembler) -> BundleResult<Self> {
        let root = assembler.config().staging_root();
        let store = SessionStore::new(&root).map_err(|e| {
            BundleError::assembly(format!("cannot open staging root {}: {e}", root.display()))
        })?;
        Ok(Self { store, assembler })
    }

    pub fn config(&self) -> &BundleConfig {
        self.assembler.config()
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn assembler(&self) -> &AssetAssembler {
        &self.assembler
    }

    // ========================================================================
    // Preview
    // ========================================================================

    /// Stages already-generated layers in a new session.
    ///
    /// On failure the half-built session is destroyed.
    #[tracing::instrument(skip_all, fields(layer2 = layer2.is_some()))]
    pub fn stage_preview(
        &self,
        background: &[u8],
        layer1: &[u8],
        layer2: Option<&[u8]>,
    ) -> BundleResult<PreviewHandle> {
        let session = self
            .store
            .create_session()
            .map_err(|e| BundleError::assembly(format!("cannot create staging session: {e}")))?;
        self.stage_into(session, background, layer1, layer2)
    }

    /// Stages layers into an existing session, destroying it on failure.
    fn stage_into(
        &self,
        session: SessionId,
        background: &[u8],
        layer1: &[u8],
        layer2: Option<&[u8]>,
    ) -> BundleResult<PreviewHandle> {
        let staged = (|| {
            let background = self.store.stage(session, LayerRole::Background, background)?;
            let layer1 = self.store.stage(session, LayerRole::Layer1, layer1)?;
            let layer2 = layer2
                .map(|bytes| self.store.stage(session, LayerRole::Layer2, bytes))
                .transpose()?;
            Ok::<_, StagingError>(PreviewHandle {
                session_id: session,
                background,
                layer1,
                layer2,
            })
        })();

        match staged {
            Ok(handle) => {
                tracing::info!(session = %session, layer2 = handle.layer2.is_some(), "staged preview");
                Ok(handle)
            }
            Err(err) => {
                self.cleanup(session);
                Err(BundleError::assembly(format!("failed to stage preview: {err}")))
            }
        }
    }

    /// Generates layers for `prompt` through `source` and stages them.
    ///
    /// The background is generated as is; foreground layers go through
    /// background removal. `secondary` adds a layer 2 icon.
    #[tracing::instrument(skip(self, source))]
    pub fn generate_preview(
        &self,
        source: &dyn LayerSource,
        prompt: &str,
        secondary: Option<&str>,
    ) -> BundleResult<PreviewHandle> {
        if prompt.trim().is_empty() {
            return Err(BundleError::input("prompt is required"));
        }
        let size = self.config().canonical_size;
        let prompts = LayerPrompts::from_user_prompt(prompt, size);
        tracing::debug!(theme = ?prompts.theme, "derived layer prompts");

        let background = source.generate(&prompts.background)?;
        let layer1 = foreground(source, &prompts.foreground)?;
        let layer2 = secondary
            .filter(|subject| !subject.trim().is_empty())
            .map(|subject| foreground(source, &foreground_prompt(subject, size)))
            .transpose()?;

        self.stage_preview(&background, &layer1, layer2.as_deref())
    }

    /// Generates a background and a logo for `prompt` and packages them
    /// directly as an image set, without staging or adjustments.
    #[tracing::instrument(skip(self, source))]
    pub fn generate_bundle(
        &self,
        source: &dyn LayerSource,
        prompt: &str,
    ) -> BundleResult<FinalizeOutput> {
        if prompt.trim().is_empty() {
            return Err(BundleError::input("prompt is required"));
        }
        let prompts = LayerPrompts::from_user_prompt(prompt, self.config().canonical_size);

        let background = source.generate(&prompts.background)?;
        let logo = foreground(source, &prompts.foreground)?;
        let archive = self
            .assembler
            .package_imageset(&background, &logo, ZipArchiveWriter::new())?;

        Ok(FinalizeOutput {
            archive,
            file_name: self.config().imageset.archive_name.clone(),
            manifest: self.assembler.imageset_manifest(),
            degradations: Vec::new(),
        })
    }

    /// Resolves a request and returns the flattened stack as PNG.
    ///
    /// Staged sessions are left in place.
    pub fn render_preview(&self, request: &FinalizeRequest) -> BundleResult<Vec<u8>> {
        let layers = request.resolve_layers(&self.store)?;
        let flat = self.assembler.flatten(&layers)?;
        Ok(codec::encode_png(&flat)?)
    }

    // ========================================================================
    // Finalize
    // ========================================================================

    /// Builds the archive for `request`.
    pub fn finalize(&self, request: &FinalizeRequest) -> BundleResult<FinalizeOutput> {
        self.finalize_at(request, Utc::now())
    }

    /// Parses a JSON request and finalizes it.
    pub fn finalize_json(&self, json: &str) -> BundleResult<FinalizeOutput> {
        let request = FinalizeRequest::from_json(json)?;
        self.finalize(&request)
    }

    /// Builds the archive, stamping the README with `generated_at`.
    ///
    /// After success or an assembly failure, the session holding the staged
    /// background is destroyed. Input and expired-staging errors leave it
    /// alone so the caller can retry.
    #[tracing::instrument(skip_all)]
    pub fn finalize_at(
        &self,
        request: &FinalizeRequest,
        generated_at: DateTime<Utc>,
    ) -> BundleResult<FinalizeOutput> {
        let result = request.resolve_layers(&self.store).and_then(|layers| {
            let bundle = self.assembler.assemble_at(&layers, generated_at)?;
            let archive = self.assembler.package(&bundle, ZipArchiveWriter::new())?;
            Ok(FinalizeOutput {
                archive,
                file_name: self.config().archive_name.clone(),
                manifest: bundle.manifest,
                degradations: bundle.degradations,
            })
        });

        match &result {
            Ok(output) => tracing::info!(
                files = output.manifest.len(),
                bytes = output.archive.len(),
                "finalized icon bundle"
            ),
            Err(err) => tracing::error!(error = %err, "finalize failed"),
        }

        // Assembly failures clean up whether they happened while resolving
        // or while rendering.
        if let Some(session) = request.background_session() {
            if matches!(result, Ok(_) | Err(BundleError::Assembly(_))) {
                self.cleanup(session);
            }
        }
        result
    }

    fn cleanup(&self, session: SessionId) {
        if let Err(err) = self.store.destroy(session) {
            tracing::warn!(session = %session, error = %err, "failed to clean up staging session");
        }
    }
}

fn foreground(source: &dyn LayerSource, prompt: &str) -> BundleResult<Vec<u8>> {
    let raw = source.generate(prompt)?;
    Ok(source.remove_background(&raw)?)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::SourceError;
    use crate::layer::LayerAdjustment;
    use crate::request::{LayerImages, LayerReference};
    use crate::session::{SessionState, StagedRef};
    use chrono::TimeZone;
    use image::{Rgba, RgbaImage};
    use std::io::{Cursor, Read};
    use std::sync::Mutex;

    fn png(size: u32, color: [u8; 4]) -> Vec<u8> {
        codec::encode_png(&RgbaImage::from_pixel(size, size, Rgba(color))).unwrap()
    }

    fn pipeline() -> (tempfile::TempDir, IconPipeline) {
        let dir = tempfile::tempdir().unwrap();
        let config = BundleConfig::new()
            .with_canonical_size(32)
            .with_resolutions([32, 16])
            .with_worker_threads(2)
            .with_staging_root(dir.path().join("staging"));
        (dir, IconPipeline::new(config).unwrap())
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 6, 7, 8, 9).unwrap()
    }

    fn archive_names(bytes: &[u8]) -> Vec<String> {
        let archive = zip::ZipArchive::new(Cursor::new(bytes.to_vec())).unwrap();
        archive.file_names().map(str::to_string).collect()
    }

    /// Records prompts and returns solid images.
    #[derive(Default)]
    struct FakeSource {
        prompts: Mutex<Vec<String>>,
        removals: Mutex<usize>,
        fail_removal: bool,
    }

    impl LayerSource for FakeSource {
        fn generate(&self, prompt: &str) -> Result<Vec<u8>, SourceError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(png(32, [200, 200, 200, 255]))
        }

        fn remove_background(&self, image: &[u8]) -> Result<Vec<u8>, SourceError> {
            if self.fail_removal {
                return Err(SourceError::RemoveBackground("service down".into()));
            }
            *self.removals.lock().unwrap() += 1;
            Ok(image.to_vec())
        }
    }

    #[test]
    fn staged_roundtrip_cleans_up_session() {
        let (_dir, pipeline) = pipeline();
        let handle = pipeline
            .stage_preview(&png(32, [255, 0, 0, 255]), &png(32, [0, 0, 255, 255]), None)
            .unwrap();
        assert_eq!(pipeline.store().state(handle.session_id), SessionState::Staged);

        let request = FinalizeRequest::new(handle.images(), LayerAdjustment::new(50.0, 0.0, 0.0));
        let output = pipeline.finalize_at(&request, fixed_time()).unwrap();

        assert_eq!(output.manifest.len(), 4);
        assert!(output.degradations.is_empty());
        assert_eq!(archive_names(&output.archive).len(), 6);
        assert_eq!(pipeline.store().state(handle.session_id), SessionState::Destroyed);
    }

    #[test]
    fn scenario_b_no_layer2() {
        let (_dir, pipeline) = pipeline();
        let handle = pipeline
            .stage_preview(&png(32, [1, 1, 1, 255]), &png(32, [2, 2, 2, 255]), None)
            .unwrap();
        let output = pipeline
            .finalize(&FinalizeRequest::new(handle.images(), LayerAdjustment::IDENTITY))
            .unwrap();

        assert!(output.manifest.filenames().all(|f| !f.contains("Layer2")));
        assert!(archive_names(&output.archive).iter().all(|f| !f.contains("Layer2")));

        let mut archive = zip::ZipArchive::new(Cursor::new(output.archive)).unwrap();
        let mut readme = String::new();
        archive
            .by_name("README.md")
            .unwrap()
            .read_to_string(&mut readme)
            .unwrap();
        assert!(!readme.contains("Layer 2"));
    }

    #[test]
    fn layer2_without_adjustment_uses_identity() {
        let (_dir, pipeline) = pipeline();
        let handle = pipeline
            .stage_preview(
                &png(32, [1, 1, 1, 255]),
                &png(32, [2, 2, 2, 255]),
                Some(&png(32, [3, 3, 3, 255])),
            )
            .unwrap();
        let output = pipeline
            .finalize(&FinalizeRequest::new(handle.images(), LayerAdjustment::new(60.0, 1.0, 1.0)))
            .unwrap();

        assert_eq!(output.manifest.len(), 6);
        let mut archive = zip::ZipArchive::new(Cursor::new(output.archive)).unwrap();
        let mut readme = String::new();
        archive
            .by_name("README.md")
            .unwrap()
            .read_to_string(&mut readme)
            .unwrap();
        assert!(readme.contains("### Layer 2 (Secondary Element)\n- Scale: 100%"));
    }

    #[test]
    fn scenario_c_expired_session() {
        let (_dir, pipeline) = pipeline();
        let gone = SessionId::generate();
        let images = LayerImages {
            background: StagedRef { session_id: gone, role: LayerRole::Background }.into(),
            layer1: StagedRef { session_id: gone, role: LayerRole::Layer1 }.into(),
            layer2: None,
        };
        let err = pipeline
            .finalize(&FinalizeRequest::new(images, LayerAdjustment::IDENTITY))
            .unwrap_err();
        assert!(matches!(err, BundleError::StagingExpired(_)), "{err}");
    }

    #[test]
    fn finalizing_twice_reports_expired() {
        let (_dir, pipeline) = pipeline();
        let handle = pipeline
            .stage_preview(&png(32, [1, 1, 1, 255]), &png(32, [2, 2, 2, 255]), None)
            .unwrap();
        let request = FinalizeRequest::new(handle.images(), LayerAdjustment::IDENTITY);
        pipeline.finalize(&request).unwrap();
        assert!(matches!(
            pipeline.finalize(&request),
            Err(BundleError::StagingExpired(_))
        ));
    }

    #[test]
    fn input_error_keeps_session() {
        let (_dir, pipeline) = pipeline();
        let handle = pipeline
            .stage_preview(&png(32, [1, 1, 1, 255]), &png(32, [2, 2, 2, 255]), None)
            .unwrap();
        let mut images = handle.images();
        images.layer1 = LayerReference::Inline { data: "%%%".into() };

        let err = pipeline
            .finalize(&FinalizeRequest::new(images, LayerAdjustment::IDENTITY))
            .unwrap_err();
        assert!(matches!(err, BundleError::Input(_)));
        assert_eq!(pipeline.store().state(handle.session_id), SessionState::Staged);
    }

    #[test]
    fn assembly_error_cleans_up_session() {
        let (_dir, pipeline) = pipeline();
        let handle = pipeline
            .stage_preview(b"not an image", &png(32, [2, 2, 2, 255]), None)
            .unwrap();
        let err = pipeline
            .finalize(&FinalizeRequest::new(handle.images(), LayerAdjustment::IDENTITY))
            .unwrap_err();
        assert!(matches!(err, BundleError::Assembly(_)));
        assert_eq!(pipeline.store().state(handle.session_id), SessionState::Destroyed);
    }

    #[cfg(unix)]
    #[test]
    fn failed_staging_destroys_the_new_session() {
        let (_dir, pipeline) = pipeline();
        let session = pipeline.store().create_session().unwrap();
        let session_dir = pipeline.store().root().join(session.to_string());
        // A directory where layer1.png should go makes the final rename fail.
        std::fs::create_dir(session_dir.join("layer1.png")).unwrap();

        let err = pipeline
            .stage_into(session, &png(32, [1, 1, 1, 255]), &png(32, [2, 2, 2, 255]), None)
            .unwrap_err();
        assert!(matches!(err, BundleError::Assembly(_)), "{err}");
        assert!(!session_dir.exists());
        assert_eq!(pipeline.store().state(session), SessionState::Destroyed);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_staged_layer_cleans_up_session() {
        let (_dir, pipeline) = pipeline();
        let handle = pipeline
            .stage_preview(&png(32, [1, 1, 1, 255]), &png(32, [2, 2, 2, 255]), None)
            .unwrap();
        let staged = pipeline
            .store()
            .root()
            .join(handle.session_id.to_string())
            .join("layer1.png");
        std::fs::remove_file(&staged).unwrap();
        std::fs::create_dir(&staged).unwrap();

        let err = pipeline
            .finalize(&FinalizeRequest::new(handle.images(), LayerAdjustment::IDENTITY))
            .unwrap_err();
        assert!(matches!(err, BundleError::Assembly(_)), "{err}");
        assert_eq!(pipeline.store().state(handle.session_id), SessionState::Destroyed);
    }

    #[test]
    fn inline_request_from_json() {
        let (_dir, pipeline) = pipeline();
        let request = FinalizeRequest::new(
            LayerImages {
                background: LayerReference::inline(&png(32, [9, 9, 9, 255])),
                layer1: LayerReference::inline(&png(16, [0, 255, 0, 255])),
                layer2: None,
            },
            LayerAdjustment::new(75.0, -2.0, 3.0),
        );
        let json = request.to_json().unwrap();

        let first = pipeline.finalize_json(&json).unwrap();
        let second = pipeline.finalize_json(&json).unwrap();
        assert_eq!(first.manifest, second.manifest);
        assert_eq!(first.manifest.len(), 4);
    }

    #[test]
    fn finalize_json_rejects_garbage() {
        let (_dir, pipeline) = pipeline();
        assert!(matches!(
            pipeline.finalize_json("{not json"),
            Err(BundleError::Input(_))
        ));
    }

    #[test]
    fn generate_preview_stages_all_layers() {
        let (_dir, pipeline) = pipeline();
        let source = FakeSource::default();
        let handle = pipeline
            .generate_preview(&source, "eco friendly bakery", Some("leaf"))
            .unwrap();

        assert!(handle.layer2.is_some());
        assert_eq!(*source.removals.lock().unwrap(), 2);

        let prompts = source.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].starts_with("32x32 solid gradient background from #065f46"));
        assert!(prompts[1].contains("icon of eco friendly bakery"));
        assert!(prompts[2].contains("icon of leaf"));

        let staged = pipeline.store().resolve(&handle.layer1).unwrap();
        assert_eq!(codec::decode(&staged).unwrap().dimensions(), (32, 32));
    }

    #[test]
    fn generator_failure_creates_no_session() {
        let (dir, pipeline) = pipeline();
        let source = FakeSource {
            fail_removal: true,
            ..FakeSource::default()
        };
        let err = pipeline.generate_preview(&source, "rocket", None).unwrap_err();
        assert!(matches!(err, BundleError::Assembly(_)));

        let sessions = std::fs::read_dir(dir.path().join("staging")).unwrap().count();
        assert_eq!(sessions, 0);
    }

    #[test]
    fn generate_bundle_packages_logo_imageset() {
        let (dir, pipeline) = pipeline();
        let source = FakeSource::default();
        let output = pipeline.generate_bundle(&source, "health clinic").unwrap();

        assert_eq!(output.file_name, "LogoAssets.zip");
        assert_eq!(
            output.manifest.filenames().collect::<Vec<_>>(),
            vec!["Background.png", "Logo.png"]
        );
        assert_eq!(output.manifest.info.author, "xcode");
        assert!(output.degradations.is_empty());

        let mut names = archive_names(&output.archive);
        names.sort();
        assert_eq!(
            names,
            vec![
                "Logo.imageset/Background.png",
                "Logo.imageset/Contents.json",
                "Logo.imageset/Logo.png",
            ]
        );

        // Only the logo goes through background removal.
        assert_eq!(*source.removals.lock().unwrap(), 1);
        let prompts = source.prompts.lock().unwrap();
        assert!(prompts[0].contains("from #0891b2 to #0d9488"));
        assert!(prompts[1].contains("icon of health clinic"));

        // Nothing is staged.
        let sessions = std::fs::read_dir(dir.path().join("staging")).unwrap().count();
        assert_eq!(sessions, 0);
    }

    #[test]
    fn generate_bundle_requires_prompt() {
        let (_dir, pipeline) = pipeline();
        assert!(matches!(
            pipeline.generate_bundle(&FakeSource::default(), ""),
            Err(BundleError::Input(_))
        ));
    }

    #[test]
    fn empty_prompt_is_input_error() {
        let (_dir, pipeline) = pipeline();
        let err = pipeline
            .generate_preview(&FakeSource::default(), "  ", None)
            .unwrap_err();
        assert!(matches!(err, BundleError::Input(_)));
    }

    #[test]
    fn render_preview_keeps_session() {
        let (_dir, pipeline) = pipeline();
        let handle = pipeline
            .stage_preview(&png(32, [255, 0, 0, 255]), &png(32, [0, 0, 255, 255]), None)
            .unwrap();
        let request = FinalizeRequest::new(handle.images(), LayerAdjustment::new(50.0, 0.0, 0.0));

        let flat = codec::decode(&pipeline.render_preview(&request).unwrap()).unwrap();
        assert_eq!(flat.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(pipeline.store().state(handle.session_id), SessionState::Staged);
    }
}
