//! Request and response types exchanged with callers.
//!
//! # Finalize Request Format
//!
//! ```json
//! {
//!   "images": {
//!     "background": { "kind": "staged", "sessionId": "67e55044-10b1-426f-9247-bb680e5fe0c8", "role": "background" },
//!     "layer1": { "kind": "inline", "data": "data:image/png;base64,iVBORw0..." }
//!   },
//!   "adjustments": {
//!     "layer1": { "scale": 80, "x": 0, "y": -12 }
//!   }
//! }
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{BundleError, BundleResult};
use crate::layer::{Degradation, LayerAdjustment, LayerRole, LayerSet};
use crate::manifest::Manifest;
use crate::session::{SessionId, SessionStore, StagedRef};

// ============================================================================
// LayerReference
// ============================================================================

/// Where to find the bytes of one layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LayerReference {
    /// A file staged by an earlier preview.
    Staged(StagedRef),
    /// Base64 image bytes, optionally as a `data:` URL.
    Inline { data: String },
}

impl LayerReference {
    /// Wraps raw bytes as an inline reference.
    pub fn inline(bytes: &[u8]) -> Self {
        Self::Inline {
            data: BASE64.encode(bytes),
        }
    }

    /// Session the reference points into, if staged.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Self::Staged(staged) => Some(staged.session_id),
            Self::Inline { .. } => None,
        }
    }

    /// Loads the referenced bytes.
    pub fn resolve(&self, store: &SessionStore) -> BundleResult<Vec<u8>> {
        match self {
            Self::Staged(staged) => Ok(store.resolve(staged)?),
            Self::Inline { data } => decode_inline(data),
        }
    }
}

impl From<StagedRef> for LayerReference {
    fn from(staged: StagedRef) -> Self {
        Self::Staged(staged)
    }
}

fn decode_inline(data: &str) -> BundleResult<Vec<u8>> {
    let payload = match data.strip_prefix("data:") {
        Some(url) => {
            let (header, body) = url
                .split_once(',')
                .ok_or_else(|| BundleError::input("data URL has no payload"))?;
            if !header.ends_with(";base64") {
                return Err(BundleError::input("data URL must be base64 encoded"));
            }
            body
        }
        None => data,
    };
    BASE64
        .decode(payload.trim())
        .map_err(|e| BundleError::input(format!("inline image is not valid base64: {e}")))
}

// ============================================================================
// PreviewHandle
// ============================================================================

/// Returned by a preview; each layer points into one staging session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewHandle {
    pub session_id: SessionId,
    pub background: StagedRef,
    pub layer1: StagedRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer2: Option<StagedRef>,
}

impl PreviewHandle {
    /// References for a finalize request built from this preview.
    pub fn images(&self) -> LayerImages {
        LayerImages {
            background: self.background.into(),
            layer1: self.layer1.into(),
            layer2: self.layer2.map(LayerReference::from),
        }
    }
}

// ============================================================================
// FinalizeRequest
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerImages {
    pub background: LayerReference,
    pub layer1: LayerReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer2: Option<LayerReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adjustments {
    pub layer1: LayerAdjustment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer2: Option<LayerAdjustment>,
}

/// Everything needed to build one bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizeRequest {
    pub images: LayerImages,
    pub adjustments: Adjustments,
}

impl FinalizeRequest {
    pub fn new(images: LayerImages, layer1: LayerAdjustment) -> Self {
        Self {
            images,
            adjustments: Adjustments {
                layer1,
                layer2: None,
            },
        }
    }

    pub fn with_layer2_adjustment(mut self, adjustment: LayerAdjustment) -> Self {
        self.adjustments.layer2 = Some(adjustment);
        self
    }

    /// Parses and validates a JSON request.
    pub fn from_json(json: &str) -> BundleResult<Self> {
        let request: Self = serde_json::from_str(json)
            .map_err(|e| BundleError::input(format!("malformed finalize request: {e}")))?;
        request.validate()?;
        Ok(request)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn validate(&self) -> BundleResult<()> {
        self.adjustments.layer1.validate()?;
        if let Some(layer2) = &self.adjustments.layer2 {
            layer2.validate()?;
        }
        Ok(())
    }

    /// Adjustment applied to layer 2; identity when none was sent.
    pub fn layer2_adjustment(&self) -> LayerAdjustment {
        self.adjustments.layer2.unwrap_or_default()
    }

    /// Session owning the staged background, if any.
    pub fn background_session(&self) -> Option<SessionId> {
        self.images.background.session_id()
    }

    /// Resolves every reference and builds the layer set.
    ///
    /// References are resolved in role order and the first failure wins.
    pub fn resolve_layers(&self, store: &SessionStore) -> BundleResult<LayerSet> {
        self.validate()?;
        let resolve = |role: LayerRole, reference: &LayerReference| {
            reference.resolve(store).map_err(|e| match e {
                BundleError::Input(msg) => BundleError::input(format!("{role}: {msg}")),
                other => other,
            })
        };

        let background = resolve(LayerRole::Background, &self.images.background)?;
        let layer1 = resolve(LayerRole::Layer1, &self.images.layer1)?;
        let mut layers = LayerSet::new(background, layer1)
            .with_layer1_adjustment(self.adjustments.layer1);

        if let Some(reference) = &self.images.layer2 {
            let layer2 = resolve(LayerRole::Layer2, reference)?;
            layers = layers.with_layer2(layer2, Some(self.layer2_adjustment()));
        }
        Ok(layers)
    }
}

// ============================================================================
// FinalizeOutput
// ============================================================================

/// A finished bundle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeOutput {
    /// Archive bytes; base64 in JSON.
    #[serde(serialize_with = "serialize_base64")]
    pub archive: Vec<u8>,
    pub file_name: String,
    pub manifest: Manifest,
    pub degradations: Vec<Degradation>,
}

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(bytes))
}
