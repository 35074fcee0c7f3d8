//! Layer roles, placement adjustments and per-item render outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::LayerImage;
use crate::error::BundleError;

// ============================================================================
// LayerRole
// ============================================================================

/// Fixed semantic slot of a layer in the icon stack.
///
/// Ordering follows the stacking order: background first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LayerRole {
    Background,
    Layer1,
    Layer2,
}

impl LayerRole {
    pub const ALL: [LayerRole; 3] = [Self::Background, Self::Layer1, Self::Layer2];

    /// Name used in packaged file names, e.g. `AppIcon-512-Layer1.png`.
    pub fn file_label(self) -> &'static str {
        match self {
            Self::Background => "Background",
            Self::Layer1 => "Layer1",
            Self::Layer2 => "Layer2",
        }
    }

    /// Lowercase key used on the wire and in staging file names.
    pub fn key(self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::Layer1 => "layer1",
            Self::Layer2 => "layer2",
        }
    }

    /// Returns true for layers that must be present in every bundle.
    pub fn is_mandatory(self) -> bool {
        !matches!(self, Self::Layer2)
    }
}

impl fmt::Display for LayerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ============================================================================
// LayerAdjustment
// ============================================================================

/// Uniform scale plus translation applied to a foreground layer.
///
/// `x` and `y` are pixel offsets relative to the centered position on the
/// canonical canvas. Missing fields deserialize to their identity values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerAdjustment {
    /// Scale in percent of the canonical size.
    pub scale: f32,
    pub x: f32,
    pub y: f32,
}

impl Default for LayerAdjustment {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl LayerAdjustment {
    pub const IDENTITY: Self = Self {
        scale: 100.0,
        x: 0.0,
        y: 0.0,
    };

    pub fn new(scale: f32, x: f32, y: f32) -> Self {
        Self { scale, x, y }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Scale as a multiplier (100% == 1.0).
    pub fn scale_factor(&self) -> f32 {
        self.scale / 100.0
    }

    /// Rejects values that cannot describe a placement.
    pub fn validate(&self) -> Result<(), BundleError> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(BundleError::input(format!(
                "adjustment scale must be a positive number, got {}",
                self.scale
            )));
        }
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err(BundleError::input("adjustment offsets must be finite"));
        }
        Ok(())
    }
}

// ============================================================================
// LayerSpec / LayerSet
// ============================================================================

/// One input layer: its role, source image and optional placement.
#[derive(Debug, Clone)]
pub struct LayerSpec {
    pub role: LayerRole,
    pub source: LayerImage,
    pub adjustment: Option<LayerAdjustment>,
}

/// The layers of one icon. Background and layer 1 are mandatory.
#[derive(Debug, Clone)]
pub struct LayerSet {
    background: LayerImage,
    layer1: (LayerImage, Option<LayerAdjustment>),
    layer2: Option<(LayerImage, Option<LayerAdjustment>)>,
}

impl LayerSet {
    pub fn new(background: impl Into<LayerImage>, layer1: impl Into<LayerImage>) -> Self {
        Self {
            background: background.into(),
            layer1: (layer1.into(), None),
            layer2: None,
        }
    }

    pub fn with_layer1_adjustment(mut self, adjustment: LayerAdjustment) -> Self {
        self.layer1.1 = Some(adjustment);
        self
    }

    pub fn with_layer2(
        mut self,
        image: impl Into<LayerImage>,
        adjustment: Option<LayerAdjustment>,
    ) -> Self {
        self.layer2 = Some((image.into(), adjustment));
        self
    }

    pub fn has_layer2(&self) -> bool {
        self.layer2.is_some()
    }

    /// Roles present in this set, in stacking order.
    pub fn roles(&self) -> Vec<LayerRole> {
        LayerRole::ALL
            .into_iter()
            .filter(|role| *role != LayerRole::Layer2 || self.has_layer2())
            .collect()
    }

    /// Adjustment that will actually be applied to `role`.
    ///
    /// The background never receives one.
    pub fn adjustment(&self, role: LayerRole) -> Option<LayerAdjustment> {
        match role {
            LayerRole::Background => None,
            LayerRole::Layer1 => self.layer1.1,
            LayerRole::Layer2 => self.layer2.as_ref().and_then(|(_, adj)| *adj),
        }
    }

    /// Expands the set into one spec per present role, in stacking order.
    pub fn specs(&self) -> Vec<LayerSpec> {
        let mut specs = vec![
            LayerSpec {
                role: LayerRole::Background,
                source: self.background.clone(),
                adjustment: None,
            },
            LayerSpec {
                role: LayerRole::Layer1,
                source: self.layer1.0.clone(),
                adjustment: self.layer1.1,
            },
        ];
        if let Some((image, adjustment)) = &self.layer2 {
            specs.push(LayerSpec {
                role: LayerRole::Layer2,
                source: image.clone(),
                adjustment: *adjustment,
            });
        }
        specs
    }
}

// ============================================================================
// Rendered / Degradation
// ============================================================================

/// Outcome of a best-effort render step.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered<T> {
    /// The step ran as requested.
    Clean(T),
    /// The step failed; `fallback` stands in for its output.
    Degraded { fallback: T, reason: String },
}

impl<T> Rendered<T> {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Clean(_) => None,
            Self::Degraded { reason, .. } => Some(reason),
        }
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Clean(value) | Self::Degraded { fallback: value, .. } => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Clean(value) | Self::Degraded { fallback: value, .. } => value,
        }
    }
}

/// Pipeline step that degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RenderStage {
    Transform,
    Resize,
}

/// Record of one degraded item, reported alongside the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Degradation {
    pub stage: RenderStage,
    pub role: LayerRole,
    /// Target resolution, for resize degradations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<u32>,
    pub reason: String,
}
