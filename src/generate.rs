//! Boundary to the external image generator, and the prompts sent to it.
//!
//! Generation and background removal are provided by the caller through
//! [`LayerSource`]; this crate only decides what to ask for.

use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("image generation failed: {0}")]
    Generate(String),

    #[error("background removal failed: {0}")]
    RemoveBackground(String),
}

/// Produces raw layer images for a text prompt.
pub trait LayerSource: Send + Sync {
    /// Generates an encoded image for `prompt`.
    fn generate(&self, prompt: &str) -> Result<Vec<u8>, SourceError>;

    /// Returns `image` with its background made transparent.
    fn remove_background(&self, image: &[u8]) -> Result<Vec<u8>, SourceError>;
}

// ============================================================================
// BackgroundTheme
// ============================================================================

/// Gradient palette picked from keywords in the user's prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackgroundTheme {
    Tech,
    Nature,
    Finance,
    Creative,
    Health,
    Default,
}

impl BackgroundTheme {
    const KEYWORDS: [(BackgroundTheme, [&'static str; 3]); 5] = [
        (Self::Tech, ["tech", "modern", "digital"]),
        (Self::Nature, ["nature", "organic", "eco"]),
        (Self::Finance, ["finance", "corporate", "business"]),
        (Self::Creative, ["creative", "art", "design"]),
        (Self::Health, ["health", "medical", "wellness"]),
    ];

    /// First theme whose keyword appears anywhere in `prompt`, case-insensitively.
    pub fn detect(prompt: &str) -> Self {
        let lower = prompt.to_lowercase();
        Self::KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
            .map(|(theme, _)| *theme)
            .unwrap_or(Self::Default)
    }

    /// Gradient start and end colors.
    pub fn gradient(self) -> (&'static str, &'static str) {
        match self {
            Self::Tech => ("#1e3a8a", "#7c3aed"),
            Self::Nature => ("#065f46", "#059669"),
            Self::Finance => ("#1e293b", "#374151"),
            Self::Creative => ("#ea580c", "#ec4899"),
            Self::Health => ("#0891b2", "#0d9488"),
            Self::Default => ("#1e40af", "#000000"),
        }
    }
}

// ============================================================================
// LayerPrompts
// ============================================================================

/// Generator prompts for the background and a foreground layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerPrompts {
    pub theme: BackgroundTheme,
    pub background: String,
    pub foreground: String,
}

impl LayerPrompts {
    pub fn from_user_prompt(prompt: &str, canvas_size: u32) -> Self {
        let theme = BackgroundTheme::detect(prompt);
        let (from, to) = theme.gradient();
        Self {
            theme,
            background: format!(
                "{canvas_size}x{canvas_size} solid gradient background from {from} to {to}, \
                 smooth, no objects, no text"
            ),
            foreground: foreground_prompt(prompt, canvas_size),
        }
    }
}

/// Prompt for a white silhouette icon of `subject` on a transparent canvas.
pub fn foreground_prompt(subject: &str, canvas_size: u32) -> String {
    format!(
        "{canvas_size}x{canvas_size} sharp vector icon of {subject}, bold white silhouette, \
         high contrast, thick lines, simple geometric design, centered on transparent \
         background, crisp edges, no gradients, flat design style, easily recognizable symbol"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theme_detection_follows_keyword_priority() {
        assert_eq!(BackgroundTheme::detect("A MODERN bank"), BackgroundTheme::Tech);
        assert_eq!(BackgroundTheme::detect("eco friendly farm"), BackgroundTheme::Nature);
        assert_eq!(BackgroundTheme::detect("Corporate law firm"), BackgroundTheme::Finance);
        assert_eq!(BackgroundTheme::detect("design studio"), BackgroundTheme::Creative);
        assert_eq!(BackgroundTheme::detect("wellness retreat"), BackgroundTheme::Health);
        assert_eq!(BackgroundTheme::detect("a cat"), BackgroundTheme::Default);
        // Tech is checked before Creative.
        assert_eq!(BackgroundTheme::detect("digital art"), BackgroundTheme::Tech);
    }

    #[test]
    fn prompts_carry_size_and_gradient() {
        let prompts = LayerPrompts::from_user_prompt("Nature camping app", 1024);
        assert_eq!(prompts.theme, BackgroundTheme::Nature);
        assert_eq!(
            prompts.background,
            "1024x1024 solid gradient background from #065f46 to #059669, smooth, no objects, no text"
        );
        assert!(prompts.foreground.starts_with("1024x1024 sharp vector icon of Nature camping app, bold white silhouette"));
        assert!(prompts.foreground.ends_with("easily recognizable symbol"));
    }

    #[test]
    fn default_theme_gradient() {
        let prompts = LayerPrompts::from_user_prompt("rocket", 512);
        assert!(prompts.background.starts_with("512x512 "));
        assert!(prompts.background.contains("from #1e40af to #000000"));
    }
}
