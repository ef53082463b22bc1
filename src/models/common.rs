use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelId {
    #[serde(rename = "flux")]
    Flux,
    #[serde(rename = "flux-pro")]
    FluxPro,
    #[serde(rename = "flux-realism")]
    FluxRealism,
    #[serde(rename = "flux-anime")]
    FluxAnime,
    #[serde(rename = "flux-3d")]
    Flux3d,
    #[serde(rename = "sdxl")]
    Sdxl,
    #[serde(rename = "midjourney")]
    Midjourney,
    #[serde(rename = "dall-e-3")]
    DallE3,
}

impl ModelId {
    pub const ALL: [ModelId; 8] = [
        ModelId::Flux,
        ModelId::FluxPro,
        ModelId::FluxRealism,
        ModelId::FluxAnime,
        ModelId::Flux3d,
        ModelId::Sdxl,
        ModelId::Midjourney,
        ModelId::DallE3,
    ];

    /// Identifier sent to the endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::Flux => "flux",
            ModelId::FluxPro => "flux-pro",
            ModelId::FluxRealism => "flux-realism",
            ModelId::FluxAnime => "flux-anime",
            ModelId::Flux3d => "flux-3d",
            ModelId::Sdxl => "sdxl",
            ModelId::Midjourney => "midjourney",
            ModelId::DallE3 => "dall-e-3",
        }
    }

    pub fn capability(&self) -> &'static ModelCapability {
        capability_of(*self)
    }
}

impl Default for ModelId {
    fn default() -> Self {
        ModelId::Flux
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelId {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ModelId::ALL
            .into_iter()
            .find(|model| model.as_str() == wanted)
            .ok_or_else(|| GenerationError::Validation(format!("Unknown model '{}'", s.trim())))
    }
}

/// Symbolic width:height the caller asks for. Whether it reaches the
/// endpoint depends on the model's [`ModelCapability`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AspectRatio {
    #[default]
    Square,
    Portrait3x4,
    Landscape4x3,
    Portrait9x16,
    Landscape16x9,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Portrait3x4,
        AspectRatio::Landscape4x3,
        AspectRatio::Portrait9x16,
        AspectRatio::Landscape16x9,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait3x4 => "3:4",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Landscape16x9 => "16:9",
        }
    }

    /// Pixel dimensions sent for this ratio.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (1024, 1024),
            AspectRatio::Portrait3x4 => (768, 1024),
            AspectRatio::Landscape4x3 => (1024, 768),
            AspectRatio::Portrait9x16 => (576, 1024),
            AspectRatio::Landscape16x9 => (1024, 576),
        }
    }

    /// `"WxH"` as the endpoint expects it.
    pub fn size_param(&self) -> String {
        let (width, height) = self.dimensions();
        format!("{}x{}", width, height)
    }

    pub fn is_default(&self) -> bool {
        *self == AspectRatio::Square
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        AspectRatio::ALL
            .into_iter()
            .find(|ratio| ratio.as_str() == wanted)
            .ok_or_else(|| {
                GenerationError::Validation(format!(
                    "Unsupported aspect ratio '{}' (expected one of 1:1, 3:4, 4:3, 9:16, 16:9)",
                    s.trim()
                ))
            })
    }
}

/// What a model accepts beyond the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCapability {
    pub model: ModelId,
    pub supports_size: bool,
    pub styles: &'static [&'static str],
    pub requires_api_key: bool,
    pub description: &'static str,
}

impl ModelCapability {
    pub fn accepts_style(&self, style: &str) -> bool {
        self.styles
            .iter()
            .any(|known| known.eq_ignore_ascii_case(style))
    }
}

const FLUX_STYLES: &[&str] = &["photorealistic", "anime", "3d", "cinematic"];
const DALLE_STYLES: &[&str] = &["vivid", "natural"];

static CAPABILITIES: [ModelCapability; 8] = [
    ModelCapability {
        model: ModelId::Flux,
        supports_size: true,
        styles: FLUX_STYLES,
        requires_api_key: false,
        description: "General purpose Flux model",
    },
    ModelCapability {
        model: ModelId::FluxPro,
        supports_size: true,
        styles: FLUX_STYLES,
        requires_api_key: false,
        description: "Higher fidelity Flux model",
    },
    ModelCapability {
        model: ModelId::FluxRealism,
        supports_size: true,
        styles: FLUX_STYLES,
        requires_api_key: false,
        description: "Flux tuned for photographic output",
    },
    ModelCapability {
        model: ModelId::FluxAnime,
        supports_size: false,
        styles: FLUX_STYLES,
        requires_api_key: false,
        description: "Flux tuned for anime illustration",
    },
    ModelCapability {
        model: ModelId::Flux3d,
        supports_size: false,
        styles: FLUX_STYLES,
        requires_api_key: false,
        description: "Flux tuned for 3D renders",
    },
    ModelCapability {
        model: ModelId::Sdxl,
        supports_size: true,
        styles: &[],
        requires_api_key: false,
        description: "Stable Diffusion XL",
    },
    ModelCapability {
        model: ModelId::Midjourney,
        supports_size: false,
        styles: &[],
        requires_api_key: false,
        description: "Midjourney proxy, fixed output size",
    },
    ModelCapability {
        model: ModelId::DallE3,
        supports_size: true,
        styles: DALLE_STYLES,
        requires_api_key: true,
        description: "DALL-E 3, needs an API key",
    },
];

fn capability_of(model: ModelId) -> &'static ModelCapability {
    // The table is indexed in ModelId::ALL order.
    &CAPABILITIES[model as usize]
}

/// Every known model with its capability entry, in display order.
pub fn supported_models() -> &'static [ModelCapability] {
    &CAPABILITIES
}
