use std::fmt;

use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{GenerationError, Result};
use crate::models::{AspectRatio, ModelId};

/// Response representation asked from the endpoint. Always a reference,
/// never inline bytes.
pub const RESPONSE_FORMAT_URL: &str = "url";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageGenerationRequest {
    pub prompt: String,
    pub model: ModelId,
    pub ratio: AspectRatio,
    pub style: Option<String>,
}

impl ImageGenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: ModelId::default(),
            ratio: AspectRatio::default(),
            style: None,
        }
    }

    pub fn with_model(mut self, model: ModelId) -> Self {
        self.model = model;
        self
    }

    pub fn with_ratio(mut self, ratio: AspectRatio) -> Self {
        self.ratio = ratio;
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }
}

/// JSON body posted to the generation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRequestParams {
    pub prompt: String,
    pub model: ModelId,
    pub response_format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl ImageRequestParams {
    /// Copy of these parameters with the size dropped, used for the one
    /// fallback attempt.
    pub fn without_size(&self) -> Self {
        Self {
            size: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImagesResponse {
    #[serde(default)]
    pub data: Vec<ImageData>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageData {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ApiErrorBody {
    Detailed { message: String },
    Plain(String),
}

impl ApiErrorBody {
    pub fn message(&self) -> &str {
        match self {
            ApiErrorBody::Detailed { message } => message,
            ApiErrorBody::Plain(message) => message,
        }
    }
}

/// Where a generated image can be downloaded from: an http(s) URL or an
/// inline `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageLocation(Url);

impl ImageLocation {
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw.trim()).map_err(|e| {
            GenerationError::MalformedResponse(format!("Invalid image location '{}': {}", raw, e))
        })?;
        match url.scheme() {
            "http" | "https" | "data" => Ok(Self(url)),
            other => Err(GenerationError::MalformedResponse(format!(
                "Unsupported image location scheme '{}'",
                other
            ))),
        }
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_inline(&self) -> bool {
        self.0.scheme() == "data"
    }
}

impl fmt::Display for ImageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_inline() {
            // data: URIs can be megabytes long
            write!(f, "data:<{} bytes>", self.0.as_str().len())
        } else {
            f.write_str(self.0.as_str())
        }
    }
}

/// Outcome of one submission, delivered exactly once.
pub type GenerationResult = Result<ImageLocation>;
