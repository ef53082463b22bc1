use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Url};

use crate::{
    config::ClientConfig,
    error::{GenerationError, Result},
    models::{ImageRequestParams, ImagesResponse},
};

/// Longest slice of an error body kept in a [`GenerationError::Remote`].
const MAX_ERROR_BODY: usize = 512;

/// The remote generation service, as seen by the orchestrator.
///
/// Implementations report every failure through the typed taxonomy; a
/// response whose body carries an `error` object must come back as
/// [`GenerationError::Remote`], not as an `Ok` with no images.
#[async_trait]
pub trait GenerationEndpoint: Send + Sync {
    async fn generate(&self, params: &ImageRequestParams) -> Result<ImagesResponse>;
}

/// OpenAI-compatible `POST /v1/images/generations` over reqwest.
#[derive(Clone)]
pub struct HttpEndpoint {
    client: Client,
    url: String,
}

impl HttpEndpoint {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let url = config.generations_url();
        let parsed = Url::parse(&url).map_err(|e| {
            GenerationError::Config(format!("Invalid base URL '{}': {}", config.base_url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(GenerationError::Config(format!(
                "Base URL '{}' must use http or https",
                config.base_url
            )));
        }

        let mut headers = HeaderMap::new();
        if let Some(api_key) = &config.api_key {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| GenerationError::Config(format!("Invalid API key: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| GenerationError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl GenerationEndpoint for HttpEndpoint {
    async fn generate(&self, params: &ImageRequestParams) -> Result<ImagesResponse> {
        log::debug!(
            "POST {} model={} size={:?} style={:?}",
            self.url,
            params.model,
            params.size,
            params.style
        );

        let response = self
            .client
            .post(&self.url)
            .json(params)
            .send()
            .await
            .map_err(GenerationError::from_dispatch)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message_from_body(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("no reason").to_string());
            log::warn!("Endpoint answered HTTP {}: {}", status.as_u16(), message);
            return Err(GenerationError::Remote {
                status: Some(status.as_u16()),
                message,
            });
        }

        let body: ImagesResponse = response
            .json()
            .await
            .map_err(GenerationError::from_dispatch)?;

        if let Some(error) = &body.error {
            return Err(GenerationError::Remote {
                status: None,
                message: error.message().to_string(),
            });
        }

        Ok(body)
    }
}

fn error_message_from_body(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = serde_json::from_str::<ImagesResponse>(trimmed) {
        if let Some(error) = parsed.error {
            return Some(error.message().to_string());
        }
    }
    Some(trimmed.chars().take(MAX_ERROR_BODY).collect())
}
