use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use reqwest::Client;

use crate::{
    config::ClientConfig,
    error::{FetchFailure, GenerationError, Result},
    logger,
    models::ImageLocation,
};

/// A downloaded and decoded image, together with the bytes it came from.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub location: ImageLocation,
    pub bytes: Vec<u8>,
    pub image: DynamicImage,
}

impl FetchedImage {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    /// Downscaled copy that fits in `max_width` x `max_height`, keeping the
    /// aspect ratio.
    pub fn preview(&self, max_width: u32, max_height: u32) -> DynamicImage {
        self.image.thumbnail(max_width, max_height)
    }
}

/// Downloads generated images. Fetching the same location twice repeats the
/// same request; nothing is cached.
#[derive(Clone)]
pub struct ImageFetcher {
    client: Client,
    timeout: Duration,
}

impl ImageFetcher {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.fetch_timeout)
            .build()
            .map_err(|e| GenerationError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            timeout: config.fetch_timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn fetch(&self, location: &ImageLocation) -> Result<FetchedImage> {
        let _timer = logger::timer("fetch image");

        let bytes = if location.is_inline() {
            decode_data_uri(location.as_str())?
        } else {
            self.download(location).await?
        };

        let image = image::load_from_memory(&bytes)?;
        log::info!(
            "Fetched {}x{} image ({} bytes) from {}",
            image.width(),
            image.height(),
            bytes.len(),
            location
        );

        Ok(FetchedImage {
            location: location.clone(),
            bytes,
            image,
        })
    }

    async fn download(&self, location: &ImageLocation) -> Result<Vec<u8>> {
        log::debug!("GET {} (timeout {:?})", location, self.timeout);

        let response = self
            .client
            .get(location.url().clone())
            .send()
            .await
            .map_err(GenerationError::from_fetch)?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::Fetch {
                failure: FetchFailure::HttpStatus(status.as_u16()),
                message: format!("GET {} returned {}", location, status),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(GenerationError::from_fetch)?;
        Ok(bytes.to_vec())
    }
}

/// Decodes `data:[<mediatype>][;base64],<payload>`. Only base64 payloads
/// are accepted since images are binary.
fn decode_data_uri(uri: &str) -> Result<Vec<u8>> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| GenerationError::Decode("Not a data URI".into()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| GenerationError::Decode("Data URI has no payload".into()))?;
    if !meta.ends_with(";base64") {
        return Err(GenerationError::Decode(
            "Data URI is not base64 encoded".into(),
        ));
    }
    STANDARD
        .decode(payload.trim())
        .map_err(|e| GenerationError::Decode(format!("Invalid base64 payload: {}", e)))
}
