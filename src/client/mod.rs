pub mod endpoint;
pub mod fetch;
pub mod orchestrator;
pub mod save;

use crate::{
    config::ClientConfig,
    error::Result,
    models::{supported_models, ImageGenerationRequest, ModelCapability},
    session::Session,
};
use std::sync::Arc;

pub use endpoint::{GenerationEndpoint, HttpEndpoint};
pub use fetch::{FetchedImage, ImageFetcher};
pub use orchestrator::{build_params, Orchestrator, PendingGeneration, PreparedRequest, SizeAdvisory};
pub use save::{format_for_path, save_image};

/// Everything needed to go from a prompt to a saved file: the orchestrator
/// for generation and the fetcher for downloads.
#[derive(Clone)]
pub struct ImageGenClient {
    orchestrator: Orchestrator,
    fetcher: ImageFetcher,
}

impl ImageGenClient {
    /// Talks to the HTTP endpoint described by `config`. Must be called from
    /// inside a tokio runtime.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let endpoint = HttpEndpoint::new(&config)?;
        log::info!("Using generation endpoint {}", endpoint.url());
        Self::with_endpoint(Arc::new(endpoint), config)
    }

    pub fn with_endpoint(endpoint: Arc<dyn GenerationEndpoint>, config: ClientConfig) -> Result<Self> {
        Ok(Self {
            orchestrator: Orchestrator::new(endpoint, &config)?,
            fetcher: ImageFetcher::new(&config)?,
        })
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn fetcher(&self) -> &ImageFetcher {
        &self.fetcher
    }

    /// A fresh shell-side state machine bound to this client.
    pub fn session(&self) -> Session {
        Session::new(self.orchestrator.clone())
    }

    pub fn supported_models() -> &'static [ModelCapability] {
        supported_models()
    }

    /// Generate, wait, then download. Advisories are logged, not asked.
    pub async fn generate_image(&self, request: ImageGenerationRequest) -> Result<FetchedImage> {
        let location = self.orchestrator.submit(request)?.wait().await?;
        self.fetcher.fetch(&location).await
    }
}
