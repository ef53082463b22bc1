use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::oneshot::{self, error::TryRecvError};
use uuid::Uuid;

use crate::{
    client::GenerationEndpoint,
    config::{ClientConfig, FallbackPolicy},
    error::{GenerationError, Result},
    logger,
    models::{
        AspectRatio, GenerationResult, ImageGenerationRequest, ImageLocation, ImageRequestParams,
        ImagesResponse, ModelId, RESPONSE_FORMAT_URL,
    },
};

/// Raised before dispatch when the chosen model ignores the requested ratio.
/// The caller decides whether to go ahead anyway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeAdvisory {
    pub model: ModelId,
    pub requested: AspectRatio,
}

impl fmt::Display for SizeAdvisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Model '{}' does not support custom sizes; the image will use its default size instead of {}",
            self.model, self.requested
        )
    }
}

/// A validated request with its wire parameters already assembled.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    request: ImageGenerationRequest,
    params: ImageRequestParams,
    advisory: Option<SizeAdvisory>,
}

impl PreparedRequest {
    pub fn request(&self) -> &ImageGenerationRequest {
        &self.request
    }

    pub fn params(&self) -> &ImageRequestParams {
        &self.params
    }

    pub fn advisory(&self) -> Option<&SizeAdvisory> {
        self.advisory.as_ref()
    }
}

/// Assembles the endpoint body from the model's capability entry. Size and
/// style are only included when the model accepts them.
pub fn build_params(request: &ImageGenerationRequest) -> ImageRequestParams {
    let capability = request.model.capability();

    let size = capability
        .supports_size
        .then(|| request.ratio.size_param());

    let style = request
        .style
        .as_deref()
        .map(str::trim)
        .filter(|style| !style.is_empty() && capability.accepts_style(style))
        .map(str::to_ascii_lowercase);

    ImageRequestParams {
        prompt: request.prompt.trim().to_string(),
        model: request.model,
        response_format: RESPONSE_FORMAT_URL.to_string(),
        size,
        style,
    }
}

/// Runs generation requests off the caller's thread and hands each result
/// back through a one-shot channel.
///
/// Holds no per-request state; clones share the endpoint and can serve any
/// number of callers.
#[derive(Clone)]
pub struct Orchestrator {
    endpoint: Arc<dyn GenerationEndpoint>,
    fallback: FallbackPolicy,
    has_api_key: bool,
    runtime: Handle,
}

impl Orchestrator {
    /// Uses the tokio runtime the caller is running in for background work.
    pub fn new(endpoint: Arc<dyn GenerationEndpoint>, config: &ClientConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            GenerationError::Config(format!(
                "Orchestrator must be created inside a tokio runtime: {}",
                e
            ))
        })?;
        Ok(Self::with_runtime(endpoint, config, runtime))
    }

    pub fn with_runtime(
        endpoint: Arc<dyn GenerationEndpoint>,
        config: &ClientConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            endpoint,
            fallback: config.fallback.clone(),
            has_api_key: config.api_key.is_some(),
            runtime,
        }
    }

    pub fn fallback_policy(&self) -> &FallbackPolicy {
        &self.fallback
    }

    /// Validates the request and builds its parameters without touching the
    /// network.
    pub fn prepare(&self, request: ImageGenerationRequest) -> Result<PreparedRequest> {
        if request.prompt.trim().is_empty() {
            return Err(GenerationError::Validation("Prompt must not be empty".into()));
        }

        let capability = request.model.capability();
        if capability.requires_api_key && !self.has_api_key {
            return Err(GenerationError::Validation(format!(
                "Model '{}' requires an API key (set IMGEN_API_KEY)",
                request.model
            )));
        }

        if let Some(style) = request.style.as_deref().map(str::trim) {
            if !style.is_empty() && !capability.accepts_style(style) {
                log::warn!(
                    "Model '{}' does not accept style '{}'; sending without it",
                    request.model,
                    style
                );
            }
        }

        let advisory = (!capability.supports_size && !request.ratio.is_default()).then(|| {
            SizeAdvisory {
                model: request.model,
                requested: request.ratio,
            }
        });

        let params = build_params(&request);
        Ok(PreparedRequest {
            request,
            params,
            advisory,
        })
    }

    /// Dispatches a prepared request and resolves it to an image location.
    ///
    /// A sized request that fails at the transport or endpoint level is
    /// retried exactly once without its size, unless the fallback policy
    /// excludes the model. The retry's error is the one returned.
    pub async fn generate(&self, prepared: &PreparedRequest) -> GenerationResult {
        let params = &prepared.params;
        let _timer = logger::timer(&format!("generate [{}]", params.model));

        let response = match self.endpoint.generate(params).await {
            Ok(response) => response,
            Err(err) if params.size.is_some()
                && err.allows_size_fallback()
                && self.fallback.allows(params.model) =>
            {
                log::warn!(
                    "Sized request to '{}' failed ({}); retrying once without size",
                    params.model,
                    err
                );
                self.endpoint
                    .generate(&params.without_size())
                    .await
                    .map_err(|retry_err| {
                        log::error!("Size fallback for '{}' failed too: {}", params.model, retry_err);
                        retry_err
                    })?
            }
            Err(err) => {
                log::error!("Generation with '{}' failed: {}", params.model, err);
                return Err(err);
            }
        };

        first_location(response)
    }

    /// Validates, then runs the request on a background task. An advisory,
    /// if any, is logged and the request proceeds without a size; use
    /// [`Orchestrator::prepare`] and [`Orchestrator::submit_prepared`] to
    /// ask the user first.
    pub fn submit(&self, request: ImageGenerationRequest) -> Result<PendingGeneration> {
        let prepared = self.prepare(request)?;
        if let Some(advisory) = prepared.advisory() {
            log::warn!("{}", advisory);
        }
        Ok(self.submit_prepared(prepared))
    }

    pub fn submit_prepared(&self, prepared: PreparedRequest) -> PendingGeneration {
        let (sender, receiver) = oneshot::channel();
        let id = Uuid::new_v4();
        let orchestrator = self.clone();

        log::info!(
            "Submitting '{}' to '{}' [req:{}]",
            prepared.params.prompt,
            prepared.params.model,
            id
        );

        self.runtime.spawn(async move {
            let result = orchestrator.generate(&prepared).await;
            match &result {
                Ok(location) => log::info!("Generation finished: {} [req:{}]", location, id),
                Err(err) => log::info!("Generation failed: {} [req:{}]", err, id),
            }
            if sender.send(result).is_err() {
                log::debug!("Result receiver gone; discarding result [req:{}]", id);
            }
        });

        PendingGeneration {
            id,
            receiver: Some(receiver),
        }
    }
}

fn first_location(response: ImagesResponse) -> GenerationResult {
    let first = response.data.into_iter().next().ok_or_else(|| {
        GenerationError::MalformedResponse("Response contained no images".into())
    })?;
    let url = first.url.ok_or_else(|| {
        GenerationError::MalformedResponse("Image entry has no url".into())
    })?;
    ImageLocation::parse(&url)
}

/// Receiving end of one submission. Yields its result at most once.
#[derive(Debug)]
pub struct PendingGeneration {
    id: Uuid,
    receiver: Option<oneshot::Receiver<GenerationResult>>,
}

impl PendingGeneration {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// True once the result has been taken.
    pub fn is_taken(&self) -> bool {
        self.receiver.is_none()
    }

    /// Non-blocking check for the result, meant for UI event loops.
    pub fn try_take(&mut self) -> Option<GenerationResult> {
        let receiver = self.receiver.as_mut()?;
        let result = match receiver.try_recv() {
            Ok(result) => result,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Closed) => Err(task_vanished()),
        };
        self.receiver = None;
        Some(result)
    }

    pub async fn wait(mut self) -> GenerationResult {
        match self.receiver.take() {
            Some(receiver) => receiver.await.unwrap_or_else(|_| Err(task_vanished())),
            None => Err(GenerationError::Internal(
                "Result was already taken".into(),
            )),
        }
    }
}

fn task_vanished() -> GenerationError {
    GenerationError::Internal("Generation task ended without a result".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageData;

    #[test]
    fn test_build_params_includes_size_for_capable_model() {
        let request = ImageGenerationRequest::new("  a red fox ")
            .with_model(ModelId::Flux)
            .with_ratio(AspectRatio::Portrait3x4)
            .with_style("Photorealistic");
        let params = build_params(&request);
        assert_eq!(params.prompt, "a red fox");
        assert_eq!(params.size.as_deref(), Some("768x1024"));
        assert_eq!(params.style.as_deref(), Some("photorealistic"));
        assert_eq!(params.response_format, "url");
    }

    #[test]
    fn test_build_params_skips_unsupported_size_and_style() {
        let request = ImageGenerationRequest::new("castle")
            .with_model(ModelId::Midjourney)
            .with_ratio(AspectRatio::Landscape16x9)
            .with_style("photorealistic");
        let params = build_params(&request);
        assert_eq!(params.size, None);
        assert_eq!(params.style, None);
    }

    #[test]
    fn test_first_location_rejects_empty_data() {
        let err = first_location(ImagesResponse::default()).unwrap_err();
        assert!(matches!(err, GenerationError::MalformedResponse(_)));

        let missing_url = ImagesResponse {
            data: vec![ImageData { url: None }],
            error: None,
        };
        assert!(matches!(
            first_location(missing_url),
            Err(GenerationError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_advisory_message_names_model_and_ratio() {
        let advisory = SizeAdvisory {
            model: ModelId::Midjourney,
            requested: AspectRatio::Portrait9x16,
        };
        let text = advisory.to_string();
        assert!(text.contains("midjourney"));
        assert!(text.contains("9:16"));
    }
}
