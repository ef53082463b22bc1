//! Prompt-to-image client.
//!
//! [`Orchestrator`] validates a prompt, assembles parameters from the
//! model's capability entry, and runs the request on a background task,
//! handing the single result back through a one-shot channel. [`Session`]
//! is the shell-side state machine on top of it, [`ImageFetcher`] downloads
//! and decodes the returned image and [`save_image`] writes it to disk.

pub mod client;
pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod session;

pub use client::{
    build_params, save_image, FetchedImage, GenerationEndpoint, HttpEndpoint, ImageFetcher,
    ImageGenClient, Orchestrator, PendingGeneration, PreparedRequest, SizeAdvisory,
};
pub use config::{ClientConfig, FallbackPolicy};
pub use error::{ErrorKind, FetchFailure, GenerationError, NetworkFailure, Result};
pub use models::{
    AspectRatio, GenerationResult, ImageGenerationRequest, ImageLocation, ImageRequestParams,
    ImagesResponse, ModelCapability, ModelId,
};
pub use session::{RequestState, Session, TriggerOutcome};
