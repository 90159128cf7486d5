//! Generation backend trait and wire types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::payload::ResolvedPayload;

/// Images plus the metadata document returned by the downstream service.
/// The metadata is opaque to the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub images: Vec<String>,
    pub info: serde_json::Value,
}

/// Downstream model inventory, surfaced to callers for request construction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelInventory {
    pub checkpoints: Vec<String>,
    pub vaes: Vec<String>,
    pub samplers: Vec<String>,
    pub upscalers: Vec<String>,
}

/// Thin transport to the downstream image-generation service.
///
/// The pipeline treats implementations as black boxes: a resolved payload
/// goes in, images and metadata (or an error) come out.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Dispatch one payload and wait for its images
    async fn submit(&self, payload: &ResolvedPayload) -> Result<GenerationOutput>;

    /// Probe whether the downstream service is reachable
    async fn check_health(&self) -> bool;

    /// List the models the downstream service currently offers
    async fn list_models(&self) -> Result<ModelInventory>;
}
