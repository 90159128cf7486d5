//! HTTP client for an Automatic1111-style WebUI instance

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::traits::{GenerationBackend, GenerationOutput, ModelInventory};
use crate::config::DownstreamConfig;
use crate::error::{AppError, Result};
use crate::payload::ResolvedPayload;

pub struct WebUiBackend {
    client: Client,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct WebUiGenerateResponse {
    #[serde(default)]
    images: Vec<String>,
    /// The WebUI returns its metadata document as a JSON string
    #[serde(default)]
    info: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NamedModel {
    #[serde(alias = "model_name")]
    name: String,
}

impl WebUiBackend {
    pub fn new(config: &DownstreamConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: format!("{}/sdapi/v1", config.base_url.trim_end_matches('/')),
        })
    }

    fn endpoint_for(&self, payload: &ResolvedPayload) -> String {
        if payload.is_image_conditioned() {
            format!("{}/img2img", self.api_url)
        } else {
            format!("{}/txt2img", self.api_url)
        }
    }

    async fn fetch_names(&self, path: &str) -> Vec<String> {
        let url = format!("{}/{}", self.api_url, path);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => response
                .json::<Vec<NamedModel>>()
                .await
                .map(|models| models.into_iter().map(|m| m.name).collect())
                .unwrap_or_default(),
            Ok(response) => {
                debug!(url = %url, status = %response.status(), "Model listing unavailable");
                Vec::new()
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Model listing unavailable");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl GenerationBackend for WebUiBackend {
    async fn submit(&self, payload: &ResolvedPayload) -> Result<GenerationOutput> {
        let url = self.endpoint_for(payload);
        debug!(url = %url, "Dispatching generation request");

        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    AppError::DownstreamUnreachable(e.to_string())
                } else {
                    AppError::HttpClient(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(status = %status, "Downstream rejected generation request");
            return Err(AppError::DownstreamError {
                status: status.as_u16(),
                detail,
            });
        }

        let body: WebUiGenerateResponse = response
            .json()
            .await
            .map_err(|e| AppError::DownstreamMalformed(e.to_string()))?;

        let info = body
            .info
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or(serde_json::Value::Null);

        Ok(GenerationOutput {
            images: body.images,
            info,
        })
    }

    async fn check_health(&self) -> bool {
        let url = format!("{}/options", self.api_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Downstream health check failed");
                false
            }
        }
    }

    async fn list_models(&self) -> Result<ModelInventory> {
        let checkpoints = self.fetch_names("sd-models").await;
        if checkpoints.is_empty() {
            return Err(AppError::DownstreamUnreachable(
                "model listing returned nothing".to_string(),
            ));
        }

        let mut vaes = self.fetch_names("sd-vae").await;
        if vaes.is_empty() {
            vaes = vec!["Automatic".to_string(), "None".to_string()];
        }

        Ok(ModelInventory {
            checkpoints,
            vaes,
            samplers: self.fetch_names("samplers").await,
            upscalers: self.fetch_names("upscalers").await,
        })
    }
}
