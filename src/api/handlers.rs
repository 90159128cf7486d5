//! Request handlers for the dispatch gateway

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::images;
use crate::jobs::{Job, JobResult, JobState, JobStatus};
use crate::payload::{self, GenerationRequest};
use crate::session::{PresetInfo, UserSession, MAX_MODIFIER_WEIGHT, MIN_MODIFIER_WEIGHT};
use crate::AppState;

/// Response returned on job acceptance
#[derive(Debug, Serialize, Deserialize)]
pub struct EnqueuedResponse {
    pub job_id: Uuid,
    pub status: JobState,
    /// 1-based position at enqueue time; 1 means processing has started
    pub queue_position: usize,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct PositionResponse {
    pub job_id: Uuid,
    pub status: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub downstream_online: bool,
    pub queue_depth: usize,
    pub timestamp: DateTime<Utc>,
}

/// Admit, fold session state into a payload, and enqueue.
///
/// The admission lock is taken before the queue is touched; if enqueueing
/// fails (queue full) the in-flight flag is cleared without starting a
/// cooldown, since no work was done.
async fn submit(state: Arc<AppState>, mut request: GenerationRequest) -> Result<impl IntoResponse> {
    request.validate()?;

    if let Some(raw) = request.source_image.take() {
        let bytes = images::decode(&raw)?;
        request.source_image = Some(images::normalize(&bytes)?);
    }

    state.admission.try_admit(&request.caller_id)?;

    let session = state.sessions.snapshot(&request.caller_id);
    let resolved = payload::build(&request, &session);
    let kind = request.kind();
    let job = Job::new(request.caller_id.clone(), kind, resolved);

    let (job_id, position_rx) = match state.queue.enqueue(job) {
        Ok(enqueued) => enqueued,
        Err(e) => {
            state.admission.clear_in_flight(&request.caller_id);
            return Err(e);
        }
    };

    let queue_position = *position_rx.borrow();
    state.positions.insert(job_id, position_rx);

    info!(
        job_id = %job_id,
        caller = %request.caller_id,
        kind = ?kind,
        position = queue_position,
        "Job accepted"
    );

    let message = if queue_position == 1 {
        "Generating image".to_string()
    } else {
        format!("Position in queue: {}", queue_position)
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueuedResponse {
            job_id,
            status: JobState::Queued,
            queue_position,
            message,
        }),
    ))
}

pub async fn generate_txt2img(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerationRequest>,
) -> Result<impl IntoResponse> {
    if request.source_image.is_some() {
        return Err(AppError::ValidationFailed(
            "source_image is not accepted here; use /generate/img2img".into(),
        ));
    }
    submit(state, request).await
}

pub async fn generate_img2img(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerationRequest>,
) -> Result<impl IntoResponse> {
    if request.source_image.is_none() {
        return Err(AppError::ValidationFailed(
            "source_image is required for img2img".into(),
        ));
    }
    submit(state, request).await
}

pub async fn generate_controlnet(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerationRequest>,
) -> Result<impl IntoResponse> {
    if request.control_units.is_empty() {
        return Err(AppError::ValidationFailed(
            "at least one control unit is required".into(),
        ));
    }
    if request.source_image.is_none() {
        return Err(AppError::ValidationFailed(
            "source_image is required for structure-conditioned generation".into(),
        ));
    }
    submit(state, request).await
}

pub async fn generate_regional(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerationRequest>,
) -> Result<impl IntoResponse> {
    if request.regional.is_none() {
        return Err(AppError::ValidationFailed(
            "a regional block is required for regional generation".into(),
        ));
    }
    submit(state, request).await
}

pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatus>> {
    let status = state.jobs.status(job_id)?;
    if status.status.is_terminal() {
        state.positions.remove(&job_id);
    }
    Ok(Json(status))
}

pub async fn job_position(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<PositionResponse>> {
    let status = state.jobs.status(job_id)?;
    let queue_position = if status.status.is_terminal() {
        state.positions.remove(&job_id);
        None
    } else {
        state.queue.position_of(job_id)
    };
    Ok(Json(PositionResponse {
        job_id,
        status: status.status,
        queue_position,
    }))
}

pub async fn job_result(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobResult>> {
    let result = state.jobs.result(job_id)?;
    state.positions.remove(&job_id);
    Ok(Json(result))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(caller_id): Path<String>,
) -> Json<UserSession> {
    Json(state.sessions.snapshot(&caller_id))
}

#[derive(Debug, Deserialize)]
pub struct AddModifierRequest {
    pub name: String,
    #[serde(default = "default_modifier_weight")]
    pub weight: f32,
}

fn default_modifier_weight() -> f32 {
    0.8
}

pub async fn add_modifier(
    State(state): State<Arc<AppState>>,
    Path(caller_id): Path<String>,
    Json(request): Json<AddModifierRequest>,
) -> Result<Json<UserSession>> {
    if request.name.trim().is_empty() {
        return Err(AppError::ValidationFailed(
            "modifier name cannot be empty".into(),
        ));
    }
    if request.weight < MIN_MODIFIER_WEIGHT || request.weight > MAX_MODIFIER_WEIGHT {
        return Err(AppError::ValidationFailed(format!(
            "weight must be between {} and {}, got {}",
            MIN_MODIFIER_WEIGHT, MAX_MODIFIER_WEIGHT, request.weight
        )));
    }
    let session = state
        .sessions
        .mutate(&caller_id, |s| {
            s.add_modifier(request.name.as_str(), request.weight)
        });
    Ok(Json(session))
}

pub async fn remove_modifier(
    State(state): State<Arc<AppState>>,
    Path((caller_id, name)): Path<(String, String)>,
) -> Result<Json<UserSession>> {
    let mut removed = false;
    let session = state
        .sessions
        .mutate(&caller_id, |s| removed = s.remove_modifier(&name));
    if !removed {
        return Err(AppError::NotFound(format!(
            "Modifier '{}' is not active for caller '{}'",
            name, caller_id
        )));
    }
    Ok(Json(session))
}

pub async fn clear_modifiers(
    State(state): State<Arc<AppState>>,
    Path(caller_id): Path<String>,
) -> Json<UserSession> {
    Json(state.sessions.mutate(&caller_id, |s| s.clear_modifiers()))
}

#[derive(Debug, Deserialize)]
pub struct SavePresetRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub config: Value,
}

#[derive(Debug, Serialize)]
pub struct PresetsResponse {
    pub presets: Vec<PresetInfo>,
}

pub async fn save_preset(
    State(state): State<Arc<AppState>>,
    Path(caller_id): Path<String>,
    Json(request): Json<SavePresetRequest>,
) -> Result<impl IntoResponse> {
    if request.name.trim().is_empty() {
        return Err(AppError::ValidationFailed(
            "preset name cannot be empty".into(),
        ));
    }
    let preset = state
        .sessions
        .save_preset(&caller_id, request.name, request.description, request.config);
    Ok((StatusCode::CREATED, Json(preset)))
}

pub async fn list_presets(
    State(state): State<Arc<AppState>>,
    Path(caller_id): Path<String>,
) -> Json<PresetsResponse> {
    Json(PresetsResponse {
        presets: state.sessions.list_presets(&caller_id),
    })
}

pub async fn delete_preset(
    State(state): State<Arc<AppState>>,
    Path((caller_id, preset_id)): Path<(String, Uuid)>,
) -> Result<StatusCode> {
    if !state.sessions.delete_preset(&caller_id, preset_id) {
        return Err(AppError::NotFound(format!("Preset {} not found", preset_id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_models(
    State(state): State<Arc<AppState>>,
) -> Result<Json<crate::backend::ModelInventory>> {
    Ok(Json(state.backend.list_models().await?))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let downstream_online = state.backend.check_health().await;
    Json(HealthResponse {
        status: if downstream_online {
            "healthy"
        } else {
            "degraded"
        },
        downstream_online,
        queue_depth: state.queue.depth(),
        timestamp: Utc::now(),
    })
}
