//! End-to-end tests for the HTTP surface, driven through the router

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower::ServiceExt;

use sd_dispatch_gateway::admission::AdmissionController;
use sd_dispatch_gateway::api;
use sd_dispatch_gateway::backend::{GenerationBackend, GenerationOutput, ModelInventory};
use sd_dispatch_gateway::config::Settings;
use sd_dispatch_gateway::error::Result;
use sd_dispatch_gateway::jobs::JobStore;
use sd_dispatch_gateway::payload::ResolvedPayload;
use sd_dispatch_gateway::queue::JobQueue;
use sd_dispatch_gateway::session::SessionStore;
use sd_dispatch_gateway::AppState;

struct InstantBackend;

#[async_trait]
impl GenerationBackend for InstantBackend {
    async fn submit(&self, _payload: &ResolvedPayload) -> Result<GenerationOutput> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(GenerationOutput {
            images: vec!["aGVsbG8=".to_string()],
            info: json!({"seed": 7}),
        })
    }

    async fn check_health(&self) -> bool {
        true
    }

    async fn list_models(&self) -> Result<ModelInventory> {
        Ok(ModelInventory {
            checkpoints: vec!["dreamshaper_v8".to_string()],
            vaes: vec!["Automatic".to_string()],
            samplers: vec!["DPM++ 2M Karras".to_string()],
            upscalers: vec!["Latent".to_string()],
        })
    }
}

async fn test_app(cooldown_secs: u64) -> (Router, tempfile::TempDir) {
    test_app_with_capacity(cooldown_secs, 100).await
}

async fn test_app_with_capacity(
    cooldown_secs: u64,
    max_pending: usize,
) -> (Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();

    let mut settings = Settings::default();
    settings.auth.enabled = false;
    settings.rate_limit.enabled = false;
    settings.admission.cooldown_secs = cooldown_secs;

    let backend: Arc<dyn GenerationBackend> = Arc::new(InstantBackend);
    let sessions = Arc::new(SessionStore::new(
        dir.path().join("sessions.json"),
        dir.path().join("presets.json"),
    ));
    let jobs = Arc::new(JobStore::new());
    let admission = Arc::new(AdmissionController::new(cooldown_secs, vec![]));
    let queue = JobQueue::new(backend.clone(), jobs.clone(), admission.clone(), max_pending);

    let state = Arc::new(AppState {
        settings: Arc::new(RwLock::new(settings)),
        sessions,
        jobs,
        admission,
        queue,
        backend,
        positions: DashMap::new(),
    });

    (api::routes::create_router(state).await, dir)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn wait_for_completion(app: &Router, job_id: &str) -> Value {
    for _ in 0..200 {
        let response = app
            .clone()
            .oneshot(get(&format!("/jobs/{}", job_id)))
            .await
            .unwrap();
        let status = body_json(response).await;
        if status["status"] == "completed" || status["status"] == "failed" {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never finished", job_id);
}

#[tokio::test]
async fn health_reports_downstream_and_queue() {
    let (app, _dir) = test_app(0).await;

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["downstream_online"], true);
    assert_eq!(body["queue_depth"], 0);
}

#[tokio::test]
async fn txt2img_accepts_then_serves_the_result() {
    let (app, _dir) = test_app(0).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/generate/txt2img",
            json!({"caller_id": "u1", "prompt": "a cat wearing a hat"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let accepted = body_json(response).await;
    assert_eq!(accepted["status"], "queued");
    assert_eq!(accepted["queue_position"], 1);
    let job_id = accepted["job_id"].as_str().unwrap().to_string();

    let status = wait_for_completion(&app, &job_id).await;
    assert_eq!(status["status"], "completed");

    let response = app
        .clone()
        .oneshot(get(&format!("/jobs/{}/result", job_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let result = body_json(response).await;
    assert_eq!(result["images"][0], "aGVsbG8=");
    assert_eq!(result["info"]["seed"], 7);
}

#[tokio::test]
async fn second_submission_while_generating_conflicts() {
    let (app, _dir) = test_app(0).await;

    let first = app
        .clone()
        .oneshot(post_json(
            "/generate/txt2img",
            json!({"caller_id": "u1", "prompt": "first"}),
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::ACCEPTED);

    let second = app
        .clone()
        .oneshot(post_json(
            "/generate/txt2img",
            json!({"caller_id": "u1", "prompt": "second"}),
        ))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body = body_json(second).await;
    assert_eq!(body["error"]["code"], "already_generating");
}

#[tokio::test]
async fn cooldown_rejection_carries_retry_at() {
    let (app, _dir) = test_app(60).await;

    let accepted = app
        .clone()
        .oneshot(post_json(
            "/generate/txt2img",
            json!({"caller_id": "u1", "prompt": "first"}),
        ))
        .await
        .unwrap();
    let job_id = body_json(accepted).await["job_id"]
        .as_str()
        .unwrap()
        .to_string();
    wait_for_completion(&app, &job_id).await;

    let throttled = app
        .clone()
        .oneshot(post_json(
            "/generate/txt2img",
            json!({"caller_id": "u1", "prompt": "too soon"}),
        ))
        .await
        .unwrap();
    assert_eq!(throttled.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(throttled).await;
    assert_eq!(body["error"]["code"], "cooldown_active");
    assert!(body["error"]["retry_at"].is_string());
}

#[tokio::test]
async fn out_of_range_values_fail_validation() {
    let (app, _dir) = test_app(0).await;

    let response = app
        .oneshot(post_json(
            "/generate/txt2img",
            json!({"caller_id": "u1", "prompt": "a cat", "steps": 999}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn img2img_requires_a_source_image() {
    let (app, _dir) = test_app(0).await;

    let response = app
        .oneshot(post_json(
            "/generate/img2img",
            json!({"caller_id": "u1", "prompt": "a cat"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn full_queue_reports_service_unavailable_and_frees_the_caller() {
    let (app, _dir) = test_app_with_capacity(0, 0).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/generate/txt2img",
            json!({"caller_id": "u1", "prompt": "a cat"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "queue_full");

    // The rejection cleared the in-flight flag: the retry is throttled by
    // the queue again, not by a phantom in-flight job.
    let retry = app
        .oneshot(post_json(
            "/generate/txt2img",
            json!({"caller_id": "u1", "prompt": "a cat"}),
        ))
        .await
        .unwrap();
    assert_eq!(retry.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let (app, _dir) = test_app(0).await;

    let response = app
        .oneshot(get("/jobs/00000000-0000-0000-0000-000000000000"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn session_modifiers_round_trip() {
    let (app, _dir) = test_app(0).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/sessions/u1/modifiers",
            json!({"name": "lineart", "weight": 0.9}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let session = body_json(response).await;
    assert_eq!(session["active_modifiers"][0]["name"], "lineart");

    let missing = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/sessions/u1/modifiers/not-there")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let removed = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/sessions/u1/modifiers/lineart")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(removed.status(), StatusCode::OK);
    let session = body_json(removed).await;
    assert!(session["active_modifiers"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn modifier_weight_is_validated_at_the_edge() {
    let (app, _dir) = test_app(0).await;

    let response = app
        .oneshot(post_json(
            "/sessions/u1/modifiers",
            json!({"name": "lineart", "weight": 5.0}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn presets_round_trip() {
    let (app, _dir) = test_app(0).await;

    let created = app
        .clone()
        .oneshot(post_json(
            "/presets/u1",
            json!({"name": "night mode", "config": {"steps": 30, "cfg_scale": 9.0}}),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let preset = body_json(created).await;
    let preset_id = preset["preset_id"].as_str().unwrap().to_string();

    let listed = app.clone().oneshot(get("/presets/u1")).await.unwrap();
    let body = body_json(listed).await;
    assert_eq!(body["presets"].as_array().unwrap().len(), 1);

    let deleted = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/presets/u1/{}", preset_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let listed = app.clone().oneshot(get("/presets/u1")).await.unwrap();
    let body = body_json(listed).await;
    assert!(body["presets"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn models_endpoint_surfaces_the_inventory() {
    let (app, _dir) = test_app(0).await;

    let response = app.oneshot(get("/models")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["checkpoints"][0], "dreamshaper_v8");
}
