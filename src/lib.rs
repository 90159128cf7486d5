//! Stable Diffusion dispatch gateway
//!
//! Serializes many callers' image-generation requests into a single ordered
//! stream against one slow WebUI instance: per-caller admission control,
//! deterministic payload construction from session state, a FIFO
//! single-consumer job queue with live position reporting, and a job
//! lifecycle/result store.

pub mod admission;
pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod images;
pub mod jobs;
pub mod middleware;
pub mod payload;
pub mod queue;
pub mod session;

pub use error::{AppError, Result};

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use admission::AdmissionController;
use backend::GenerationBackend;
use jobs::JobStore;
use queue::{JobQueue, PositionReceiver};
use session::SessionStore;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<RwLock<config::Settings>>,
    pub sessions: Arc<SessionStore>,
    pub jobs: Arc<JobStore>,
    pub admission: Arc<AdmissionController>,
    pub queue: Arc<JobQueue>,
    pub backend: Arc<dyn GenerationBackend>,
    /// Live position receivers for queued jobs, pruned as jobs finish
    pub positions: DashMap<Uuid, PositionReceiver>,
}
