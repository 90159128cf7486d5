//! In-memory job and result maps

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::GenerationOutput;
use crate::error::{AppError, Result};
use crate::jobs::{Job, JobResult, JobState, JobStatus};

/// Owns the id -> Job and id -> JobResult maps.
///
/// The store is the only writer of terminal state. Status rows are updated in
/// place on transition; a result row is written once, at the terminal
/// transition, and never mutated.
#[derive(Default)]
pub struct JobStore {
    jobs: DashMap<Uuid, Job>,
    results: DashMap<Uuid, JobResult>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly enqueued job. Status queries are valid from here on.
    pub fn insert(&self, job: Job) {
        debug!(job_id = %job.id, caller = %job.caller_id, "Job registered");
        self.jobs.insert(job.id, job);
    }

    pub fn status(&self, job_id: Uuid) -> Result<JobStatus> {
        self.jobs
            .get(&job_id)
            .map(|job| JobStatus::from(&*job))
            .ok_or(AppError::JobNotFound(job_id))
    }

    /// Result becomes available only once the job is terminal. Querying
    /// earlier yields `ResultNotReady`, distinct from an unknown id.
    pub fn result(&self, job_id: Uuid) -> Result<JobResult> {
        if let Some(result) = self.results.get(&job_id) {
            return Ok(result.clone());
        }
        if self.jobs.contains_key(&job_id) {
            return Err(AppError::ResultNotReady(job_id));
        }
        Err(AppError::JobNotFound(job_id))
    }

    /// Fetch the payload for the consumer to dispatch
    pub fn payload(&self, job_id: Uuid) -> Option<crate::payload::ResolvedPayload> {
        self.jobs.get(&job_id).map(|job| job.payload.clone())
    }

    pub fn mark_processing(&self, job_id: Uuid) {
        self.transition(job_id, JobState::Processing, None);
    }

    /// Record a successful terminal state and its result
    pub fn complete(&self, job_id: Uuid, output: GenerationOutput) {
        let now = Utc::now();
        if self.transition(job_id, JobState::Completed, None) {
            self.results
                .entry(job_id)
                .or_insert_with(|| JobResult::completed(job_id, output, now));
        }
    }

    /// Record a failed terminal state, preserving the raw downstream error
    /// for queryers while keeping the status message caller-safe.
    pub fn fail(&self, job_id: Uuid, error: &AppError) {
        let now = Utc::now();
        let message = "There was a problem generating your image".to_string();
        if self.transition(job_id, JobState::Failed, Some(message)) {
            self.results
                .entry(job_id)
                .or_insert_with(|| JobResult::failed(job_id, error.to_string(), now));
        }
    }

    /// Drop terminal jobs (and their results) that finished before `cutoff`,
    /// returning how many were removed. Queued and processing jobs are never
    /// touched.
    pub fn prune_terminal_before(&self, cutoff: chrono::DateTime<Utc>) -> usize {
        let expired: Vec<Uuid> = self
            .jobs
            .iter()
            .filter(|entry| {
                entry.state.is_terminal()
                    && entry.completed_at.map_or(false, |at| at < cutoff)
            })
            .map(|entry| *entry.key())
            .collect();
        for job_id in &expired {
            self.jobs.remove(job_id);
            self.results.remove(job_id);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "Expired terminal jobs pruned");
        }
        expired.len()
    }

    fn transition(&self, job_id: Uuid, to: JobState, message: Option<String>) -> bool {
        let Some(mut job) = self.jobs.get_mut(&job_id) else {
            warn!(job_id = %job_id, "Transition for unknown job ignored");
            return false;
        };
        if !job.state.can_transition(to) {
            warn!(
                job_id = %job_id,
                from = ?job.state,
                to = ?to,
                "Illegal job state transition ignored"
            );
            return false;
        }
        job.state = to;
        if to.is_terminal() {
            job.completed_at = Some(Utc::now());
        }
        if message.is_some() {
            job.message = message;
        }
        debug!(job_id = %job_id, state = ?to, "Job state updated");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobKind;
    use crate::payload::ResolvedPayload;

    fn queued_job() -> Job {
        Job::new("user-1", JobKind::Text, ResolvedPayload::default())
    }

    #[test]
    fn result_before_terminal_is_not_ready() {
        let store = JobStore::new();
        let job = queued_job();
        let id = job.id;
        store.insert(job);

        assert!(matches!(store.result(id), Err(AppError::ResultNotReady(_))));
        assert!(matches!(
            store.result(Uuid::new_v4()),
            Err(AppError::JobNotFound(_))
        ));
    }

    #[test]
    fn complete_writes_result_once() {
        let store = JobStore::new();
        let job = queued_job();
        let id = job.id;
        store.insert(job);
        store.mark_processing(id);
        store.complete(
            id,
            GenerationOutput {
                images: vec!["aGk=".to_string()],
                info: serde_json::json!({"seed": 42}),
            },
        );

        let first = store.result(id).unwrap();
        assert_eq!(first.status, JobState::Completed);
        assert_eq!(first.images.len(), 1);

        // A late failure must not overwrite the terminal result
        store.fail(id, &AppError::Internal("late".to_string()));
        let second = store.result(id).unwrap();
        assert_eq!(second.status, JobState::Completed);
        assert_eq!(second.completed_at, first.completed_at);
    }

    #[test]
    fn pruning_removes_only_old_terminal_jobs() {
        let store = JobStore::new();

        let done = queued_job();
        let done_id = done.id;
        store.insert(done);
        store.mark_processing(done_id);
        store.complete(done_id, GenerationOutput::default());

        let live = queued_job();
        let live_id = live.id;
        store.insert(live);

        // Nothing has aged past a cutoff in the past
        assert_eq!(
            store.prune_terminal_before(Utc::now() - chrono::Duration::hours(1)),
            0
        );

        // A future cutoff expires the terminal job but never the queued one
        assert_eq!(
            store.prune_terminal_before(Utc::now() + chrono::Duration::seconds(1)),
            1
        );
        assert!(matches!(
            store.result(done_id),
            Err(AppError::JobNotFound(_))
        ));
        assert!(store.status(live_id).is_ok());
    }

    #[test]
    fn failed_jobs_keep_raw_error_in_result() {
        let store = JobStore::new();
        let job = queued_job();
        let id = job.id;
        store.insert(job);
        store.mark_processing(id);
        store.fail(id, &AppError::DownstreamUnreachable("refused".to_string()));

        let status = store.status(id).unwrap();
        assert_eq!(status.status, JobState::Failed);
        assert_eq!(
            status.message.as_deref(),
            Some("There was a problem generating your image")
        );

        let result = store.result(id).unwrap();
        assert!(result.error.as_deref().unwrap().contains("refused"));
    }
}
