//! FIFO job scheduler with live position reporting
//!
//! Jobs are executed strictly in submission order by a single consumer task:
//! exactly one job is `processing` at any instant, system-wide, because the
//! downstream service cannot usefully parallelize generation. The consumer is
//! spawned on the empty-to-non-empty transition and exits when the queue
//! drains.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::admission::{AdmissionController, AdmissionGuard};
use crate::backend::GenerationBackend;
use crate::error::{AppError, Result};
use crate::jobs::{Job, JobStore};

/// Live 1-based queue position. Position 1 means "processing now".
pub type PositionReceiver = watch::Receiver<usize>;

struct PendingJob {
    job_id: Uuid,
    caller_id: String,
    position_tx: watch::Sender<usize>,
    /// Set once a position update fails to deliver; the job still runs,
    /// but no further updates are attempted for it.
    observer_gone: bool,
}

#[derive(Default)]
struct QueueInner {
    pending: VecDeque<PendingJob>,
    /// Job currently held by the consumer, if any
    active: Option<Uuid>,
    consumer_running: bool,
}

pub struct JobQueue {
    inner: Mutex<QueueInner>,
    max_pending: usize,
    store: Arc<JobStore>,
    admission: Arc<AdmissionController>,
    backend: Arc<dyn GenerationBackend>,
}

impl JobQueue {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        store: Arc<JobStore>,
        admission: Arc<AdmissionController>,
        max_pending: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(QueueInner::default()),
            max_pending,
            store,
            admission,
            backend,
        })
    }

    /// Add an admitted job to the tail of the queue.
    ///
    /// Returns the job id and a receiver carrying the job's live position.
    /// Status queries against the Job Store are valid as soon as this
    /// returns.
    pub fn enqueue(self: &Arc<Self>, job: Job) -> Result<(Uuid, PositionReceiver)> {
        let job_id = job.id;
        let caller_id = job.caller_id.clone();

        let mut inner = self.inner.lock();
        if inner.pending.len() >= self.max_pending {
            return Err(AppError::QueueFull);
        }

        self.store.insert(job);

        let initial = inner.pending.len() + if inner.active.is_some() { 2 } else { 1 };
        let (position_tx, position_rx) = watch::channel(initial);
        inner.pending.push_back(PendingJob {
            job_id,
            caller_id: caller_id.clone(),
            position_tx,
            observer_gone: false,
        });
        debug!(job_id = %job_id, caller = %caller_id, position = initial, "Job enqueued");
        self.notify_positions(&mut inner);

        if !inner.consumer_running {
            inner.consumer_running = true;
            let queue = Arc::clone(self);
            tokio::spawn(async move { queue.consume().await });
        }

        Ok((job_id, position_rx))
    }

    /// Current 1-based position, or `None` once the job left the queue
    pub fn position_of(&self, job_id: Uuid) -> Option<usize> {
        let inner = self.inner.lock();
        if inner.active == Some(job_id) {
            return Some(1);
        }
        let base = if inner.active.is_some() { 2 } else { 1 };
        inner
            .pending
            .iter()
            .position(|p| p.job_id == job_id)
            .map(|i| base + i)
    }

    /// Jobs waiting or processing right now
    pub fn depth(&self) -> usize {
        let inner = self.inner.lock();
        inner.pending.len() + usize::from(inner.active.is_some())
    }

    async fn consume(self: Arc<Self>) {
        loop {
            let mut next = {
                let mut inner = self.inner.lock();
                match inner.pending.pop_front() {
                    Some(next) => {
                        inner.active = Some(next.job_id);
                        self.notify_positions(&mut inner);
                        next
                    }
                    None => {
                        inner.active = None;
                        inner.consumer_running = false;
                        debug!("Queue drained, consumer exiting");
                        return;
                    }
                }
            };

            self.store.mark_processing(next.job_id);

            // The guard restores the caller's admission state on every exit
            // path of this iteration, including downstream failures. Once the
            // observer is gone the lock was already cleared, and may since
            // guard a newer submission from the same caller; the guard is
            // defused so this job's terminal transition cannot release it.
            let mut admission =
                AdmissionGuard::new(self.admission.clone(), next.caller_id.clone());
            if next.observer_gone {
                admission.defuse();
            } else if next.position_tx.send(1).is_err() {
                next.observer_gone = true;
                self.admission.clear_in_flight(&next.caller_id);
                admission.defuse();
            }

            match self.store.payload(next.job_id) {
                Some(payload) => match self.backend.submit(&payload).await {
                    Ok(output) => {
                        info!(
                            job_id = %next.job_id,
                            caller = %next.caller_id,
                            images = output.images.len(),
                            "Job completed"
                        );
                        self.store.complete(next.job_id, output);
                    }
                    Err(e) => {
                        warn!(job_id = %next.job_id, error = %e, "Job failed");
                        self.store.fail(next.job_id, &e);
                    }
                },
                None => {
                    let missing = AppError::Internal("Job payload missing".to_string());
                    self.store.fail(next.job_id, &missing);
                }
            }

            self.inner.lock().active = None;
        }
    }

    /// Best-effort fan-out of new positions to every still-queued job.
    ///
    /// A failed delivery means that caller's receiver is gone: it can no
    /// longer observe completion, so its in-flight admission lock is cleared
    /// immediately. The job itself stays queued and still runs to a terminal
    /// state. Other recipients are unaffected.
    fn notify_positions(&self, inner: &mut QueueInner) {
        let base = if inner.active.is_some() { 2 } else { 1 };
        for (i, entry) in inner.pending.iter_mut().enumerate() {
            if entry.observer_gone {
                continue;
            }
            if entry.position_tx.send(base + i).is_err() {
                entry.observer_gone = true;
                debug!(
                    job_id = %entry.job_id,
                    caller = %entry.caller_id,
                    "Position observer gone, clearing in-flight lock"
                );
                self.admission.clear_in_flight(&entry.caller_id);
            }
        }
    }
}
