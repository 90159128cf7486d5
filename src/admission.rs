//! Per-caller admission control
//!
//! Gate in front of the job queue: one in-flight job per caller plus a
//! cooldown counted from the previous job's terminal transition. Privileged
//! callers bypass both checks and never touch cooldown state.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::error::{AppError, Result};

/// Throttle state tracked per caller, created lazily on first submission
#[derive(Debug, Clone, Default)]
pub struct AdmissionState {
    pub generating: bool,
    pub last_completed_at: Option<DateTime<Utc>>,
}

pub struct AdmissionController {
    cooldown: Duration,
    privileged: HashSet<String>,
    states: Mutex<HashMap<String, AdmissionState>>,
}

impl AdmissionController {
    pub fn new(cooldown_secs: u64, privileged: impl IntoIterator<Item = String>) -> Self {
        Self {
            cooldown: Duration::seconds(cooldown_secs as i64),
            privileged: privileged.into_iter().collect(),
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_privileged(&self, caller_id: &str) -> bool {
        self.privileged.contains(caller_id)
    }

    /// Decide whether `caller_id` may submit now. On acceptance the caller's
    /// in-flight flag is set before returning, within the same critical
    /// section as the decision, so two near-simultaneous submissions cannot
    /// both pass.
    pub fn try_admit(&self, caller_id: &str) -> Result<()> {
        self.try_admit_at(caller_id, Utc::now())
    }

    pub fn try_admit_at(&self, caller_id: &str, now: DateTime<Utc>) -> Result<()> {
        let privileged = self.is_privileged(caller_id);
        let mut states = self.states.lock();
        let state = states.entry(caller_id.to_string()).or_default();

        // Privileged callers skip both checks but are tracked like everyone
        // else, so the in-flight flag stays accurate.
        if !privileged {
            if state.generating {
                return Err(AppError::AlreadyGenerating);
            }

            if let Some(last) = state.last_completed_at {
                let retry_at = last + self.cooldown;
                if now < retry_at {
                    let remaining = retry_at - now;
                    return Err(AppError::CooldownActive {
                        retry_at,
                        remaining_secs: remaining.num_seconds().max(1),
                    });
                }
            }
        } else {
            debug!(caller = %caller_id, "Privileged caller admitted");
        }

        state.generating = true;
        Ok(())
    }

    /// Terminal-transition reset: clears the in-flight flag and starts the
    /// cooldown clock, regardless of whether the job succeeded.
    pub fn release(&self, caller_id: &str) {
        self.release_at(caller_id, Utc::now());
    }

    pub fn release_at(&self, caller_id: &str, now: DateTime<Utc>) {
        let mut states = self.states.lock();
        let state = states.entry(caller_id.to_string()).or_default();
        state.generating = false;
        state.last_completed_at = Some(now);
    }

    /// Drop only the in-flight flag, without starting the cooldown clock.
    /// Used when a caller stops observing its queued job mid-wait.
    pub fn clear_in_flight(&self, caller_id: &str) {
        if let Some(state) = self.states.lock().get_mut(caller_id) {
            state.generating = false;
        }
    }

    pub fn state_of(&self, caller_id: &str) -> AdmissionState {
        self.states.lock().get(caller_id).cloned().unwrap_or_default()
    }
}

/// Guarantees the admission reset runs on every exit path of the per-job
/// processing routine, including the downstream-failure path.
pub struct AdmissionGuard {
    controller: Arc<AdmissionController>,
    caller_id: String,
    armed: bool,
}

impl AdmissionGuard {
    pub fn new(controller: Arc<AdmissionController>, caller_id: impl Into<String>) -> Self {
        Self {
            controller,
            caller_id: caller_id.into(),
            armed: true,
        }
    }

    /// Disarm the guard so dropping it leaves admission state untouched.
    ///
    /// Used for jobs whose caller already had its in-flight lock cleared by
    /// observer-gone cleanup: that lock may by now guard a newer submission
    /// from the same caller, which this job must not release.
    pub fn defuse(&mut self) {
        self.armed = false;
    }
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        if self.armed {
            self.controller.release(&self.caller_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller(cooldown_secs: u64) -> AdmissionController {
        AdmissionController::new(cooldown_secs, vec!["vip".to_string()])
    }

    #[test]
    fn second_submission_while_generating_is_rejected() {
        let ctl = controller(15);
        assert!(ctl.try_admit("u1").is_ok());
        assert!(matches!(
            ctl.try_admit("u1"),
            Err(AppError::AlreadyGenerating)
        ));
    }

    #[test]
    fn cooldown_counts_from_completion() {
        let ctl = controller(15);
        let t0 = Utc::now();
        assert!(ctl.try_admit_at("u1", t0).is_ok());
        ctl.release_at("u1", t0);

        match ctl.try_admit_at("u1", t0 + Duration::seconds(5)) {
            Err(AppError::CooldownActive {
                retry_at,
                remaining_secs,
            }) => {
                assert_eq!(retry_at, t0 + Duration::seconds(15));
                assert_eq!(remaining_secs, 10);
            }
            other => panic!("expected cooldown rejection, got {:?}", other.err()),
        }

        assert!(ctl.try_admit_at("u1", t0 + Duration::seconds(15)).is_ok());
    }

    #[test]
    fn privileged_callers_are_never_throttled() {
        let ctl = controller(15);
        let t0 = Utc::now();
        for _ in 0..5 {
            assert!(ctl.try_admit_at("vip", t0).is_ok());
        }
        ctl.release_at("vip", t0);
        // Cooldown never applies, even right after completion
        assert!(ctl.try_admit_at("vip", t0).is_ok());
    }

    #[test]
    fn guard_releases_on_drop() {
        let ctl = Arc::new(controller(0));
        ctl.try_admit("u1").unwrap();
        {
            let _guard = AdmissionGuard::new(ctl.clone(), "u1");
        }
        let state = ctl.state_of("u1");
        assert!(!state.generating);
        assert!(state.last_completed_at.is_some());
    }

    #[test]
    fn defused_guard_leaves_state_untouched() {
        let ctl = Arc::new(controller(0));
        ctl.try_admit("u1").unwrap();
        {
            let mut guard = AdmissionGuard::new(ctl.clone(), "u1");
            guard.defuse();
        }
        let state = ctl.state_of("u1");
        assert!(state.generating);
        assert!(state.last_completed_at.is_none());
    }

    #[test]
    fn clear_in_flight_does_not_start_cooldown() {
        let ctl = controller(15);
        ctl.try_admit("u1").unwrap();
        ctl.clear_in_flight("u1");

        let state = ctl.state_of("u1");
        assert!(!state.generating);
        assert!(state.last_completed_at.is_none());
        assert!(ctl.try_admit("u1").is_ok());
    }

    #[test]
    fn callers_are_tracked_independently() {
        let ctl = controller(15);
        assert!(ctl.try_admit("u1").is_ok());
        assert!(ctl.try_admit("u2").is_ok());
        assert!(matches!(
            ctl.try_admit("u2"),
            Err(AppError::AlreadyGenerating)
        ));
    }
}
