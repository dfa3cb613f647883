//! Task chain scheduler: keeps the refresh job and every processing slot
//! re-armed, and staggers first activation of later slots.
//!
//! ```text
//! launch ──► slot 0 orphan check ──► arm(0)
//! slot 0 first run ──► arm(0) + arm(1) @ now + interval
//! slot 1 first run ──► arm(1) + arm(2) @ now + interval
//! slot N-1 first run ──► arm(N-1)
//! any later run of i ──► arm(i)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{Duration, Utc};

use bgtasks_core::traits::{BackgroundScheduler, KeyValueStore};
use bgtasks_core::types::{JobIds, ScheduleRequest};

use crate::device::ExpectedRunTimes;

/// Delay before a newly chained slot may first run: `ceil(30 + 30 / N)` minutes.
pub fn scheduling_interval_minutes(max_processing_tasks: usize) -> i64 {
    let n = max_processing_tasks.max(1) as i64;
    30 + (30 + n - 1) / n
}

/// Which slots have run at least once in this process. Not persisted:
/// every launch starts with all flags cleared.
pub struct ChainState {
    armed_once: Box<[AtomicBool]>,
}

impl ChainState {
    pub fn new(slots: usize) -> Self {
        Self {
            armed_once: (0..slots).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    /// Record an execution of `slot`. Returns `true` only for the first one.
    pub fn mark_executed(&self, slot: usize) -> bool {
        match self.armed_once.get(slot) {
            Some(flag) => !flag.swap(true, Ordering::AcqRel),
            None => false,
        }
    }

    pub fn is_armed(&self, slot: usize) -> bool {
        self.armed_once
            .get(slot)
            .is_some_and(|f| f.load(Ordering::Acquire))
    }
}

/// Submits schedule requests for the refresh job and the processing chain.
pub struct ChainScheduler {
    scheduler: Arc<dyn BackgroundScheduler>,
    ids: JobIds,
    interval: Duration,
    state: ChainState,
}

impl ChainScheduler {
    pub fn new(scheduler: Arc<dyn BackgroundScheduler>, ids: JobIds) -> Self {
        let slots = ids.max_processing_tasks();
        Self {
            scheduler,
            interval: Duration::minutes(scheduling_interval_minutes(slots)),
            state: ChainState::new(slots),
            ids,
        }
    }

    pub fn ids(&self) -> &JobIds {
        &self.ids
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    /// Re-arm the refresh job. No delay, no constraints.
    pub fn arm_refresh(&self) {
        tracing::info!("📅 Scheduling refresh task");
        self.submit(ScheduleRequest::refresh(self.ids.refresh()));
    }

    /// Re-arm `slot`; with `chain_advance`, also arm `slot + 1` after the
    /// scheduling interval (unless `slot` is the last one).
    pub fn arm_slot(&self, slot: usize, chain_advance: bool) {
        tracing::info!("📅 Scheduling processing task #{slot}");
        self.submit(ScheduleRequest::processing(self.ids.processing(slot), None));

        if chain_advance && slot + 1 < self.ids.max_processing_tasks() {
            let next = slot + 1;
            let at = Utc::now() + self.interval;
            tracing::info!("⛓️ Processing task #{next} scheduled for the first time at {at}");
            self.submit(ScheduleRequest::processing(self.ids.processing(next), Some(at)));
        }
    }

    /// Called once per dispatched execution of `slot`.
    pub fn on_processing_invoked(&self, slot: usize) {
        let chain_advance = self.state.mark_executed(slot);
        self.arm_slot(slot, chain_advance);
    }

    /// Launch-time guard against slot 0 having been dropped while the
    /// process was dead. Returns whether slot 0 was re-armed.
    pub fn ensure_first_slot_armed(&self, store: &dyn KeyValueStore) -> bool {
        let id = self.ids.processing(0);
        match ExpectedRunTimes::get(store, &id) {
            Some(at) if at >= Utc::now() => {
                tracing::debug!("Processing task #0 expected at {at}, leaving as is");
                false
            }
            _ => {
                self.arm_slot(0, false);
                true
            }
        }
    }

    fn submit(&self, request: ScheduleRequest) {
        let id = request.identifier.clone();
        if let Err(e) = self.scheduler.submit(request) {
            tracing::warn!("⚠️ Failed to submit '{id}': {e}");
        }
    }
}
