//! Execution state machine: arbitrates "work finished" against "deadline
//! expired" for one dispatched invocation.
//!
//! ```text
//!            on_finish()             on_expire()
//! Completed ◄──────────── Running ────────────► Expired
//!  start record, cb(true)          cancel work, expired record, cb(false)
//! ```
//!
//! Both transitions are a single compare-and-swap out of `Running`, so
//! whichever trigger lands first wins and the other becomes a no-op.

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use bgtasks_core::types::JobKind;

use crate::event_log::EventLog;

/// Lifecycle of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExecutionState {
    Running = 0,
    Completed = 1,
    Expired = 2,
}

impl ExecutionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ExecutionState::Running,
            1 => ExecutionState::Completed,
            _ => ExecutionState::Expired,
        }
    }
}

/// Invoked exactly once with `true` (finished) or `false` (expired).
pub type CompletionCallback = Box<dyn FnOnce(bool) + Send + 'static>;

/// One dispatched invocation of a refresh or processing job.
pub struct TaskExecution {
    kind: JobKind,
    state: AtomicU8,
    cancel: CancellationToken,
    event_log: Arc<EventLog>,
    on_complete: Mutex<Option<CompletionCallback>>,
}

impl TaskExecution {
    pub fn new(kind: JobKind, event_log: Arc<EventLog>, on_complete: CompletionCallback) -> Arc<Self> {
        Arc::new(Self {
            kind,
            state: AtomicU8::new(ExecutionState::Running as u8),
            cancel: CancellationToken::new(),
            event_log,
            on_complete: Mutex::new(Some(on_complete)),
        })
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn state(&self) -> ExecutionState {
        ExecutionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Token the work is raced against; cancelled on expiry.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Spawn `work`. Normal completion calls [`on_finish`](Self::on_finish);
    /// if the token is cancelled first, `work` is dropped mid-flight.
    pub fn start<F>(self: &Arc<Self>, work: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = this.cancel.cancelled() => {
                    tracing::debug!("✂️ {} work abandoned after expiry", this.kind);
                }
                _ = work => this.on_finish(),
            }
        })
    }

    /// Work finished. No-op unless still `Running`.
    pub fn on_finish(&self) {
        if !self.transition(ExecutionState::Completed) {
            return;
        }
        match self.kind {
            JobKind::Refresh => self.event_log.append_refresh_start(false),
            JobKind::Processing(n) => self.event_log.append_processing_start(false, n),
        }
        tracing::info!("✅ {} completed", self.kind);
        self.complete(true);
    }

    /// Deadline reached. No-op unless still `Running`.
    pub fn on_expire(&self) {
        if !self.transition(ExecutionState::Expired) {
            return;
        }
        self.cancel.cancel();
        match self.kind {
            JobKind::Refresh => self.event_log.append_refresh_expired(),
            JobKind::Processing(n) => self.event_log.append_processing_expired(n),
        }
        tracing::info!("⏰ {} expired", self.kind);
        self.complete(false);
    }

    fn transition(&self, to: ExecutionState) -> bool {
        self.state
            .compare_exchange(
                ExecutionState::Running as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn complete(&self, success: bool) {
        let callback = self
            .on_complete
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(callback) = callback {
            callback(success);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct Probe {
        calls: Arc<AtomicUsize>,
        results: Arc<Mutex<Vec<bool>>>,
    }

    impl Probe {
        fn new() -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                results: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn callback(&self) -> CompletionCallback {
            let calls = Arc::clone(&self.calls);
            let results = Arc::clone(&self.results);
            Box::new(move |success| {
                calls.fetch_add(1, Ordering::SeqCst);
                results.lock().unwrap().push(success);
            })
        }
    }

    fn log() -> (tempfile::TempDir, Arc<EventLog>) {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(EventLog::new(dir.path(), "exec"));
        (dir, log)
    }

    #[tokio::test]
    async fn test_finish_wins() {
        let (_dir, log) = log();
        let probe = Probe::new();
        let exec = TaskExecution::new(JobKind::Refresh, log.clone(), probe.callback());

        exec.start(async {}).await.unwrap();
        exec.on_expire();

        assert_eq!(exec.state(), ExecutionState::Completed);
        assert_eq!(*probe.results.lock().unwrap(), vec![true]);
        let rows = log.load_all();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].ends_with("refresh-start"));
    }

    #[tokio::test]
    async fn test_expire_cancels_pending_work() {
        let (_dir, log) = log();
        let probe = Probe::new();
        let exec = TaskExecution::new(JobKind::Processing(1), log.clone(), probe.callback());

        let reached_end = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&reached_end);
        let handle = exec.start(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            flag.fetch_add(1, Ordering::SeqCst);
        });

        exec.on_expire();
        handle.await.unwrap();
        exec.on_finish();

        assert_eq!(exec.state(), ExecutionState::Expired);
        assert!(exec.cancellation().is_cancelled());
        assert_eq!(reached_end.load(Ordering::SeqCst), 0);
        assert_eq!(*probe.results.lock().unwrap(), vec![false]);
        let rows = log.load_all();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].ends_with("processing-1-expired"));
    }

    #[tokio::test]
    async fn test_repeated_triggers_are_noops() {
        let (_dir, log) = log();
        let probe = Probe::new();
        let exec = TaskExecution::new(JobKind::Processing(0), log.clone(), probe.callback());

        exec.on_finish();
        exec.on_finish();
        exec.on_expire();
        exec.on_expire();

        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        assert_eq!(log.load_all().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_finish_and_expire_complete_once() {
        let (_dir, log) = log();

        for round in 0..200 {
            let probe = Probe::new();
            let exec = TaskExecution::new(JobKind::Processing(2), log.clone(), probe.callback());

            let barrier = Arc::new(tokio::sync::Barrier::new(2));
            let (a, b) = (Arc::clone(&exec), Arc::clone(&exec));
            let (ba, bb) = (Arc::clone(&barrier), Arc::clone(&barrier));
            let finisher = tokio::spawn(async move {
                ba.wait().await;
                a.on_finish();
            });
            let expirer = tokio::spawn(async move {
                bb.wait().await;
                b.on_expire();
            });
            finisher.await.unwrap();
            expirer.await.unwrap();

            assert_eq!(probe.calls.load(Ordering::SeqCst), 1, "round {round}");
            let success = probe.results.lock().unwrap()[0];
            let expected = if success {
                ExecutionState::Completed
            } else {
                ExecutionState::Expired
            };
            assert_eq!(exec.state(), expected);
        }

        // One record per round, each either a start or an expiry.
        let rows = log.load_all();
        assert_eq!(rows.len(), 200);
        assert!(rows.iter().all(|r| {
            r.ends_with("processing-2-start") || r.ends_with("processing-2-expired")
        }));
    }
}
