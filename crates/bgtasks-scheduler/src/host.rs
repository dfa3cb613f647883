//! Local host: an in-process stand-in for the OS background scheduler.
//! Uses tokio::interval for ticking (sleeps between checks). Each tick fires
//! every pending request that is due and whose constraints hold, then arms a
//! deadline watcher that expires the run if it does not report in time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

use bgtasks_core::config::HostConfig;
use bgtasks_core::error::{BgTasksError, Result};
use bgtasks_core::traits::{BackgroundScheduler, ExpirationHandler, JobHandle, JobHandler};
use bgtasks_core::types::{ConnectivityStatus, JobId, JobIds, JobKind, ScheduleRequest};

/// A request waiting to fire.
#[derive(Debug, Clone)]
struct PendingRequest {
    request: ScheduleRequest,
    eligible_at: DateTime<Utc>,
}

struct HostState {
    handlers: HashMap<JobId, JobHandler>,
    pending: HashMap<JobId, PendingRequest>,
}

/// In-process background scheduler.
pub struct LocalScheduler {
    ids: JobIds,
    config: HostConfig,
    state: Mutex<HostState>,
    network_available: AtomicBool,
    on_external_power: AtomicBool,
}

impl LocalScheduler {
    /// Only identifiers produced by `ids` may be submitted.
    pub fn new(ids: JobIds, config: HostConfig) -> Self {
        Self {
            network_available: AtomicBool::new(config.network_available),
            on_external_power: AtomicBool::new(config.on_external_power),
            ids,
            config,
            state: Mutex::new(HostState {
                handlers: HashMap::new(),
                pending: HashMap::new(),
            }),
        }
    }

    pub fn set_network_available(&self, available: bool) {
        self.network_available.store(available, Ordering::Relaxed);
    }

    pub fn set_on_external_power(&self, on_power: bool) {
        self.on_external_power.store(on_power, Ordering::Relaxed);
    }

    /// Track reachability from a probe: requests that need the network are
    /// held while it reports no connection. `Determining` leaves the flag as is.
    pub fn follow_connectivity(
        self: &Arc<Self>,
        mut rx: watch::Receiver<ConnectivityStatus>,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let status = *rx.borrow_and_update();
                if let Some(available) = network_available(status) {
                    this.set_network_available(available);
                }
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    pub fn is_network_available(&self) -> bool {
        self.network_available.load(Ordering::Relaxed)
    }

    /// Pending requests, soonest first.
    pub fn pending(&self) -> Vec<(JobId, DateTime<Utc>)> {
        let state = self.lock();
        let mut out: Vec<_> = state
            .pending
            .values()
            .map(|p| (p.request.identifier.clone(), p.eligible_at))
            .collect();
        out.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        out
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn deadline_for(&self, kind: JobKind) -> Duration {
        Duration::from_secs(match kind {
            JobKind::Refresh => self.config.refresh_deadline_secs,
            JobKind::Processing(_) => self.config.processing_deadline_secs,
        })
    }

    fn constraints_met(&self, request: &ScheduleRequest) -> bool {
        (!request.requires_network || self.network_available.load(Ordering::Relaxed))
            && (!request.requires_external_power || self.on_external_power.load(Ordering::Relaxed))
    }

    /// Fire every due request as of `now`. Returns the identifiers dispatched.
    pub fn tick_at(&self, now: DateTime<Utc>) -> Vec<JobId> {
        let due: Vec<(JobId, Option<JobHandler>)> = {
            let mut state = self.lock();
            let ready: Vec<JobId> = state
                .pending
                .values()
                .filter(|p| p.eligible_at <= now && self.constraints_met(&p.request))
                .map(|p| p.request.identifier.clone())
                .collect();
            ready
                .into_iter()
                .map(|id| {
                    state.pending.remove(&id);
                    let handler = state.handlers.get(&id).cloned();
                    (id, handler)
                })
                .collect()
        };

        let mut fired = Vec::with_capacity(due.len());
        for (id, handler) in due {
            let Some(handler) = handler else {
                tracing::warn!("⚠️ No handler registered for '{id}', dropping request");
                continue;
            };
            let Some(kind) = self.ids.kind_of(&id) else {
                continue;
            };
            let job = LocalJob::new(id.clone());
            spawn_deadline(Arc::clone(&job), self.deadline_for(kind));
            tracing::info!("🔔 Dispatching '{id}'");
            handler(job as Arc<dyn JobHandle>);
            fired.push(id);
        }
        fired
    }

    pub fn tick(&self) -> Vec<JobId> {
        self.tick_at(Utc::now())
    }
}

impl BackgroundScheduler for LocalScheduler {
    fn register(&self, id: JobId, handler: JobHandler) -> Result<()> {
        if self.ids.kind_of(&id).is_none() {
            return Err(BgTasksError::Scheduler(format!("'{id}' is not a permitted identifier")));
        }
        self.lock().handlers.insert(id, handler);
        Ok(())
    }

    fn submit(&self, request: ScheduleRequest) -> Result<()> {
        let kind = self.ids.kind_of(&request.identifier).ok_or_else(|| {
            BgTasksError::Scheduler(format!(
                "'{}' is not a permitted identifier",
                request.identifier
            ))
        })?;

        let mut state = self.lock();
        if matches!(kind, JobKind::Processing(_)) && !state.pending.contains_key(&request.identifier)
        {
            let processing = state
                .pending
                .keys()
                .filter(|id| matches!(self.ids.kind_of(id), Some(JobKind::Processing(_))))
                .count();
            if processing >= self.config.max_pending_processing {
                return Err(BgTasksError::Scheduler(format!(
                    "too many pending processing requests ({processing})"
                )));
            }
        }

        let now = Utc::now();
        let min_gap = chrono::Duration::seconds(self.config.min_gap_secs as i64);
        let eligible_at = request.earliest_begin_date.unwrap_or(now + min_gap);
        tracing::debug!("📥 '{}' eligible at {eligible_at}", request.identifier);
        state.pending.insert(
            request.identifier.clone(),
            PendingRequest {
                request,
                eligible_at,
            },
        );
        Ok(())
    }
}

/// Handle for one locally dispatched run.
pub struct LocalJob {
    id: JobId,
    expiration: Mutex<Option<ExpirationHandler>>,
    completed: AtomicBool,
    done: Notify,
}

impl LocalJob {
    fn new(id: JobId) -> Arc<Self> {
        Arc::new(Self {
            id,
            expiration: Mutex::new(None),
            completed: AtomicBool::new(false),
            done: Notify::new(),
        })
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    fn expire(&self) {
        if self.is_completed() {
            return;
        }
        let handler = self
            .expiration
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match handler {
            Some(handler) => {
                tracing::info!("⏰ '{}' hit its deadline", self.id);
                handler();
            }
            None => tracing::warn!("⚠️ '{}' expired with no expiration handler", self.id),
        }
    }
}

impl JobHandle for LocalJob {
    fn identifier(&self) -> &JobId {
        &self.id
    }

    fn set_expiration_handler(&self, handler: ExpirationHandler) {
        *self.expiration.lock().unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }

    fn report_completion(&self, success: bool) {
        if self.completed.swap(true, Ordering::AcqRel) {
            tracing::warn!("⚠️ '{}' reported completion twice", self.id);
            return;
        }
        tracing::info!("🏁 '{}' completed (success = {success})", self.id);
        self.done.notify_waiters();
    }
}

fn spawn_deadline(job: Arc<LocalJob>, deadline: Duration) {
    tokio::spawn(async move {
        tokio::select! {
            _ = job.done.notified() => {}
            _ = tokio::time::sleep(deadline) => job.expire(),
        }
    });
}

fn network_available(status: ConnectivityStatus) -> Option<bool> {
    match status {
        ConnectivityStatus::Determining => None,
        ConnectivityStatus::NotConnected
        | ConnectivityStatus::ConnectedViaCellularWithoutInternet
        | ConnectivityStatus::ConnectedViaEthernetWithoutInternet
        | ConnectivityStatus::ConnectedViaWiFiWithoutInternet => Some(false),
        _ => Some(true),
    }
}

/// Spawn the host loop as a background tokio task.
pub fn spawn_host(scheduler: Arc<LocalScheduler>) -> JoinHandle<()> {
    let tick_secs = scheduler.config.tick_secs.max(1);
    tracing::info!("⏰ Local host started (check every {tick_secs}s)");
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(tick_secs));
        loop {
            interval.tick().await;
            let fired = scheduler.tick();
            if !fired.is_empty() {
                tracing::debug!("Fired {} job(s)", fired.len());
            }
        }
    })
}

/// Probe `target` (a `host:port`) every `every` and publish reachability.
/// The sender side lives in the spawned task.
pub fn spawn_connectivity_probe(
    target: String,
    every: Duration,
) -> (watch::Receiver<ConnectivityStatus>, JoinHandle<()>) {
    let (tx, rx) = watch::channel(ConnectivityStatus::Determining);
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(every.max(Duration::from_secs(1)));
        loop {
            interval.tick().await;
            let status = probe(&target).await;
            tx.send_if_modified(|current| {
                let changed = *current != status;
                *current = status;
                changed
            });
            if tx.is_closed() {
                break;
            }
        }
    });
    (rx, handle)
}

async fn probe(target: &str) -> ConnectivityStatus {
    match tokio::time::timeout(Duration::from_secs(5), tokio::net::TcpStream::connect(target)).await {
        Ok(Ok(_)) => ConnectivityStatus::Connected,
        _ => ConnectivityStatus::NotConnected,
    }
}

/// `host:port` of a base URL, defaulting the port from the scheme.
pub fn probe_target(base_url: &str) -> Option<String> {
    let (scheme, rest) = base_url.split_once("://")?;
    let authority = rest.split(['/', '?', '#']).next()?;
    if authority.is_empty() {
        return None;
    }
    if authority.rsplit_once(':').is_some_and(|(_, p)| p.parse::<u16>().is_ok()) {
        return Some(authority.to_string());
    }
    let port = if scheme.eq_ignore_ascii_case("https") { 443 } else { 80 };
    Some(format!("{authority}:{port}"))
}
