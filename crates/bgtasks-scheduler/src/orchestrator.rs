//! Run orchestrator: wires the chain scheduler, execution state machine,
//! event log and telemetry together at launch and at every job invocation.

use std::sync::{Arc, Weak};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use bgtasks_core::error::Result;
use bgtasks_core::traits::{
    BackgroundScheduler, DeviceInfo, JobHandle, JobHandler, KeyValueStore, TelemetrySink,
};
use bgtasks_core::types::{ConnectivityStatus, JobIds, JobKind, NotificationStatus, RunRecord};

use crate::chain::ChainScheduler;
use crate::device;
use crate::event_log::EventLog;
use crate::execution::TaskExecution;

/// Collaborators handed to the orchestrator.
pub struct Collaborators {
    pub scheduler: Arc<dyn BackgroundScheduler>,
    pub store: Arc<dyn KeyValueStore>,
    pub event_log: Arc<EventLog>,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub device: Arc<dyn DeviceInfo>,
}

pub struct RunOrchestrator {
    chain: ChainScheduler,
    scheduler: Arc<dyn BackgroundScheduler>,
    store: Arc<dyn KeyValueStore>,
    event_log: Arc<EventLog>,
    telemetry: Arc<dyn TelemetrySink>,
    device: Arc<dyn DeviceInfo>,
}

impl RunOrchestrator {
    pub fn new(ids: JobIds, deps: Collaborators) -> Arc<Self> {
        Arc::new(Self {
            chain: ChainScheduler::new(Arc::clone(&deps.scheduler), ids),
            scheduler: deps.scheduler,
            store: deps.store,
            event_log: deps.event_log,
            telemetry: deps.telemetry,
            device: deps.device,
        })
    }

    pub fn chain(&self) -> &ChainScheduler {
        &self.chain
    }

    pub fn event_log(&self) -> &Arc<EventLog> {
        &self.event_log
    }

    pub fn ids(&self) -> &JobIds {
        self.chain.ids()
    }

    /// Process start: re-arm an orphaned slot 0, then route every job
    /// identifier back into this orchestrator.
    pub fn launch(self: &Arc<Self>) -> Result<()> {
        self.chain.ensure_first_slot_armed(self.store.as_ref());

        let ids = self.ids().clone();
        for id in ids.all() {
            if let Some(kind) = ids.kind_of(&id) {
                self.scheduler.register(id, self.handler(kind))?;
            }
        }
        tracing::info!(
            "🚀 Launched with {} processing slots (chain interval {} min)",
            ids.max_processing_tasks(),
            self.chain.interval().num_minutes()
        );
        Ok(())
    }

    fn handler(self: &Arc<Self>, kind: JobKind) -> JobHandler {
        let weak: Weak<Self> = Arc::downgrade(self);
        Arc::new(move |job: Arc<dyn JobHandle>| match weak.upgrade() {
            Some(this) => match kind {
                JobKind::Refresh => this.handle_refresh(job),
                JobKind::Processing(slot) => this.handle_processing(slot, job),
            },
            None => {
                tracing::warn!("⚠️ '{}' dispatched after shutdown", job.identifier());
                job.report_completion(false);
            }
        })
    }

    /// Cache every reachability change so run records can report it.
    pub fn observe_connectivity(
        self: &Arc<Self>,
        mut rx: watch::Receiver<ConnectivityStatus>,
    ) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            loop {
                let status = *rx.borrow_and_update();
                if let Err(e) = device::set_connectivity_status(store.as_ref(), status) {
                    tracing::warn!("⚠️ Failed to cache connectivity status: {e}");
                }
                tracing::debug!("🌐 Connectivity: {status}");
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    pub fn handle_refresh(self: &Arc<Self>, job: Arc<dyn JobHandle>) {
        tracing::info!("🔔 Executing refresh task");
        self.chain.arm_refresh();
        self.dispatch(JobKind::Refresh, job);
    }

    pub fn handle_processing(self: &Arc<Self>, slot: usize, job: Arc<dyn JobHandle>) {
        tracing::info!("🔔 Executing processing task #{slot}");
        self.chain.on_processing_invoked(slot);
        self.dispatch(JobKind::Processing(slot), job);
    }

    fn dispatch(self: &Arc<Self>, kind: JobKind, job: Arc<dyn JobHandle>) {
        let reporter = Arc::clone(&job);
        let exec = TaskExecution::new(
            kind,
            Arc::clone(&self.event_log),
            Box::new(move |success| reporter.report_completion(success)),
        );

        let expirer = Arc::clone(&exec);
        job.set_expiration_handler(Box::new(move || expirer.on_expire()));

        let this = Arc::clone(self);
        exec.start(async move { this.send_run_record(kind).await });
    }

    fn run_record(&self, kind: JobKind) -> RunRecord {
        RunRecord {
            unix_ts_millis: chrono::Utc::now().timestamp_millis().max(0) as u64,
            battery_level: self.device.battery_level(),
            battery_state: self.device.battery_state().to_string(),
            task_num: kind.task_num(),
            connectivity: device::connectivity_status(self.store.as_ref()).to_string(),
        }
    }

    async fn send_run_record(&self, kind: JobKind) {
        let device_id = device::device_id(self.store.as_ref());
        let record = self.run_record(kind);
        let result = match kind {
            JobKind::Refresh => self.telemetry.record_refresh_run(&device_id, &record).await,
            JobKind::Processing(_) => {
                self.telemetry
                    .record_processing_run(&device_id, &record)
                    .await
            }
        };
        if let Err(e) = result {
            tracing::warn!("⚠️ Failed to send {kind} record: {e}");
        }
    }

    /// New push token from the platform. Registers it (and the device
    /// metadata) only when it differs from the last accepted one.
    pub async fn on_push_token(&self, token: &str) {
        if device::push_token(self.store.as_ref()) == token {
            tracing::debug!("Push token unchanged");
            return;
        }
        let device_id = device::device_id(self.store.as_ref());
        match self.telemetry.register_push_token(&device_id, token).await {
            Ok(()) => {
                if let Err(e) = device::set_push_token(self.store.as_ref(), token) {
                    tracing::warn!("⚠️ Failed to persist push token: {e}");
                }
            }
            Err(e) => tracing::warn!("⚠️ Failed to send device token: {e}"),
        }
        let metadata = self.device.metadata();
        if let Err(e) = self
            .telemetry
            .register_device_metadata(&device_id, &metadata)
            .await
        {
            tracing::warn!("⚠️ Failed to send device metadata: {e}");
        }
    }

    /// Notification authorization observed. Anything other than
    /// `Authorized` is reported as denied; only changes are sent.
    pub async fn on_notification_status(&self, status: NotificationStatus) {
        let effective = match status {
            NotificationStatus::Authorized => NotificationStatus::Authorized,
            NotificationStatus::NotDetermined => return,
            _ => NotificationStatus::Denied,
        };
        if device::notification_status(self.store.as_ref()) == effective {
            return;
        }
        if let Err(e) = device::set_notification_status(self.store.as_ref(), effective) {
            tracing::warn!("⚠️ Failed to persist notification status: {e}");
        }
        let device_id = device::device_id(self.store.as_ref());
        let authorized = effective == NotificationStatus::Authorized;
        if let Err(e) = self
            .telemetry
            .register_notification_status(&device_id, authorized)
            .await
        {
            tracing::warn!("⚠️ Failed to send notification status: {e}");
        }
    }
}
