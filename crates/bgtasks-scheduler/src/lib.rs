//! # BGTasks Scheduler
//!
//! Keeps a refresh job and a chain of processing slots armed with the
//! background scheduler, arbitrates each run between "finished" and
//! "expired", and records what happened to an append-only event log.
//!
//! ## Architecture
//! ```text
//! RunOrchestrator::launch
//!   ├── orphan check → ChainScheduler::arm_slot(0)
//!   └── register handlers → BackgroundScheduler (LocalScheduler on hosts)
//!
//! LocalScheduler (tokio interval)
//!   └── due request → handler(LocalJob)
//!         ├── ChainScheduler: re-arm self, first run also arms slot + 1
//!         └── TaskExecution (Running → Completed | Expired)
//!               ├── work: RunRecord → TelemetrySink (HTTP POST)
//!               ├── EventLog: "*-start" or "*-expired"
//!               └── JobHandle::report_completion(success)
//! ```

pub mod chain;
pub mod device;
pub mod event_log;
pub mod execution;
pub mod host;
pub mod orchestrator;
pub mod store;
pub mod telemetry;

pub use chain::{ChainScheduler, ChainState, scheduling_interval_minutes};
pub use device::{ExpectedRunTimes, HostDeviceInfo};
pub use event_log::{EventLog, EventRecord};
pub use execution::{CompletionCallback, ExecutionState, TaskExecution};
pub use host::{LocalJob, LocalScheduler, probe_target, spawn_connectivity_probe, spawn_host};
pub use orchestrator::{Collaborators, RunOrchestrator};
pub use store::{FileKvStore, MemoryKvStore};
pub use telemetry::{HttpTelemetry, NoopTelemetry};
