//! # BGTasks Core
//!
//! Shared configuration, error type, data model and the collaborator traits
//! (background scheduler, key-value store, telemetry sink, device info) that
//! the scheduler crate is written against.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::BgTasksConfig;
pub use error::{BgTasksError, Result};
pub use types::{
    BatteryState, ConnectivityStatus, DeviceMetadata, JobId, JobIds, JobKind, NotificationStatus,
    RunRecord, ScheduleRequest,
};
