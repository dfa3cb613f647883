//! Background scheduler trait: the host facility that wakes the process
//! and dispatches job handlers.

use std::sync::Arc;

use crate::error::Result;
use crate::types::{JobId, ScheduleRequest};

/// Callback installed on a running job; fired when its deadline is imminent.
pub type ExpirationHandler = Box<dyn FnOnce() + Send + 'static>;

/// Handler invoked by the scheduler each time a registered job becomes due.
pub type JobHandler = Arc<dyn Fn(Arc<dyn JobHandle>) + Send + Sync + 'static>;

/// One in-flight invocation, owned by the scheduler.
pub trait JobHandle: Send + Sync {
    fn identifier(&self) -> &JobId;

    /// Replace the expiration handler for this invocation.
    fn set_expiration_handler(&self, handler: ExpirationHandler);

    /// Release the scheduler-held execution slot.
    fn report_completion(&self, success: bool);
}

/// Facility that owns schedule requests once submitted.
pub trait BackgroundScheduler: Send + Sync {
    /// Route future invocations of `id` to `handler`.
    fn register(&self, id: JobId, handler: JobHandler) -> Result<()>;

    /// Hand a request over. The caller keeps no handle to it.
    fn submit(&self, request: ScheduleRequest) -> Result<()>;
}
