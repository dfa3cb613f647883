//! Telemetry sink trait. Fire-and-forget: callers log and discard errors.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{DeviceMetadata, RunRecord};

#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn register_device_metadata(&self, device_id: &str, metadata: &DeviceMetadata)
    -> Result<()>;

    async fn register_push_token(&self, device_id: &str, token: &str) -> Result<()>;

    async fn register_notification_status(&self, device_id: &str, authorized: bool) -> Result<()>;

    async fn record_refresh_run(&self, device_id: &str, record: &RunRecord) -> Result<()>;

    async fn record_processing_run(&self, device_id: &str, record: &RunRecord) -> Result<()>;
}
