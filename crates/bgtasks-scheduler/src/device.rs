//! Device-scoped persisted values and the host device info provider.
//!
//! Every accessor follows the same first-access policy: a missing (or
//! unreadable) value installs the default into the store and returns it.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};

use bgtasks_core::error::Result;
use bgtasks_core::traits::{DeviceInfo, KeyValueStore};
use bgtasks_core::types::{
    BatteryState, ConnectivityStatus, DeviceMetadata, JobId, NotificationStatus,
};

const DEVICE_ID_KEY: &str = "deviceID";
const PUSH_TOKEN_KEY: &str = "apnsDeviceToken";
const NOTIFICATION_STATUS_KEY: &str = "notificationsAuthorizationStatus";
const CONNECTIVITY_KEY: &str = "connectivityStatus";
const EXPECTED_RUN_TIMES_KEY: &str = "expectedRunTimes";

fn install<T>(what: &str, result: Result<()>, value: T) -> T {
    if let Err(e) = result {
        tracing::warn!("⚠️ Failed to persist default {what}: {e}");
    }
    value
}

/// Stable per-install device identity. Generated once (UUID v4) and reused.
pub fn device_id(store: &dyn KeyValueStore) -> String {
    if let Some(existing) = store.get_string(DEVICE_ID_KEY) {
        return existing;
    }
    let id = uuid::Uuid::new_v4().to_string().to_uppercase();
    install("device id", store.set_string(DEVICE_ID_KEY, &id), id)
}

/// Last push token the sink accepted; empty until one is registered.
pub fn push_token(store: &dyn KeyValueStore) -> String {
    if let Some(existing) = store.get_string(PUSH_TOKEN_KEY) {
        return existing;
    }
    install("push token", store.set_string(PUSH_TOKEN_KEY, ""), String::new())
}

pub fn set_push_token(store: &dyn KeyValueStore, token: &str) -> Result<()> {
    store.set_string(PUSH_TOKEN_KEY, token)
}

/// Last notification authorization reported to the sink.
pub fn notification_status(store: &dyn KeyValueStore) -> NotificationStatus {
    store
        .get_int(NOTIFICATION_STATUS_KEY)
        .and_then(NotificationStatus::from_code)
        .unwrap_or(NotificationStatus::NotDetermined)
}

pub fn set_notification_status(store: &dyn KeyValueStore, status: NotificationStatus) -> Result<()> {
    store.set_int(NOTIFICATION_STATUS_KEY, status.code())
}

/// Last observed reachability; `Determining` until the first observation.
pub fn connectivity_status(store: &dyn KeyValueStore) -> ConnectivityStatus {
    if let Some(status) = store
        .get_int(CONNECTIVITY_KEY)
        .and_then(ConnectivityStatus::from_code)
    {
        return status;
    }
    let fallback = ConnectivityStatus::Determining;
    install(
        "connectivity status",
        store.set_int(CONNECTIVITY_KEY, fallback.code()),
        fallback,
    )
}

pub fn set_connectivity_status(store: &dyn KeyValueStore, status: ConnectivityStatus) -> Result<()> {
    store.set_int(CONNECTIVITY_KEY, status.code())
}

/// Persisted `identifier → expected run time` map.
pub struct ExpectedRunTimes;

impl ExpectedRunTimes {
    pub fn get(store: &dyn KeyValueStore, id: &JobId) -> Option<DateTime<Utc>> {
        let Some(times) = store.get_double_map(EXPECTED_RUN_TIMES_KEY) else {
            install(
                "expected run times",
                store.set_double_map(EXPECTED_RUN_TIMES_KEY, &HashMap::new()),
                (),
            );
            return None;
        };
        let secs = *times.get(id.as_str())?;
        let millis = (secs * 1000.0).round() as i64;
        Utc.timestamp_millis_opt(millis).single()
    }

    pub fn set(store: &dyn KeyValueStore, id: &JobId, at: DateTime<Utc>) -> Result<()> {
        let mut times = store.get_double_map(EXPECTED_RUN_TIMES_KEY).unwrap_or_default();
        times.insert(id.to_string(), at.timestamp_millis() as f64 / 1000.0);
        store.set_double_map(EXPECTED_RUN_TIMES_KEY, &times)
    }
}

/// Device info for a desktop/server host. There is no battery to read, so
/// level is `-1.0` and state `Unknown`.
pub struct HostDeviceInfo {
    metadata: DeviceMetadata,
}

impl HostDeviceInfo {
    pub fn detect() -> Self {
        let model = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| std::env::consts::ARCH.to_string());
        Self {
            metadata: DeviceMetadata {
                system_name: whoami::platform().to_string(),
                system_version: whoami::distro(),
                model,
            },
        }
    }
}

impl DeviceInfo for HostDeviceInfo {
    fn battery_level(&self) -> f32 {
        -1.0
    }

    fn battery_state(&self) -> BatteryState {
        BatteryState::Unknown
    }

    fn metadata(&self) -> DeviceMetadata {
        self.metadata.clone()
    }
}
