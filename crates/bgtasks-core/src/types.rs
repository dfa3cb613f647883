//! Shared data types: job identity, schedule requests, device status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, restart-stable job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two job families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// The singleton refresh job.
    Refresh,
    /// Processing slot `i` in `0..max_processing_tasks`.
    Processing(usize),
}

impl JobKind {
    /// Event record type written when a run finishes normally.
    ///
    /// `will_expire` appends `-expire`; every caller passes `false`.
    pub fn start_event(&self, will_expire: bool) -> String {
        let suffix = if will_expire { "-expire" } else { "" };
        match self {
            JobKind::Refresh => format!("refresh-start{suffix}"),
            JobKind::Processing(n) => format!("processing-{n}-start{suffix}"),
        }
    }

    /// Event record type written when a run hits its deadline.
    pub fn expired_event(&self) -> String {
        match self {
            JobKind::Refresh => "refresh-expired".to_string(),
            JobKind::Processing(n) => format!("processing-{n}-expired"),
        }
    }

    /// `task_num` reported to the telemetry sink.
    pub fn task_num(&self) -> usize {
        match self {
            JobKind::Refresh => 0,
            JobKind::Processing(n) => *n,
        }
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Refresh => write!(f, "refresh"),
            JobKind::Processing(n) => write!(f, "processing#{n}"),
        }
    }
}

/// Builds and parses the namespaced identifiers for one chain.
#[derive(Debug, Clone)]
pub struct JobIds {
    namespace: String,
    max_processing_tasks: usize,
}

impl JobIds {
    pub fn new(namespace: &str, max_processing_tasks: usize) -> Self {
        Self {
            namespace: namespace.trim_end_matches('.').to_string(),
            max_processing_tasks,
        }
    }

    pub fn max_processing_tasks(&self) -> usize {
        self.max_processing_tasks
    }

    pub fn refresh(&self) -> JobId {
        JobId(format!("{}.refresh", self.namespace))
    }

    pub fn processing(&self, slot: usize) -> JobId {
        JobId(format!("{}.processing.{slot}", self.namespace))
    }

    /// Refresh first, then every processing slot in order.
    pub fn all(&self) -> Vec<JobId> {
        std::iter::once(self.refresh())
            .chain((0..self.max_processing_tasks).map(|i| self.processing(i)))
            .collect()
    }

    /// Map an identifier back to its kind. Unknown or out-of-range ids yield `None`.
    pub fn kind_of(&self, id: &JobId) -> Option<JobKind> {
        let rest = id.as_str().strip_prefix(&self.namespace)?.strip_prefix('.')?;
        if rest == "refresh" {
            return Some(JobKind::Refresh);
        }
        let slot: usize = rest.strip_prefix("processing.")?.parse().ok()?;
        (slot < self.max_processing_tasks).then_some(JobKind::Processing(slot))
    }
}

/// A request handed to the background scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub identifier: JobId,
    /// `None` = eligible as soon as constraints are met.
    pub earliest_begin_date: Option<DateTime<Utc>>,
    pub requires_network: bool,
    pub requires_external_power: bool,
}

impl ScheduleRequest {
    /// Unconstrained request, used for the refresh job.
    pub fn refresh(identifier: JobId) -> Self {
        Self {
            identifier,
            earliest_begin_date: None,
            requires_network: false,
            requires_external_power: false,
        }
    }

    /// Network + external power request, used for processing slots.
    pub fn processing(identifier: JobId, earliest_begin_date: Option<DateTime<Utc>>) -> Self {
        Self {
            identifier,
            earliest_begin_date,
            requires_network: true,
            requires_external_power: true,
        }
    }
}

/// Battery charging state as reported in telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryState {
    Unknown,
    Unplugged,
    Charging,
    Full,
    /// A state this build does not recognize.
    Other,
}

impl BatteryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatteryState::Unknown => "unknown",
            BatteryState::Unplugged => "unplugged",
            BatteryState::Charging => "charging",
            BatteryState::Full => "full",
            BatteryState::Other => "unknown-default",
        }
    }
}

impl std::fmt::Display for BatteryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last observed network reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityStatus {
    Connected,
    ConnectedViaCellular,
    ConnectedViaCellularWithoutInternet,
    ConnectedViaEthernet,
    ConnectedViaEthernetWithoutInternet,
    ConnectedViaWiFi,
    ConnectedViaWiFiWithoutInternet,
    Determining,
    NotConnected,
}

impl ConnectivityStatus {
    /// Stable integer code used for persistence.
    pub fn code(&self) -> i64 {
        match self {
            ConnectivityStatus::Connected => 0,
            ConnectivityStatus::ConnectedViaCellular => 1,
            ConnectivityStatus::ConnectedViaCellularWithoutInternet => 2,
            ConnectivityStatus::ConnectedViaEthernet => 3,
            ConnectivityStatus::ConnectedViaEthernetWithoutInternet => 4,
            ConnectivityStatus::ConnectedViaWiFi => 5,
            ConnectivityStatus::ConnectedViaWiFiWithoutInternet => 6,
            ConnectivityStatus::Determining => 7,
            ConnectivityStatus::NotConnected => 8,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => ConnectivityStatus::Connected,
            1 => ConnectivityStatus::ConnectedViaCellular,
            2 => ConnectivityStatus::ConnectedViaCellularWithoutInternet,
            3 => ConnectivityStatus::ConnectedViaEthernet,
            4 => ConnectivityStatus::ConnectedViaEthernetWithoutInternet,
            5 => ConnectivityStatus::ConnectedViaWiFi,
            6 => ConnectivityStatus::ConnectedViaWiFiWithoutInternet,
            7 => ConnectivityStatus::Determining,
            8 => ConnectivityStatus::NotConnected,
            _ => return None,
        })
    }
}

impl std::fmt::Display for ConnectivityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectivityStatus::Connected => "connected",
            ConnectivityStatus::ConnectedViaCellular => "connectedViaCellular",
            ConnectivityStatus::ConnectedViaCellularWithoutInternet => {
                "connectedViaCellularWithoutInternet"
            }
            ConnectivityStatus::ConnectedViaEthernet => "connectedViaEthernet",
            ConnectivityStatus::ConnectedViaEthernetWithoutInternet => {
                "connectedViaEthernetWithoutInternet"
            }
            ConnectivityStatus::ConnectedViaWiFi => "connectedViaWiFi",
            ConnectivityStatus::ConnectedViaWiFiWithoutInternet => "connectedViaWiFiWithoutInternet",
            ConnectivityStatus::Determining => "determining",
            ConnectivityStatus::NotConnected => "notConnected",
        };
        f.write_str(name)
    }
}

/// Notification authorization as granted by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationStatus {
    NotDetermined,
    Denied,
    Authorized,
    Provisional,
    Ephemeral,
}

impl NotificationStatus {
    pub fn code(&self) -> i64 {
        match self {
            NotificationStatus::NotDetermined => 0,
            NotificationStatus::Denied => 1,
            NotificationStatus::Authorized => 2,
            NotificationStatus::Provisional => 3,
            NotificationStatus::Ephemeral => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            0 => NotificationStatus::NotDetermined,
            1 => NotificationStatus::Denied,
            2 => NotificationStatus::Authorized,
            3 => NotificationStatus::Provisional,
            4 => NotificationStatus::Ephemeral,
            _ => return None,
        })
    }
}

impl std::str::FromStr for NotificationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "not-determined" | "notdetermined" => Ok(NotificationStatus::NotDetermined),
            "denied" => Ok(NotificationStatus::Denied),
            "authorized" => Ok(NotificationStatus::Authorized),
            "provisional" => Ok(NotificationStatus::Provisional),
            "ephemeral" => Ok(NotificationStatus::Ephemeral),
            other => Err(format!("unknown notification status '{other}'")),
        }
    }
}

/// Static description of the device, registered with the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceMetadata {
    pub system_name: String,
    pub system_version: String,
    pub model: String,
}

/// One run report for the telemetry sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub unix_ts_millis: u64,
    pub battery_level: f32,
    pub battery_state: String,
    pub task_num: usize,
    pub connectivity: String,
}
