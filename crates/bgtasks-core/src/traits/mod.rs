//! Collaborator traits: the seams between the core and its host.

pub mod device;
pub mod scheduler;
pub mod store;
pub mod telemetry;

pub use device::DeviceInfo;
pub use scheduler::{BackgroundScheduler, ExpirationHandler, JobHandle, JobHandler};
pub use store::KeyValueStore;
pub use telemetry::TelemetrySink;
