//! The abstract interfaces through which the core consumes the
//! platform's collaborating services. Concrete REST implementations
//! live in the SDK crate; tests substitute in-memory doubles.

use crate::types::{
    device::{Addressable, Device, DeviceServiceRecord},
    event::Event,
    profile::DeviceProfile,
    schedule::{Schedule, ScheduleEvent},
};
use crate::Result;
use async_trait::async_trait;

/// Flat name/value pairs, as exchanged with the service registry.
pub type NvPairs = Vec<(String, String)>;

/// The core-data ingestion service.
#[async_trait]
pub trait CoreDataClient: Send + Sync {
    /// Liveness probe. `Ok(())` means the service answered pong.
    async fn ping(&self) -> Result<()>;

    /// Submit one event. Delivery is best-effort; the caller treats
    /// any error as a dropped event.
    async fn add_event(&self, event: &Event) -> Result<()>;
}

/// The core-metadata registry of services, devices, profiles and
/// schedules.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    async fn ping(&self) -> Result<()>;

    /// Fetch this service's registration, if present.
    async fn device_service(
        &self,
        name: &str,
    ) -> Result<Option<DeviceServiceRecord>>;

    /// Register the service; returns the assigned id.
    async fn create_device_service(
        &self,
        record: &DeviceServiceRecord,
    ) -> Result<String>;

    async fn addressable(&self, name: &str) -> Result<Option<Addressable>>;

    /// Create an addressable; returns the assigned id. `Conflict`
    /// when one of the same name already exists.
    async fn create_addressable(&self, addr: &Addressable) -> Result<String>;

    async fn profile(&self, name: &str) -> Result<Option<DeviceProfile>>;

    async fn profile_by_id(&self, id: &str) -> Result<Option<DeviceProfile>>;

    async fn create_profile(&self, profile: &DeviceProfile) -> Result<String>;

    /// All devices owned by the named service.
    async fn devices_for_service(&self, name: &str) -> Result<Vec<Device>>;

    async fn device(&self, id: &str) -> Result<Option<Device>>;

    async fn device_by_name(&self, name: &str) -> Result<Option<Device>>;

    /// Create a device; returns the assigned id.
    async fn create_device(&self, device: &Device) -> Result<String>;

    async fn update_device(&self, device: &Device) -> Result<()>;

    async fn delete_device(&self, id: &str) -> Result<()>;

    async fn delete_device_by_name(&self, name: &str) -> Result<()>;

    async fn create_schedule(&self, schedule: &Schedule) -> Result<String>;

    async fn schedule(&self, name: &str) -> Result<Option<Schedule>>;

    async fn create_schedule_event(
        &self,
        event: &ScheduleEvent,
    ) -> Result<String>;

    /// All schedule events bound to the named service.
    async fn schedule_events_for_service(
        &self,
        name: &str,
    ) -> Result<Vec<ScheduleEvent>>;
}

/// The optional service registry (configuration + health checks).
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn ping(&self) -> Result<()>;

    /// The stored configuration for `service` under `profile`, as
    /// flat pairs. An empty result means nothing is stored yet and
    /// the file-loaded configuration should be uploaded.
    async fn get_config(
        &self,
        service: &str,
        profile: Option<&str>,
    ) -> Result<NvPairs>;

    async fn put_config(
        &self,
        service: &str,
        profile: Option<&str>,
        pairs: &NvPairs,
    ) -> Result<()>;

    /// Register the service for periodic health checking.
    async fn register_service(
        &self,
        name: &str,
        host: &str,
        port: u16,
        check_interval: &str,
    ) -> Result<()>;
}
