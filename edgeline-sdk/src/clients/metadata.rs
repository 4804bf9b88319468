//! The core-metadata REST client.

use super::RestClient;
use async_trait::async_trait;
use edgeline_api::{
    client::MetadataClient,
    types::{
        device::{Addressable, Device, DeviceServiceRecord},
        profile::DeviceProfile,
        schedule::{Schedule, ScheduleEvent},
    },
    Error, Result,
};

pub struct MetaClient {
    rest: RestClient,
}

impl MetaClient {
    /// `base` is the service authority, e.g. `http://localhost:48081`.
    pub fn new(base: &str) -> Self {
        MetaClient {
            rest: RestClient::new(format!("{}/api/v1", base)),
        }
    }
}

#[async_trait]
impl MetadataClient for MetaClient {
    async fn ping(&self) -> Result<()> {
        let body = self.rest.get_text("/ping").await?;

        if body.trim() == "pong" {
            Ok(())
        } else {
            Err(Error::RemoteServerDown(format!(
                "core-metadata ping answered '{}'",
                body.trim()
            )))
        }
    }

    async fn device_service(
        &self,
        name: &str,
    ) -> Result<Option<DeviceServiceRecord>> {
        self.rest
            .get_json(&format!("/deviceservice/name/{}", name))
            .await
    }

    async fn create_device_service(
        &self,
        record: &DeviceServiceRecord,
    ) -> Result<String> {
        self.rest.post_json("/deviceservice", record).await
    }

    async fn addressable(&self, name: &str) -> Result<Option<Addressable>> {
        self.rest
            .get_json(&format!("/addressable/name/{}", name))
            .await
    }

    async fn create_addressable(&self, addr: &Addressable) -> Result<String> {
        self.rest.post_json("/addressable", addr).await
    }

    async fn profile(&self, name: &str) -> Result<Option<DeviceProfile>> {
        self.rest
            .get_json(&format!("/deviceprofile/name/{}", name))
            .await
    }

    async fn profile_by_id(&self, id: &str) -> Result<Option<DeviceProfile>> {
        self.rest.get_json(&format!("/deviceprofile/{}", id)).await
    }

    async fn create_profile(&self, profile: &DeviceProfile) -> Result<String> {
        self.rest.post_json("/deviceprofile", profile).await
    }

    async fn devices_for_service(&self, name: &str) -> Result<Vec<Device>> {
        self.rest
            .get_json(&format!("/device/servicename/{}", name))
            .await
            .map(Option::unwrap_or_default)
    }

    async fn device(&self, id: &str) -> Result<Option<Device>> {
        self.rest.get_json(&format!("/device/{}", id)).await
    }

    async fn device_by_name(&self, name: &str) -> Result<Option<Device>> {
        self.rest.get_json(&format!("/device/name/{}", name)).await
    }

    async fn create_device(&self, device: &Device) -> Result<String> {
        self.rest.post_json("/device", device).await
    }

    async fn update_device(&self, device: &Device) -> Result<()> {
        self.rest.put_json("/device", device).await
    }

    async fn delete_device(&self, id: &str) -> Result<()> {
        self.rest.delete(&format!("/device/id/{}", id)).await
    }

    async fn delete_device_by_name(&self, name: &str) -> Result<()> {
        self.rest.delete(&format!("/device/name/{}", name)).await
    }

    async fn create_schedule(&self, schedule: &Schedule) -> Result<String> {
        self.rest.post_json("/schedule", schedule).await
    }

    async fn schedule(&self, name: &str) -> Result<Option<Schedule>> {
        self.rest.get_json(&format!("/schedule/name/{}", name)).await
    }

    async fn create_schedule_event(
        &self,
        event: &ScheduleEvent,
    ) -> Result<String> {
        self.rest.post_json("/scheduleevent", event).await
    }

    async fn schedule_events_for_service(
        &self,
        name: &str,
    ) -> Result<Vec<ScheduleEvent>> {
        self.rest
            .get_json(&format!("/scheduleevent/servicename/{}", name))
            .await
            .map(Option::unwrap_or_default)
    }
}
