//! Public device operations: the driver-facing API for registering
//! and maintaining devices, plus the startup registration of devices
//! declared in the configuration file.
//!
//! Each operation holds the cache lock only for the local mutation;
//! metadata calls happen outside it.

use crate::{
    config::{AddressableConfig, DeviceListEntry},
    events::millitime,
    service::DeviceService,
};
use edgeline_api::{
    types::{
        device::{AdminState, Addressable, Device, OperatingState},
        profile::DeviceProfile,
    },
    Error, Result,
};
use tracing::info;

impl DeviceService {
    /// Adds a device, generally in response to discovery. The
    /// addressable is created in metadata first; its name and origin
    /// are generated when not set. Returns the id of the new or
    /// already-present device.
    pub async fn add_device(
        &self,
        name: &str,
        description: Option<&str>,
        labels: &[String],
        profile_name: &str,
        addressable: Addressable,
    ) -> Result<String> {
        if let Some(id) = self.cache().id_for(name).await {
            info!("device {} is already registered", name);
            return Ok(id);
        }

        let metadata = self.metadata()?;
        let mut addr = addressable;

        if addr.name.is_empty() {
            addr.name = name.to_string();
        }
        if addr.origin == 0 {
            addr.origin = millitime();
        }

        match metadata.create_addressable(&addr).await {
            Ok(id) => addr.id = id,
            Err(Error::Conflict(_)) => {
                if let Some(existing) = metadata.addressable(&addr.name).await?
                {
                    addr = existing;
                }
            }
            Err(e) => return Err(e),
        }

        let mut device = Device {
            id: String::new(),
            name: name.to_string(),
            description: description.map(String::from),
            labels: labels.to_vec(),
            profile_name: profile_name.to_string(),
            addressable: Some(addr),
            admin_state: AdminState::Unlocked,
            op_state: OperatingState::Enabled,
            origin: millitime(),
        };

        match metadata.create_device(&device).await {
            Ok(id) => {
                device.id = id.clone();
                self.cache().add(device).await;
                info!("added device {}", name);
                Ok(id)
            }
            Err(Error::Conflict(_)) => {
                // Someone registered the name first; adopt their
                // record.

                match metadata.device_by_name(name).await? {
                    Some(existing) => {
                        let id = existing.id.clone();

                        self.cache().add(existing).await;
                        Ok(id)
                    }
                    None => Err(Error::Conflict(format!(
                        "device {} exists but can't be fetched",
                        name
                    ))),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Deletes a device from metadata and from the local cache.
    pub async fn remove_device(&self, id: &str) -> Result<()> {
        self.metadata()?.delete_device(id).await?;
        if let Some(dev) = self.cache().remove(id).await {
            info!("removed device {}", &dev.name);
        }
        Ok(())
    }

    pub async fn remove_device_by_name(&self, name: &str) -> Result<()> {
        self.metadata()?.delete_device_by_name(name).await?;
        if self.cache().remove_by_name(name).await.is_some() {
            info!("removed device {}", name);
        }
        Ok(())
    }

    /// Updates a device's details. The device is located by `id` when
    /// set, otherwise by `name`; in the first case a `name` argument
    /// renames the device.
    pub async fn update_device(
        &self,
        id: Option<&str>,
        name: Option<&str>,
        description: Option<&str>,
        labels: Option<&[String]>,
        profile_name: Option<&str>,
    ) -> Result<()> {
        let current = match (id, name) {
            (Some(id), _) => self.cache().get(id).await,
            (None, Some(name)) => self.cache().get_by_name(name).await,
            (None, None) => {
                return Err(Error::InvalidArg(
                    "update_device needs an id or a name".into(),
                ))
            }
        };
        let mut device = current.ok_or_else(|| {
            Error::NotFound(format!(
                "no device {}",
                id.or(name).unwrap_or_default()
            ))
        })?;

        if id.is_some() {
            if let Some(name) = name {
                device.name = name.to_string();
            }
        }
        if let Some(description) = description {
            device.description = Some(description.to_string());
        }
        if let Some(labels) = labels {
            device.labels = labels.to_vec();
        }
        if let Some(profile_name) = profile_name {
            device.profile_name = profile_name.to_string();
        }

        self.metadata()?.update_device(&device).await?;
        self.cache().add(device).await;
        Ok(())
    }

    /// Reloads this service's device set from metadata into the cache
    /// and returns it.
    pub async fn devices(&self) -> Result<Vec<Device>> {
        let devices =
            self.metadata()?.devices_for_service(self.name()).await?;

        for device in &devices {
            self.cache().add(device.clone()).await;
        }
        Ok(devices)
    }

    pub async fn get_device(&self, id: &str) -> Option<Device> {
        self.cache().get(id).await
    }

    pub async fn get_device_by_name(&self, name: &str) -> Option<Device> {
        self.cache().get_by_name(name).await
    }

    /// The device profiles currently cached by the SDK.
    pub async fn profiles(&self) -> Vec<DeviceProfile> {
        self.cache().profiles().await
    }

    /// Registers the devices declared under `[[DeviceList]]` that
    /// metadata doesn't already know.
    pub(crate) async fn process_configured_devices(
        &self,
        list: &[DeviceListEntry],
    ) -> Result<()> {
        for entry in list {
            if self.cache().get_by_name(&entry.name).await.is_some() {
                continue;
            }

            info!("registering configured device {}", &entry.name);

            let addr = entry
                .addressable
                .clone()
                .unwrap_or_else(AddressableConfig::default);

            self.add_device(
                &entry.name,
                entry.description.as_deref(),
                &entry.labels,
                &entry.profile,
                Addressable {
                    name: addr.name.unwrap_or_else(|| entry.name.clone()),
                    protocol: addr
                        .protocol
                        .unwrap_or_else(|| String::from("HTTP")),
                    method: addr.method.unwrap_or_else(|| String::from("GET")),
                    address: addr.address.unwrap_or_default(),
                    port: addr.port,
                    path: addr.path.unwrap_or_default(),
                    ..Addressable::default()
                },
            )
            .await?;
        }
        Ok(())
    }
}
