//! The metadata model for devices and their network locators. These
//! types mirror the records kept by core-metadata; the wire spellings
//! are the platform's camelCase ones.

use serde_derive::{Deserialize, Serialize};

/// Whether a device may be handed to the driver at all. `Locked`
/// devices are never passed to driver callbacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminState {
    #[serde(rename = "LOCKED")]
    Locked,
    #[serde(rename = "UNLOCKED")]
    Unlocked,
}

/// Whether a device is currently in service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatingState {
    #[serde(rename = "ENABLED")]
    Enabled,
    #[serde(rename = "DISABLED")]
    Disabled,
}

/// A network-layer locator persisted in core-metadata. Immutable once
/// created there.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Addressable {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub origin: u64,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub path: String,
}

/// A logical endpoint the service speaks to via the user driver.
/// Uniquely identified by its metadata-assigned `id`; `name` is also
/// unique within the service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Device {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(rename = "profileName")]
    pub profile_name: String,
    #[serde(default)]
    pub addressable: Option<Addressable>,
    #[serde(rename = "adminState")]
    pub admin_state: AdminState,
    #[serde(rename = "operatingState")]
    pub op_state: OperatingState,
    #[serde(default)]
    pub origin: u64,
}

impl Device {
    /// True when the device may be dispatched to the driver.
    pub fn usable(&self) -> bool {
        self.admin_state == AdminState::Unlocked
            && self.op_state == OperatingState::Enabled
    }
}

/// The registration record for the device service itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeviceServiceRecord {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(rename = "adminState")]
    pub admin_state: AdminState,
    #[serde(rename = "operatingState")]
    pub op_state: OperatingState,
    #[serde(default)]
    pub addressable: Option<Addressable>,
    #[serde(default)]
    pub origin: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_spellings() {
        assert_eq!(
            serde_json::to_string(&AdminState::Locked).unwrap(),
            "\"LOCKED\""
        );
        assert_eq!(
            serde_json::from_str::<OperatingState>("\"ENABLED\"").unwrap(),
            OperatingState::Enabled
        );
    }

    #[test]
    fn test_device_wire_names() {
        let dev: Device = serde_json::from_str(
            r#"{
              "id": "d-1",
              "name": "thermostat",
              "profileName": "thermo-profile",
              "adminState": "UNLOCKED",
              "operatingState": "ENABLED"
            }"#,
        )
        .unwrap();

        assert_eq!(dev.profile_name, "thermo-profile");
        assert!(dev.usable());

        let locked = Device {
            admin_state: AdminState::Locked,
            ..dev
        };

        assert!(!locked.usable());
    }
}
