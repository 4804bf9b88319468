//! The device profile schema: resources, transforms and commands.
//! Profiles are loaded from YAML files at startup and fetched from
//! core-metadata on demand; both representations deserialize into
//! these types.

use crate::types::value::PropertyType;
use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;

/// The value description of a device resource: its declared type and
/// the transform parameters the dispatcher applies on reads and
/// writes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyValue {
    #[serde(rename = "type")]
    pub value_type: Option<PropertyType>,
    #[serde(rename = "readWrite", default)]
    pub read_write: Option<String>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
    #[serde(rename = "defaultValue", default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub mask: Option<u64>,
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default)]
    pub offset: Option<f64>,
    #[serde(default)]
    pub base: Option<f64>,
    #[serde(rename = "mediaType", default)]
    pub media_type: Option<String>,
}

impl PropertyValue {
    /// True when any read/write transform parameter is present.
    pub fn has_transform(&self) -> bool {
        self.mask.is_some()
            || self.scale.is_some()
            || self.offset.is_some()
            || self.base.is_some()
    }
}

/// The units half of a resource's `properties` block. Informational.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Units {
    #[serde(rename = "type", default)]
    pub unit_type: Option<String>,
    #[serde(rename = "readWrite", default)]
    pub read_write: Option<String>,
    #[serde(rename = "defaultValue", default)]
    pub default_value: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileProperty {
    pub value: PropertyValue,
    #[serde(default)]
    pub units: Option<Units>,
}

/// A named readable/writable attribute of a device.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceResource {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub attributes: Option<HashMap<String, String>>,
    pub properties: ProfileProperty,
}

/// Binds a high-level command to a concrete device resource, with an
/// optional fixed parameter for writes and value mappings for
/// presentation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceOperation {
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub operation: Option<String>,
    /// The name of the device resource this operation reads or
    /// writes.
    pub object: String,
    #[serde(default)]
    pub parameter: Option<String>,
    #[serde(default)]
    pub secondary: Vec<String>,
    #[serde(default)]
    pub mappings: HashMap<String, String>,
}

/// A named command: ordered lists of resource operations for reads
/// (`get`) and writes (`set`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceCommand {
    pub name: String,
    #[serde(default)]
    pub get: Vec<ResourceOperation>,
    #[serde(default)]
    pub set: Vec<ResourceOperation>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "expectedValues", default)]
    pub expected_values: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub responses: Vec<CommandResponse>,
}

/// The REST-facing command descriptions registered with core-command.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreCommand {
    pub name: String,
    #[serde(default)]
    pub get: Option<CommandSpec>,
    #[serde(default)]
    pub put: Option<CommandSpec>,
}

/// The schema of a device: its resources, commands and value
/// transforms.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(rename = "deviceResources", default)]
    pub device_resources: Vec<DeviceResource>,
    #[serde(rename = "deviceCommands", default)]
    pub device_commands: Vec<DeviceCommand>,
    #[serde(rename = "coreCommands", default)]
    pub core_commands: Vec<CoreCommand>,
}

impl DeviceProfile {
    /// Looks up a device resource by name.
    pub fn resource(&self, name: &str) -> Option<&DeviceResource> {
        self.device_resources.iter().find(|r| r.name == name)
    }

    /// Looks up a device command by name.
    pub fn command(&self, name: &str) -> Option<&DeviceCommand> {
        self.device_commands.iter().find(|c| c.name == name)
    }

    /// Resolves a command name into its ordered resource operations.
    /// A command that names a device resource directly (with no
    /// deviceCommand entry) yields a single synthesized operation on
    /// that resource.
    pub fn operations(
        &self,
        command: &str,
        for_write: bool,
    ) -> Option<Vec<ResourceOperation>> {
        if let Some(cmd) = self.command(command) {
            let ops = if for_write { &cmd.set } else { &cmd.get };

            if ops.is_empty() {
                return None;
            }
            return Some(ops.clone());
        }

        self.resource(command).map(|res| {
            vec![ResourceOperation {
                operation: Some(
                    if for_write { "set" } else { "get" }.to_string(),
                ),
                object: res.name.clone(),
                ..ResourceOperation::default()
            }]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROFILE: &str = r#"{
      "name": "thermo-profile",
      "deviceResources": [
        { "name": "Temperature",
          "properties": {
            "value": { "type": "Int16", "scale": 0.1, "offset": -40.0 },
            "units": { "defaultValue": "degC" }
          }
        }
      ],
      "deviceCommands": [
        { "name": "temperature",
          "get": [ { "operation": "get", "object": "Temperature" } ]
        }
      ]
    }"#;

    #[test]
    fn test_profile_decode() {
        let p: DeviceProfile = serde_json::from_str(PROFILE).unwrap();

        assert_eq!(p.name, "thermo-profile");

        let res = p.resource("Temperature").unwrap();

        assert_eq!(
            res.properties.value.value_type,
            Some(PropertyType::Int16)
        );
        assert_eq!(res.properties.value.scale, Some(0.1));
        assert!(res.properties.value.has_transform());
    }

    #[test]
    fn test_command_resolution() {
        let p: DeviceProfile = serde_json::from_str(PROFILE).unwrap();

        let ops = p.operations("temperature", false).unwrap();

        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].object, "Temperature");

        // No set list was declared for the command.
        assert!(p.operations("temperature", true).is_none());

        // A bare resource name synthesizes one operation.
        let ops = p.operations("Temperature", false).unwrap();

        assert_eq!(ops[0].object, "Temperature");

        assert!(p.operations("missing", false).is_none());
    }
}
