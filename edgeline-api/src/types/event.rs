//! The wire-format records posted to core-data.

use crate::types::value::PropertyType;
use serde_derive::{Deserialize, Serialize};

fn default_valid() -> bool {
    true
}

fn is_valid(valid: &bool) -> bool {
    *valid
}

/// One sampled value. `value` carries the decimal form for numerics
/// and base64 for binary payloads, in which case `media_type` names
/// the content type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub name: String,
    pub value: String,
    pub origin: u64,
    #[serde(rename = "valueType")]
    pub value_type: PropertyType,
    #[serde(rename = "mediaType", skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub media_type: Option<String>,
    /// False when the producer replaced an out-of-range value with a
    /// sentinel. Valid readings omit the field on the wire.
    #[serde(default = "default_valid", skip_serializing_if = "is_valid")]
    pub valid: bool,
}

/// A batch of readings from one device, posted to core-data as a
/// single record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub device: String,
    pub origin: u64,
    pub readings: Vec<Reading>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let ev = Event {
            device: "thermostat".into(),
            origin: 1_700_000_000_000,
            readings: vec![Reading {
                name: "temperature".into(),
                value: "83.4".into(),
                origin: 0,
                value_type: PropertyType::Float32,
                media_type: None,
                valid: true,
            }],
        };

        let json = serde_json::to_value(&ev).unwrap();

        assert_eq!(json["device"], "thermostat");
        assert_eq!(json["readings"][0]["valueType"], "Float32");
        assert!(json["readings"][0].get("mediaType").is_none());

        // A valid reading carries no marker on the wire.

        assert!(json["readings"][0].get("valid").is_none());
    }

    #[test]
    fn test_non_valid_marker() {
        let reading = Reading {
            name: "temperature".into(),
            value: "0".into(),
            origin: 1,
            value_type: PropertyType::Int16,
            media_type: None,
            valid: false,
        };

        let json = serde_json::to_value(&reading).unwrap();

        assert_eq!(json["valid"], false);

        // Decoding defaults the marker to valid when absent.

        let decoded: Reading = serde_json::from_str(
            r#"{ "name": "t", "value": "1", "origin": 0,
                 "valueType": "Int16" }"#,
        )
        .unwrap();

        assert!(decoded.valid);
    }
}
