//! Schedules and schedule events as kept by core-metadata. The SDK's
//! scheduler owns the in-memory runtime timers; these records are the
//! durable half.

use crate::types::device::Addressable;
use serde_derive::{Deserialize, Serialize};

/// A named interval. `frequency` is an ISO-8601 duration of the form
/// `PnYnMnDTnHnMnS`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub frequency: String,
}

/// The action to fire at a schedule's interval. The addressable's
/// `path` must be the discovery path or a device-command path.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEvent {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub schedule: String,
    #[serde(default)]
    pub addressable: Option<Addressable>,
    #[serde(default)]
    pub parameters: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
}
