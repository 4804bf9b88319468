//! Defines the seam between the service core and the user-supplied
//! protocol driver.
//!
//! A driver implementation holds whatever protocol state it needs;
//! the SDK never sees it. Drivers must be re-entrant across devices.
//! They may assume the SDK serializes get/put invocations per device,
//! so per-device protocol state needs no locking of its own.

use crate::types::{
    device::Addressable,
    profile::{DeviceResource, ResourceOperation},
    value::Value,
};
use async_trait::async_trait;
use std::{collections::HashMap, fmt};

/// One read or write the driver is asked to perform: the resource
/// operation named by the command, plus the underlying device
/// resource it resolves to.
#[derive(Clone, Debug)]
pub struct CommandRequest {
    pub operation: ResourceOperation,
    pub resource: DeviceResource,
}

/// A parameter (for put) or a result (for get).
#[derive(Clone, Debug, PartialEq)]
pub struct CommandResult {
    /// The timestamp of the result, in epoch milliseconds. Only set
    /// when the device itself supplies one; the event publisher mints
    /// a timestamp for zero origins.
    pub origin: u64,
    pub value: Value,
}

impl CommandResult {
    /// A result stamped by the device.
    pub fn with_origin(origin: u64, value: Value) -> Self {
        CommandResult { origin, value }
    }
}

impl From<Value> for CommandResult {
    fn from(value: Value) -> Self {
        CommandResult { origin: 0, value }
    }
}

/// A driver-side failure. `op` is the index of the request that
/// failed, when the driver can tell; the message is surfaced in the
/// HTTP error body.
#[derive(Clone, Debug, PartialEq)]
pub struct DriverError {
    pub op: Option<usize>,
    pub message: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        DriverError {
            op: None,
            message: message.into(),
        }
    }

    pub fn at_op(op: usize, message: impl Into<String>) -> Self {
        DriverError {
            op: Some(op),
            message: message.into(),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.op {
            Some(n) => write!(f, "operation {}: {}", n, &self.message),
            None => write!(f, "{}", &self.message),
        }
    }
}

/// All protocol drivers implement this trait. The SDK invokes the
/// methods from its dispatcher and scheduler tasks; implementations
/// may block (await) in any of them.
#[async_trait]
pub trait ProtocolDriver: Send + Sync {
    /// Called once during service start, before any other callback.
    /// `config` holds the name/value pairs from the configuration's
    /// `Driver` table, passed through verbatim.
    async fn init(
        &self,
        config: &HashMap<String, String>,
    ) -> Result<(), DriverError>;

    /// Whether this driver can detect devices on its own. Drivers
    /// that return `false` cause discovery requests to be rejected
    /// with HTTP 503.
    fn discoverable(&self) -> bool {
        false
    }

    /// Detect devices and register them through the service handle.
    /// At most one invocation is in flight at any time.
    async fn discover(&self) {}

    /// Read the requested resources from a device. The returned
    /// vector must parallel `requests`, and each value's type must
    /// match the property type declared by the matching resource.
    async fn get(
        &self,
        device: &Addressable,
        requests: &[CommandRequest],
    ) -> Result<Vec<CommandResult>, DriverError>;

    /// Write the given values to a device. `values` parallels
    /// `requests`.
    async fn put(
        &self,
        device: &Addressable,
        requests: &[CommandRequest],
        values: &[CommandResult],
    ) -> Result<(), DriverError>;

    /// Called during service shutdown. `force` permits an unclean
    /// stop.
    async fn stop(&self, force: bool);
}
