//! Translates device REST URLs into driver invocations: resolves the
//! target device and profile, expands the named command into resource
//! operations, applies the value transforms, and shapes the reply.

use crate::{events, service::DeviceService, transform};
use edgeline_api::{
    driver::{CommandRequest, CommandResult},
    types::{
        device::Device,
        profile::DeviceProfile,
        value::{PropertyType, Value},
    },
    Error,
};
use serde_json::json;
use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};
use tracing::{debug, error, warn};

/// An HTTP-shaped reply from the dispatch plane, independent of the
/// web framework carrying it.
#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: serde_json::Value,
}

impl Reply {
    pub fn ok(body: serde_json::Value) -> Reply {
        Reply { status: 200, body }
    }

    pub fn error(status: u16, message: &str) -> Reply {
        Reply {
            status,
            body: json!({ "message": message }),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Per-device serialization of driver get/put, striped so the lock
/// table stays fixed-size regardless of fleet size.
pub struct StripedLocks {
    stripes: Vec<tokio::sync::Mutex<()>>,
}

impl StripedLocks {
    pub fn new(count: usize) -> Self {
        StripedLocks {
            stripes: (0..count).map(|_| tokio::sync::Mutex::new(())).collect(),
        }
    }

    pub async fn lock(&self, key: &str) -> tokio::sync::MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();

        key.hash(&mut hasher);
        self.stripes[(hasher.finish() as usize) % self.stripes.len()]
            .lock()
            .await
    }
}

/// Entry point for the `/api/v1/device/` URL families. `tail` is the
/// part after the prefix.
pub async fn device_command(
    svc: &DeviceService,
    tail: &str,
    write: bool,
    body: Option<serde_json::Value>,
) -> Reply {
    let parts: Vec<_> = tail.split('/').filter(|s| !s.is_empty()).collect();

    match parts.as_slice() {
        ["all", cmd] => {
            if write {
                Reply::error(405, "PUT is not supported on all-commands")
            } else {
                broadcast(svc, cmd).await
            }
        }
        ["name", name, cmd] => {
            match svc.cache().get_by_name(name).await {
                Some(dev) => single(svc, &dev, cmd, write, body).await,
                None => Reply::error(
                    404,
                    &format!("no device named {}", name),
                ),
            }
        }
        [id, cmd] => match svc.cache().get(id).await {
            Some(dev) => single(svc, &dev, cmd, write, body).await,
            None => Reply::error(404, &format!("no device with id {}", id)),
        },
        _ => Reply::error(404, "unrecognized device URL"),
    }
}

async fn single(
    svc: &DeviceService,
    device: &Device,
    cmd: &str,
    write: bool,
    body: Option<serde_json::Value>,
) -> Reply {
    use edgeline_api::types::device::{AdminState, OperatingState};

    if device.admin_state == AdminState::Locked {
        return Reply::error(
            423,
            &format!("device {} is locked", &device.name),
        );
    }
    if device.op_state == OperatingState::Disabled {
        return Reply::error(
            503,
            &format!("device {} is disabled", &device.name),
        );
    }

    let profile = match resolve_profile(svc, device).await {
        Ok(p) => p,
        Err(reply) => return reply,
    };
    let requests = match build_requests(&profile, cmd, write) {
        Ok(r) => r,
        Err(reply) => return reply,
    };

    if write {
        run_put(svc, device, &requests, body).await
    } else {
        match run_get(svc, device, &requests).await {
            Ok(event) => Reply::ok(event),
            Err(reply) => reply,
        }
    }
}

/// Fetches and caches the device's profile when it isn't cached yet,
/// so the driver callback never runs without one.
async fn resolve_profile(
    svc: &DeviceService,
    device: &Device,
) -> Result<DeviceProfile, Reply> {
    if let Some(profile) = svc.cache().profile(&device.profile_name).await {
        return Ok(profile);
    }

    let metadata = svc
        .metadata()
        .map_err(|e| Reply::error(500, &e.to_string()))?;

    match metadata.profile(&device.profile_name).await {
        Ok(Some(profile)) => {
            debug!("caching profile {} on first use", &profile.name);
            svc.cache().add_profile(profile.clone()).await;
            Ok(profile)
        }
        Ok(None) => Err(Reply::error(
            500,
            &format!("profile {} is not known", &device.profile_name),
        )),
        Err(e) => Err(Reply::error(500, &e.to_string())),
    }
}

fn build_requests(
    profile: &DeviceProfile,
    cmd: &str,
    write: bool,
) -> Result<Vec<CommandRequest>, Reply> {
    let ops = profile.operations(cmd, write).ok_or_else(|| {
        Reply::error(
            404,
            &format!("profile {} has no command {}", &profile.name, cmd),
        )
    })?;

    ops.into_iter()
        .map(|op| {
            let resource = profile.resource(&op.object).ok_or_else(|| {
                Reply::error(
                    500,
                    &format!(
                        "profile {} names unknown resource {}",
                        &profile.name, &op.object
                    ),
                )
            })?;

            Ok(CommandRequest {
                operation: op,
                resource: resource.clone(),
            })
        })
        .collect()
}

async fn run_get(
    svc: &DeviceService,
    device: &Device,
    requests: &[CommandRequest],
) -> Result<serde_json::Value, Reply> {
    let addressable = device_addressable(device);
    let results = {
        let _serial = svc.device_locks().lock(&device.id).await;

        svc.driver()
            .get(&addressable, requests)
            .await
            .map_err(|e| {
                error!("driver get on {} failed: {}", &device.name, &e);
                Reply::error(500, &e.to_string())
            })?
    };

    let transform = svc.data_transform().await;

    match events::generate_event(&device.name, requests, results, transform) {
        Ok(Some(event)) => {
            let reply = serde_json::to_value(&event)
                .map_err(|e| Reply::error(500, &e.to_string()))?;

            if let Ok(client) = svc.data() {
                events::publish(svc.pool(), client, event);
            }
            Ok(reply)
        }
        Ok(None) => Err(Reply::error(
            500,
            &format!("no readings produced for {}", &device.name),
        )),
        Err(e) => Err(Reply::error(500, &e.to_string())),
    }
}

async fn run_put(
    svc: &DeviceService,
    device: &Device,
    requests: &[CommandRequest],
    body: Option<serde_json::Value>,
) -> Reply {
    let body = match body.as_ref().and_then(|b| b.as_object()) {
        Some(obj) => obj.clone(),
        None => return Reply::error(400, "PUT requires a JSON object body"),
    };
    let transform = svc.data_transform().await;
    let mut values = vec![];

    for request in requests {
        let props = &request.resource.properties.value;
        let declared = props.value_type.unwrap_or(PropertyType::String);

        // The body is keyed by resource name; a write with no body
        // entry falls back to the operation's fixed parameter.

        let supplied = match body.get(&request.operation.object) {
            Some(v) => v.clone(),
            None => match &request.operation.parameter {
                Some(p) => serde_json::Value::String(p.clone()),
                None => {
                    return Reply::error(
                        400,
                        &format!(
                            "no value supplied for {}",
                            &request.operation.object
                        ),
                    )
                }
            },
        };

        let value = match parse_put_value(declared, &supplied, transform, props)
        {
            Ok(v) => v,
            Err(e) => return Reply::error(400, &e.to_string()),
        };

        values.push(CommandResult::from(value));
    }

    let addressable = device_addressable(device);
    let result = {
        let _serial = svc.device_locks().lock(&device.id).await;

        svc.driver().put(&addressable, requests, &values).await
    };

    match result {
        Ok(()) => Reply::ok(json!({})),
        Err(e) => {
            error!("driver put on {} failed: {}", &device.name, &e);
            Reply::error(500, &e.to_string())
        }
    }
}

/// Parses one PUT body entry: the engineering-units value is read at
/// its reported type, the inverse transform recovers the raw value,
/// and the result must land on the declared property type.
fn parse_put_value(
    declared: PropertyType,
    supplied: &serde_json::Value,
    transform: bool,
    props: &edgeline_api::types::profile::PropertyValue,
) -> Result<Value, Error> {
    let transformed =
        transform && props.has_transform() && declared.is_numeric();

    let value = if transformed {
        let engineering =
            Value::from_json(PropertyType::Float64, supplied)?;

        transform::inverse(engineering, props)?
    } else {
        Value::from_json(declared, supplied)?
    };

    if value.property_type() != declared {
        return Err(Error::TypeMismatch(format!(
            "{} does not satisfy {}",
            value, declared
        )));
    }
    Ok(value)
}

/// Reads one command across every usable device. Ids are snapshotted
/// under the read lock, iteration happens without it, and a device
/// that vanishes mid-broadcast contributes an error entry instead of
/// aborting the batch. Output preserves the snapshot order.
async fn broadcast(svc: &DeviceService, cmd: &str) -> Reply {
    let snapshot = svc.cache().snapshot().await;
    let mut entries = vec![];

    for dev in snapshot.into_iter().filter(|d| d.usable()) {
        // Re-check against the live cache; callbacks may have
        // mutated the fleet since the snapshot.

        let current = match svc.cache().get(&dev.id).await {
            Some(d) => d,
            None => {
                warn!("device {} removed mid-broadcast", &dev.name);
                entries.push(json!({
                    "device": dev.name,
                    "message": "device removed during broadcast"
                }));
                continue;
            }
        };

        if !current.usable() {
            continue;
        }

        match single(svc, &current, cmd, false, None).await {
            reply if reply.is_success() => entries.push(reply.body),
            reply => {
                let message = reply
                    .body
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("command failed")
                    .to_string();

                entries.push(json!({
                    "device": current.name,
                    "message": message
                }))
            }
        }
    }

    Reply::ok(serde_json::Value::Array(entries))
}

fn device_addressable(
    device: &Device,
) -> edgeline_api::types::device::Addressable {
    device.addressable.clone().unwrap_or_else(|| {
        edgeline_api::types::device::Addressable {
            name: device.name.clone(),
            ..Default::default()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{profile_fixture, MemData, MemMetadata, MockDriver};
    use edgeline_api::types::device::{
        AdminState, Device, OperatingState,
    };
    use std::sync::Arc;

    fn device(id: &str, name: &str) -> Device {
        Device {
            id: id.into(),
            name: name.into(),
            description: None,
            labels: vec![],
            profile_name: "thermo-profile".into(),
            addressable: None,
            admin_state: AdminState::Unlocked,
            op_state: OperatingState::Enabled,
            origin: 0,
        }
    }

    async fn harness(
        driver: Arc<MockDriver>,
    ) -> (Arc<crate::service::DeviceService>, Arc<MemData>) {
        let data = Arc::new(MemData::default());
        let metadata = Arc::new(MemMetadata::default());
        let svc = crate::service::DeviceService::new_for_tests(
            driver,
            data.clone(),
            metadata,
        );

        svc.cache().add_profile(profile_fixture()).await;
        svc.cache().add(device("d-1", "thermostat")).await;
        (svc, data)
    }

    #[tokio::test]
    async fn test_get_by_name_and_id() {
        let driver = Arc::new(MockDriver::default());

        driver.set_result("Temperature", Value::I16(1234));

        let (svc, _data) = harness(driver).await;

        for tail in ["name/thermostat/temperature", "d-1/temperature"] {
            let reply = device_command(&svc, tail, false, None).await;

            assert_eq!(reply.status, 200, "{}", tail);
            assert_eq!(reply.body["device"], "thermostat");
            assert_eq!(reply.body["readings"][0]["value"], "83.4");
            assert_eq!(reply.body["readings"][0]["valueType"], "Float32");
        }
    }

    #[tokio::test]
    async fn test_get_publishes_event() {
        let driver = Arc::new(MockDriver::default());

        driver.set_result("Temperature", Value::I16(1234));

        let (svc, data) = harness(driver).await;
        let reply =
            device_command(&svc, "name/thermostat/temperature", false, None)
                .await;

        assert_eq!(reply.status, 200);

        // The POST runs on the worker pool; drain it.

        svc.pool().stop(false).await;
        let events = data.events.lock().unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].device, "thermostat");
    }

    #[tokio::test]
    async fn test_profile_fetched_on_miss() {
        let driver = Arc::new(MockDriver::default());

        driver.set_result("Temperature", Value::I16(1234));

        // The profile only exists in metadata, not in the cache.

        let data = Arc::new(MemData::default());
        let metadata = Arc::new(MemMetadata::default());

        metadata.seed_profile(profile_fixture());

        let svc = crate::service::DeviceService::new_for_tests(
            driver,
            data,
            metadata,
        );

        svc.cache().add(device("d-1", "thermostat")).await;
        assert!(svc.cache().profile("thermo-profile").await.is_none());

        let reply =
            device_command(&svc, "name/thermostat/temperature", false, None)
                .await;

        assert_eq!(reply.status, 200);

        // The fetched profile is cached for the next request.

        assert!(svc.cache().profile("thermo-profile").await.is_some());
    }

    #[tokio::test]
    async fn test_missing_device_404() {
        let (svc, _) = harness(Arc::new(MockDriver::default())).await;
        let reply =
            device_command(&svc, "name/furnace/temperature", false, None)
                .await;

        assert_eq!(reply.status, 404);
        assert!(reply.body["message"].as_str().unwrap().contains("furnace"));
    }

    #[tokio::test]
    async fn test_locked_device_never_reaches_driver() {
        let driver = Arc::new(MockDriver::default());
        let (svc, _) = harness(driver.clone()).await;
        let mut locked = device("d-2", "vault");

        locked.admin_state = AdminState::Locked;
        svc.cache().add(locked).await;

        let reply =
            device_command(&svc, "name/vault/temperature", false, None).await;

        assert_eq!(reply.status, 423);
        assert_eq!(driver.get_count(), 0);

        let mut disabled = device("d-3", "spare");

        disabled.op_state = OperatingState::Disabled;
        svc.cache().add(disabled).await;

        let reply =
            device_command(&svc, "name/spare/temperature", false, None).await;

        assert_eq!(reply.status, 503);
        assert_eq!(driver.get_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_command_404() {
        let (svc, _) = harness(Arc::new(MockDriver::default())).await;
        let reply =
            device_command(&svc, "name/thermostat/pressure", false, None)
                .await;

        assert_eq!(reply.status, 404);
    }

    #[tokio::test]
    async fn test_driver_failure_500() {
        let driver = Arc::new(MockDriver::default());

        driver.fail_with("bus fault");

        let (svc, _) = harness(driver).await;
        let reply =
            device_command(&svc, "name/thermostat/temperature", false, None)
                .await;

        assert_eq!(reply.status, 500);
        assert!(reply.body["message"]
            .as_str()
            .unwrap()
            .contains("bus fault"));
    }

    #[tokio::test]
    async fn test_put_inverse_transform() {
        let driver = Arc::new(MockDriver::default());
        let (svc, _) = harness(driver.clone()).await;

        // Writing the engineering value 83.4 must hand the raw 1234
        // to the driver.

        let reply = device_command(
            &svc,
            "name/thermostat/settemp",
            true,
            Some(serde_json::json!({ "Temperature": 83.4 })),
        )
        .await;

        assert_eq!(reply.status, 200);
        assert_eq!(
            driver.put_log(),
            vec![("Temperature".to_string(), Value::I16(1234))]
        );
    }

    #[tokio::test]
    async fn test_put_type_mismatch_400() {
        let (svc, _) = harness(Arc::new(MockDriver::default())).await;
        let reply = device_command(
            &svc,
            "name/thermostat/settemp",
            true,
            Some(serde_json::json!({ "Temperature": "warm" })),
        )
        .await;

        assert_eq!(reply.status, 400);

        // A missing body is also the caller's error.

        let reply =
            device_command(&svc, "name/thermostat/settemp", true, None).await;

        assert_eq!(reply.status, 400);
    }

    #[tokio::test]
    async fn test_broadcast_order_and_errors() {
        let driver = Arc::new(MockDriver::default());

        driver.set_result("Temperature", Value::I16(1234));

        let (svc, _) = harness(driver).await;

        svc.cache().add(device("d-2", "attic")).await;

        let mut locked = device("d-3", "vault");

        locked.admin_state = AdminState::Locked;
        svc.cache().add(locked).await;

        let reply = device_command(&svc, "all/temperature", false, None).await;

        assert_eq!(reply.status, 200);

        let entries = reply.body.as_array().unwrap();

        // Locked devices are skipped; the rest appear in name order.

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["device"], "attic");
        assert_eq!(entries[1]["device"], "thermostat");

        // PUT has no broadcast form.

        let reply = device_command(&svc, "all/temperature", true, None).await;

        assert_eq!(reply.status, 405);
    }
}
