//! A protocol driver that serves synthetic readings. Useful for
//! demos, for smoke-testing a deployment before real hardware shows
//! up, and as a worked example of the driver seam.
//!
//! Configuration (the `[Driver]` table):
//!
//! - `Seed`: starting state for the value generator (default 1).
//! - `DeviceCount`: how many synthetic devices discovery registers
//!   (default 2).
//! - `DiscoveryProfile`: the profile those devices are created with
//!   (default "virtual-device").

use async_trait::async_trait;
use edgeline_api::{
    driver::{CommandRequest, CommandResult, DriverError, ProtocolDriver},
    types::{
        device::Addressable,
        value::{PropertyType, Value},
    },
};
use edgeline_sdk::DeviceService;
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex, Weak,
};
use tracing::{info, warn};

pub struct VirtualDriver {
    service: Mutex<Weak<DeviceService>>,
    stored: Mutex<HashMap<(String, String), Value>>,
    seed: AtomicU64,
    device_count: AtomicUsize,
    discovery_profile: Mutex<String>,
}

impl VirtualDriver {
    pub fn new() -> Arc<VirtualDriver> {
        Arc::new(VirtualDriver::default())
    }

    /// Hands the driver its service handle so discovery can register
    /// devices. Call between `DeviceService::new` and `start`.
    pub fn attach(&self, service: &Arc<DeviceService>) {
        *self.service.lock().unwrap() = Arc::downgrade(service);
    }

    fn next_raw(&self) -> u64 {
        // xorshift64; good enough for synthetic telemetry.

        let mut x = self.seed.load(Ordering::Relaxed);

        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.seed.store(x, Ordering::Relaxed);
        x
    }

    fn synthesize(&self, ty: PropertyType) -> Value {
        let raw = self.next_raw();

        match ty {
            PropertyType::Bool => Value::Bool(raw & 1 == 1),
            PropertyType::String => {
                Value::Str(format!("sample-{}", raw % 1000))
            }
            PropertyType::Uint8 => Value::U8(raw as u8),
            PropertyType::Uint16 => Value::U16(raw as u16),
            PropertyType::Uint32 => Value::U32(raw as u32),
            PropertyType::Uint64 => Value::U64(raw),
            PropertyType::Int8 => Value::I8(raw as i8),
            PropertyType::Int16 => Value::I16((raw % 2000) as i16),
            PropertyType::Int32 => Value::I32(raw as i32),
            PropertyType::Int64 => Value::I64(raw as i64),
            PropertyType::Float32 => {
                Value::F32((raw % 10_000) as f32 / 100.0)
            }
            PropertyType::Float64 => {
                Value::F64((raw % 100_000) as f64 / 100.0)
            }
            PropertyType::Binary => {
                Value::Binary(raw.to_be_bytes().to_vec())
            }
        }
    }
}

impl Default for VirtualDriver {
    fn default() -> Self {
        VirtualDriver {
            service: Mutex::new(Weak::new()),
            stored: Mutex::new(HashMap::new()),
            seed: AtomicU64::new(1),
            device_count: AtomicUsize::new(2),
            discovery_profile: Mutex::new(String::from("virtual-device")),
        }
    }
}

#[async_trait]
impl ProtocolDriver for VirtualDriver {
    async fn init(
        &self,
        config: &HashMap<String, String>,
    ) -> Result<(), DriverError> {
        if let Some(seed) = config.get("Seed") {
            let seed: u64 = seed.parse().map_err(|_| {
                DriverError::new(format!("bad Seed value '{}'", seed))
            })?;

            self.seed.store(seed.max(1), Ordering::Relaxed);
        }
        if let Some(count) = config.get("DeviceCount") {
            let count: usize = count.parse().map_err(|_| {
                DriverError::new(format!("bad DeviceCount value '{}'", count))
            })?;

            self.device_count.store(count, Ordering::Relaxed);
        }
        if let Some(profile) = config.get("DiscoveryProfile") {
            *self.discovery_profile.lock().unwrap() = profile.clone();
        }

        info!("virtual driver ready");
        Ok(())
    }

    fn discoverable(&self) -> bool {
        true
    }

    async fn discover(&self) {
        let service = self.service.lock().unwrap().upgrade();
        let service = match service {
            Some(service) => service,
            None => {
                warn!("discovery requested before the driver was attached");
                return;
            }
        };
        let count = self.device_count.load(Ordering::Relaxed);
        let profile = self.discovery_profile.lock().unwrap().clone();

        for n in 0..count {
            let name = format!("virtual-{:02}", n);
            let result = service
                .add_device(
                    &name,
                    Some("synthetic device"),
                    &[String::from("virtual")],
                    &profile,
                    Addressable::default(),
                )
                .await;

            match result {
                Ok(id) => info!("discovered {} ({})", &name, &id),
                Err(e) => warn!("can't register {}: {}", &name, &e),
            }
        }
    }

    async fn get(
        &self,
        device: &Addressable,
        requests: &[CommandRequest],
    ) -> Result<Vec<CommandResult>, DriverError> {
        let stored = self.stored.lock().unwrap();

        Ok(requests
            .iter()
            .map(|req| {
                let key =
                    (device.name.clone(), req.resource.name.clone());

                let value = match stored.get(&key) {
                    Some(v) => v.clone(),
                    None => self.synthesize(
                        req.resource
                            .properties
                            .value
                            .value_type
                            .unwrap_or(PropertyType::Int32),
                    ),
                };

                CommandResult::from(value)
            })
            .collect())
    }

    async fn put(
        &self,
        device: &Addressable,
        requests: &[CommandRequest],
        values: &[CommandResult],
    ) -> Result<(), DriverError> {
        let mut stored = self.stored.lock().unwrap();

        for (req, value) in requests.iter().zip(values) {
            stored.insert(
                (device.name.clone(), req.resource.name.clone()),
                value.value.clone(),
            );
        }
        Ok(())
    }

    async fn stop(&self, _force: bool) {
        info!("virtual driver stopped")
    }
}
