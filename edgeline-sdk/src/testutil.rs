//! In-memory doubles for the platform clients and a scriptable
//! driver, shared by the unit tests.

use async_trait::async_trait;
use edgeline_api::{
    client::{
        CoreDataClient, MetadataClient, NvPairs, RegistryClient,
    },
    driver::{CommandRequest, CommandResult, DriverError, ProtocolDriver},
    types::{
        device::{Addressable, Device, DeviceServiceRecord},
        event::Event,
        profile::{
            DeviceCommand, DeviceProfile, DeviceResource, ProfileProperty,
            PropertyValue, ResourceOperation,
        },
        schedule::{Schedule, ScheduleEvent},
        value::{PropertyType, Value},
    },
    Error, Result,
};
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
};
use tokio::time::Duration;

/// A profile with one transformed Int16 resource and read/write
/// commands over it.
pub fn profile_fixture() -> DeviceProfile {
    let resource = DeviceResource {
        name: "Temperature".into(),
        description: Some("ambient temperature".into()),
        attributes: None,
        properties: ProfileProperty {
            value: PropertyValue {
                value_type: Some(PropertyType::Int16),
                read_write: Some("RW".into()),
                scale: Some(0.1),
                offset: Some(-40.0),
                minimum: Some(-40.0),
                maximum: Some(125.0),
                ..PropertyValue::default()
            },
            units: None,
        },
    };
    let get_op = ResourceOperation {
        operation: Some("get".into()),
        object: "Temperature".into(),
        ..ResourceOperation::default()
    };
    let set_op = ResourceOperation {
        operation: Some("set".into()),
        object: "Temperature".into(),
        ..ResourceOperation::default()
    };

    DeviceProfile {
        id: "prof-1".into(),
        name: "thermo-profile".into(),
        device_resources: vec![resource],
        device_commands: vec![
            DeviceCommand {
                name: "temperature".into(),
                get: vec![get_op],
                set: vec![],
            },
            DeviceCommand {
                name: "settemp".into(),
                get: vec![],
                set: vec![set_op],
            },
        ],
        ..DeviceProfile::default()
    }
}

/// Records posted events; always pingable.
#[derive(Default)]
pub struct MemData {
    pub events: Mutex<Vec<Event>>,
}

#[async_trait]
impl CoreDataClient for MemData {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn add_event(&self, event: &Event) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

#[derive(Default)]
struct MemMetadataState {
    services: HashMap<String, DeviceServiceRecord>,
    addressables: HashMap<String, Addressable>,
    profiles: HashMap<String, DeviceProfile>,
    devices: HashMap<String, Device>,
    schedules: HashMap<String, Schedule>,
    schedule_events: HashMap<String, ScheduleEvent>,
    next_id: usize,
    creates: usize,
}

impl MemMetadataState {
    fn make_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        self.creates += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

/// An in-memory core-metadata: create calls answer `Conflict` for
/// names that already exist, exactly like the real registry.
#[derive(Default)]
pub struct MemMetadata {
    state: Mutex<MemMetadataState>,
}

impl MemMetadata {
    pub fn seed_device(&self, device: Device) {
        let mut state = self.state.lock().unwrap();

        state.devices.insert(device.id.clone(), device);
    }

    pub fn seed_profile(&self, profile: DeviceProfile) {
        let mut state = self.state.lock().unwrap();

        state.profiles.insert(profile.name.clone(), profile);
    }

    pub fn has_device(&self, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .devices
            .values()
            .any(|d| d.name == name)
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.state.lock().unwrap().services.contains_key(name)
    }

    pub fn create_count(&self) -> usize {
        self.state.lock().unwrap().creates
    }
}

#[async_trait]
impl MetadataClient for MemMetadata {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn device_service(
        &self,
        name: &str,
    ) -> Result<Option<DeviceServiceRecord>> {
        Ok(self.state.lock().unwrap().services.get(name).cloned())
    }

    async fn create_device_service(
        &self,
        record: &DeviceServiceRecord,
    ) -> Result<String> {
        let mut state = self.state.lock().unwrap();

        if state.services.contains_key(&record.name) {
            return Err(Error::Conflict(record.name.clone()));
        }

        let id = state.make_id("svc");
        let mut record = record.clone();

        record.id = id.clone();
        state.services.insert(record.name.clone(), record);
        Ok(id)
    }

    async fn addressable(&self, name: &str) -> Result<Option<Addressable>> {
        Ok(self.state.lock().unwrap().addressables.get(name).cloned())
    }

    async fn create_addressable(&self, addr: &Addressable) -> Result<String> {
        let mut state = self.state.lock().unwrap();

        if state.addressables.contains_key(&addr.name) {
            return Err(Error::Conflict(addr.name.clone()));
        }

        let id = state.make_id("addr");
        let mut addr = addr.clone();

        addr.id = id.clone();
        state.addressables.insert(addr.name.clone(), addr);
        Ok(id)
    }

    async fn profile(&self, name: &str) -> Result<Option<DeviceProfile>> {
        Ok(self.state.lock().unwrap().profiles.get(name).cloned())
    }

    async fn profile_by_id(&self, id: &str) -> Result<Option<DeviceProfile>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .profiles
            .values()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn create_profile(&self, profile: &DeviceProfile) -> Result<String> {
        let mut state = self.state.lock().unwrap();

        if state.profiles.contains_key(&profile.name) {
            return Err(Error::Conflict(profile.name.clone()));
        }

        let id = state.make_id("prof");
        let mut profile = profile.clone();

        profile.id = id.clone();
        state.profiles.insert(profile.name.clone(), profile);
        Ok(id)
    }

    async fn devices_for_service(&self, _name: &str) -> Result<Vec<Device>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .devices
            .values()
            .cloned()
            .collect())
    }

    async fn device(&self, id: &str) -> Result<Option<Device>> {
        Ok(self.state.lock().unwrap().devices.get(id).cloned())
    }

    async fn device_by_name(&self, name: &str) -> Result<Option<Device>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .devices
            .values()
            .find(|d| d.name == name)
            .cloned())
    }

    async fn create_device(&self, device: &Device) -> Result<String> {
        let mut state = self.state.lock().unwrap();

        if state.devices.values().any(|d| d.name == device.name) {
            return Err(Error::Conflict(device.name.clone()));
        }

        let id = state.make_id("dev");
        let mut device = device.clone();

        device.id = id.clone();
        state.devices.insert(id.clone(), device);
        Ok(id)
    }

    async fn update_device(&self, device: &Device) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        if !state.devices.contains_key(&device.id) {
            return Err(Error::NotFound(device.id.clone()));
        }
        state.devices.insert(device.id.clone(), device.clone());
        Ok(())
    }

    async fn delete_device(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        state
            .devices
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn delete_device_by_name(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let id = state
            .devices
            .values()
            .find(|d| d.name == name)
            .map(|d| d.id.clone())
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        state.devices.remove(&id);
        Ok(())
    }

    async fn create_schedule(&self, schedule: &Schedule) -> Result<String> {
        let mut state = self.state.lock().unwrap();

        if state.schedules.contains_key(&schedule.name) {
            return Err(Error::Conflict(schedule.name.clone()));
        }

        let id = state.make_id("sched");
        let mut schedule = schedule.clone();

        schedule.id = id.clone();
        state.schedules.insert(schedule.name.clone(), schedule);
        Ok(id)
    }

    async fn schedule(&self, name: &str) -> Result<Option<Schedule>> {
        Ok(self.state.lock().unwrap().schedules.get(name).cloned())
    }

    async fn create_schedule_event(
        &self,
        event: &ScheduleEvent,
    ) -> Result<String> {
        let mut state = self.state.lock().unwrap();

        if state.schedule_events.contains_key(&event.name) {
            return Err(Error::Conflict(event.name.clone()));
        }

        let id = state.make_id("se");
        let mut event = event.clone();

        event.id = id.clone();
        state.schedule_events.insert(event.name.clone(), event);
        Ok(id)
    }

    async fn schedule_events_for_service(
        &self,
        _name: &str,
    ) -> Result<Vec<ScheduleEvent>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .schedule_events
            .values()
            .cloned()
            .collect())
    }
}

/// A registry double holding one config blob.
#[derive(Default)]
pub struct MemRegistry {
    config: Mutex<NvPairs>,
    pub registrations: Mutex<Vec<String>>,
}

impl MemRegistry {
    pub fn stored(&self) -> NvPairs {
        self.config.lock().unwrap().clone()
    }
}

#[async_trait]
impl RegistryClient for MemRegistry {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn get_config(
        &self,
        _service: &str,
        _profile: Option<&str>,
    ) -> Result<NvPairs> {
        Ok(self.config.lock().unwrap().clone())
    }

    async fn put_config(
        &self,
        _service: &str,
        _profile: Option<&str>,
        pairs: &NvPairs,
    ) -> Result<()> {
        *self.config.lock().unwrap() = pairs.clone();
        Ok(())
    }

    async fn register_service(
        &self,
        name: &str,
        _host: &str,
        _port: u16,
        _check_interval: &str,
    ) -> Result<()> {
        self.registrations.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

/// A scriptable driver: resource values are set ahead of time, writes
/// and invocation counts are recorded for assertions.
#[derive(Default)]
pub struct MockDriver {
    results: Mutex<HashMap<String, Value>>,
    fail: Mutex<Option<String>>,
    get_count: AtomicUsize,
    put_log: Mutex<Vec<(String, Value)>>,
    discover_count: AtomicUsize,
    discover_delay: Mutex<Option<Duration>>,
    discoverable: AtomicBool,
}

impl MockDriver {
    pub fn set_result(&self, resource: &str, value: Value) {
        self.results
            .lock()
            .unwrap()
            .insert(resource.to_string(), value);
    }

    pub fn fail_with(&self, message: &str) {
        *self.fail.lock().unwrap() = Some(message.to_string());
    }

    pub fn get_count(&self) -> usize {
        self.get_count.load(Ordering::SeqCst)
    }

    pub fn put_log(&self) -> Vec<(String, Value)> {
        self.put_log.lock().unwrap().clone()
    }

    pub fn set_discoverable(&self, value: bool) {
        self.discoverable.store(value, Ordering::SeqCst)
    }

    pub fn set_discover_delay(&self, delay: Duration) {
        *self.discover_delay.lock().unwrap() = Some(delay);
    }

    pub fn discover_count(&self) -> usize {
        self.discover_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProtocolDriver for MockDriver {
    async fn init(
        &self,
        _config: &HashMap<String, String>,
    ) -> std::result::Result<(), DriverError> {
        Ok(())
    }

    fn discoverable(&self) -> bool {
        self.discoverable.load(Ordering::SeqCst)
    }

    async fn discover(&self) {
        let delay = *self.discover_delay.lock().unwrap();

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.discover_count.fetch_add(1, Ordering::SeqCst);
    }

    async fn get(
        &self,
        _device: &Addressable,
        requests: &[CommandRequest],
    ) -> std::result::Result<Vec<CommandResult>, DriverError> {
        self.get_count.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = self.fail.lock().unwrap().clone() {
            return Err(DriverError::new(message));
        }

        let results = self.results.lock().unwrap();

        requests
            .iter()
            .enumerate()
            .map(|(n, req)| {
                results
                    .get(&req.resource.name)
                    .cloned()
                    .map(CommandResult::from)
                    .ok_or_else(|| {
                        DriverError::at_op(
                            n,
                            format!("no value for {}", &req.resource.name),
                        )
                    })
            })
            .collect()
    }

    async fn put(
        &self,
        _device: &Addressable,
        requests: &[CommandRequest],
        values: &[CommandResult],
    ) -> std::result::Result<(), DriverError> {
        if let Some(message) = self.fail.lock().unwrap().clone() {
            return Err(DriverError::new(message));
        }

        let mut log = self.put_log.lock().unwrap();

        for (req, value) in requests.iter().zip(values) {
            log.push((req.operation.object.clone(), value.value.clone()));
        }
        Ok(())
    }

    async fn stop(&self, _force: bool) {}
}
