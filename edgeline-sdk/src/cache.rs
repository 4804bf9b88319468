//! The in-memory device and profile caches, kept consistent with
//! core-metadata under concurrent reads and callback-driven writes.

use edgeline_api::types::{device::Device, profile::DeviceProfile};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

#[derive(Default)]
struct DeviceMaps {
    devices: HashMap<String, Device>,
    name_to_id: HashMap<String, String>,
}

impl DeviceMaps {
    // Inserts a device, keeping `name_to_id` bijective over live
    // devices across renames and id reuse.
    fn insert(&mut self, device: Device) {
        if let Some(old_id) = self.name_to_id.get(&device.name) {
            if *old_id != device.id {
                self.devices.remove(old_id);
            }
        }
        if let Some(old) = self.devices.get(&device.id) {
            if old.name != device.name {
                self.name_to_id.remove(&old.name);
            }
        }
        self.name_to_id
            .insert(device.name.clone(), device.id.clone());
        self.devices.insert(device.id.clone(), device);
    }

    fn remove(&mut self, id: &str) -> Option<Device> {
        let dev = self.devices.remove(id)?;

        self.name_to_id.remove(&dev.name);
        Some(dev)
    }
}

/// Devices indexed by id and by name, and profiles indexed by name.
///
/// The device maps sit behind tokio's write-preferring `RwLock`, so a
/// stream of bulk readers can't starve callback mutations or
/// discovery additions. The profile map only sees rare, short
/// mutations and uses a plain mutex. Discovery is gated by its own
/// mutex: `try_lock` semantics make concurrent discovery requests
/// short-circuit instead of queueing.
pub struct DeviceCache {
    devices: RwLock<DeviceMaps>,
    profiles: Mutex<HashMap<String, DeviceProfile>>,
    discovery: Arc<Mutex<()>>,
}

impl DeviceCache {
    pub fn new() -> Self {
        DeviceCache {
            devices: RwLock::new(DeviceMaps::default()),
            profiles: Mutex::new(HashMap::new()),
            discovery: Arc::new(Mutex::new(())),
        }
    }

    pub async fn add(&self, device: Device) {
        self.devices.write().await.insert(device)
    }

    pub async fn remove(&self, id: &str) -> Option<Device> {
        self.devices.write().await.remove(id)
    }

    pub async fn remove_by_name(&self, name: &str) -> Option<Device> {
        let mut maps = self.devices.write().await;
        let id = maps.name_to_id.get(name)?.clone();

        maps.remove(&id)
    }

    pub async fn get(&self, id: &str) -> Option<Device> {
        self.devices.read().await.devices.get(id).cloned()
    }

    pub async fn get_by_name(&self, name: &str) -> Option<Device> {
        let maps = self.devices.read().await;
        let id = maps.name_to_id.get(name)?;

        maps.devices.get(id).cloned()
    }

    pub async fn id_for(&self, name: &str) -> Option<String> {
        self.devices.read().await.name_to_id.get(name).cloned()
    }

    /// A point-in-time copy of the device set, ordered by device name
    /// so broadcast output is deterministic.
    pub async fn snapshot(&self) -> Vec<Device> {
        let maps = self.devices.read().await;
        let mut devices: Vec<_> = maps.devices.values().cloned().collect();

        devices.sort_by(|a, b| a.name.cmp(&b.name));
        devices
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.devices.len()
    }

    pub async fn clear(&self) {
        let mut maps = self.devices.write().await;

        maps.devices.clear();
        maps.name_to_id.clear();
        self.profiles.lock().await.clear();
    }

    pub async fn profile(&self, name: &str) -> Option<DeviceProfile> {
        self.profiles.lock().await.get(name).cloned()
    }

    pub async fn add_profile(&self, profile: DeviceProfile) {
        self.profiles
            .lock()
            .await
            .insert(profile.name.clone(), profile);
    }

    pub async fn remove_profile_by_id(
        &self,
        id: &str,
    ) -> Option<DeviceProfile> {
        let mut profiles = self.profiles.lock().await;
        let name = profiles
            .values()
            .find(|p| p.id == id)
            .map(|p| p.name.clone())?;

        profiles.remove(&name)
    }

    pub async fn profiles(&self) -> Vec<DeviceProfile> {
        let mut profiles: Vec<_> =
            self.profiles.lock().await.values().cloned().collect();

        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        profiles
    }

    /// Claims the discovery gate. `None` means a discovery is already
    /// in flight and this request should be dropped, never queued.
    pub fn try_begin_discovery(&self) -> Option<OwnedMutexGuard<()>> {
        self.discovery.clone().try_lock_owned().ok()
    }

    // Verifies the name index is a bijection over the device map.
    #[cfg(test)]
    async fn check_bijection(&self) {
        let maps = self.devices.read().await;

        assert_eq!(maps.devices.len(), maps.name_to_id.len());
        for (id, dev) in &maps.devices {
            assert_eq!(maps.name_to_id.get(&dev.name), Some(id));
        }
    }
}

impl Default for DeviceCache {
    fn default() -> Self {
        DeviceCache::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgeline_api::types::device::{AdminState, OperatingState};

    fn device(id: &str, name: &str) -> Device {
        Device {
            id: id.into(),
            name: name.into(),
            description: None,
            labels: vec![],
            profile_name: "p".into(),
            addressable: None,
            admin_state: AdminState::Unlocked,
            op_state: OperatingState::Enabled,
            origin: 0,
        }
    }

    #[tokio::test]
    async fn test_lookup_both_ways() {
        let cache = DeviceCache::new();

        cache.add(device("d-1", "alpha")).await;
        cache.add(device("d-2", "beta")).await;

        assert_eq!(cache.get("d-1").await.unwrap().name, "alpha");
        assert_eq!(cache.get_by_name("beta").await.unwrap().id, "d-2");
        assert_eq!(cache.id_for("alpha").await, Some("d-1".into()));
        assert!(cache.get("d-3").await.is_none());
        cache.check_bijection().await;
    }

    #[tokio::test]
    async fn test_bijection_over_mutations() {
        let cache = DeviceCache::new();

        cache.add(device("d-1", "alpha")).await;
        cache.add(device("d-2", "beta")).await;

        // Rename d-1; the old name must disappear from the index.

        cache.add(device("d-1", "gamma")).await;
        cache.check_bijection().await;
        assert!(cache.get_by_name("alpha").await.is_none());
        assert_eq!(cache.id_for("gamma").await, Some("d-1".into()));

        // Re-register the name under a new id; the old id goes away.

        cache.add(device("d-9", "beta")).await;
        cache.check_bijection().await;
        assert!(cache.get("d-2").await.is_none());

        // add then remove-by-name returns to the prior state.

        let before = cache.len().await;

        cache.add(device("d-5", "delta")).await;
        assert!(cache.remove_by_name("delta").await.is_some());
        cache.check_bijection().await;
        assert_eq!(cache.len().await, before);
        assert!(cache.remove_by_name("delta").await.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_order() {
        let cache = DeviceCache::new();

        cache.add(device("d-2", "beta")).await;
        cache.add(device("d-1", "alpha")).await;
        cache.add(device("d-3", "gamma")).await;

        let names: Vec<_> = cache
            .snapshot()
            .await
            .into_iter()
            .map(|d| d.name)
            .collect();

        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
    }

    #[tokio::test]
    async fn test_discovery_gate() {
        let cache = DeviceCache::new();

        let guard = cache.try_begin_discovery();

        assert!(guard.is_some());

        // A second claim while the first is held short-circuits.

        assert!(cache.try_begin_discovery().is_none());

        drop(guard);
        assert!(cache.try_begin_discovery().is_some());
    }

    #[tokio::test]
    async fn test_profiles() {
        let cache = DeviceCache::new();

        cache
            .add_profile(DeviceProfile {
                name: "thermo".into(),
                ..DeviceProfile::default()
            })
            .await;

        assert!(cache.profile("thermo").await.is_some());
        assert!(cache.profile("other").await.is_none());
        assert_eq!(cache.profiles().await.len(), 1);
    }
}
