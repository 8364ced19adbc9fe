use anyhow::Context;
use tracing::{debug, info, warn};

use crate::model::{TrackerConfig, Variant};
use crate::storage::KeyValueStorage;

/// Storage key of the root config blob.
pub const STORAGE_KEY: &str = "tv_tasks_config_v1";

/// Loads and saves the whole [`TrackerConfig`] under [`STORAGE_KEY`].
#[derive(Debug)]
pub struct ConfigStore<S> {
    storage: S,
    variant: Variant,
}

impl<S: KeyValueStorage> ConfigStore<S> {
    pub fn new(storage: S, variant: Variant) -> Self {
        Self { storage, variant }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Reads the stored config, seeding and persisting defaults on first run.
    #[tracing::instrument(skip(self), fields(variant = self.variant.as_str()))]
    pub fn load(&mut self) -> anyhow::Result<TrackerConfig> {
        let Some(raw) = self.storage.get_item(STORAGE_KEY)? else {
            info!("no stored config; seeding defaults");
            let cfg = TrackerConfig::seed(self.variant);
            self.save(&cfg)?;
            return Ok(cfg);
        };

        let mut cfg: TrackerConfig = serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing stored config `{STORAGE_KEY}`"))?;

        if self.variant == Variant::Cloud {
            migrate_device_names(&mut cfg);
        }

        debug!(
            devices = cfg.devices.len(),
            tasks = cfg.tasks.len(),
            done = cfg.done_today.len(),
            "loaded config"
        );
        Ok(cfg)
    }

    /// Overwrites the stored blob with the full config.
    #[tracing::instrument(skip(self, cfg))]
    pub fn save(&mut self, cfg: &TrackerConfig) -> anyhow::Result<()> {
        let serialized = serde_json::to_string(cfg).context("failed serializing config")?;
        self.storage
            .set_item(STORAGE_KEY, &serialized)
            .with_context(|| format!("failed saving config `{STORAGE_KEY}`"))
    }
}

/// Gives every device a `deviceName`, empty when missing.
///
/// A legacy `ip` is left untouched: the cloud name of a plug cannot be
/// derived from its address, so the user completes it from the config page.
fn migrate_device_names(cfg: &mut TrackerConfig) {
    for device in &mut cfg.devices {
        if device.device_name.is_none() {
            if device.ip.is_some() {
                warn!(
                    device = %device.id,
                    "device only has a legacy ip; deviceName needs configuring"
                );
            }
            device.device_name = Some(String::new());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    const LEGACY_IP_CONFIG: &str = r#"{
        "devices": [{"id": "1", "name": "TV", "mode": "reward", "ip": "192.168.1.9"}],
        "tasks": [],
        "doneToday": []
    }"#;

    #[test]
    fn first_load_seeds_and_persists() {
        let mut store = ConfigStore::new(MemoryStorage::new(), Variant::Cloud);
        let cfg = store.load().unwrap();

        assert_eq!(cfg.devices.len(), 1);
        assert_eq!(cfg.tasks.len(), 2);
        assert!(cfg.done_today.is_empty());

        let raw = store.storage().get_item(STORAGE_KEY).unwrap().unwrap();
        let stored: TrackerConfig = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored, cfg);
    }

    #[test]
    fn local_seed_addresses_by_ip() {
        let mut store = ConfigStore::new(MemoryStorage::new(), Variant::Local);
        let cfg = store.load().unwrap();
        assert!(cfg.devices[0].ip.is_some());
        assert_eq!(cfg.devices[0].device_name, None);
    }

    #[test]
    fn cloud_load_fills_missing_device_name_and_keeps_ip() {
        let storage = MemoryStorage::new().with_item(STORAGE_KEY, LEGACY_IP_CONFIG);
        let mut store = ConfigStore::new(storage, Variant::Cloud);

        let cfg = store.load().unwrap();
        assert_eq!(cfg.devices[0].device_name.as_deref(), Some(""));
        assert_eq!(cfg.devices[0].ip.as_deref(), Some("192.168.1.9"));
    }

    #[test]
    fn local_load_does_not_migrate() {
        let storage = MemoryStorage::new().with_item(STORAGE_KEY, LEGACY_IP_CONFIG);
        let mut store = ConfigStore::new(storage, Variant::Local);

        let cfg = store.load().unwrap();
        assert_eq!(cfg.devices[0].device_name, None);
    }

    #[test]
    fn malformed_blob_is_an_error_and_is_not_overwritten() {
        let storage = MemoryStorage::new().with_item(STORAGE_KEY, "{not json");
        let mut store = ConfigStore::new(storage, Variant::Cloud);

        let err = store.load().unwrap_err();
        assert!(format!("{err:#}").contains(STORAGE_KEY));
        assert_eq!(
            store.storage().get_item(STORAGE_KEY).unwrap().as_deref(),
            Some("{not json")
        );
    }
}
