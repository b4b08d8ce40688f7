//! Persisted device configuration (`spec.md` §3, §6). Loaded once at boot
//! and rewritten whenever the web UI posts a change; the store itself (flash
//! partition, SPIFFS file, whatever the host provides) is the external
//! `ConfigStore` collaborator.

use serde::{Deserialize, Serialize};

/// Which Wi-Fi role the device should boot into.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WifiBootMode {
    Station,
    AccessPoint,
}

/// The device's persisted configuration (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dev_name: String,
    pub sta_ssid: String,
    pub sta_psk: String,
    pub web_port: u16,
    pub wifi_boot_mode: WifiBootMode,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dev_name: "sdbridge".to_string(),
            sta_ssid: String::new(),
            sta_psk: String::new(),
            web_port: 80,
            wifi_boot_mode: WifiBootMode::AccessPoint,
        }
    }
}

/// Where [`Config`] is persisted across reboots (`SPEC_FULL.md` §6).
pub trait ConfigStore: Send {
    fn load(&self) -> std::io::Result<Config>;
    fn save(&self, config: &Config) -> std::io::Result<()>;
}

/// An in-memory [`ConfigStore`] for tests and for hosts with no persistent
/// storage wired up yet.
pub struct MemoryConfigStore {
    inner: std::sync::Mutex<Config>,
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        MemoryConfigStore {
            inner: std::sync::Mutex::new(Config::default()),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> std::io::Result<Config> {
        Ok(self.inner.lock().unwrap_or_else(|p| p.into_inner()).clone())
    }

    fn save(&self, config: &Config) -> std::io::Result<()> {
        *self.inner.lock().unwrap_or_else(|p| p.into_inner()) = config.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_boots_as_access_point() {
        let config = Config::default();
        assert_eq!(config.wifi_boot_mode, WifiBootMode::AccessPoint);
        assert_eq!(config.web_port, 80);
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryConfigStore::default();
        let mut config = store.load().unwrap();
        config.dev_name = "renamed".to_string();
        store.save(&config).unwrap();
        assert_eq!(store.load().unwrap().dev_name, "renamed");
    }

    #[test]
    fn config_serializes_to_snake_case_json() {
        let config = Config::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["wifi_boot_mode"], "access_point");
    }
}
