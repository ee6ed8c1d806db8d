//! Store keys, cycle tunables and device configuration lookup.

use alloc::string::String;

use log::warn;

use crate::{backoff::NORMAL_INTERVAL_SECS, counters::KeyValueStore, network::WifiCredentials};

pub const KEY_MANIFEST_URL: &str = "manifest_url";
pub const KEY_AES_KEY_HEX: &str = "aes_key_hex";
pub const KEY_IMAGES_BASE: &str = "images_base";
pub const KEY_WIFI_RETRY: &str = "wifi_retry";
pub const KEY_API_RETRY: &str = "api_retry";
pub const KEY_SLEEP_DURATION: &str = "sleep_duration";
pub const KEY_WIFI_SSID: &str = "wifi_ssid";
pub const KEY_WIFI_PASSWORD: &str = "wifi_password";

/// Every key the store must accept.
pub const KNOWN_KEYS: [&str; 8] = [
    KEY_MANIFEST_URL,
    KEY_AES_KEY_HEX,
    KEY_IMAGES_BASE,
    KEY_WIFI_RETRY,
    KEY_API_RETRY,
    KEY_SLEEP_DURATION,
    KEY_WIFI_SSID,
    KEY_WIFI_PASSWORD,
];

/// Manifest refresh interval when the manifest omits `refresh_rate`.
pub const DEFAULT_REFRESH_SECS: i32 = 1800;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CycleConfig {
    pub normal_interval_secs: u32,
    pub min_refresh_secs: u32,
    pub max_refresh_secs: u32,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            normal_interval_secs: NORMAL_INTERVAL_SECS,
            min_refresh_secs: 60,
            max_refresh_secs: 24 * 60 * 60,
        }
    }
}

impl CycleConfig {
    pub const fn with_normal_interval_secs(mut self, normal_interval_secs: u32) -> Self {
        self.normal_interval_secs = normal_interval_secs;
        self
    }

    pub const fn with_refresh_bounds(mut self, min_secs: u32, max_secs: u32) -> Self {
        self.min_refresh_secs = min_secs;
        self.max_refresh_secs = max_secs;
        self
    }

    /// Clamps a manifest-supplied interval into the configured bounds.
    pub fn refresh_sleep_secs(&self, refresh_interval_seconds: i32) -> u32 {
        let requested = refresh_interval_seconds.max(0) as u32;
        requested.clamp(self.min_refresh_secs, self.max_refresh_secs.max(self.min_refresh_secs))
    }
}

/// Values baked into the firmware image, used when the store has no override.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BuildDefaults {
    pub manifest_url: &'static str,
    pub images_base: &'static str,
    pub aes_key_hex: &'static str,
    pub wifi_ssid: &'static str,
    pub wifi_password: &'static str,
}

/// Configuration resolved for one wake cycle.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeviceConfig {
    pub manifest_url: String,
    pub images_base: String,
    pub aes_key_hex: String,
    pub credentials: WifiCredentials,
}

impl DeviceConfig {
    pub fn load<S: KeyValueStore>(store: &mut S, defaults: &BuildDefaults) -> Self {
        Self {
            manifest_url: string_or_default(store, KEY_MANIFEST_URL, defaults.manifest_url),
            images_base: string_or_default(store, KEY_IMAGES_BASE, defaults.images_base),
            aes_key_hex: string_or_default(store, KEY_AES_KEY_HEX, defaults.aes_key_hex),
            credentials: WifiCredentials {
                ssid: string_or_default(store, KEY_WIFI_SSID, defaults.wifi_ssid),
                password: string_or_default(store, KEY_WIFI_PASSWORD, defaults.wifi_password),
            },
        }
    }
}

fn string_or_default<S: KeyValueStore>(store: &mut S, key: &str, default: &str) -> String {
    match store.get_string(key) {
        Ok(Some(value)) if !value.is_empty() => value,
        Ok(_) => String::from(default),
        Err(err) => {
            warn!("config: read failed key={} err={:?}; using default", key, err);
            String::from(default)
        }
    }
}
