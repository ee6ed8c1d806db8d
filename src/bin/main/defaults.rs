use inkwake_core::config::BuildDefaults;

/// Baked-in configuration, overridden by values in the flash store.
pub(super) const BUILD_DEFAULTS: BuildDefaults = BuildDefaults {
    manifest_url: env_or_empty(option_env!("INKWAKE_MANIFEST_URL")),
    images_base: env_or_empty(option_env!("INKWAKE_IMAGES_BASE")),
    aes_key_hex: env_or_empty(option_env!("INKWAKE_AES_KEY_HEX")),
    wifi_ssid: env_or_empty(option_env!("INKWAKE_WIFI_SSID")),
    wifi_password: env_or_empty(option_env!("INKWAKE_WIFI_PASSWORD")),
};

const fn env_or_empty(value: Option<&'static str>) -> &'static str {
    match value {
        Some(value) => value,
        None => "",
    }
}
