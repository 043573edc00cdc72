//! Build-time device configuration.
//!
//! Secrets are baked in from the build environment so they never live in the
//! repository: `PWD_WIFI_SSID`, `PWD_WIFI_PASSWORD`, `PWD_SYNC_ENDPOINT` and
//! `PWD_API_KEY`.

use core::fmt;
use embassy_time::Duration;

use crate::sync::SyncSettings;

/// Name advertised over BLE and shown on the boot banner.
pub const DEVICE_NAME: &str = "Password-Reminder";
/// Manufacturer string exposed through the device information service.
pub const MANUFACTURER: &str = "Poruruba";
/// Pass key answered to the host during pairing.
pub const FIXED_PASS_KEY: u32 = 123_456;
/// Partition labels searched, in order, for the credential cache.
pub const CACHE_PARTITION_LABELS: [&str; 3] = ["pwd_list", "pwd-list", "nvs_pwd"];

const WIFI_CONNECT_TIMEOUT_MS: u64 = 10_000;
const WIFI_POLL_INTERVAL_MS: u64 = 1_000;
const KEYSTROKE_DELAY_MS: u64 = 20;
const NOTICE_HOLD_MS: u64 = 1_000;

const fn env_or_empty(value: Option<&'static str>) -> &'static str {
    match value {
        Some(value) => value,
        None => "",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(field) => write!(f, "{field} is not configured"),
        }
    }
}

impl core::error::Error for ConfigError {}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    pub device_name: &'static str,
    pub wifi_ssid: &'static str,
    pub wifi_password: &'static str,
    pub endpoint: &'static str,
    pub api_key: &'static str,
    pub connect_timeout: Duration,
    pub connect_poll: Duration,
    pub keystroke_delay: Duration,
    pub notice_hold: Duration,
    pub pass_key: u32,
}

impl DeviceConfig {
    /// Configuration assembled from the build environment.
    pub const fn from_build_env() -> Self {
        Self {
            device_name: DEVICE_NAME,
            wifi_ssid: env_or_empty(option_env!("PWD_WIFI_SSID")),
            wifi_password: env_or_empty(option_env!("PWD_WIFI_PASSWORD")),
            endpoint: env_or_empty(option_env!("PWD_SYNC_ENDPOINT")),
            api_key: env_or_empty(option_env!("PWD_API_KEY")),
            connect_timeout: Duration::from_millis(WIFI_CONNECT_TIMEOUT_MS),
            connect_poll: Duration::from_millis(WIFI_POLL_INTERVAL_MS),
            keystroke_delay: Duration::from_millis(KEYSTROKE_DELAY_MS),
            notice_hold: Duration::from_millis(NOTICE_HOLD_MS),
            pass_key: FIXED_PASS_KEY,
        }
    }

    /// Report the first required sync field that is still empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.sync_settings().missing_field() {
            Some(field) => Err(ConfigError::Missing(field)),
            None => Ok(()),
        }
    }

    pub fn sync_settings(&self) -> SyncSettings<'static> {
        SyncSettings {
            wifi_ssid: self.wifi_ssid,
            wifi_password: self.wifi_password,
            endpoint: self.endpoint,
            api_key: self.api_key,
            connect_timeout: self.connect_timeout,
            poll_interval: self.connect_poll,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::from_build_env()
    }
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("device_name", &self.device_name)
            .field("wifi_ssid", &self.wifi_ssid)
            .field("endpoint", &self.endpoint)
            .field("connect_timeout_ms", &self.connect_timeout.as_millis())
            .field("keystroke_delay_ms", &self.keystroke_delay.as_millis())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> DeviceConfig {
        DeviceConfig {
            wifi_ssid: "home",
            wifi_password: "pass",
            endpoint: "http://example.test/pwd-allpasswd",
            api_key: "key",
            ..DeviceConfig::from_build_env()
        }
    }

    #[test]
    fn defaults_match_device_timings() {
        let config = DeviceConfig::from_build_env();
        assert_eq!(config.connect_timeout.as_millis(), 10_000);
        assert_eq!(config.connect_poll.as_millis(), 1_000);
        assert_eq!(config.keystroke_delay.as_millis(), 20);
        assert_eq!(config.pass_key, 123_456);
    }

    #[test]
    fn validate_names_the_missing_field() {
        assert_eq!(configured().validate(), Ok(()));

        let config = DeviceConfig {
            endpoint: " ",
            ..configured()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Missing("sync endpoint"))
        );
    }

    #[test]
    fn blank_api_key_is_missing_for_config_and_refresh() {
        let config = DeviceConfig {
            api_key: "   ",
            ..configured()
        };

        assert_eq!(config.validate(), Err(ConfigError::Missing("api key")));
        assert_eq!(config.sync_settings().missing_field(), Some("api key"));
    }

    #[test]
    fn debug_output_omits_secrets() {
        let rendered = format!("{:?}", configured());
        assert!(!rendered.contains("pass\""));
        assert!(!rendered.contains("\"key\""));
    }
}
