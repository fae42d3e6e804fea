//! Station configuration
//!
//! Strings are borrowed so the firmware can build a `Config<'static>` from
//! build-time environment and the simulator can deserialize one in place from
//! a JSON buffer. Every section has defaults, so a partial file is enough.

use embassy_time::Duration;
use serde::{Deserialize, Serialize};

use crate::clock::TimeZone;
use crate::connection::{DEFAULT_GIVE_UP_COOLDOWN, ExhaustedAction, RetryPolicy};
use crate::publish::{TopicError, TopicSet};
use crate::sensors::{CalibrationOffsets, SMOOTHING_ALPHA};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(bound(deserialize = "'de: 'a"), default)]
pub struct Config<'a> {
    pub wifi: WifiConfig<'a>,
    pub broker: BrokerConfig<'a>,
    pub time: TimeConfig<'a>,
    pub discovery: DiscoveryConfig<'a>,
    pub calibration: CalibrationOffsets,
    pub smoothing_alpha: f32,
    pub retry: RetryConfig,
    pub poll_interval_ms: u64,
    pub display: DisplayConfig,
}

impl Default for Config<'_> {
    fn default() -> Self {
        Self {
            wifi: WifiConfig::default(),
            broker: BrokerConfig::default(),
            time: TimeConfig::default(),
            discovery: DiscoveryConfig::default(),
            calibration: CalibrationOffsets::ZERO,
            smoothing_alpha: SMOOTHING_ALPHA,
            retry: RetryConfig::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            display: DisplayConfig::default(),
        }
    }
}

impl Config<'_> {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct WifiConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct BrokerConfig<'a> {
    pub host: &'a str,
    pub port: u16,
    pub client_id: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub keep_alive_secs: u16,
}

impl Default for BrokerConfig<'_> {
    fn default() -> Self {
        Self {
            host: "",
            port: 1883,
            client_id: "ESP32WeatherStation",
            username: "",
            password: "",
            keep_alive_secs: 60,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TimeConfig<'a> {
    pub ntp_server: &'a str,
    pub tz_label: &'a str,
    pub utc_offset_secs: i32,
    pub dst_offset_secs: i32,
}

impl Default for TimeConfig<'_> {
    fn default() -> Self {
        Self {
            ntp_server: "pool.ntp.org",
            tz_label: "PST",
            utc_offset_secs: -8 * 3600,
            dst_offset_secs: 3600,
        }
    }
}

impl TimeConfig<'_> {
    pub fn time_zone(&self) -> TimeZone {
        TimeZone::new(self.tz_label, self.utc_offset_secs, self.dst_offset_secs)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct DiscoveryConfig<'a> {
    pub prefix: &'a str,
    pub device_id: &'a str,
    pub device_name: &'a str,
}

impl Default for DiscoveryConfig<'_> {
    fn default() -> Self {
        Self {
            prefix: "homeassistant",
            device_id: "esp32",
            device_name: "ESP32",
        }
    }
}

impl DiscoveryConfig<'_> {
    pub fn topic_set(&self) -> Result<TopicSet, TopicError> {
        TopicSet::new(self.prefix, self.device_id, self.device_name)
    }
}

/// Serializable form of a [`RetryPolicy`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct RetryPolicyConfig {
    pub backoff_ms: u64,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Reset the device instead of cooling down once `max_attempts` is spent.
    pub restart_on_exhaustion: bool,
    pub cooldown_ms: u64,
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self::from(RetryPolicy::BROKER)
    }
}

impl From<RetryPolicy> for RetryPolicyConfig {
    fn from(policy: RetryPolicy) -> Self {
        let (restart_on_exhaustion, cooldown) = match policy.on_exhausted {
            ExhaustedAction::GiveUp { cooldown } => (false, cooldown),
            ExhaustedAction::Restart => (true, DEFAULT_GIVE_UP_COOLDOWN),
        };
        Self {
            backoff_ms: policy.backoff.as_millis(),
            max_attempts: policy.max_attempts,
            restart_on_exhaustion,
            cooldown_ms: cooldown.as_millis(),
        }
    }
}

impl RetryPolicyConfig {
    pub fn policy(&self) -> RetryPolicy {
        let on_exhausted = if self.restart_on_exhaustion {
            ExhaustedAction::Restart
        } else {
            ExhaustedAction::GiveUp {
                cooldown: Duration::from_millis(self.cooldown_ms),
            }
        };

        RetryPolicy {
            backoff: Duration::from_millis(self.backoff_ms),
            max_attempts: self.max_attempts,
            on_exhausted,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    pub wifi: RetryPolicyConfig,
    pub broker: RetryPolicyConfig,
    pub time_sync: RetryPolicyConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            wifi: RetryPolicy::WIFI.into(),
            broker: RetryPolicy::BROKER.into(),
            time_sync: RetryPolicy::TIME_SYNC.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct DisplayConfig {
    pub auto_off_secs: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { auto_off_secs: 300 }
    }
}

impl DisplayConfig {
    pub fn auto_off(&self) -> Duration {
        Duration::from_secs(self.auto_off_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.broker.client_id, "ESP32WeatherStation");
        assert_eq!(config.time.ntp_server, "pool.ntp.org");
        assert_eq!(config.poll_interval(), Duration::from_millis(2000));
        assert_eq!(config.smoothing_alpha, 0.2);
        assert_eq!(config.calibration, CalibrationOffsets::ZERO);
    }

    #[test]
    fn test_default_retry_policies() {
        let retry = RetryConfig::default();

        assert_eq!(retry.wifi.policy(), RetryPolicy::WIFI);
        assert_eq!(retry.broker.policy(), RetryPolicy::BROKER);
        assert_eq!(retry.time_sync.policy(), RetryPolicy::TIME_SYNC);
        assert_eq!(retry.wifi.max_attempts, Some(20));
        assert_eq!(retry.wifi.backoff_ms, 500);
    }

    #[test]
    fn test_restart_policy_from_config() {
        let config = RetryPolicyConfig {
            backoff_ms: 500,
            max_attempts: Some(20),
            restart_on_exhaustion: true,
            cooldown_ms: 0,
        };

        assert_eq!(config.policy().on_exhausted, ExhaustedAction::Restart);
    }

    #[test]
    fn test_default_topics() {
        let topics = DiscoveryConfig::default().topic_set().unwrap();
        assert_eq!(
            topics.state_topic(crate::publish::SensorTopic::Humidity),
            "homeassistant/sensor/esp32_humidity/state"
        );
    }

    #[test]
    fn test_time_zone_from_config() {
        let tz = TimeConfig::default().time_zone();
        assert_eq!(tz.label.as_str(), "PST");
        assert_eq!(tz.total_offset_secs(), -7 * 3600);
    }
}
