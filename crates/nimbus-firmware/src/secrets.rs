//! Build-time configuration injected by `build.rs`.

use log::warn;
use nimbus_core::config::{BrokerConfig, Config, WifiConfig};
use nimbus_core::sensors::CalibrationOffsets;

fn parse_or<T: core::str::FromStr>(key: &str, raw: &str, default: T) -> T {
    raw.trim().parse().unwrap_or_else(|_| {
        warn!("Config: {} = {:?} is not valid, using default", key, raw);
        default
    })
}

/// Station configuration with secrets and calibration from the build environment.
pub fn config() -> Config<'static> {
    let defaults = Config::default();

    Config {
        wifi: WifiConfig {
            ssid: env!("WIFI_SSID"),
            password: env!("WIFI_PASSWORD"),
        },
        broker: BrokerConfig {
            host: env!("MQTT_HOST"),
            port: parse_or("MQTT_PORT", env!("MQTT_PORT"), defaults.broker.port),
            username: env!("MQTT_USER"),
            password: env!("MQTT_PASS"),
            ..defaults.broker
        },
        calibration: CalibrationOffsets::new(
            parse_or("TEMP_OFFSET", env!("TEMP_OFFSET"), 0.0),
            parse_or("PRESSURE_OFFSET", env!("PRESSURE_OFFSET"), 0.0),
            parse_or("ALTITUDE_OFFSET", env!("ALTITUDE_OFFSET"), 0.0),
        ),
        ..defaults
    }
}
