//! Bakes Wi-Fi, broker and calibration settings into the firmware.
//!
//! Values come from the process environment or a `.env` file next to this
//! crate; missing keys fall back to defaults so a clean checkout still builds.

const KEYS: &[(&str, &str)] = &[
    ("WIFI_SSID", ""),
    ("WIFI_PASSWORD", ""),
    ("MQTT_HOST", ""),
    ("MQTT_PORT", "1883"),
    ("MQTT_USER", ""),
    ("MQTT_PASS", ""),
    ("TEMP_OFFSET", "0.0"),
    ("PRESSURE_OFFSET", "0.0"),
    ("ALTITUDE_OFFSET", "0.0"),
];

fn main() {
    println!("cargo:rustc-link-arg=-Tlinkall.x");
    println!("cargo:rerun-if-changed=.env");

    if let Err(e) = dotenvy::dotenv() {
        println!("cargo:warning=No .env loaded ({e}), using environment and defaults");
    }

    for (key, default) in KEYS {
        println!("cargo:rerun-if-env-changed={key}");
        let value = std::env::var(key).unwrap_or_else(|_| (*default).to_string());
        println!("cargo:rustc-env={key}={value}");
    }
}
