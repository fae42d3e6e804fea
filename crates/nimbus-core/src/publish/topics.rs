use core::fmt::Write;

use heapless::String;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::sensors::Reading;
use crate::units::{to_fahrenheit, to_feet};

pub type Topic = String<96>;
pub type StatePayload = String<48>;
pub type DiscoveryPayload = String<384>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicError {
    #[error("Topic or payload does not fit its buffer: {0}")]
    TooLong(&'static str),
}

/// The four published measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorTopic {
    Temperature,
    Humidity,
    Altitude,
    Pressure,
}

impl SensorTopic {
    /// Order of the state publishes in every batch.
    pub const STATE_ORDER: [SensorTopic; 4] = [
        SensorTopic::Temperature,
        SensorTopic::Humidity,
        SensorTopic::Altitude,
        SensorTopic::Pressure,
    ];

    /// Order of the discovery announcement.
    pub const DISCOVERY_ORDER: [SensorTopic; 4] = [
        SensorTopic::Temperature,
        SensorTopic::Humidity,
        SensorTopic::Pressure,
        SensorTopic::Altitude,
    ];

    /// JSON key and topic suffix.
    pub const fn field(self) -> &'static str {
        match self {
            SensorTopic::Temperature => "temperature",
            SensorTopic::Humidity => "humidity",
            SensorTopic::Altitude => "altitude",
            SensorTopic::Pressure => "pressure",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            SensorTopic::Temperature => "Temperature",
            SensorTopic::Humidity => "Humidity",
            SensorTopic::Altitude => "Altitude",
            SensorTopic::Pressure => "Pressure",
        }
    }

    /// Decimal places in the state payload.
    pub const fn precision(self) -> usize {
        match self {
            SensorTopic::Temperature => 2,
            SensorTopic::Humidity => 1,
            SensorTopic::Altitude | SensorTopic::Pressure => 0,
        }
    }

    pub const fn unit(self) -> &'static str {
        match self {
            SensorTopic::Temperature => "°F",
            SensorTopic::Humidity => "%",
            SensorTopic::Altitude => "ft",
            SensorTopic::Pressure => "hPa",
        }
    }

    /// Home Assistant `device_class`, or `None` where an icon is used instead.
    pub const fn device_class(self) -> Option<&'static str> {
        match self {
            SensorTopic::Temperature => Some("temperature"),
            SensorTopic::Humidity => Some("humidity"),
            SensorTopic::Pressure => Some("pressure"),
            SensorTopic::Altitude => None,
        }
    }

    pub const fn icon(self) -> Option<&'static str> {
        match self {
            SensorTopic::Altitude => Some("mdi:altimeter"),
            _ => None,
        }
    }

    /// The published value in wire units (°F, %, ft, hPa).
    pub fn value(self, reading: &Reading) -> f32 {
        match self {
            SensorTopic::Temperature => to_fahrenheit(reading.temperature),
            SensorTopic::Humidity => reading.humidity,
            SensorTopic::Altitude => to_feet(reading.altitude),
            SensorTopic::Pressure => reading.pressure,
        }
    }

    const fn index(self) -> usize {
        match self {
            SensorTopic::Temperature => 0,
            SensorTopic::Humidity => 1,
            SensorTopic::Altitude => 2,
            SensorTopic::Pressure => 3,
        }
    }
}

/// `{"<field>": <value>}` with the field's fixed precision.
pub fn state_payload(topic: SensorTopic, value: f32) -> Result<StatePayload, TopicError> {
    let mut payload = StatePayload::new();
    write!(
        payload,
        "{{\"{}\": {:.*}}}",
        topic.field(),
        topic.precision(),
        value
    )
    .map_err(|_| TopicError::TooLong("state payload"))?;
    Ok(payload)
}

/// State and discovery topics for one device.
#[derive(Debug, Clone)]
pub struct TopicSet {
    device_id: String<32>,
    device_name: String<32>,
    state: [Topic; 4],
    discovery: [Topic; 4],
}

impl TopicSet {
    /// Build `<prefix>/sensor/<device_id>_<field>/{state,config}` for every field.
    pub fn new(prefix: &str, device_id: &str, device_name: &str) -> Result<Self, TopicError> {
        let mut state: [Topic; 4] = Default::default();
        let mut discovery: [Topic; 4] = Default::default();

        for topic in SensorTopic::STATE_ORDER {
            let i = topic.index();
            write!(state[i], "{}/sensor/{}_{}/state", prefix, device_id, topic.field())
                .map_err(|_| TopicError::TooLong("state topic"))?;
            write!(discovery[i], "{}/sensor/{}_{}/config", prefix, device_id, topic.field())
                .map_err(|_| TopicError::TooLong("discovery topic"))?;
        }

        Ok(Self {
            device_id: String::try_from(device_id).map_err(|_| TopicError::TooLong("device id"))?,
            device_name: String::try_from(device_name)
                .map_err(|_| TopicError::TooLong("device name"))?,
            state,
            discovery,
        })
    }

    pub fn state_topic(&self, topic: SensorTopic) -> &str {
        &self.state[topic.index()]
    }

    pub fn discovery_topic(&self, topic: SensorTopic) -> &str {
        &self.discovery[topic.index()]
    }

    /// Home Assistant MQTT discovery descriptor for one field.
    pub fn discovery_payload(&self, topic: SensorTopic) -> Result<DiscoveryPayload, TopicError> {
        let mut payload = DiscoveryPayload::new();
        self.write_discovery(&mut payload, topic)
            .map_err(|_| TopicError::TooLong("discovery payload"))?;
        Ok(payload)
    }

    fn write_discovery(&self, out: &mut DiscoveryPayload, topic: SensorTopic) -> core::fmt::Result {
        write!(out, "{{\"name\": \"{} {}\",", self.device_name, topic.label())?;
        write!(out, "\"unique_id\": \"{}_{}\",", self.device_id, topic.field())?;
        write!(out, "\"state_topic\": \"{}\",", self.state_topic(topic))?;
        write!(out, "\"unit_of_measurement\": \"{}\",", topic.unit())?;
        if let Some(class) = topic.device_class() {
            write!(out, "\"device_class\": \"{}\",", class)?;
        }
        if let Some(icon) = topic.icon() {
            write!(out, "\"icon\": \"{}\",", icon)?;
        }
        write!(out, "\"value_template\": \"{{{{ value_json.{} }}}}\"}}", topic.field())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics() -> TopicSet {
        TopicSet::new("homeassistant", "esp32", "ESP32").unwrap()
    }

    #[test]
    fn test_topic_paths() {
        let topics = topics();
        assert_eq!(
            topics.state_topic(SensorTopic::Temperature),
            "homeassistant/sensor/esp32_temperature/state"
        );
        assert_eq!(
            topics.discovery_topic(SensorTopic::Altitude),
            "homeassistant/sensor/esp32_altitude/config"
        );
        assert_eq!(
            topics.state_topic(SensorTopic::Pressure),
            "homeassistant/sensor/esp32_pressure/state"
        );
    }

    #[test]
    fn test_state_payload_precision() {
        assert_eq!(
            state_payload(SensorTopic::Temperature, 68.9).unwrap().as_str(),
            "{\"temperature\": 68.90}"
        );
        assert_eq!(
            state_payload(SensorTopic::Humidity, 45.26).unwrap().as_str(),
            "{\"humidity\": 45.3}"
        );
        assert_eq!(
            state_payload(SensorTopic::Pressure, 1002.65).unwrap().as_str(),
            "{\"pressure\": 1003}"
        );
        assert_eq!(
            state_payload(SensorTopic::Altitude, 328.4).unwrap().as_str(),
            "{\"altitude\": 328}"
        );
    }

    #[test]
    fn test_values_are_converted_at_the_boundary() {
        let reading = Reading {
            temperature: 20.5,
            humidity: 40.0,
            pressure: 1000.0,
            altitude: 100.0,
            ..Reading::empty()
        };

        assert!((SensorTopic::Temperature.value(&reading) - 68.9).abs() < 1e-4);
        assert!((SensorTopic::Altitude.value(&reading) - 328.084).abs() < 1e-3);
        assert_eq!(SensorTopic::Humidity.value(&reading), 40.0);
        assert_eq!(SensorTopic::Pressure.value(&reading), 1000.0);
    }

    #[test]
    fn test_temperature_discovery_payload() {
        let payload = topics().discovery_payload(SensorTopic::Temperature).unwrap();
        assert_eq!(
            payload.as_str(),
            "{\"name\": \"ESP32 Temperature\",\
             \"unique_id\": \"esp32_temperature\",\
             \"state_topic\": \"homeassistant/sensor/esp32_temperature/state\",\
             \"unit_of_measurement\": \"°F\",\
             \"device_class\": \"temperature\",\
             \"value_template\": \"{{ value_json.temperature }}\"}"
        );
    }

    #[test]
    fn test_altitude_discovery_uses_icon() {
        let payload = topics().discovery_payload(SensorTopic::Altitude).unwrap();
        assert!(payload.contains("\"icon\": \"mdi:altimeter\""));
        assert!(!payload.contains("device_class"), "altitude has no device class");
        assert!(payload.contains("\"unit_of_measurement\": \"ft\""));
        assert!(payload.ends_with("\"value_template\": \"{{ value_json.altitude }}\"}"));
    }

    #[test]
    fn test_oversized_device_id_is_rejected() {
        let long = "a_device_identifier_that_is_far_too_long_to_fit_in_a_ninety_six_byte_topic_buffer";
        assert_eq!(
            TopicSet::new("homeassistant", long, "ESP32").err(),
            Some(TopicError::TooLong("state topic"))
        );
    }
}
