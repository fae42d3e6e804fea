//! Sensor drivers, calibration and the smoothing reader
//!
//! The station has two physical channels: a humidity sensor and a
//! barometric sensor that also reports temperature. Each driver implements
//! one of the traits below; [`SensorReader`] combines them into a
//! [`Reading`].

#[cfg(feature = "sensor-bmp390")]
pub mod bmp390;
mod calibration;
mod reader;
#[cfg(feature = "sensor-sht40")]
pub mod sht40;
mod smoothing;

pub use calibration::*;
pub use reader::*;
pub use smoothing::*;

#[cfg(feature = "sensor-bmp390")]
pub use bmp390::BMP390Sensor;
#[cfg(feature = "sensor-sht40")]
pub use sht40::SHT40Sensor;

use embassy_time::Instant;
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor}: failed to {operation} ({details})")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{sensor}: reading is not a finite number")]
    InvalidReading { sensor: &'static str },
    #[error("humidity unavailable, keeping previous value")]
    HumidityUnavailable,
    #[error("barometric sensor unavailable, keeping previous values")]
    BarometricUnavailable,
    #[error("all sensors unavailable, keeping previous values")]
    AllUnavailable,
}

/// Raw output of a barometric sensor, before offsets and smoothing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarometricSample {
    pub temperature_celsius: f32,
    pub pressure_hpa: f32,
    /// Altitude reported by the sensor itself. `None` when the part only
    /// measures pressure, in which case the reader derives altitude.
    pub altitude_m: Option<f32>,
}

/// A humidity sensor producing relative humidity in percent.
pub trait HumiditySensor {
    fn read_humidity(&mut self) -> impl Future<Output = Result<f32, SensorError>>;
}

/// A combined temperature/pressure sensor.
pub trait BarometricSensor {
    fn read_barometric(&mut self) -> impl Future<Output = Result<BarometricSample, SensorError>>;
}

/// One processed sample of every channel.
///
/// Temperature and humidity are offset-corrected, pressure and altitude are
/// offset-corrected and smoothed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub temperature: f32,
    pub humidity: f32,
    pub pressure: f32,
    pub altitude: f32,
    pub timestamp: Instant,
}

impl Reading {
    /// The all-zero reading shown before the first successful poll.
    pub const fn empty() -> Self {
        Self {
            temperature: 0.0,
            humidity: 0.0,
            pressure: 0.0,
            altitude: 0.0,
            timestamp: Instant::from_ticks(0),
        }
    }
}

impl Default for Reading {
    fn default() -> Self {
        Self::empty()
    }
}
