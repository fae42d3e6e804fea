use embassy_time::Instant;
use log::warn;

use super::{
    BarometricSample, BarometricSensor, CalibrationOffsets, HumiditySensor, Reading, SensorError,
    SmoothingState, SMOOTHING_ALPHA, altitude_from_pressure,
};

/// Reads both sensor channels and turns raw values into a [`Reading`].
///
/// A failed channel keeps its previous value ("stale, not absent"); the
/// failure is reported through the returned error while [`Self::current`]
/// still holds the merged reading.
pub struct SensorReader<H, B> {
    humidity: H,
    barometric: B,
    offsets: CalibrationOffsets,
    alpha: f32,
    smoothing: SmoothingState,
    current: Reading,
}

impl<H, B> SensorReader<H, B>
where
    H: HumiditySensor,
    B: BarometricSensor,
{
    pub fn new(humidity: H, barometric: B, offsets: CalibrationOffsets) -> Self {
        Self::with_alpha(humidity, barometric, offsets, SMOOTHING_ALPHA)
    }

    /// Create a reader with a non-default smoothing factor.
    pub fn with_alpha(humidity: H, barometric: B, offsets: CalibrationOffsets, alpha: f32) -> Self {
        Self {
            humidity,
            barometric,
            offsets,
            alpha,
            smoothing: SmoothingState::new(),
            current: Reading::empty(),
        }
    }

    /// Poll both channels once.
    pub async fn read(&mut self, now: Instant) -> Result<Reading, SensorError> {
        let humidity_ok = match self.humidity.read_humidity().await {
            Ok(humidity) if humidity.is_finite() => {
                self.current.humidity = humidity;
                true
            }
            Ok(humidity) => {
                warn!("Humidity sensor returned {}, keeping previous value", humidity);
                false
            }
            Err(e) => {
                warn!("Humidity read failed: {}", e);
                false
            }
        };

        let barometric_ok = match self.barometric.read_barometric().await {
            Ok(sample) => match self.correct(sample) {
                Some((temperature, pressure, altitude)) => {
                    let (pressure, altitude) = self.smoothing.apply(pressure, altitude, self.alpha);
                    self.current.temperature = temperature;
                    self.current.pressure = pressure;
                    self.current.altitude = altitude;
                    true
                }
                None => {
                    warn!("Barometric sensor returned {:?}, keeping previous values", sample);
                    false
                }
            },
            Err(e) => {
                warn!("Barometric read failed: {}", e);
                false
            }
        };

        self.current.timestamp = now;

        match (humidity_ok, barometric_ok) {
            (true, true) => Ok(self.current),
            (false, true) => Err(SensorError::HumidityUnavailable),
            (true, false) => Err(SensorError::BarometricUnavailable),
            (false, false) => Err(SensorError::AllUnavailable),
        }
    }

    /// Offset-corrected temperature, pressure and altitude, or `None` when the
    /// sample would feed a non-finite value or a non-positive pressure into
    /// the filters.
    fn correct(&self, sample: BarometricSample) -> Option<(f32, f32, f32)> {
        let temperature = sample.temperature_celsius + self.offsets.temp_offset;
        let pressure = sample.pressure_hpa + self.offsets.pressure_offset;
        if !temperature.is_finite() || !pressure.is_finite() || pressure <= 0.0 {
            return None;
        }

        // Derived altitude uses the corrected but unsmoothed pressure.
        let altitude = sample
            .altitude_m
            .unwrap_or_else(|| altitude_from_pressure(pressure))
            + self.offsets.altitude_offset;

        altitude.is_finite().then_some((temperature, pressure, altitude))
    }

    /// The latest merged reading, including stale channels.
    pub fn current(&self) -> Reading {
        self.current
    }

    pub fn smoothing(&self) -> &SmoothingState {
        &self.smoothing
    }

    /// Seed the filters, e.g. from a known previous value.
    pub fn set_smoothing(&mut self, state: SmoothingState) {
        self.smoothing = state;
    }

    pub fn offsets(&self) -> CalibrationOffsets {
        self.offsets
    }
}
