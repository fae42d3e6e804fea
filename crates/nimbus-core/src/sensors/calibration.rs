use serde::{Deserialize, Serialize};

/// Standard sea-level pressure used by the barometric formula.
pub const SEA_LEVEL_PRESSURE_HPA: f32 = 1013.25;

/// Additive corrections applied to raw readings before smoothing.
///
/// Fixed for the lifetime of the process; they come from build-time or
/// load-time configuration.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
#[serde(default)]
pub struct CalibrationOffsets {
    pub temp_offset: f32,
    pub pressure_offset: f32,
    pub altitude_offset: f32,
}

impl CalibrationOffsets {
    pub const ZERO: Self = Self {
        temp_offset: 0.0,
        pressure_offset: 0.0,
        altitude_offset: 0.0,
    };

    pub const fn new(temp_offset: f32, pressure_offset: f32, altitude_offset: f32) -> Self {
        Self {
            temp_offset,
            pressure_offset,
            altitude_offset,
        }
    }
}

/// Altitude in metres from pressure in hPa, international barometric formula.
pub fn altitude_from_pressure(pressure_hpa: f32) -> f32 {
    44330.0 * (1.0 - libm::powf(pressure_hpa / SEA_LEVEL_PRESSURE_HPA, 0.1903))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sea_level_is_zero() {
        assert!(altitude_from_pressure(SEA_LEVEL_PRESSURE_HPA).abs() < 1e-3);
    }

    #[test]
    fn test_altitude_grows_as_pressure_drops() {
        let low = altitude_from_pressure(1000.0);
        let high = altitude_from_pressure(900.0);
        assert!(low > 100.0 && low < 120.0, "1000 hPa gave {}", low);
        assert!(high > 950.0 && high < 1000.0, "900 hPa gave {}", high);
    }
}
