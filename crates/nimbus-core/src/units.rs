//! Unit conversions applied at the publish and display boundaries.
//!
//! Readings stay metric everywhere inside the station; imperial values only
//! exist in outgoing payloads and on screen.

/// Feet per metre.
pub const FEET_PER_METER: f32 = 3.28084;

/// Celsius to Fahrenheit (`F = C * 1.8 + 32`).
pub fn to_fahrenheit(celsius: f32) -> f32 {
    celsius * 1.8 + 32.0
}

/// Metres to feet.
pub fn to_feet(meters: f32) -> f32 {
    meters * FEET_PER_METER
}
