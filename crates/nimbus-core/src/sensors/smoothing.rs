/// Weight given to the newest sample by the pressure and altitude filters.
pub const SMOOTHING_ALPHA: f32 = 0.2;

/// Exponential moving average step.
///
/// Computes `alpha * new + (1 - alpha) * previous` in its interpolation form,
/// which returns `previous` exactly when `new == previous` or `alpha == 0`.
/// `alpha` is clamped to `[0, 1]`.
pub fn apply_smoothing(new: f32, previous: f32, alpha: f32) -> f32 {
    if alpha >= 1.0 {
        return new;
    }
    previous + alpha.max(0.0) * (new - previous)
}

/// Previous smoothed values of the two filtered channels.
///
/// Starts at zero, so the first smoothed samples after boot sit well below
/// the true value until the filter settles. That start-up transient is
/// expected.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SmoothingState {
    pub prev_pressure: f32,
    pub prev_altitude: f32,
}

impl SmoothingState {
    pub const fn new() -> Self {
        Self {
            prev_pressure: 0.0,
            prev_altitude: 0.0,
        }
    }

    /// Smooth both channels independently and store the results as the new
    /// previous values. Returns `(pressure, altitude)`.
    pub fn apply(&mut self, pressure: f32, altitude: f32, alpha: f32) -> (f32, f32) {
        self.prev_pressure = apply_smoothing(pressure, self.prev_pressure, alpha);
        self.prev_altitude = apply_smoothing(altitude, self.prev_altitude, alpha);
        (self.prev_pressure, self.prev_altitude)
    }
}
