//! In-process stand-ins for the station hardware and network.

use std::cell::Cell;
use std::convert::Infallible;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use embassy_time::Instant;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics_simulator::SimulatorDisplay;
use log::info;

use nimbus_core::connection::Link;
use nimbus_core::clock::TimeSource;
use nimbus_core::display::{DisplayPanel, SCREEN_HEIGHT, SCREEN_WIDTH};
use nimbus_core::publish::Publisher;
use nimbus_core::sensors::{BarometricSample, BarometricSensor, HumiditySensor, SensorError};

/// Switches flipped from the keyboard and read by every simulated component.
#[derive(Clone, Default)]
pub struct Faults {
    pub wifi_down: Rc<Cell<bool>>,
    pub broker_down: Rc<Cell<bool>>,
    pub humidity_failed: Rc<Cell<bool>>,
}

impl Faults {
    pub fn flip(flag: &Cell<bool>, name: &str) {
        flag.set(!flag.get());
        info!("{}: {}", name, if flag.get() { "failing" } else { "healthy" });
    }
}

#[derive(Debug)]
pub enum SimError {
    Unreachable,
}

fn elapsed_secs(start: Instant) -> f64 {
    start.elapsed().as_millis() as f64 / 1000.0
}

/// Slowly drifting humidity, 40 to 60 %.
pub struct MockHumidity {
    start: Instant,
    faults: Faults,
}

impl MockHumidity {
    pub fn new(faults: Faults) -> Self {
        Self {
            start: Instant::now(),
            faults,
        }
    }
}

impl HumiditySensor for MockHumidity {
    async fn read_humidity(&mut self) -> Result<f32, SensorError> {
        if self.faults.humidity_failed.get() {
            return Err(SensorError::ReadFailed {
                sensor: "Mock humidity",
                operation: "read",
                details: "fault injected",
            });
        }

        let t = elapsed_secs(self.start);
        Ok((50.0 + 10.0 * (t / 180.0).sin() + 2.0 * (t / 23.0).cos()) as f32)
    }
}

/// Temperature around 23 °C and pressure around 1013 hPa. Altitude is left
/// to the reader.
pub struct MockBarometer {
    start: Instant,
}

impl MockBarometer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl BarometricSensor for MockBarometer {
    async fn read_barometric(&mut self) -> Result<BarometricSample, SensorError> {
        let t = elapsed_secs(self.start);
        Ok(BarometricSample {
            temperature_celsius: (23.0 + 3.0 * (t / 120.0).sin() + 0.5 * (t / 37.0).cos()) as f32,
            pressure_hpa: (1013.0 + 4.0 * (t / 300.0).sin() + 0.3 * (t / 11.0).cos()) as f32,
            altitude_m: None,
        })
    }
}

/// A link that connects on the first attempt unless its fault switch is set.
/// Flipping the switch while connected drops the link.
pub struct MockLink {
    name: &'static str,
    down: Rc<Cell<bool>>,
    associated: bool,
}

impl MockLink {
    pub fn new(name: &'static str, down: Rc<Cell<bool>>) -> Self {
        Self {
            name,
            down,
            associated: false,
        }
    }
}

impl Link for MockLink {
    type Error = SimError;

    fn is_connected(&self) -> bool {
        self.associated && !self.down.get()
    }

    async fn connect(&mut self, _now: Instant) -> Result<(), Self::Error> {
        self.associated = !self.down.get();
        if self.associated {
            info!("{}: link up", self.name);
            Ok(())
        } else {
            Err(SimError::Unreachable)
        }
    }
}

/// Host clock as the time server.
pub struct HostClock {
    wifi_down: Rc<Cell<bool>>,
}

impl HostClock {
    pub fn new(wifi_down: Rc<Cell<bool>>) -> Self {
        Self { wifi_down }
    }
}

impl TimeSource for HostClock {
    type Error = SimError;

    async fn sync(&mut self) -> Result<u64, Self::Error> {
        if self.wifi_down.get() {
            return Err(SimError::Unreachable);
        }

        Ok(SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs())
    }
}

/// Logs every message instead of sending it.
pub struct LogPublisher {
    broker_down: Rc<Cell<bool>>,
    pub sent: usize,
}

impl LogPublisher {
    pub fn new(broker_down: Rc<Cell<bool>>) -> Self {
        Self {
            broker_down,
            sent: 0,
        }
    }
}

impl Publisher for LogPublisher {
    type Error = SimError;

    async fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), Self::Error> {
        if self.broker_down.get() {
            return Err(SimError::Unreachable);
        }

        self.sent += 1;
        info!(
            "MQTT {}{} {}",
            topic,
            if retain { " (retained)" } else { "" },
            String::from_utf8_lossy(payload)
        );
        Ok(())
    }
}

/// OLED stand-in. While powered off the window shows a blank frame.
pub struct SimPanel {
    frame: SimulatorDisplay<BinaryColor>,
    blank: SimulatorDisplay<BinaryColor>,
    powered: bool,
}

impl SimPanel {
    pub fn new() -> Self {
        let size = Size::new(SCREEN_WIDTH, SCREEN_HEIGHT);
        Self {
            frame: SimulatorDisplay::new(size),
            blank: SimulatorDisplay::new(size),
            powered: true,
        }
    }

    /// What the physical panel would currently show.
    pub fn visible(&self) -> &SimulatorDisplay<BinaryColor> {
        if self.powered { &self.frame } else { &self.blank }
    }
}

impl OriginDimensions for SimPanel {
    fn size(&self) -> Size {
        self.frame.size()
    }
}

impl DrawTarget for SimPanel {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        self.frame.draw_iter(pixels)
    }
}

impl DisplayPanel for SimPanel {
    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_powered(&mut self, on: bool) -> Result<(), Self::Error> {
        self.powered = on;
        Ok(())
    }
}
