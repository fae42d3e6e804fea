//! Board bring-up: I2C buses, sensors and the OLED
//!
//! Pin map (ESP32-S3 DevKit):
//! - I2C0 (async, 400 kHz): SDA GPIO8, SCL GPIO9. SHT40 at 0x44, BMP390 at 0x77.
//! - I2C1 (blocking, 400 kHz): SDA GPIO4, SCL GPIO5. SSD1306 at 0x3C.
//! - BOOT button: GPIO0, active low.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex as AsyncMutex;
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::time::Rate;
use esp_hal::{Async, Blocking};
use log::info;
use nimbus_core::app_state::{AppError, error_text};
use nimbus_core::i2c_bus::SharedI2c;
use nimbus_core::sensors::{BMP390Sensor, SHT40Sensor};
use static_cell::StaticCell;

use crate::panel::OledPanel;

pub type SensorBus = I2c<'static, Async>;
pub type SensorI2c = SharedI2c<'static, CriticalSectionRawMutex, SensorBus>;
pub type Humidity = SHT40Sensor<SensorI2c>;
pub type Barometer = BMP390Sensor<SensorI2c, embassy_time::Delay>;
pub type Oled = OledPanel<I2c<'static, Blocking>>;

/// Create the sensor bus and hand out one shared handle per sensor.
pub fn init_sensors(
    i2c0: esp_hal::peripherals::I2C0<'static>,
    sda: esp_hal::peripherals::GPIO8<'static>,
    scl: esp_hal::peripherals::GPIO9<'static>,
) -> (Humidity, Barometer) {
    let bus = I2c::new(i2c0, I2cConfig::default().with_frequency(Rate::from_khz(400)))
        .expect("I2C0 config is valid")
        .with_sda(sda)
        .with_scl(scl)
        .into_async();

    static I2C0_BUS: StaticCell<AsyncMutex<CriticalSectionRawMutex, SensorBus>> =
        StaticCell::new();
    let bus = I2C0_BUS.init(AsyncMutex::new(bus));

    info!("Sensors: SHT40 and BMP390 on I2C0");
    (
        SHT40Sensor::new(SharedI2c::new(bus)),
        BMP390Sensor::new(SharedI2c::new(bus), embassy_time::Delay),
    )
}

/// Bring up the OLED on its own bus.
pub fn init_display(
    i2c1: esp_hal::peripherals::I2C1<'static>,
    sda: esp_hal::peripherals::GPIO4<'static>,
    scl: esp_hal::peripherals::GPIO5<'static>,
) -> Result<Oled, AppError> {
    let bus = I2c::new(i2c1, I2cConfig::default().with_frequency(Rate::from_khz(400)))
        .expect("I2C1 config is valid")
        .with_sda(sda)
        .with_scl(scl);

    let panel = OledPanel::init(bus).map_err(|e| AppError::Display(error_text(e)))?;
    info!("Display: SSD1306 initialised");
    Ok(panel)
}
