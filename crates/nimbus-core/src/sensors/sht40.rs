use embedded_hal_async::i2c::I2c;
use sht4x::Sht4xAsync;

use super::{HumiditySensor, SensorError};

/// SHT40 used as the station's humidity channel.
///
/// The part also measures temperature, but the station takes temperature from
/// the barometric sensor so only relative humidity is reported here.
pub struct SHT40Sensor<I> {
    sensor: Sht4xAsync<I, embassy_time::Delay>,
}

impl<I: I2c> SHT40Sensor<I> {
    pub fn new(i2c: I) -> Self {
        Self {
            sensor: Sht4xAsync::<I, embassy_time::Delay>::new(i2c),
        }
    }
}

impl<I: I2c> HumiditySensor for SHT40Sensor<I> {
    async fn read_humidity(&mut self) -> Result<f32, SensorError> {
        let measurement = self
            .sensor
            .measure(sht4x::Precision::High, &mut embassy_time::Delay)
            .await
            .map_err(|e| {
                log::error!("SHT40 measurement failed: {:?}", e);
                SensorError::ReadFailed {
                    sensor: "SHT40",
                    operation: "measure humidity",
                    details: "I2C communication error or sensor not responding",
                }
            })?;

        Ok(measurement.humidity_percent().to_num::<f32>())
    }
}
