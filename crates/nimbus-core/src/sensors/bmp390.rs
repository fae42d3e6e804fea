use bmp390::{Address, Bmp390, Configuration};
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;
use log::{error, info};

use super::{BarometricSample, BarometricSensor, SensorError};

const KELVIN_OFFSET: f32 = 273.15;

/// BMP390 temperature and pressure channel.
///
/// The driver is brought up on the first read. A failed bring-up is retried
/// on the next read, which is why the bus handle must be cloneable.
pub struct BMP390Sensor<I, D> {
    i2c: I,
    delay: D,
    address: Address,
    sensor: Option<Bmp390<I>>,
}

impl<I: I2c + Clone, D: DelayNs + Clone> BMP390Sensor<I, D> {
    /// Sensor at 0x77 (SDO high).
    pub fn new(i2c: I, delay: D) -> Self {
        Self::with_address(i2c, delay, Address::Up)
    }

    pub fn with_address(i2c: I, delay: D, address: Address) -> Self {
        Self {
            i2c,
            delay,
            address,
            sensor: None,
        }
    }

    async fn initialize(&mut self) -> Result<(), SensorError> {
        let sensor = Bmp390::try_new(
            self.i2c.clone(),
            self.address,
            self.delay.clone(),
            &Configuration::default(),
        )
        .await
        .map_err(|e| {
            error!("BMP390 initialization failed: {:?}", e);
            SensorError::ReadFailed {
                sensor: "BMP390",
                operation: "initialize",
                details: "chip id mismatch or I2C communication error",
            }
        })?;

        info!("BMP390: initialized");
        self.sensor = Some(sensor);
        Ok(())
    }
}

impl<I: I2c + Clone, D: DelayNs + Clone> BarometricSensor for BMP390Sensor<I, D> {
    async fn read_barometric(&mut self) -> Result<BarometricSample, SensorError> {
        if self.sensor.is_none() {
            self.initialize().await?;
        }
        let Some(sensor) = self.sensor.as_mut() else {
            return Err(SensorError::ReadFailed {
                sensor: "BMP390",
                operation: "initialize",
                details: "driver not available",
            });
        };

        let measurement = sensor.measure().await.map_err(|e| {
            error!("BMP390 measurement failed: {:?}", e);
            SensorError::ReadFailed {
                sensor: "BMP390",
                operation: "measure pressure and temperature",
                details: "I2C communication error or sensor not responding",
            }
        })?;

        // Quantities are held in SI base units: kelvin and pascal.
        Ok(BarometricSample {
            temperature_celsius: measurement.temperature.value - KELVIN_OFFSET,
            pressure_hpa: measurement.pressure.value / 100.0,
            altitude_m: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use embassy_futures::block_on;
    use embedded_hal_async::i2c::{
        ErrorKind, ErrorType, NoAcknowledgeSource, Operation, SevenBitAddress,
    };

    /// Bus with nothing attached: every transaction is NACKed.
    #[derive(Clone)]
    struct EmptyBus<'a> {
        transactions: &'a Cell<usize>,
    }

    impl ErrorType for EmptyBus<'_> {
        type Error = ErrorKind;
    }

    impl I2c for EmptyBus<'_> {
        async fn transaction(
            &mut self,
            _address: SevenBitAddress,
            _operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            self.transactions.set(self.transactions.get() + 1);
            Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))
        }
    }

    #[derive(Clone)]
    struct NoDelay;

    impl DelayNs for NoDelay {
        async fn delay_ns(&mut self, _ns: u32) {}
    }

    #[test]
    fn test_missing_chip_fails_and_retries_bring_up() {
        let transactions = Cell::new(0);
        let mut sensor = BMP390Sensor::new(
            EmptyBus {
                transactions: &transactions,
            },
            NoDelay,
        );

        let first = block_on(sensor.read_barometric());
        assert!(
            matches!(
                first,
                Err(SensorError::ReadFailed {
                    operation: "initialize",
                    ..
                })
            ),
            "missing chip should fail bring-up"
        );
        let after_first = transactions.get();
        assert!(after_first > 0, "bring-up should touch the bus");

        let second = block_on(sensor.read_barometric());
        assert!(
            matches!(
                second,
                Err(SensorError::ReadFailed {
                    operation: "initialize",
                    ..
                })
            ),
            "bring-up is retried, not cached as failed"
        );
        assert!(
            transactions.get() > after_first,
            "second read should attempt bring-up again"
        );
    }
}
