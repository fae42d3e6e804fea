//! Shared async I2C bus
//!
//! The humidity and barometric sensors sit on the same bus. Each driver gets
//! its own [`SharedI2c`] handle; every transaction locks the bus for its whole
//! duration so operations from different drivers never interleave.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::i2c::{ErrorType, I2c, Operation, SevenBitAddress};

/// Handle to an I2C bus shared behind an embassy [`Mutex`].
pub struct SharedI2c<'a, M: RawMutex, BUS> {
    bus: &'a Mutex<M, BUS>,
}

impl<'a, M: RawMutex, BUS> SharedI2c<'a, M, BUS> {
    pub const fn new(bus: &'a Mutex<M, BUS>) -> Self {
        Self { bus }
    }
}

impl<M: RawMutex, BUS> Clone for SharedI2c<'_, M, BUS> {
    fn clone(&self) -> Self {
        Self { bus: self.bus }
    }
}

impl<M: RawMutex, BUS: ErrorType> ErrorType for SharedI2c<'_, M, BUS> {
    type Error = BUS::Error;
}

// read/write/write_read fall back to the trait's defaults, which all go
// through `transaction`.
impl<M: RawMutex, BUS: I2c> I2c for SharedI2c<'_, M, BUS> {
    async fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut bus = self.bus.lock().await;
        bus.transaction(address, operations).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use embedded_hal_async::i2c::ErrorKind;

    #[derive(Default)]
    struct CountingBus {
        transactions: usize,
        last_address: u8,
    }

    impl ErrorType for CountingBus {
        type Error = ErrorKind;
    }

    impl I2c for CountingBus {
        async fn transaction(
            &mut self,
            address: SevenBitAddress,
            _operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            self.transactions += 1;
            self.last_address = address;
            Ok(())
        }
    }

    #[test]
    fn test_handles_share_one_bus() {
        let bus: Mutex<NoopRawMutex, CountingBus> = Mutex::new(CountingBus::default());
        let mut humidity = SharedI2c::new(&bus);
        let mut barometer = humidity.clone();

        block_on(humidity.write(0x44, &[0xFD])).unwrap();
        let mut buf = [0u8; 1];
        block_on(barometer.write_read(0x77, &[0x00], &mut buf)).unwrap();

        let bus = block_on(bus.lock());
        assert_eq!(bus.transactions, 2);
        assert_eq!(bus.last_address, 0x77);
    }
}
