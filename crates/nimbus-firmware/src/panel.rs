//! SSD1306 OLED as a [`DisplayPanel`]

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_hal::i2c::I2c;
use nimbus_core::display::DisplayPanel;
use ssd1306::mode::BufferedGraphicsMode;
use ssd1306::prelude::*;
use ssd1306::{I2CDisplayInterface, Ssd1306};

type Driver<I> =
    Ssd1306<I2CInterface<I>, DisplaySize128x64, BufferedGraphicsMode<DisplaySize128x64>>;

pub type PanelError<I> = <Driver<I> as DrawTarget>::Error;

/// 128x64 SSD1306 on I2C, mounted upside down.
pub struct OledPanel<I> {
    display: Driver<I>,
}

impl<I: I2c> OledPanel<I> {
    /// Initialise the controller. On error the caller runs without a display.
    pub fn init(i2c: I) -> Result<Self, PanelError<I>> {
        let mut display = Ssd1306::new(
            I2CDisplayInterface::new(i2c),
            DisplaySize128x64,
            DisplayRotation::Rotate180,
        )
        .into_buffered_graphics_mode();

        display.init()?;
        display.clear(BinaryColor::Off)?;
        display.flush()?;

        Ok(Self { display })
    }
}

impl<I: I2c> OriginDimensions for OledPanel<I> {
    fn size(&self) -> Size {
        self.display.size()
    }
}

impl<I: I2c> DrawTarget for OledPanel<I> {
    type Color = BinaryColor;
    type Error = PanelError<I>;

    fn draw_iter<P>(&mut self, pixels: P) -> Result<(), Self::Error>
    where
        P: IntoIterator<Item = Pixel<Self::Color>>,
    {
        self.display.draw_iter(pixels)
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        self.display.clear(color)
    }
}

impl<I: I2c> DisplayPanel for OledPanel<I> {
    fn flush(&mut self) -> Result<(), Self::Error> {
        self.display.flush()
    }

    fn set_powered(&mut self, on: bool) -> Result<(), Self::Error> {
        self.display.set_display_on(on)
    }
}
