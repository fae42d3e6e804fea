use core::fmt::Write;

use embassy_time::Instant;
use embedded_graphics::{
    Drawable,
    mono_font::{MonoTextStyle, ascii::FONT_6X10},
    pixelcolor::BinaryColor,
    prelude::*,
    text::{Baseline, Text},
};

use super::Snapshot;
use crate::units::{to_fahrenheit, to_feet};

pub const SCREEN_WIDTH: u32 = 128;
pub const SCREEN_HEIGHT: u32 = 64;

/// Top edge of each text row.
const ROW_Y: [i32; 6] = [0, 10, 20, 30, 40, 54];

pub type ScreenLine = heapless::String<32>;

/// The single screen of the station: four measurements, MQTT status, clock.
pub struct StationScreen<'a> {
    snapshot: &'a Snapshot<'a>,
    now: Instant,
}

impl<'a> StationScreen<'a> {
    pub fn new(snapshot: &'a Snapshot<'a>, now: Instant) -> Self {
        Self { snapshot, now }
    }

    /// Text of every row, top to bottom. `None` leaves the row blank.
    pub fn lines(&self) -> [Option<ScreenLine>; 6] {
        let r = &self.snapshot.reading;

        let status = if self.snapshot.publish.shows_sent_indicator(self.now) {
            Some("MQTT Sent!")
        } else if !self.snapshot.broker.is_connected() {
            Some("MQTT offline")
        } else {
            None
        };

        [
            line(format_args!(
                "Temp: {:.1} C / {:.1} F",
                r.temperature,
                to_fahrenheit(r.temperature)
            )),
            line(format_args!("Humidity: {:.1}%", r.humidity)),
            line(format_args!(
                "Alt: {:.0} m / {:.0} ft",
                r.altitude,
                to_feet(r.altitude)
            )),
            line(format_args!("Pressure: {:.0} hPa", r.pressure)),
            status.and_then(|s| line(format_args!("{}", s))),
            line(format_args!("{}", self.snapshot.time)),
        ]
    }
}

// Rows that overflow are truncated by the buffer; a partial row beats none.
fn line(args: core::fmt::Arguments<'_>) -> Option<ScreenLine> {
    let mut s = ScreenLine::new();
    let _ = s.write_fmt(args);
    Some(s)
}

impl Drawable for StationScreen<'_> {
    type Color = BinaryColor;
    type Output = ();

    fn draw<D>(&self, target: &mut D) -> Result<(), D::Error>
    where
        D: DrawTarget<Color = BinaryColor>,
    {
        let style = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);

        for (y, text) in ROW_Y.iter().zip(self.lines()) {
            if let Some(text) = text {
                Text::with_baseline(&text, Point::new(0, *y), style, Baseline::Top).draw(target)?;
            }
        }

        Ok(())
    }
}
