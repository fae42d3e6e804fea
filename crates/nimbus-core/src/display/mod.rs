//! OLED presentation of the station state
//!
//! [`DisplayPresenter`] is a read-only consumer: every tick it receives a
//! [`Snapshot`] and the pending button toggle, applies the power policy and
//! redraws the single screen if the panel is on.

mod layout;
mod power;

pub use layout::*;
pub use power::*;

use embassy_time::Instant;
use embedded_graphics::{Drawable, pixelcolor::BinaryColor, prelude::*};
use log::{info, warn};

use crate::connection::ConnectionState;
use crate::publish::PublishRecord;
use crate::sensors::Reading;

/// A buffered monochrome panel.
pub trait DisplayPanel: DrawTarget<Color = BinaryColor> {
    /// Push the frame buffer to the panel.
    fn flush(&mut self) -> Result<(), Self::Error>;

    fn set_powered(&mut self, on: bool) -> Result<(), Self::Error>;
}

/// Everything the screen shows.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub reading: Reading,
    pub broker: ConnectionState,
    pub publish: PublishRecord,
    pub time: &'a str,
}

pub struct DisplayPresenter<D> {
    panel: Option<D>,
    power: DisplayPower,
}

impl<D: DisplayPanel> DisplayPresenter<D> {
    pub fn new(panel: D, now: Instant) -> Self {
        Self::with_power(Some(panel), DisplayPower::new(now))
    }

    /// Presenter for a panel that failed to initialise. Every update is a no-op.
    pub fn inert(now: Instant) -> Self {
        Self::with_power(None, DisplayPower::new(now))
    }

    pub fn with_power(panel: Option<D>, power: DisplayPower) -> Self {
        if panel.is_none() {
            warn!("Display unavailable, running without it");
        }
        Self { panel, power }
    }

    /// Apply the toggle and auto-off policy, then render if the panel is on.
    pub fn update(
        &mut self,
        snapshot: &Snapshot<'_>,
        toggle_requested: bool,
        now: Instant,
    ) -> Result<(), D::Error> {
        let change = self.power.apply(toggle_requested, now);

        let Some(panel) = self.panel.as_mut() else {
            return Ok(());
        };

        match change {
            PowerChange::TurnedOn => {
                info!("Display turned on");
                panel.set_powered(true)?;
            }
            PowerChange::TurnedOff => {
                info!("Display turned off");
                panel.clear(BinaryColor::Off)?;
                panel.flush()?;
                panel.set_powered(false)?;
                return Ok(());
            }
            PowerChange::Unchanged => {}
        }

        if !self.power.is_on() {
            return Ok(());
        }

        panel.clear(BinaryColor::Off)?;
        StationScreen::new(snapshot, now).draw(panel)?;
        panel.flush()
    }

    pub fn is_on(&self) -> bool {
        self.power.is_on()
    }

    pub fn is_inert(&self) -> bool {
        self.panel.is_none()
    }

    pub fn panel(&self) -> Option<&D> {
        self.panel.as_ref()
    }
}
