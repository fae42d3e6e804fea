//! Station-wide run state and error types

use core::fmt::Write;

use thiserror_no_std::Error;

use crate::connection::ConnectionState;

/// Coarse lifecycle of the station, derived from the supervisors each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppRunState {
    WifiConnecting,
    TimeSyncing,
    BrokerConnecting,
    Running,
    RestartPending,
}

impl AppRunState {
    pub fn from_links(
        wifi: ConnectionState,
        clock: ConnectionState,
        broker: ConnectionState,
        restart_requested: bool,
    ) -> Self {
        if restart_requested {
            AppRunState::RestartPending
        } else if !wifi.is_connected() {
            AppRunState::WifiConnecting
        } else if !clock.is_connected() {
            AppRunState::TimeSyncing
        } else if !broker.is_connected() {
            AppRunState::BrokerConnecting
        } else {
            AppRunState::Running
        }
    }
}

pub type ErrorText = heapless::String<64>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("WiFi bring-up failed: {0}")]
    Wifi(ErrorText),
    #[error("Display init failed: {0}")]
    Display(ErrorText),
    #[error("Configuration error: {0}")]
    Config(ErrorText),
}

/// Debug-format `value` into an [`ErrorText`], truncating if needed.
pub fn error_text(value: impl core::fmt::Debug) -> ErrorText {
    let mut text = ErrorText::new();
    let _ = write!(text, "{:?}", value);
    text
}
