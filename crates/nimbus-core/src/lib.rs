//! Hardware-independent core library for nimbus
//!
//! This crate contains all platform-agnostic logic for the nimbus weather
//! station: sensor smoothing and calibration, connection supervision, the
//! MQTT publish gate, the wall clock, the display presenter and the station
//! loop that ties them together.
//!
//! It is `#![no_std]` so it compiles on both the ESP32-S3 target and desktop
//! hosts (for the simulator and tests).

#![no_std]

pub mod app_state;
pub mod clock;
pub mod config;
pub mod connection;
pub mod display;
pub mod i2c_bus;
pub mod publish;
pub mod sensors;
pub mod station;
pub mod units;
