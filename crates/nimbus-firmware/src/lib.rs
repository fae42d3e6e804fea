//! ESP32-S3 implementations of the nimbus core traits.

#![no_std]

pub mod broker;
pub mod button;
pub mod hardware;
pub mod ntp;
pub mod panel;
pub mod secrets;
pub mod wifi;
