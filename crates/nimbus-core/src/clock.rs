//! Wall clock anchored to an NTP sample
//!
//! The device has no RTC. [`ClockSync`] stores one `(unix seconds, monotonic
//! instant)` pair from a successful sync and extrapolates from it. It is a
//! [`Link`] so the station can drive it with the same supervisor and retry
//! policy as the network connections.

use core::fmt::{Debug, Write};

use embassy_time::Instant;
use log::info;
use thiserror_no_std::Error;
use time::OffsetDateTime;

use crate::connection::Link;

/// Shown until the first successful sync.
pub const TIME_PLACEHOLDER: &str = "--/--/-- --:-- --";

pub const NTP_PORT: u16 = 123;
pub const NTP_PACKET_LEN: usize = 48;
/// Seconds between the NTP epoch (1900) and the Unix epoch (1970).
pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

pub type TimeString = heapless::String<32>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    #[error("NTP response too short: {0} bytes")]
    ShortResponse(usize),
    #[error("NTP response is not from a server (mode {0})")]
    NotServerMode(u8),
    #[error("NTP server is unsynchronised")]
    Unsynchronised,
    #[error("Timestamp out of range")]
    OutOfRange,
}

/// SNTP v3 client request: LI=0, VN=3, Mode=3.
pub fn ntp_request() -> [u8; NTP_PACKET_LEN] {
    let mut packet = [0u8; NTP_PACKET_LEN];
    packet[0] = 0x1B;
    packet
}

/// Unix seconds from the transmit timestamp of an SNTP response.
pub fn parse_ntp_response(packet: &[u8]) -> Result<u64, ClockError> {
    if packet.len() < NTP_PACKET_LEN {
        return Err(ClockError::ShortResponse(packet.len()));
    }

    let mode = packet[0] & 0x07;
    if mode != 4 && mode != 5 {
        return Err(ClockError::NotServerMode(mode));
    }

    let secs = u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]) as u64;
    if secs == 0 {
        return Err(ClockError::Unsynchronised);
    }

    secs.checked_sub(NTP_UNIX_OFFSET).ok_or(ClockError::OutOfRange)
}

/// Fixed local offset applied to UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeZone {
    pub label: heapless::String<8>,
    pub utc_offset_secs: i32,
    /// Always added on top of `utc_offset_secs`; there are no DST rules.
    pub dst_offset_secs: i32,
}

impl TimeZone {
    pub fn new(label: &str, utc_offset_secs: i32, dst_offset_secs: i32) -> Self {
        let mut tz_label = heapless::String::new();
        for c in label.chars() {
            if tz_label.push(c).is_err() {
                break;
            }
        }
        Self {
            label: tz_label,
            utc_offset_secs,
            dst_offset_secs,
        }
    }

    pub fn total_offset_secs(&self) -> i64 {
        self.utc_offset_secs as i64 + self.dst_offset_secs as i64
    }
}

impl Default for TimeZone {
    fn default() -> Self {
        Self::new("PST", -8 * 3600, 3600)
    }
}

/// `MM/DD/YY HH:MM AM/PM <TZ>`
pub fn format_time(unix_secs: u64, tz: &TimeZone) -> Result<TimeString, ClockError> {
    let local = i64::try_from(unix_secs)
        .ok()
        .and_then(|secs| secs.checked_add(tz.total_offset_secs()))
        .ok_or(ClockError::OutOfRange)?;
    let dt = OffsetDateTime::from_unix_timestamp(local).map_err(|_| ClockError::OutOfRange)?;

    let (hour12, meridiem) = match dt.hour() {
        0 => (12, "AM"),
        h @ 1..=11 => (h, "AM"),
        12 => (12, "PM"),
        h => (h - 12, "PM"),
    };

    let mut out = TimeString::new();
    write!(
        out,
        "{:02}/{:02}/{:02} {:02}:{:02} {} {}",
        u8::from(dt.month()),
        dt.day(),
        dt.year().rem_euclid(100),
        hour12,
        dt.minute(),
        meridiem,
        tz.label
    )
    .map_err(|_| ClockError::OutOfRange)?;
    Ok(out)
}

/// Source of the current Unix time, normally an SNTP query.
pub trait TimeSource {
    type Error: Debug;

    fn sync(&mut self) -> impl Future<Output = Result<u64, Self::Error>>;
}

/// Wall clock extrapolated from the last successful sync.
pub struct ClockSync<T> {
    source: T,
    tz: TimeZone,
    anchor: Option<(u64, Instant)>,
}

impl<T: TimeSource> ClockSync<T> {
    pub fn new(source: T, tz: TimeZone) -> Self {
        Self {
            source,
            tz,
            anchor: None,
        }
    }

    pub fn unix_time(&self, now: Instant) -> Option<u64> {
        self.anchor.map(|(secs, at)| {
            secs + now.saturating_duration_since(at).as_secs()
        })
    }

    /// Local time string, or [`TIME_PLACEHOLDER`] before the first sync.
    pub fn time_string(&self, now: Instant) -> TimeString {
        let formatted = self
            .unix_time(now)
            .and_then(|secs| format_time(secs, &self.tz).ok());

        formatted.unwrap_or_else(|| {
            let mut placeholder = TimeString::new();
            let _ = placeholder.push_str(TIME_PLACEHOLDER);
            placeholder
        })
    }

    pub fn time_zone(&self) -> &TimeZone {
        &self.tz
    }
}

impl<T: TimeSource> Link for ClockSync<T> {
    type Error = T::Error;

    fn is_connected(&self) -> bool {
        self.anchor.is_some()
    }

    async fn connect(&mut self, now: Instant) -> Result<(), Self::Error> {
        let secs = self.source.sync().await?;
        info!("Clock synced: unix time {}", secs);
        self.anchor = Some((secs, now));
        Ok(())
    }
}
