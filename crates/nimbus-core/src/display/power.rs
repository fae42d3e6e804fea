use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_time::{Duration, Instant};

/// The display turns itself off this long after it was last turned on.
pub const AUTO_OFF_AFTER: Duration = Duration::from_secs(5 * 60);

/// Presses closer together than this are treated as contact bounce.
pub const TOGGLE_DEBOUNCE_MS: u32 = 200;

/// Button press handed from the interrupt handler to the driving loop.
///
/// Single producer (the GPIO interrupt), single consumer (the loop).
pub struct ToggleFlag {
    requested: AtomicBool,
    last_edge_ms: AtomicU32,
    seen_edge: AtomicBool,
}

impl ToggleFlag {
    pub const fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            last_edge_ms: AtomicU32::new(0),
            seen_edge: AtomicBool::new(false),
        }
    }

    /// Record a button edge at `now_ms`. Returns `false` if it was debounced.
    pub fn request(&self, now_ms: u32) -> bool {
        if self.seen_edge.load(Ordering::Relaxed)
            && now_ms.wrapping_sub(self.last_edge_ms.load(Ordering::Relaxed)) < TOGGLE_DEBOUNCE_MS
        {
            return false;
        }

        self.last_edge_ms.store(now_ms, Ordering::Relaxed);
        self.seen_edge.store(true, Ordering::Relaxed);
        self.requested.store(true, Ordering::Release);
        true
    }

    /// Consume a pending request.
    pub fn take(&self) -> bool {
        self.requested.swap(false, Ordering::AcqRel)
    }
}

impl Default for ToggleFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerChange {
    Unchanged,
    TurnedOn,
    TurnedOff,
}

/// On/off policy: button toggle plus auto-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayPower {
    on: bool,
    on_since: Instant,
    auto_off: Duration,
}

impl DisplayPower {
    /// The display starts on.
    pub fn new(now: Instant) -> Self {
        Self::with_auto_off(now, AUTO_OFF_AFTER)
    }

    pub fn with_auto_off(now: Instant, auto_off: Duration) -> Self {
        Self {
            on: true,
            on_since: now,
            auto_off,
        }
    }

    /// Apply a pending toggle, then the auto-off timeout.
    pub fn apply(&mut self, toggle_requested: bool, now: Instant) -> PowerChange {
        let mut change = PowerChange::Unchanged;

        if toggle_requested {
            self.on = !self.on;
            if self.on {
                self.on_since = now;
                change = PowerChange::TurnedOn;
            } else {
                change = PowerChange::TurnedOff;
            }
        }

        if self.on && now.saturating_duration_since(self.on_since) >= self.auto_off {
            self.on = false;
            change = PowerChange::TurnedOff;
        }

        change
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}
