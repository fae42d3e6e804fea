//! Connection supervision for Wi-Fi, time sync and the MQTT broker
//!
//! Every network dependency of the station is modelled as a [`Link`] that can
//! be polled for connectivity and asked to connect. A [`ConnectionSupervisor`]
//! wraps one link and owns its retry schedule:
//!
//! - at most one connection attempt per [`ConnectionSupervisor::ensure_connected`]
//!   call, and only once the scheduled retry instant has passed, so the
//!   driving loop never sleeps on a failing link;
//! - bounded or unbounded retries and the reaction to exhaustion come from a
//!   [`RetryPolicy`], not from the link type;
//! - the first successful connection in the process lifetime runs a
//!   [`FirstConnectAction`] exactly once.

use core::fmt::Debug;

use embassy_time::{Duration, Instant};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

/// Something the station has to stay connected to.
pub trait Link {
    type Error: Debug;

    /// Cheap, non-blocking connectivity query.
    fn is_connected(&self) -> bool;

    /// Make one connection attempt.
    fn connect(&mut self, now: Instant) -> impl Future<Output = Result<(), Self::Error>>;
}

/// Read-only connectivity view handed to consumers such as the publish gate.
pub trait Connectivity {
    fn is_connected(&self) -> bool;
}

/// One-time work run on the first successful connection.
pub trait FirstConnectAction {
    fn on_first_connect(&mut self) -> impl Future<Output = ()>;
}

impl FirstConnectAction for () {
    async fn on_first_connect(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    /// Set on the first successful connection and never cleared.
    pub first_connection_done: bool,
}

impl ConnectionState {
    pub const fn new() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            first_connection_done: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

/// What to do once a bounded retry budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustedAction {
    /// Stop trying for `cooldown`, then start a fresh round of attempts.
    GiveUp { cooldown: Duration },
    /// Ask the firmware to reset the device.
    Restart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    pub on_exhausted: ExhaustedAction,
}

/// Pause before a new round of Wi-Fi attempts after giving up.
pub const DEFAULT_GIVE_UP_COOLDOWN: Duration = Duration::from_secs(30);

impl RetryPolicy {
    pub const fn unbounded(backoff: Duration) -> Self {
        Self {
            backoff,
            max_attempts: None,
            on_exhausted: ExhaustedAction::GiveUp {
                cooldown: DEFAULT_GIVE_UP_COOLDOWN,
            },
        }
    }

    pub const fn bounded(backoff: Duration, max_attempts: u32) -> Self {
        Self {
            backoff,
            max_attempts: Some(max_attempts),
            on_exhausted: ExhaustedAction::GiveUp {
                cooldown: DEFAULT_GIVE_UP_COOLDOWN,
            },
        }
    }

    pub const fn with_exhausted_action(mut self, action: ExhaustedAction) -> Self {
        self.on_exhausted = action;
        self
    }

    /// Wi-Fi association: 20 attempts 500 ms apart.
    pub const WIFI: Self = Self::bounded(Duration::from_millis(500), 20);
    /// Broker session: every 5 s, forever.
    pub const BROKER: Self = Self::unbounded(Duration::from_millis(5000));
    /// NTP: every 5 s until the clock is set.
    pub const TIME_SYNC: Self = Self::unbounded(Duration::from_millis(5000));
}

/// Drives a [`Link`] towards the connected state.
pub struct ConnectionSupervisor<L> {
    name: &'static str,
    link: L,
    policy: RetryPolicy,
    state: ConnectionState,
    attempts: u32,
    next_attempt: Option<Instant>,
    restart_requested: bool,
}

impl<L: Link> ConnectionSupervisor<L> {
    pub fn new(name: &'static str, link: L, policy: RetryPolicy) -> Self {
        Self {
            name,
            link,
            policy,
            state: ConnectionState::new(),
            attempts: 0,
            next_attempt: None,
            restart_requested: false,
        }
    }

    /// Bring the link up if it is not, running at most one attempt.
    ///
    /// Returns immediately when already connected or when the next attempt
    /// is not due yet.
    pub async fn ensure_connected<A: FirstConnectAction>(
        &mut self,
        now: Instant,
        on_first_connect: &mut A,
    ) -> ConnectionState {
        if self.state.is_connected() {
            if self.link.is_connected() {
                return self.state;
            }
            warn!("{}: connection lost", self.name);
            self.state.status = ConnectionStatus::Disconnected;
            self.attempts = 0;
            self.next_attempt = None;
        }

        if self.restart_requested {
            return self.state;
        }

        if self.next_attempt.is_some_and(|at| now < at) {
            return self.state;
        }

        self.state.status = ConnectionStatus::Connecting;
        self.attempts += 1;

        let result = if self.link.is_connected() {
            Ok(())
        } else {
            self.link.connect(now).await
        };

        match result {
            Ok(()) => self.on_connected(on_first_connect).await,
            Err(e) => self.on_attempt_failed(now, e),
        }

        self.state
    }

    async fn on_connected<A: FirstConnectAction>(&mut self, on_first_connect: &mut A) {
        info!("{}: connected after {} attempt(s)", self.name, self.attempts);
        self.state.status = ConnectionStatus::Connected;
        self.attempts = 0;
        self.next_attempt = None;

        if !self.state.first_connection_done {
            self.state.first_connection_done = true;
            on_first_connect.on_first_connect().await;
        }
    }

    fn on_attempt_failed(&mut self, now: Instant, e: L::Error) {
        let exhausted = self
            .policy
            .max_attempts
            .is_some_and(|max| self.attempts >= max);

        if !exhausted {
            warn!(
                "{}: attempt {} failed: {:?}, retrying in {} ms",
                self.name,
                self.attempts,
                e,
                self.policy.backoff.as_millis()
            );
            self.next_attempt = Some(now + self.policy.backoff);
            return;
        }

        self.state.status = ConnectionStatus::Disconnected;
        match self.policy.on_exhausted {
            ExhaustedAction::GiveUp { cooldown } => {
                error!(
                    "{}: giving up after {} attempts ({:?}), next round in {} s",
                    self.name,
                    self.attempts,
                    e,
                    cooldown.as_secs()
                );
                self.attempts = 0;
                self.next_attempt = Some(now + cooldown);
            }
            ExhaustedAction::Restart => {
                error!(
                    "{}: failed {} attempts ({:?}), requesting restart",
                    self.name, self.attempts, e
                );
                self.restart_requested = true;
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// [`Self::state`] corrected by the link's own connectivity, for callers
    /// that read it between checks. A dropped link reads as disconnected.
    pub fn live_state(&self) -> ConnectionState {
        if self.state.is_connected() && !self.link.is_connected() {
            ConnectionState {
                status: ConnectionStatus::Disconnected,
                ..self.state
            }
        } else {
            self.state
        }
    }

    pub fn restart_requested(&self) -> bool {
        self.restart_requested
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }
}

impl<L: Link> Connectivity for ConnectionSupervisor<L> {
    fn is_connected(&self) -> bool {
        self.state.is_connected() && self.link.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    /// Link that fails `failures_left` times, then connects. `up` can be
    /// cleared to simulate a dropped connection.
    struct FlakyLink {
        failures_left: u32,
        up: bool,
        connect_calls: u32,
    }

    impl FlakyLink {
        fn failing(times: u32) -> Self {
            Self {
                failures_left: times,
                up: false,
                connect_calls: 0,
            }
        }
    }

    impl Link for FlakyLink {
        type Error = &'static str;

        fn is_connected(&self) -> bool {
            self.up
        }

        async fn connect(&mut self, _now: Instant) -> Result<(), Self::Error> {
            self.connect_calls += 1;
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err("refused");
            }
            self.up = true;
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountAnnouncements(u32);

    impl FirstConnectAction for CountAnnouncements {
        async fn on_first_connect(&mut self) {
            self.0 += 1;
        }
    }

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn test_connects_and_announces_once() {
        let mut supervisor =
            ConnectionSupervisor::new("broker", FlakyLink::failing(0), RetryPolicy::BROKER);
        let mut announcements = CountAnnouncements::default();

        let state = block_on(supervisor.ensure_connected(at(0), &mut announcements));

        assert_eq!(state.status, ConnectionStatus::Connected);
        assert!(state.first_connection_done);
        assert_eq!(announcements.0, 1);
        assert!(supervisor.is_connected());
    }

    #[test]
    fn test_noop_when_connected() {
        let mut supervisor =
            ConnectionSupervisor::new("broker", FlakyLink::failing(0), RetryPolicy::BROKER);
        block_on(supervisor.ensure_connected(at(0), &mut ()));
        block_on(supervisor.ensure_connected(at(10), &mut ()));
        block_on(supervisor.ensure_connected(at(20), &mut ()));

        assert_eq!(supervisor.link().connect_calls, 1);
    }

    #[test]
    fn test_retry_waits_for_backoff() {
        let mut supervisor =
            ConnectionSupervisor::new("broker", FlakyLink::failing(1), RetryPolicy::BROKER);

        let state = block_on(supervisor.ensure_connected(at(0), &mut ()));
        assert_eq!(state.status, ConnectionStatus::Connecting);

        let state = block_on(supervisor.ensure_connected(at(4999), &mut ()));
        assert_eq!(state.status, ConnectionStatus::Connecting);
        assert_eq!(supervisor.link().connect_calls, 1, "attempted before backoff elapsed");

        let state = block_on(supervisor.ensure_connected(at(5000), &mut ()));
        assert_eq!(state.status, ConnectionStatus::Connected);
        assert_eq!(supervisor.link().connect_calls, 2);
    }

    #[test]
    fn test_first_connection_flag_survives_reconnects() {
        let mut supervisor =
            ConnectionSupervisor::new("broker", FlakyLink::failing(0), RetryPolicy::BROKER);
        let mut announcements = CountAnnouncements::default();
        let mut flips = 0;
        let mut was_done = false;

        for cycle in 0..5u64 {
            let state = block_on(supervisor.ensure_connected(at(cycle * 10_000), &mut announcements));
            if state.first_connection_done && !was_done {
                flips += 1;
            }
            assert!(!(was_done && !state.first_connection_done), "flag was reset");
            was_done = state.first_connection_done;

            // Drop the link and make the next attempt fail once.
            supervisor.link_mut().up = false;
            supervisor.link_mut().failures_left = 1;
            let state = block_on(supervisor.ensure_connected(at(cycle * 10_000 + 1), &mut announcements));
            assert_ne!(state.status, ConnectionStatus::Connected);
            assert!(state.first_connection_done);
        }

        assert_eq!(flips, 1);
        assert_eq!(announcements.0, 1, "discovery repeated on reconnect");
    }

    #[test]
    fn test_lost_link_is_detected_by_polling() {
        let mut supervisor =
            ConnectionSupervisor::new("wifi", FlakyLink::failing(0), RetryPolicy::WIFI);
        block_on(supervisor.ensure_connected(at(0), &mut ()));

        supervisor.link_mut().up = false;
        assert!(!supervisor.is_connected(), "connectivity query must see the drop");

        let state = block_on(supervisor.ensure_connected(at(100), &mut ()));
        assert_eq!(state.status, ConnectionStatus::Connected);
        assert_eq!(supervisor.link().connect_calls, 2, "reconnect is attempted immediately");
    }

    #[test]
    fn test_already_up_link_skips_connect() {
        let mut link = FlakyLink::failing(0);
        link.up = true;
        let mut supervisor = ConnectionSupervisor::new("wifi", link, RetryPolicy::WIFI);

        let state = block_on(supervisor.ensure_connected(at(0), &mut ()));

        assert_eq!(state.status, ConnectionStatus::Connected);
        assert_eq!(supervisor.link().connect_calls, 0);
    }

    #[test]
    fn test_bounded_give_up_cools_down() {
        let policy = RetryPolicy::bounded(Duration::from_millis(500), 3).with_exhausted_action(
            ExhaustedAction::GiveUp {
                cooldown: Duration::from_secs(10),
            },
        );
        let mut supervisor = ConnectionSupervisor::new("wifi", FlakyLink::failing(10), policy);

        for i in 0..3u64 {
            block_on(supervisor.ensure_connected(at(i * 500), &mut ()));
        }
        assert_eq!(supervisor.state().status, ConnectionStatus::Disconnected);
        assert_eq!(supervisor.link().connect_calls, 3);

        block_on(supervisor.ensure_connected(at(1500), &mut ()));
        block_on(supervisor.ensure_connected(at(9999), &mut ()));
        assert_eq!(supervisor.link().connect_calls, 3, "no attempts during cooldown");

        block_on(supervisor.ensure_connected(at(11_000), &mut ()));
        assert_eq!(supervisor.link().connect_calls, 4);
        assert!(!supervisor.restart_requested());
    }

    #[test]
    fn test_bounded_restart_policy() {
        let policy = RetryPolicy::bounded(Duration::from_millis(500), 2)
            .with_exhausted_action(ExhaustedAction::Restart);
        let mut supervisor = ConnectionSupervisor::new("wifi", FlakyLink::failing(10), policy);

        block_on(supervisor.ensure_connected(at(0), &mut ()));
        assert!(!supervisor.restart_requested());
        block_on(supervisor.ensure_connected(at(500), &mut ()));
        assert!(supervisor.restart_requested());

        block_on(supervisor.ensure_connected(at(60_000), &mut ()));
        assert_eq!(supervisor.link().connect_calls, 2, "no attempts once restart is pending");
    }

    #[test]
    fn test_unbounded_never_exhausts() {
        let mut supervisor =
            ConnectionSupervisor::new("broker", FlakyLink::failing(100), RetryPolicy::BROKER);

        for i in 0..100u64 {
            block_on(supervisor.ensure_connected(at(i * 5000), &mut ()));
        }

        assert_eq!(supervisor.link().connect_calls, 100);
        assert_eq!(supervisor.state().status, ConnectionStatus::Connecting);
        assert!(!supervisor.restart_requested());
    }
}
