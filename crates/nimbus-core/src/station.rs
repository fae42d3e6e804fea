//! The station application context and its driving loop body
//!
//! [`Station`] owns every component and exposes one operation, [`Station::tick`],
//! which the firmware calls once per poll interval:
//!
//! 1. Wi-Fi supervisor check
//! 2. if Wi-Fi is up, clock sync and broker supervisor checks (the first broker
//!    connection announces discovery)
//! 3. sensor read
//! 4. publish gate
//! 5. display update with the pending button toggle
//!
//! Nothing in a tick sleeps. Retries are scheduled by the supervisors and the
//! publish gate and simply skipped until due.

use core::fmt::Debug;

use embassy_time::Instant;
use log::warn;

use crate::app_state::AppRunState;
use crate::clock::{ClockSync, TimeSource};
use crate::config::Config;
use crate::connection::{ConnectionSupervisor, Link};
use crate::display::{DisplayPanel, DisplayPower, DisplayPresenter, Snapshot, ToggleFlag};
use crate::publish::{DiscoveryAnnouncer, PublishGate, PublishOutcome, Publisher, TopicError};
use crate::sensors::{BarometricSensor, HumiditySensor, Reading, SensorError, SensorReader};

/// Hardware and transport pieces a [`Station`] is assembled from.
pub struct StationParts<H, B, W, T, M, P, D> {
    pub humidity: H,
    pub barometric: B,
    pub wifi: W,
    pub time_source: T,
    pub broker: M,
    pub publisher: P,
    /// `None` when the display failed to initialise.
    pub panel: Option<D>,
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub sensors: Result<Reading, SensorError>,
    pub publish: PublishOutcome,
    pub run_state: AppRunState,
}

pub struct Station<H, B, W, T, M, P, D> {
    reader: SensorReader<H, B>,
    wifi: ConnectionSupervisor<W>,
    clock: ConnectionSupervisor<ClockSync<T>>,
    broker: ConnectionSupervisor<M>,
    publisher: P,
    gate: PublishGate,
    presenter: DisplayPresenter<D>,
}

impl<H, B, W, T, M, P, D> Station<H, B, W, T, M, P, D>
where
    H: HumiditySensor,
    B: BarometricSensor,
    W: Link,
    T: TimeSource,
    M: Link,
    P: Publisher,
    D: DisplayPanel,
    D::Error: Debug,
{
    pub fn new(
        parts: StationParts<H, B, W, T, M, P, D>,
        config: &Config<'_>,
        now: Instant,
    ) -> Result<Self, TopicError> {
        let topics = config.discovery.topic_set()?;

        Ok(Self {
            reader: SensorReader::with_alpha(
                parts.humidity,
                parts.barometric,
                config.calibration,
                config.smoothing_alpha,
            ),
            wifi: ConnectionSupervisor::new("WiFi", parts.wifi, config.retry.wifi.policy()),
            clock: ConnectionSupervisor::new(
                "NTP",
                ClockSync::new(parts.time_source, config.time.time_zone()),
                config.retry.time_sync.policy(),
            ),
            broker: ConnectionSupervisor::new("MQTT", parts.broker, config.retry.broker.policy()),
            publisher: parts.publisher,
            gate: PublishGate::new(topics),
            presenter: DisplayPresenter::with_power(
                parts.panel,
                DisplayPower::with_auto_off(now, config.display.auto_off()),
            ),
        })
    }

    /// Run one pass of the driving loop.
    pub async fn tick(&mut self, now: Instant, toggle: &ToggleFlag) -> TickReport {
        let wifi = self.wifi.ensure_connected(now, &mut ()).await;
        if wifi.is_connected() {
            self.clock.ensure_connected(now, &mut ()).await;

            let mut announcer = DiscoveryAnnouncer::new(self.gate.topics(), &mut self.publisher);
            self.broker.ensure_connected(now, &mut announcer).await;
        }

        let sensors = self.reader.read(now).await;
        let reading = self.reader.current();

        let publish = self
            .gate
            .maybe_publish(&self.broker, &mut self.publisher, &reading, now)
            .await;

        let time = self.clock.link().time_string(now);
        let snapshot = Snapshot {
            reading,
            broker: self.broker.live_state(),
            publish: self.gate.record(),
            time: &time,
        };
        if let Err(e) = self.presenter.update(&snapshot, toggle.take(), now) {
            warn!("Display update failed: {:?}", e);
        }

        TickReport {
            sensors,
            publish,
            run_state: self.run_state(),
        }
    }

    pub fn run_state(&self) -> AppRunState {
        AppRunState::from_links(
            self.wifi.live_state(),
            self.clock.live_state(),
            self.broker.live_state(),
            self.restart_requested(),
        )
    }

    /// A `Restart` retry policy was exhausted; the firmware should reset.
    pub fn restart_requested(&self) -> bool {
        self.wifi.restart_requested()
            || self.clock.restart_requested()
            || self.broker.restart_requested()
    }

    pub fn reader(&self) -> &SensorReader<H, B> {
        &self.reader
    }

    pub fn wifi(&self) -> &ConnectionSupervisor<W> {
        &self.wifi
    }

    pub fn clock(&self) -> &ConnectionSupervisor<ClockSync<T>> {
        &self.clock
    }

    pub fn broker(&self) -> &ConnectionSupervisor<M> {
        &self.broker
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn gate(&self) -> &PublishGate {
        &self.gate
    }

    pub fn presenter(&self) -> &DisplayPresenter<D> {
        &self.presenter
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::clock::TIME_PLACEHOLDER;
    use crate::config::RetryPolicyConfig;
    use crate::connection::ConnectionStatus;
    use crate::display::StationScreen;
    use crate::publish::SkipReason;
    use crate::sensors::{BarometricSample, CalibrationOffsets};
    use core::cell::Cell;
    use core::convert::Infallible;
    use embassy_futures::block_on;
    use embedded_graphics::{Pixel, pixelcolor::BinaryColor, prelude::*};
    use std::string::{String, ToString};
    use std::vec::Vec;

    struct FixedHumidity(f32);

    impl HumiditySensor for FixedHumidity {
        async fn read_humidity(&mut self) -> Result<f32, SensorError> {
            Ok(self.0)
        }
    }

    struct FixedBarometer(BarometricSample);

    impl BarometricSensor for FixedBarometer {
        async fn read_barometric(&mut self) -> Result<BarometricSample, SensorError> {
            Ok(self.0)
        }
    }

    /// Link whose state lives in a shared cell so tests can cut it.
    struct CellLink<'a> {
        up: &'a Cell<bool>,
        reachable: &'a Cell<bool>,
        connects: &'a Cell<u32>,
    }

    impl Link for CellLink<'_> {
        type Error = &'static str;

        fn is_connected(&self) -> bool {
            self.up.get()
        }

        async fn connect(&mut self, _now: Instant) -> Result<(), Self::Error> {
            self.connects.set(self.connects.get() + 1);
            if !self.reachable.get() {
                return Err("unreachable");
            }
            self.up.set(true);
            Ok(())
        }
    }

    struct FixedTime;

    impl TimeSource for FixedTime {
        type Error = &'static str;

        async fn sync(&mut self) -> Result<u64, Self::Error> {
            Ok(1_700_000_000)
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        sent: Vec<(String, String)>,
    }

    impl Publisher for RecordingPublisher {
        type Error = Infallible;

        async fn publish(&mut self, topic: &str, payload: &[u8], _retain: bool) -> Result<(), Self::Error> {
            self.sent.push((
                topic.to_string(),
                String::from_utf8_lossy(payload).into_owned(),
            ));
            Ok(())
        }
    }

    impl RecordingPublisher {
        fn count(&self, suffix: &str) -> usize {
            self.sent.iter().filter(|(topic, _)| topic.ends_with(suffix)).count()
        }
    }

    #[derive(Default)]
    struct Panel {
        lit: usize,
    }

    impl OriginDimensions for Panel {
        fn size(&self) -> Size {
            Size::new(128, 64)
        }
    }

    impl DrawTarget for Panel {
        type Color = BinaryColor;
        type Error = Infallible;

        fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
        where
            I: IntoIterator<Item = Pixel<Self::Color>>,
        {
            self.lit += pixels.into_iter().filter(|Pixel(_, c)| c.is_on()).count();
            Ok(())
        }

        fn clear(&mut self, _color: Self::Color) -> Result<(), Self::Error> {
            self.lit = 0;
            Ok(())
        }
    }

    impl DisplayPanel for Panel {
        fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn set_powered(&mut self, _on: bool) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    struct Net {
        wifi_up: Cell<bool>,
        wifi_reachable: Cell<bool>,
        wifi_connects: Cell<u32>,
        broker_up: Cell<bool>,
        broker_reachable: Cell<bool>,
        broker_connects: Cell<u32>,
    }

    impl Net {
        fn new() -> Self {
            Self {
                wifi_up: Cell::new(false),
                wifi_reachable: Cell::new(true),
                wifi_connects: Cell::new(0),
                broker_up: Cell::new(false),
                broker_reachable: Cell::new(true),
                broker_connects: Cell::new(0),
            }
        }
    }

    type TestStation<'a> = Station<
        FixedHumidity,
        FixedBarometer,
        CellLink<'a>,
        FixedTime,
        CellLink<'a>,
        RecordingPublisher,
        Panel,
    >;

    fn station<'a>(net: &'a Net, config: &Config<'_>) -> TestStation<'a> {
        let parts = StationParts {
            humidity: FixedHumidity(45.0),
            barometric: FixedBarometer(BarometricSample {
                temperature_celsius: 20.0,
                pressure_hpa: 1013.25,
                altitude_m: None,
            }),
            wifi: CellLink {
                up: &net.wifi_up,
                reachable: &net.wifi_reachable,
                connects: &net.wifi_connects,
            },
            time_source: FixedTime,
            broker: CellLink {
                up: &net.broker_up,
                reachable: &net.broker_reachable,
                connects: &net.broker_connects,
            },
            publisher: RecordingPublisher::default(),
            panel: Some(Panel::default()),
        };
        Station::new(parts, config, Instant::from_millis(0)).unwrap()
    }

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn test_first_tick_connects_announces_and_publishes() {
        let net = Net::new();
        let config = Config {
            calibration: CalibrationOffsets::new(0.5, 0.0, 0.0),
            ..Config::default()
        };
        let mut station = station(&net, &config);
        let toggle = ToggleFlag::new();

        let report = block_on(station.tick(at(0), &toggle));

        assert_eq!(report.run_state, AppRunState::Running);
        assert_eq!(report.publish, PublishOutcome::Sent);
        assert!(report.sensors.is_ok());
        assert_eq!(station.publisher().count("/config"), 4, "discovery not announced");
        assert_eq!(station.publisher().count("/state"), 4);

        let temperature = station
            .publisher()
            .sent
            .iter()
            .find(|(topic, _)| topic == "homeassistant/sensor/esp32_temperature/state")
            .map(|(_, payload)| payload.clone());
        assert_eq!(temperature.as_deref(), Some("{\"temperature\": 68.90}"));

        assert_ne!(
            station.clock().link().time_string(at(0)).as_str(),
            TIME_PLACEHOLDER
        );
        assert!(station.presenter().panel().unwrap().lit > 0);
    }

    #[test]
    fn test_wifi_down_skips_network_work() {
        let net = Net::new();
        net.wifi_reachable.set(false);
        let mut station = station(&net, &Config::default());
        let toggle = ToggleFlag::new();

        let report = block_on(station.tick(at(0), &toggle));

        assert_eq!(report.run_state, AppRunState::WifiConnecting);
        assert_eq!(report.publish, PublishOutcome::Skipped(SkipReason::NotConnected));
        assert_eq!(net.broker_connects.get(), 0, "broker attempted without Wi-Fi");
        assert!(report.sensors.is_ok(), "sensors are read regardless of the network");
        assert!(station.publisher().sent.is_empty());
    }

    #[test]
    fn test_broker_reconnect_does_not_repeat_discovery() {
        let net = Net::new();
        let mut station = station(&net, &Config::default());
        let toggle = ToggleFlag::new();

        block_on(station.tick(at(0), &toggle));
        net.broker_up.set(false);
        net.broker_reachable.set(false);

        let report = block_on(station.tick(at(2000), &toggle));
        assert_eq!(report.publish, PublishOutcome::Skipped(SkipReason::NotConnected));
        assert_eq!(station.broker().state().status, ConnectionStatus::Connecting);

        net.broker_reachable.set(true);
        let report = block_on(station.tick(at(4000), &toggle));
        assert_eq!(report.publish, PublishOutcome::Skipped(SkipReason::RetryPending));

        let report = block_on(station.tick(at(8000), &toggle));
        assert_eq!(report.publish, PublishOutcome::Sent);
        assert!(station.broker().state().first_connection_done);
        assert_eq!(station.publisher().count("/config"), 4);
        assert_eq!(station.publisher().count("/state"), 8);
    }

    #[test]
    fn test_button_toggles_display() {
        let net = Net::new();
        let mut station = station(&net, &Config::default());
        let toggle = ToggleFlag::new();

        block_on(station.tick(at(0), &toggle));
        assert!(station.presenter().is_on());

        toggle.request(100);
        block_on(station.tick(at(2000), &toggle));
        assert!(!station.presenter().is_on());
        assert!(!toggle.take(), "tick must consume the toggle");
    }

    #[test]
    fn test_restart_policy_surfaces_through_station() {
        let net = Net::new();
        net.wifi_reachable.set(false);
        let mut config = Config::default();
        config.retry.wifi = RetryPolicyConfig {
            backoff_ms: 500,
            max_attempts: Some(2),
            restart_on_exhaustion: true,
            cooldown_ms: 0,
        };
        let mut station = station(&net, &config);
        let toggle = ToggleFlag::new();

        block_on(station.tick(at(0), &toggle));
        assert!(!station.restart_requested());
        let report = block_on(station.tick(at(500), &toggle));

        assert!(station.restart_requested());
        assert_eq!(report.run_state, AppRunState::RestartPending);
    }

    #[test]
    fn test_wifi_drop_shows_broker_offline() {
        let net = Net::new();
        let mut station = station(&net, &Config::default());
        let toggle = ToggleFlag::new();

        block_on(station.tick(at(0), &toggle));
        net.wifi_up.set(false);
        net.wifi_reachable.set(false);
        net.broker_up.set(false);

        let now = at(10_000);
        let report = block_on(station.tick(now, &toggle));

        assert_eq!(report.run_state, AppRunState::WifiConnecting);
        assert_eq!(
            station.broker().state().status,
            ConnectionStatus::Connected,
            "broker supervisor is not polled without Wi-Fi"
        );
        let live = station.broker().live_state();
        assert!(!live.is_connected());
        assert!(live.first_connection_done);

        let time = station.clock().link().time_string(now);
        let snapshot = Snapshot {
            reading: station.reader().current(),
            broker: live,
            publish: station.gate().record(),
            time: &time,
        };
        let screen = StationScreen::new(&snapshot, now);
        assert_eq!(screen.lines()[4].as_deref(), Some("MQTT offline"));

        let mut expected = Panel::default();
        screen.draw(&mut expected).unwrap();
        assert_eq!(
            station.presenter().panel().unwrap().lit,
            expected.lit,
            "rendered screen must use the live broker status"
        );
    }
}
