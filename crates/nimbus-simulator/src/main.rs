//! Desktop simulator for the nimbus weather station.
//!
//! Runs the real [`Station`] loop against synthetic sensors, an in-process
//! network and a logging MQTT publisher, and renders the OLED in an SDL2
//! window via `embedded-graphics-simulator`.
//!
//! # Key bindings
//!
//! | Key   | Action                              |
//! |-------|-------------------------------------|
//! | Space | Display button                      |
//! | W     | Drop / restore Wi-Fi                |
//! | M     | Drop / restore the MQTT broker      |
//! | H     | Fail / restore the humidity sensor  |
//! | Q     | Quit                                |
//!
//! An optional JSON station config can be passed as the first argument, see
//! `station.json`.

mod sim;

use std::time::Duration;

use embassy_futures::block_on;
use embassy_time::Instant;
use embedded_graphics_simulator::{
    BinaryColorTheme, OutputSettingsBuilder, SimulatorEvent, Window, sdl2::Keycode,
};
use log::{error, info};

use nimbus_core::config::Config;
use nimbus_core::display::ToggleFlag;
use nimbus_core::station::{Station, StationParts};

use sim::{Faults, HostClock, LogPublisher, MockBarometer, MockHumidity, MockLink, SimPanel};

/// Pixel scale factor for the simulator window.
const WINDOW_SCALE: u32 = 4;

/// Target frame duration (~30 FPS).
const FRAME_DURATION: Duration = Duration::from_millis(33);

static DISPLAY_TOGGLE: ToggleFlag = ToggleFlag::new();

fn load_config_text() -> Option<String> {
    let path = std::env::args().nth(1)?;
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            info!("Config: loaded {}", path);
            Some(text)
        }
        Err(e) => {
            error!("Config: cannot read {}: {}", path, e);
            None
        }
    }
}

fn main() {
    env_logger::init();
    info!("Starting nimbus simulator");
    info!("Keys: Space=Button  W=WiFi  M=Broker  H=Humidity  Q=Quit");

    let config_text = load_config_text();
    let config = match config_text.as_deref().map(|text| serde_json::from_str::<Config>(text)) {
        Some(Ok(config)) => config,
        Some(Err(e)) => {
            error!("Config: invalid JSON ({}), using defaults", e);
            Config::default()
        }
        None => Config::default(),
    };

    let faults = Faults::default();
    let parts = StationParts {
        humidity: MockHumidity::new(faults.clone()),
        barometric: MockBarometer::new(),
        wifi: MockLink::new("WiFi", faults.wifi_down.clone()),
        time_source: HostClock::new(faults.wifi_down.clone()),
        broker: MockLink::new("MQTT", faults.broker_down.clone()),
        publisher: LogPublisher::new(faults.broker_down.clone()),
        panel: Some(SimPanel::new()),
    };

    let mut station = match Station::new(parts, &config, Instant::now()) {
        Ok(station) => station,
        Err(e) => {
            error!("Discovery topics do not fit: {}", e);
            return;
        }
    };

    let output_settings = OutputSettingsBuilder::new()
        .scale(WINDOW_SCALE)
        .theme(BinaryColorTheme::OledBlue)
        .build();
    let mut window = Window::new("Nimbus Simulator", &output_settings);

    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    let mut last_tick: Option<std::time::Instant> = None;

    'running: loop {
        let frame_start = std::time::Instant::now();

        // --- Station loop -------------------------------------------------
        if last_tick.is_none_or(|t| t.elapsed() >= poll_interval) {
            let report = block_on(station.tick(Instant::now(), &DISPLAY_TOGGLE));
            info!(
                "Tick: {:?}, publish {:?}, published {} messages so far",
                report.run_state,
                report.publish,
                station.publisher().sent
            );
            if let Err(e) = report.sensors {
                info!("Sensors: {}", e);
            }
            if station.restart_requested() {
                error!("Connection retries exhausted, the device would restart now");
                break 'running;
            }
            last_tick = Some(std::time::Instant::now());
        }

        // The SDL window is lazily initialized on the first `update()` call,
        // which must happen before `events()`.
        if let Some(panel) = station.presenter().panel() {
            window.update(panel.visible());
        }

        // --- SDL events ---------------------------------------------------
        for event in window.events() {
            match event {
                SimulatorEvent::Quit => break 'running,
                SimulatorEvent::KeyDown { keycode, .. } => match keycode {
                    Keycode::Q | Keycode::Escape => break 'running,
                    Keycode::Space => {
                        if DISPLAY_TOGGLE.request(Instant::now().as_millis() as u32) {
                            info!("Button pressed");
                        }
                    }
                    Keycode::W => Faults::flip(&faults.wifi_down, "WiFi"),
                    Keycode::M => Faults::flip(&faults.broker_down, "Broker"),
                    Keycode::H => Faults::flip(&faults.humidity_failed, "Humidity sensor"),
                    _ => {}
                },
                _ => {}
            }
        }

        // --- Frame pacing -------------------------------------------------
        let elapsed = frame_start.elapsed();
        if elapsed < FRAME_DURATION {
            std::thread::sleep(FRAME_DURATION - elapsed);
        }
    }

    info!("Simulator exiting");
}
