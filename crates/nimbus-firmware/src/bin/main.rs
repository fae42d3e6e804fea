#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_net::{DhcpConfig, Runner, StackResources};
use embassy_time::{Instant, Timer};
use esp_hal::clock::CpuClock;
use esp_hal::gpio::{Input, InputConfig, Pull};
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use esp_radio::wifi::WifiDevice;
use log::{debug, error, info};
use static_cell::StaticCell;

use nimbus_core::app_state::{AppError, error_text};
use nimbus_core::station::{Station, StationParts};
use nimbus_firmware::broker::{BrokerLink, BrokerPublisher, BrokerSettings, broker_task};
use nimbus_firmware::button::{DISPLAY_TOGGLE, button_task};
use nimbus_firmware::hardware;
use nimbus_firmware::ntp::NtpSource;
use nimbus_firmware::secrets;
use nimbus_firmware::wifi::WifiLink;

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

extern crate alloc;

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

/// Unrecoverable bring-up failure.
fn halt(e: AppError) -> ! {
    error!("{}", e);
    panic!("station bring-up failed");
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) -> ! {
    runner.run().await
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    rtt_target::rtt_init_log!();

    let hal_config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(hal_config);

    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 73744);
    esp_alloc::heap_allocator!(size: 64 * 1024);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    info!("Embassy initialized");

    let config = secrets::config();

    static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
    let radio = RADIO.init(esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller"));
    let (controller, interfaces) = esp_radio::wifi::new(radio, peripherals.WIFI, Default::default())
        .expect("Failed to initialize Wi-Fi controller");

    let rng = Rng::new();
    let seed = (u64::from(rng.random()) << 32) | u64::from(rng.random());

    static RESOURCES: StaticCell<StackResources<4>> = StaticCell::new();
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        embassy_net::Config::dhcpv4(DhcpConfig::default()),
        RESOURCES.init(StackResources::new()),
        seed,
    );

    spawner.spawn(net_task(runner).expect("net task spawns once"));
    spawner.spawn(
        broker_task(stack, BrokerSettings::from(&config.broker)).expect("broker task spawns once"),
    );

    let button = Input::new(
        peripherals.GPIO0,
        InputConfig::default().with_pull(Pull::Up),
    );
    spawner.spawn(button_task(button).expect("button task spawns once"));

    let wifi = WifiLink::new(controller, stack, config.wifi.ssid, config.wifi.password)
        .unwrap_or_else(|e| halt(AppError::Wifi(error_text(e))));

    let (humidity, barometric) =
        hardware::init_sensors(peripherals.I2C0, peripherals.GPIO8, peripherals.GPIO9);
    let panel = hardware::init_display(peripherals.I2C1, peripherals.GPIO4, peripherals.GPIO5)
        .inspect_err(|e| error!("{}", e))
        .ok();

    let parts = StationParts {
        humidity,
        barometric,
        wifi,
        time_source: NtpSource::new(stack, config.time.ntp_server),
        broker: BrokerLink,
        publisher: BrokerPublisher,
        panel,
    };

    let mut station = Station::new(parts, &config, Instant::now())
        .unwrap_or_else(|e| halt(AppError::Config(error_text(e))));

    info!("Station running, polling every {} ms", config.poll_interval_ms);

    loop {
        let report = station.tick(Instant::now(), &DISPLAY_TOGGLE).await;
        debug!(
            "Tick: {:?}, sensors {:?}, publish {:?}",
            report.run_state, report.sensors, report.publish
        );

        if station.restart_requested() {
            error!("Connection retries exhausted, restarting");
            Timer::after_millis(100).await;
            esp_hal::system::software_reset();
        }

        Timer::after(config.poll_interval()).await;
    }
}
