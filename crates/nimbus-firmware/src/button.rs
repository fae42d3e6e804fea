//! BOOT button (GPIO0) display toggle

use embassy_time::Instant;
use esp_hal::gpio::Input;
use log::debug;
use nimbus_core::display::ToggleFlag;

/// Set by the button task, taken by the station before each render.
pub static DISPLAY_TOGGLE: ToggleFlag = ToggleFlag::new();

/// Waits on the falling-edge interrupt and records a toggle request.
#[embassy_executor::task]
pub async fn button_task(mut button: Input<'static>) -> ! {
    loop {
        button.wait_for_falling_edge().await;
        if DISPLAY_TOGGLE.request(Instant::now().as_millis() as u32) {
            debug!("Button: display toggle requested");
        }
    }
}
