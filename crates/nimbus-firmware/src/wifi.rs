//! Wi-Fi station link

use embassy_net::Stack;
use embassy_time::{Duration, Instant, with_timeout};
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController, WifiError};
use log::{info, warn};
use nimbus_core::connection::Link;
use thiserror_no_std::Error;

/// How long to wait for DHCP after association.
const DHCP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum WifiLinkError {
    #[error("Radio error: {0:?}")]
    Radio(WifiError),
    #[error("No DHCP lease")]
    NoAddress,
}

impl From<WifiError> for WifiLinkError {
    fn from(e: WifiError) -> Self {
        WifiLinkError::Radio(e)
    }
}

/// Station-mode Wi-Fi. Connected means associated and holding an IPv4 lease.
pub struct WifiLink {
    controller: WifiController<'static>,
    stack: Stack<'static>,
    started: bool,
}

impl WifiLink {
    pub fn new(
        mut controller: WifiController<'static>,
        stack: Stack<'static>,
        ssid: &str,
        password: &str,
    ) -> Result<Self, WifiLinkError> {
        let client = ClientConfig::default()
            .with_ssid(ssid.into())
            .with_password(password.into());
        controller.set_config(&ModeConfig::Client(client))?;

        Ok(Self {
            controller,
            stack,
            started: false,
        })
    }
}

impl Link for WifiLink {
    type Error = WifiLinkError;

    fn is_connected(&self) -> bool {
        self.controller.is_connected().unwrap_or(false) && self.stack.is_config_up()
    }

    async fn connect(&mut self, _now: Instant) -> Result<(), Self::Error> {
        if !self.started {
            self.controller.start_async().await?;
            self.started = true;
            info!("WiFi: started STA mode");
        }

        if !self.controller.is_connected().unwrap_or(false) {
            self.controller.connect_async().await?;
        }

        if with_timeout(DHCP_TIMEOUT, self.stack.wait_config_up())
            .await
            .is_err()
        {
            warn!("WiFi: associated but no DHCP lease yet");
            return Err(WifiLinkError::NoAddress);
        }

        if let Some(config) = self.stack.config_v4() {
            info!("WiFi: connected, address {}", config.address);
        }
        Ok(())
    }
}
