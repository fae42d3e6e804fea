//! SNTP time source over embassy-net UDP

use embassy_net::dns::DnsQueryType;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::Stack;
use embassy_time::{Duration, with_timeout};
use log::{info, warn};
use nimbus_core::clock::{ClockError, NTP_PACKET_LEN, NTP_PORT, TimeSource, ntp_request, parse_ntp_response};
use thiserror_no_std::Error;

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Error, Debug)]
pub enum NtpError {
    #[error("NTP server could not be resolved")]
    Dns,
    #[error("UDP socket error")]
    Socket,
    #[error("No response from NTP server")]
    Timeout,
    #[error("Bad NTP response: {0}")]
    Response(ClockError),
}

pub struct NtpSource {
    stack: Stack<'static>,
    server: &'static str,
}

impl NtpSource {
    pub fn new(stack: Stack<'static>, server: &'static str) -> Self {
        Self { stack, server }
    }
}

impl TimeSource for NtpSource {
    type Error = NtpError;

    async fn sync(&mut self) -> Result<u64, Self::Error> {
        let address = self
            .stack
            .dns_query(self.server, DnsQueryType::A)
            .await
            .ok()
            .and_then(|addresses| addresses.first().copied())
            .ok_or(NtpError::Dns)?;

        let mut rx_meta = [PacketMetadata::EMPTY; 1];
        let mut rx_buffer = [0u8; 128];
        let mut tx_meta = [PacketMetadata::EMPTY; 1];
        let mut tx_buffer = [0u8; 128];
        let mut socket = UdpSocket::new(
            self.stack,
            &mut rx_meta,
            &mut rx_buffer,
            &mut tx_meta,
            &mut tx_buffer,
        );
        socket.bind(0).map_err(|e| {
            warn!("NTP: bind failed: {:?}", e);
            NtpError::Socket
        })?;

        socket
            .send_to(&ntp_request(), (address, NTP_PORT))
            .await
            .map_err(|e| {
                warn!("NTP: send failed: {:?}", e);
                NtpError::Socket
            })?;

        let mut packet = [0u8; NTP_PACKET_LEN];
        let (len, _) = with_timeout(RESPONSE_TIMEOUT, socket.recv_from(&mut packet))
            .await
            .map_err(|_| NtpError::Timeout)?
            .map_err(|e| {
                warn!("NTP: receive failed: {:?}", e);
                NtpError::Socket
            })?;

        let secs = parse_ntp_response(&packet[..len]).map_err(NtpError::Response)?;
        info!("NTP: time from {}", self.server);
        Ok(secs)
    }
}
