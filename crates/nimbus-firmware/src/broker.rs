//! MQTT session task and the handles the station uses to drive it
//!
//! The rust-mqtt client borrows its socket and buffers, so the whole session
//! lives inside [`broker_task`]. The station talks to it through two bounded
//! channels (one request in flight at a time) and reads connectivity from an
//! atomic flag.

use core::net::Ipv4Addr;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_futures::select::{Either, select};
use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::TcpSocket;
use embassy_net::{IpAddress, Stack};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Instant, Timer};
use heapless::Vec;
use log::{debug, error, info, warn};
use nimbus_core::connection::Link;
use nimbus_core::publish::Publisher;
use rust_mqtt::client::client::MqttClient;
use rust_mqtt::client::client_config::{ClientConfig, MqttVersion};
use rust_mqtt::packet::v5::publish_packet::QualityOfService;
use rust_mqtt::packet::v5::reason_codes::ReasonCode;
use rust_mqtt::utils::rng_generator::CountingRng;
use thiserror_no_std::Error;

const SOCKET_BUFFER: usize = 1024;
const MQTT_BUFFER: usize = 512;
const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_TOPIC: usize = 96;
const MAX_PAYLOAD: usize = 384;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Broker host could not be resolved")]
    Dns,
    #[error("TCP connect failed")]
    Tcp,
    #[error("Broker refused: {0:?}")]
    Mqtt(ReasonCode),
    #[error("No broker session")]
    NotConnected,
    #[error("Message does not fit the request buffer")]
    TooLarge,
}

pub enum BrokerRequest {
    Connect,
    Publish {
        topic: Vec<u8, MAX_TOPIC>,
        payload: Vec<u8, MAX_PAYLOAD>,
        retain: bool,
    },
}

type Response = Result<(), BrokerError>;

static REQUESTS: Channel<CriticalSectionRawMutex, BrokerRequest, 1> = Channel::new();
static RESPONSES: Channel<CriticalSectionRawMutex, Response, 1> = Channel::new();
static SESSION_UP: AtomicBool = AtomicBool::new(false);

/// Where and as whom to connect.
#[derive(Clone, Copy)]
pub struct BrokerSettings {
    pub host: &'static str,
    pub port: u16,
    pub client_id: &'static str,
    pub username: &'static str,
    pub password: &'static str,
    pub keep_alive_secs: u16,
}

impl From<&nimbus_core::config::BrokerConfig<'static>> for BrokerSettings {
    fn from(config: &nimbus_core::config::BrokerConfig<'static>) -> Self {
        Self {
            host: config.host,
            port: config.port,
            client_id: config.client_id,
            username: config.username,
            password: config.password,
            keep_alive_secs: config.keep_alive_secs,
        }
    }
}

#[embassy_executor::task]
pub async fn broker_task(stack: Stack<'static>, settings: BrokerSettings) -> ! {
    let mut rx_buffer = [0u8; SOCKET_BUFFER];
    let mut tx_buffer = [0u8; SOCKET_BUFFER];
    let mut mqtt_tx = [0u8; MQTT_BUFFER];
    let mut mqtt_rx = [0u8; MQTT_BUFFER];

    loop {
        match REQUESTS.receive().await {
            BrokerRequest::Connect => {}
            BrokerRequest::Publish { .. } => {
                RESPONSES.send(Err(BrokerError::NotConnected)).await;
                continue;
            }
        }

        let address = match resolve(stack, settings.host).await {
            Ok(address) => address,
            Err(e) => {
                RESPONSES.send(Err(e)).await;
                continue;
            }
        };

        let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
        socket.set_timeout(Some(SOCKET_TIMEOUT));
        if let Err(e) = socket.connect((address, settings.port)).await {
            warn!("MQTT: TCP connect to {}:{} failed: {:?}", settings.host, settings.port, e);
            RESPONSES.send(Err(BrokerError::Tcp)).await;
            continue;
        }

        let mut config = ClientConfig::new(MqttVersion::MQTTv5, CountingRng(20000));
        config.add_client_id(settings.client_id);
        if !settings.username.is_empty() {
            config.add_username(settings.username);
            config.add_password(settings.password);
        }
        config.keep_alive = settings.keep_alive_secs;
        config.max_packet_size = MQTT_BUFFER as u32;

        let mut client = MqttClient::<_, 5, _>::new(
            socket,
            &mut mqtt_tx,
            MQTT_BUFFER,
            &mut mqtt_rx,
            MQTT_BUFFER,
            config,
        );

        if let Err(code) = client.connect_to_broker().await {
            warn!("MQTT: broker rejected connection: {:?}", code);
            RESPONSES.send(Err(BrokerError::Mqtt(code))).await;
            continue;
        }

        info!("MQTT: session established with {}", settings.host);
        SESSION_UP.store(true, Ordering::Release);
        RESPONSES.send(Ok(())).await;

        let ping_every = Duration::from_secs(u64::from(settings.keep_alive_secs.max(2)) / 2);
        loop {
            let session_lost = match select(REQUESTS.receive(), Timer::after(ping_every)).await {
                Either::First(BrokerRequest::Connect) => {
                    RESPONSES.send(Ok(())).await;
                    continue;
                }
                Either::First(BrokerRequest::Publish {
                    topic,
                    payload,
                    retain,
                }) => {
                    let result = match core::str::from_utf8(&topic) {
                        Ok(topic) => client
                            .send_message(topic, &payload, QualityOfService::QoS0, retain)
                            .await
                            .map_err(BrokerError::Mqtt),
                        Err(_) => Err(BrokerError::TooLarge),
                    };
                    let lost = matches!(result, Err(BrokerError::Mqtt(_)));
                    RESPONSES.send(result).await;
                    lost
                }
                Either::Second(()) => {
                    debug!("MQTT: ping");
                    match client.send_ping().await {
                        Ok(()) => false,
                        Err(code) => {
                            warn!("MQTT: ping failed: {:?}", code);
                            true
                        }
                    }
                }
            };

            if session_lost {
                error!("MQTT: session lost");
                break;
            }
        }

        SESSION_UP.store(false, Ordering::Release);
    }
}

async fn resolve(stack: Stack<'static>, host: &str) -> Result<IpAddress, BrokerError> {
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(IpAddress::Ipv4(ip));
    }

    match stack.dns_query(host, DnsQueryType::A).await {
        Ok(addresses) => addresses.first().copied().ok_or(BrokerError::Dns),
        Err(e) => {
            warn!("MQTT: DNS lookup of {} failed: {:?}", host, e);
            Err(BrokerError::Dns)
        }
    }
}

async fn request(request: BrokerRequest) -> Response {
    REQUESTS.send(request).await;
    RESPONSES.receive().await
}

/// The broker session as seen by the connection supervisor.
pub struct BrokerLink;

impl Link for BrokerLink {
    type Error = BrokerError;

    fn is_connected(&self) -> bool {
        SESSION_UP.load(Ordering::Acquire)
    }

    async fn connect(&mut self, _now: Instant) -> Result<(), Self::Error> {
        request(BrokerRequest::Connect).await
    }
}

/// Publishes through the broker task.
pub struct BrokerPublisher;

impl Publisher for BrokerPublisher {
    type Error = BrokerError;

    async fn publish(&mut self, topic: &str, payload: &[u8], retain: bool) -> Result<(), Self::Error> {
        let topic = Vec::from_slice(topic.as_bytes()).map_err(|_| BrokerError::TooLarge)?;
        let payload = Vec::from_slice(payload).map_err(|_| BrokerError::TooLarge)?;

        request(BrokerRequest::Publish {
            topic,
            payload,
            retain,
        })
        .await
    }
}
