//! MQTT publishing: state topics, Home Assistant discovery and the publish gate

mod topics;

pub use topics::*;

use core::fmt::Debug;

use embassy_time::{Duration, Instant};
use log::{error, info, warn};

use crate::connection::{Connectivity, FirstConnectAction};
use crate::sensors::Reading;

/// Delay before publishing again after finding the broker disconnected.
pub const PUBLISH_RETRY_DELAY: Duration = Duration::from_millis(5000);

/// How long "MQTT Sent!" stays on screen after a successful batch.
pub const SENT_INDICATOR_WINDOW: Duration = Duration::from_millis(5000);

/// Transport for MQTT messages.
pub trait Publisher {
    type Error: Debug;

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> impl Future<Output = Result<(), Self::Error>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotConnected,
    /// Still inside the delay scheduled by an earlier `NotConnected`.
    RetryPending,
}

pub type FailedTopics = heapless::Vec<SensorTopic, 4>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent,
    Skipped(SkipReason),
    /// Some publishes failed. The ones that went out are not retracted.
    PartialFailure(FailedTopics),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishRecord {
    pub last_success: Option<Instant>,
}

impl PublishRecord {
    pub fn shows_sent_indicator(&self, now: Instant) -> bool {
        self.last_success
            .is_some_and(|at| now.saturating_duration_since(at) <= SENT_INDICATOR_WINDOW)
    }
}

/// Decides when a reading goes out and records the last full success.
pub struct PublishGate {
    topics: TopicSet,
    record: PublishRecord,
    retry_at: Option<Instant>,
    retry_delay: Duration,
}

impl PublishGate {
    pub fn new(topics: TopicSet) -> Self {
        Self::with_retry_delay(topics, PUBLISH_RETRY_DELAY)
    }

    pub fn with_retry_delay(topics: TopicSet, retry_delay: Duration) -> Self {
        Self {
            topics,
            record: PublishRecord::default(),
            retry_at: None,
            retry_delay,
        }
    }

    /// Publish all four fields of `reading` if the broker is reachable.
    ///
    /// Never waits: a disconnected broker schedules the next attempt and
    /// returns at once.
    pub async fn maybe_publish<C, P>(
        &mut self,
        link: &C,
        publisher: &mut P,
        reading: &Reading,
        now: Instant,
    ) -> PublishOutcome
    where
        C: Connectivity,
        P: Publisher,
    {
        if self.retry_at.is_some_and(|at| now < at) {
            return PublishOutcome::Skipped(SkipReason::RetryPending);
        }

        if !link.is_connected() {
            warn!(
                "MQTT publish skipped, broker not connected. Retrying in {} ms",
                self.retry_delay.as_millis()
            );
            self.retry_at = Some(now + self.retry_delay);
            return PublishOutcome::Skipped(SkipReason::NotConnected);
        }
        self.retry_at = None;

        let mut failed = FailedTopics::new();
        for topic in SensorTopic::STATE_ORDER {
            if let Err(e) = self.publish_one(publisher, topic, reading).await {
                error!("MQTT publish of {} failed: {}", topic.field(), e);
                // Capacity equals the number of topics.
                let _ = failed.push(topic);
            }
        }

        if failed.is_empty() {
            self.record.last_success = Some(now);
            info!("MQTT sensor data published");
            PublishOutcome::Sent
        } else {
            PublishOutcome::PartialFailure(failed)
        }
    }

    async fn publish_one<P: Publisher>(
        &self,
        publisher: &mut P,
        topic: SensorTopic,
        reading: &Reading,
    ) -> Result<(), PublishFailure<P::Error>> {
        let payload =
            state_payload(topic, topic.value(reading)).map_err(PublishFailure::Format)?;
        publisher
            .publish(self.topics.state_topic(topic), payload.as_bytes(), true)
            .await
            .map_err(PublishFailure::Transport)
    }

    pub fn record(&self) -> PublishRecord {
        self.record
    }

    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }
}

enum PublishFailure<E> {
    Format(TopicError),
    Transport(E),
}

impl<E: Debug> core::fmt::Display for PublishFailure<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            PublishFailure::Format(e) => write!(f, "{}", e),
            PublishFailure::Transport(e) => write!(f, "{:?}", e),
        }
    }
}

/// Publishes the retained discovery descriptors for all four fields.
///
/// Run once, on the first broker connection. Individual failures are logged
/// and do not stop the remaining announcements.
pub struct DiscoveryAnnouncer<'a, P> {
    topics: &'a TopicSet,
    publisher: &'a mut P,
}

impl<'a, P: Publisher> DiscoveryAnnouncer<'a, P> {
    pub fn new(topics: &'a TopicSet, publisher: &'a mut P) -> Self {
        Self { topics, publisher }
    }

    pub async fn announce(&mut self) -> usize {
        let mut sent = 0;
        for topic in SensorTopic::DISCOVERY_ORDER {
            let payload = match self.topics.discovery_payload(topic) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("Discovery for {} not sent: {}", topic.field(), e);
                    continue;
                }
            };

            match self
                .publisher
                .publish(self.topics.discovery_topic(topic), payload.as_bytes(), true)
                .await
            {
                Ok(()) => sent += 1,
                Err(e) => error!("Discovery for {} failed: {:?}", topic.field(), e),
            }
        }

        info!("MQTT discovery sent for {} sensors", sent);
        sent
    }
}

impl<P: Publisher> FirstConnectAction for DiscoveryAnnouncer<'_, P> {
    async fn on_first_connect(&mut self) {
        self.announce().await;
    }
}
