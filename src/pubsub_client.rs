//! Pub/sub collaborator interface.
//!
//! The real messaging service is an external SDK; the load generator
//! only depends on the `Publisher`/`Subscriber` traits below. The
//! `LoopbackBus` implementation delivers messages in-process over a
//! broadcast channel with optional random delivery jitter, which is
//! what the worker runs against by default and what the tests use.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use thiserror::Error;
use tokio::sync::broadcast;

/// Per-channel broadcast capacity before slow subscribers lag.
const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum PubSubError {
    #[error("channel '{0}' has no live peers")]
    ChannelClosed(String),
    #[error("subscriber lagged, {0} messages dropped")]
    Lagged(u64),
}

/// A timestamped message. Subscribers derive delivery latency from
/// the embedded publish time.
#[derive(Debug, Clone)]
pub struct Message {
    pub published_at_ms: i64,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            published_at_ms: Utc::now().timestamp_millis(),
            payload,
        }
    }

    /// Milliseconds since this message was published.
    pub fn age_ms(&self) -> i64 {
        Utc::now().timestamp_millis() - self.published_at_ms
    }
}

// ─── Collaborator traits ─────────────────────────────────────────

pub trait Publisher: Send + Sync + 'static {
    fn publish(&self, message: Message) -> impl Future<Output = Result<(), PubSubError>> + Send;
}

pub trait Subscriber: Send + 'static {
    /// Waits for the next message on the channel. Blocking call,
    /// ended by the channel closing.
    fn next(&mut self) -> impl Future<Output = Result<Message, PubSubError>> + Send;
}

pub trait PubSubClient: Clone + Send + Sync + 'static {
    type Publisher: Publisher;
    type Subscriber: Subscriber;

    fn publisher(&self, channel: &str) -> Self::Publisher;
    fn subscriber(&self, channel: &str) -> Self::Subscriber;
}

// ─── Loopback implementation ─────────────────────────────────────

/// In-process bus: one broadcast channel per named channel, shared by
/// every clone of the client.
#[derive(Clone)]
pub struct LoopbackBus {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<Message>>>>,
    max_jitter: Duration,
}

impl LoopbackBus {
    /// `max_jitter` is the upper bound of the uniformly random delay
    /// applied to each publish, simulating network transit.
    pub fn new(max_jitter: Duration) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            max_jitter,
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<Message> {
        self.channels
            .lock()
            .entry(channel.to_owned())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

pub struct LoopbackPublisher {
    channel: String,
    tx: broadcast::Sender<Message>,
    max_jitter: Duration,
}

impl Publisher for LoopbackPublisher {
    async fn publish(&self, message: Message) -> Result<(), PubSubError> {
        if !self.max_jitter.is_zero() {
            let delay_us = rand::thread_rng().gen_range(0..=self.max_jitter.as_micros() as u64);
            tokio::time::sleep(Duration::from_micros(delay_us)).await;
        }

        self.tx
            .send(message)
            .map(|_| ())
            .map_err(|_| PubSubError::ChannelClosed(self.channel.clone()))
    }
}

pub struct LoopbackSubscriber {
    channel: String,
    rx: broadcast::Receiver<Message>,
}

impl Subscriber for LoopbackSubscriber {
    async fn next(&mut self) -> Result<Message, PubSubError> {
        match self.rx.recv().await {
            Ok(message) => Ok(message),
            Err(broadcast::error::RecvError::Lagged(n)) => Err(PubSubError::Lagged(n)),
            Err(broadcast::error::RecvError::Closed) => {
                Err(PubSubError::ChannelClosed(self.channel.clone()))
            }
        }
    }
}

impl PubSubClient for LoopbackBus {
    type Publisher = LoopbackPublisher;
    type Subscriber = LoopbackSubscriber;

    fn publisher(&self, channel: &str) -> LoopbackPublisher {
        LoopbackPublisher {
            channel: channel.to_owned(),
            tx: self.sender(channel),
            max_jitter: self.max_jitter,
        }
    }

    fn subscriber(&self, channel: &str) -> LoopbackSubscriber {
        LoopbackSubscriber {
            channel: channel.to_owned(),
            rx: self.sender(channel).subscribe(),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_published_messages() {
        let bus = LoopbackBus::new(Duration::ZERO);
        let mut sub = bus.subscriber("fanout");
        let publisher = bus.publisher("fanout");

        publisher.publish(Message::new(vec![1, 2, 3])).await.unwrap();

        let received = sub.next().await.unwrap();
        assert_eq!(received.payload, vec![1, 2, 3]);
        assert!(received.age_ms() >= 0);
    }

    #[tokio::test]
    async fn fans_out_to_every_subscriber() {
        let bus = LoopbackBus::new(Duration::ZERO);
        let mut a = bus.subscriber("fanout");
        let mut b = bus.subscriber("fanout");

        bus.publisher("fanout")
            .publish(Message::new(b"hello".to_vec()))
            .await
            .unwrap();

        assert_eq!(a.next().await.unwrap().payload, b"hello");
        assert_eq!(b.next().await.unwrap().payload, b"hello");
    }

    #[tokio::test]
    async fn publish_without_subscribers_fails() {
        let bus = LoopbackBus::new(Duration::ZERO);
        let publisher = bus.publisher("nobody-home");

        let err = publisher.publish(Message::new(Vec::new())).await.unwrap_err();
        assert!(matches!(err, PubSubError::ChannelClosed(_)));
    }
}
