//! In-memory implementation of the EventBus trait for testing and development

use crate::{validate_name, Acknowledge, BusMessage, BusResult, Delivery, DeliveryStream, EventBus};
use async_trait::async_trait;
use futures::stream::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// EventBus implementation backed by process-local append logs
///
/// This implementation is suitable for:
/// - Unit tests (no external dependencies)
/// - Local development without Docker
/// - Integration tests that need fast, isolated message buses
///
/// Each topic is an append-only `Vec` of messages. Each consumer group on a
/// topic has a committed offset that only moves forward on acknowledgement.
/// Nothing is ever dropped, so a slow group never loses messages.
///
/// # Example
/// ```rust
/// use event_bus::{BusMessage, EventBus, InMemoryBus};
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryBus::new();
///
/// // Publishing before subscribing is fine, the log keeps everything
/// bus.publish(BusMessage::new("m-1", "TicketPrinted", b"hello".to_vec())).await?;
///
/// let mut stream = bus.subscribe("TicketPrinted", "audit").await?;
/// let delivery = stream.next().await.unwrap()?;
/// assert_eq!(delivery.message().payload, b"hello");
/// delivery.ack().await?;
///
/// assert_eq!(bus.committed_offset("TicketPrinted", "audit"), Some(1));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryBus {
    topics: Arc<Mutex<HashMap<String, TopicLog>>>,
}

struct TopicLog {
    messages: Vec<BusMessage>,
    cursors: HashMap<String, usize>,
    appended: watch::Sender<usize>,
}

impl TopicLog {
    fn new() -> Self {
        let (appended, _) = watch::channel(0);
        Self {
            messages: Vec::new(),
            cursors: HashMap::new(),
            appended,
        }
    }
}

impl InMemoryBus {
    /// Create a new, empty in-memory event bus
    pub fn new() -> Self {
        Self::default()
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<String, TopicLog>> {
        lock(&self.topics)
    }

    /// Committed offset of `consumer_group` on `topic`, if the group ever subscribed
    pub fn committed_offset(&self, topic: &str, consumer_group: &str) -> Option<usize> {
        self.topics()
            .get(topic)
            .and_then(|log| log.cursors.get(consumer_group).copied())
    }

    /// Everything ever published to `topic`, in order
    pub fn published(&self, topic: &str) -> Vec<BusMessage> {
        self.topics()
            .get(topic)
            .map(|log| log.messages.clone())
            .unwrap_or_default()
    }
}

fn lock(topics: &Mutex<HashMap<String, TopicLog>>) -> MutexGuard<'_, HashMap<String, TopicLog>> {
    topics.lock().unwrap_or_else(PoisonError::into_inner)
}

struct InMemoryAck {
    topics: Arc<Mutex<HashMap<String, TopicLog>>>,
    topic: String,
    consumer_group: String,
    offset: usize,
}

#[async_trait]
impl Acknowledge for InMemoryAck {
    async fn ack(&self) -> BusResult<()> {
        let mut topics = lock(&self.topics);
        if let Some(log) = topics.get_mut(&self.topic) {
            let cursor = log.cursors.entry(self.consumer_group.clone()).or_insert(0);
            *cursor = (*cursor).max(self.offset + 1);
        }
        Ok(())
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, message: BusMessage) -> BusResult<()> {
        validate_name("topic", &message.topic)?;

        let mut topics = self.topics();
        let log = topics
            .entry(message.topic.clone())
            .or_insert_with(TopicLog::new);
        log.messages.push(message);
        log.appended.send_replace(log.messages.len());

        Ok(())
    }

    async fn subscribe(&self, topic: &str, consumer_group: &str) -> BusResult<DeliveryStream> {
        validate_name("topic", topic)?;
        validate_name("consumer group", consumer_group)?;

        let (mut offset, mut appended) = {
            let mut topics = self.topics();
            let log = topics.entry(topic.to_string()).or_insert_with(TopicLog::new);
            let start = *log.cursors.entry(consumer_group.to_string()).or_insert(0);
            (start, log.appended.subscribe())
        };

        let topics = Arc::clone(&self.topics);
        let topic = topic.to_string();
        let consumer_group = consumer_group.to_string();

        let stream = async_stream::stream! {
            loop {
                let _ = appended.borrow_and_update();

                let next = {
                    let topics = lock(&topics);
                    topics
                        .get(&topic)
                        .and_then(|log| log.messages.get(offset).cloned())
                };

                match next {
                    Some(message) => {
                        let acker = InMemoryAck {
                            topics: Arc::clone(&topics),
                            topic: topic.clone(),
                            consumer_group: consumer_group.clone(),
                            offset,
                        };
                        offset += 1;
                        yield Ok(Delivery::new(message, Box::new(acker)));
                    }
                    None => {
                        if appended.changed().await.is_err() {
                            break;
                        }
                    }
                }
            }
        };

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn msg(id: &str, topic: &str) -> BusMessage {
        BusMessage::new(id, topic, id.as_bytes().to_vec())
    }

    async fn next_id(stream: &mut DeliveryStream) -> (String, Delivery) {
        let delivery = timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("timeout waiting for delivery")
            .expect("stream ended")
            .expect("delivery error");
        (delivery.message().id.clone(), delivery)
    }

    #[tokio::test]
    async fn test_new_group_starts_at_beginning() {
        let bus = InMemoryBus::new();
        bus.publish(msg("1", "orders")).await.unwrap();
        bus.publish(msg("2", "orders")).await.unwrap();

        let mut stream = bus.subscribe("orders", "g").await.unwrap();

        assert_eq!(next_id(&mut stream).await.0, "1");
        assert_eq!(next_id(&mut stream).await.0, "2");
    }

    #[tokio::test]
    async fn test_waits_for_later_publish() {
        let bus = InMemoryBus::new();
        let mut stream = bus.subscribe("orders", "g").await.unwrap();

        let publisher = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish(msg("late", "orders")).await.unwrap();
        });

        assert_eq!(next_id(&mut stream).await.0, "late");
    }

    #[tokio::test]
    async fn test_groups_are_independent() {
        let bus = InMemoryBus::new();
        bus.publish(msg("1", "orders")).await.unwrap();

        let mut a = bus.subscribe("orders", "a").await.unwrap();
        let mut b = bus.subscribe("orders", "b").await.unwrap();

        let (_, delivery) = next_id(&mut a).await;
        delivery.ack().await.unwrap();

        assert_eq!(next_id(&mut b).await.0, "1");
        assert_eq!(bus.committed_offset("orders", "a"), Some(1));
        assert_eq!(bus.committed_offset("orders", "b"), Some(0));
    }

    #[tokio::test]
    async fn test_unacked_messages_are_redelivered_on_resubscribe() {
        let bus = InMemoryBus::new();
        bus.publish(msg("1", "orders")).await.unwrap();
        bus.publish(msg("2", "orders")).await.unwrap();

        {
            let mut stream = bus.subscribe("orders", "g").await.unwrap();
            let (_, first) = next_id(&mut stream).await;
            first.ack().await.unwrap();
            // second is received but never acknowledged
            let _ = next_id(&mut stream).await;
        }

        let mut stream = bus.subscribe("orders", "g").await.unwrap();
        assert_eq!(next_id(&mut stream).await.0, "2");
    }

    #[tokio::test]
    async fn test_offset_never_regresses() {
        let bus = InMemoryBus::new();
        for id in ["1", "2", "3"] {
            bus.publish(msg(id, "orders")).await.unwrap();
        }

        let mut stream = bus.subscribe("orders", "g").await.unwrap();
        let (_, d1) = next_id(&mut stream).await;
        let (_, d2) = next_id(&mut stream).await;
        let (_, d3) = next_id(&mut stream).await;

        d3.ack().await.unwrap();
        d1.ack().await.unwrap();
        d2.ack().await.unwrap();

        assert_eq!(bus.committed_offset("orders", "g"), Some(3));
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = InMemoryBus::new();
        bus.publish(msg("other", "payments")).await.unwrap();
        bus.publish(msg("mine", "orders")).await.unwrap();

        let mut stream = bus.subscribe("orders", "g").await.unwrap();
        assert_eq!(next_id(&mut stream).await.0, "mine");
        assert_eq!(bus.published("payments").len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_invalid_names() {
        let bus = InMemoryBus::new();
        assert!(bus.publish(msg("1", "")).await.is_err());
        assert!(bus.subscribe("orders", "bad group").await.is_err());
    }
}
