//! NATS JetStream implementation of the EventBus trait

use crate::{
    validate_name, Acknowledge, BusError, BusMessage, BusResult, Delivery, DeliveryStream,
    EventBus,
};
use async_nats::jetstream::{
    self,
    consumer::{pull, AckPolicy, DeliverPolicy, PullConsumer},
    stream,
};
use async_nats::{Client, HeaderMap};
use async_trait::async_trait;
use futures::stream::StreamExt;
use std::collections::HashMap;

const MSG_ID_HEADER: &str = "Nats-Msg-Id";

/// EventBus implementation using NATS JetStream
///
/// Every topic is backed by its own stream (created on first use) whose only
/// subject is the topic itself. Every consumer group is a durable pull
/// consumer with explicit acknowledgement, so its position survives restarts.
/// A group created after messages were published starts from the first
/// message still retained by the stream.
///
/// Bus message metadata travels as NATS headers. The message id is sent as
/// `Nats-Msg-Id`, which also lets JetStream drop duplicate publishes inside
/// its deduplication window.
///
/// # Example
/// ```rust,no_run
/// use event_bus::{BusMessage, EventBus, NatsBus};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let nats_client = async_nats::connect("nats://localhost:4222").await?;
/// let bus = NatsBus::new(nats_client);
///
/// bus.publish(BusMessage::new("m-1", "TicketPrinted", b"{}".to_vec())).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct NatsBus {
    jetstream: jetstream::Context,
}

impl NatsBus {
    /// Create a new NatsBus from an existing NATS client
    pub fn new(client: Client) -> Self {
        Self {
            jetstream: jetstream::new(client),
        }
    }

    async fn ensure_stream(&self, topic: &str) -> BusResult<stream::Stream> {
        let config = stream::Config {
            name: stream_name(topic),
            subjects: vec![topic.to_string()],
            ..Default::default()
        };

        self.jetstream
            .get_or_create_stream(config)
            .await
            .map_err(|e| BusError::ConnectionError(format!("stream for '{topic}': {e}")))
    }
}

/// JetStream names may not contain `.`, `*`, `>` or whitespace
fn stream_name(topic: &str) -> String {
    topic
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' | '/' | '\\' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}

/// Durable pull consumer that starts at the first retained message and
/// only moves on explicit acks
fn durable_consumer_config(durable: &str) -> pull::Config {
    pull::Config {
        durable_name: Some(durable.to_string()),
        ack_policy: AckPolicy::Explicit,
        deliver_policy: DeliverPolicy::All,
        ..Default::default()
    }
}

struct JetStreamAck {
    message: jetstream::Message,
}

#[async_trait]
impl Acknowledge for JetStreamAck {
    async fn ack(&self) -> BusResult<()> {
        self.message
            .ack()
            .await
            .map_err(|e| BusError::AckError(e.to_string()))
    }
}

fn to_bus_message(message: &jetstream::Message) -> BusMessage {
    let mut metadata = HashMap::new();
    let mut id = None;

    if let Some(headers) = &message.headers {
        for (key, values) in headers.iter() {
            // Take the first value for each header
            if let Some(value) = values.first() {
                if key.to_string() == MSG_ID_HEADER {
                    id = Some(value.to_string());
                } else {
                    metadata.insert(key.to_string(), value.to_string());
                }
            }
        }
    }

    BusMessage {
        id: id.unwrap_or_default(),
        topic: message.subject.to_string(),
        payload: message.payload.to_vec(),
        metadata,
    }
}

#[async_trait]
impl EventBus for NatsBus {
    async fn publish(&self, message: BusMessage) -> BusResult<()> {
        validate_name("topic", &message.topic)?;
        self.ensure_stream(&message.topic).await?;

        let mut headers = HeaderMap::new();
        headers.insert(MSG_ID_HEADER, message.id.as_str());
        for (key, value) in &message.metadata {
            headers.insert(key.as_str(), value.as_str());
        }

        // The second await waits for the JetStream ack, i.e. durable storage
        self.jetstream
            .publish_with_headers(message.topic.clone(), headers, message.payload.into())
            .await
            .map_err(|e| BusError::PublishError(e.to_string()))?
            .await
            .map_err(|e| BusError::PublishError(e.to_string()))?;

        Ok(())
    }

    async fn subscribe(&self, topic: &str, consumer_group: &str) -> BusResult<DeliveryStream> {
        validate_name("topic", topic)?;
        validate_name("consumer group", consumer_group)?;

        let durable = stream_name(consumer_group);
        let consumer: PullConsumer = self
            .ensure_stream(topic)
            .await?
            .get_or_create_consumer(&durable, durable_consumer_config(&durable))
            .await
            .map_err(|e| BusError::SubscribeError(e.to_string()))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| BusError::SubscribeError(e.to_string()))?;

        let stream = messages.map(|item| match item {
            Ok(message) => {
                let bus_message = to_bus_message(&message);
                Ok(Delivery::new(bus_message, Box::new(JetStreamAck { message })))
            }
            Err(e) => Err(BusError::SubscribeError(e.to_string())),
        });

        Ok(stream.boxed())
    }
}
