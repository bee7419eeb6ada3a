//! # Message Router
//!
//! Dispatches bus messages to registered handlers. Each handler owns its own
//! consumer group on its topic and runs as an independent subscription, so a
//! slow or failing handler never holds back another handler of the same
//! topic.
//!
//! Every message passes the same chain (see [`middleware`]):
//!
//! 1. correlation id is read from metadata or generated
//! 2. an `info_span!` with message id, correlation id, consumer group, topic
//!    and message type wraps all further logging
//! 3. the handler is retried per [`RetryConfig`]; malformed payloads are not
//! 4. messages without a known type tag, of another handler's type, or on the
//!    skip list are dropped without invoking the handler
//!
//! The message is acknowledged once the chain finishes, whatever the outcome.
//! A message whose handler keeps failing is logged at `error` level and
//! acknowledged; it is not redelivered.

mod context;
pub mod middleware;

pub use context::{new_correlation_id, MessageContext, GENERATED_CORRELATION_PREFIX};

use crate::consumer_retry::RetryConfig;
use crate::{validate_name, BusError, BusMessage, Delivery, DeliveryStream, EventBus};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashSet;
use std::error::Error as StdError;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Error returned by a handler for one message
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The payload cannot be decoded; retrying will not help
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("handler failed: {0}")]
    Failed(Box<dyn StdError + Send + Sync>),
}

impl HandlerError {
    pub fn failed(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Failed(err.into())
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Errors raised while registering or running subscriptions
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("handler '{handler}' declares unregistered message type '{message_type}'")]
    UnregisteredType {
        handler: String,
        message_type: String,
    },

    #[error("consumer group '{consumer_group}' is already subscribed to '{topic}'")]
    DuplicateHandler {
        topic: String,
        consumer_group: String,
    },

    #[error("subscription of '{consumer_group}' to '{topic}' failed: {source}")]
    Subscribe {
        topic: String,
        consumer_group: String,
        #[source]
        source: BusError,
    },

    #[error("message stream of '{consumer_group}' on '{topic}' ended unexpectedly")]
    StreamEnded {
        topic: String,
        consumer_group: String,
    },

    #[error("subscription task failed: {0}")]
    Task(String),
}

/// A handler bound to one topic under one consumer group
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Consumer group name, unique per topic
    fn name(&self) -> &str;

    fn topic(&self) -> &str;

    /// The type tag this handler accepts
    fn message_type(&self) -> &str;

    async fn handle(&self, ctx: &MessageContext, message: &BusMessage) -> Result<(), HandlerError>;
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub retry: RetryConfig,
    /// Capacity of the channel between a subscription's stream and its worker
    pub intake_buffer: usize,
    /// Message ids dropped without invoking any handler
    pub skip_message_ids: HashSet<String>,
    /// Every type tag the application knows about
    pub known_types: HashSet<String>,
}

impl RouterConfig {
    pub fn new<I, S>(known_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            retry: RetryConfig::default(),
            intake_buffer: 16,
            skip_message_ids: HashSet::new(),
            known_types: known_types.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_intake_buffer(mut self, intake_buffer: usize) -> Self {
        self.intake_buffer = intake_buffer.max(1);
        self
    }

    pub fn with_skip_message_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_message_ids = ids.into_iter().map(Into::into).collect();
        self
    }
}

/// Registry of handlers, validated at registration time
pub struct Router {
    bus: Arc<dyn EventBus>,
    config: Arc<RouterConfig>,
    handlers: Vec<Arc<dyn MessageHandler>>,
}

impl Router {
    pub fn new(bus: Arc<dyn EventBus>, config: RouterConfig) -> Self {
        Self {
            bus,
            config: Arc::new(config),
            handlers: Vec::new(),
        }
    }

    /// Register a handler
    ///
    /// Fails when the handler's message type is not one of the configured
    /// known types, when its names are invalid, or when its consumer group is
    /// already subscribed to the same topic.
    pub fn add_handler(&mut self, handler: Arc<dyn MessageHandler>) -> Result<(), RouterError> {
        if !self.config.known_types.contains(handler.message_type()) {
            return Err(RouterError::UnregisteredType {
                handler: handler.name().to_string(),
                message_type: handler.message_type().to_string(),
            });
        }

        let invalid = |source: BusError| RouterError::Subscribe {
            topic: handler.topic().to_string(),
            consumer_group: handler.name().to_string(),
            source,
        };
        validate_name("topic", handler.topic()).map_err(invalid)?;
        validate_name("consumer group", handler.name()).map_err(invalid)?;

        let duplicate = self
            .handlers
            .iter()
            .any(|h| h.topic() == handler.topic() && h.name() == handler.name());
        if duplicate {
            return Err(RouterError::DuplicateHandler {
                topic: handler.topic().to_string(),
                consumer_group: handler.name().to_string(),
            });
        }

        info!(
            topic = %handler.topic(),
            consumer_group = %handler.name(),
            message_type = %handler.message_type(),
            "Registered message handler"
        );
        self.handlers.push(handler);
        Ok(())
    }

    /// `(topic, consumer_group)` of every registered handler
    pub fn registrations(&self) -> Vec<(String, String)> {
        self.handlers
            .iter()
            .map(|h| (h.topic().to_string(), h.name().to_string()))
            .collect()
    }

    /// One runnable subscription per handler, for an external supervisor
    pub fn into_subscriptions(self) -> Vec<Subscription> {
        self.handlers
            .into_iter()
            .map(|handler| Subscription {
                bus: Arc::clone(&self.bus),
                config: Arc::clone(&self.config),
                handler,
            })
            .collect()
    }

    /// Run every subscription until `token` is cancelled
    ///
    /// The first subscription that fails cancels `token`; its error is
    /// returned once the remaining subscriptions have stopped.
    pub async fn run(self, token: CancellationToken) -> Result<(), RouterError> {
        let mut tasks = JoinSet::new();
        for subscription in self.into_subscriptions() {
            tasks.spawn(subscription.run(token.clone()));
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined.unwrap_or_else(|e| Err(RouterError::Task(e.to_string())));
            if let Err(e) = result {
                error!(error = %e, "Subscription stopped with error");
                token.cancel();
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

/// A single handler's subscription: a stream pump feeding a bounded channel,
/// and a worker processing one message at a time in delivery order
pub struct Subscription {
    bus: Arc<dyn EventBus>,
    config: Arc<RouterConfig>,
    handler: Arc<dyn MessageHandler>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        self.handler.topic()
    }

    pub fn consumer_group(&self) -> &str {
        self.handler.name()
    }

    pub async fn run(self, token: CancellationToken) -> Result<(), RouterError> {
        let topic = self.handler.topic().to_string();
        let group = self.handler.name().to_string();

        let stream = self
            .bus
            .subscribe(&topic, &group)
            .await
            .map_err(|source| RouterError::Subscribe {
                topic: topic.clone(),
                consumer_group: group.clone(),
                source,
            })?;

        info!(topic = %topic, consumer_group = %group, "Subscription started");

        let (intake, mut pending) = mpsc::channel::<Delivery>(self.config.intake_buffer.max(1));

        let worker = async {
            let mut stats = middleware::ProcessingStats::default();
            loop {
                let delivery = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    next = pending.recv() => match next {
                        Some(delivery) => delivery,
                        None => break,
                    },
                };
                let outcome = middleware::process_delivery(
                    self.handler.as_ref(),
                    &self.config,
                    &topic,
                    delivery,
                )
                .await;
                stats.record(&outcome);
            }
            stats
        };

        let (pumped, stats) = tokio::join!(
            pump(stream, intake, token.clone(), &topic, &group),
            worker
        );

        info!(
            topic = %topic,
            consumer_group = %group,
            handled = stats.handled,
            suppressed = stats.suppressed,
            malformed = stats.malformed,
            exhausted = stats.exhausted,
            "Subscription stopped"
        );
        pumped
    }
}

/// Move deliveries from the bus into the bounded intake channel
///
/// Returns when cancelled or when the worker is gone. The sender is dropped
/// on return, which lets the worker drain and stop.
async fn pump(
    mut stream: DeliveryStream,
    intake: mpsc::Sender<Delivery>,
    token: CancellationToken,
    topic: &str,
    group: &str,
) -> Result<(), RouterError> {
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return Ok(()),
            item = stream.next() => match item {
                Some(Ok(delivery)) => {
                    // a full channel must not outlive cancellation
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return Ok(()),
                        sent = intake.send(delivery) => {
                            if sent.is_err() {
                                return Ok(());
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!(topic = %topic, consumer_group = %group, error = %e, "Error receiving message");
                }
                None => {
                    return Err(RouterError::StreamEnded {
                        topic: topic.to_string(),
                        consumer_group: group.to_string(),
                    });
                }
            },
        }
    }
}
