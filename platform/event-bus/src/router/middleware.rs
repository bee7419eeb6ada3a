//! The fixed per-message middleware chain
//!
//! correlation -> logging span -> retry -> suppression filter -> handler,
//! followed by an acknowledgement in every case.

use super::{HandlerError, MessageContext, MessageHandler, RouterConfig};
use crate::consumer_retry::retry_with_policy;
use crate::{validate_metadata, BusMessage, Delivery, METADATA_TYPE};
use std::fmt;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Why a message was dropped without invoking its handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suppression {
    MissingType,
    InvalidMetadata(String),
    UnknownType(String),
    OtherHandlerType(String),
    Denylisted,
}

impl fmt::Display for Suppression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingType => write!(f, "message has no type tag"),
            Self::InvalidMetadata(reason) => write!(f, "invalid metadata: {reason}"),
            Self::UnknownType(t) => write!(f, "message type '{t}' is not registered"),
            Self::OtherHandlerType(t) => write!(f, "message type '{t}' is not handled here"),
            Self::Denylisted => write!(f, "message id is on the skip list"),
        }
    }
}

/// How processing of a single delivery ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Handled,
    Suppressed(Suppression),
    Malformed,
    Exhausted { attempts: u32 },
}

/// Per-subscription tally of outcomes, logged when the subscription stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessingStats {
    pub handled: u64,
    pub suppressed: u64,
    pub malformed: u64,
    pub exhausted: u64,
}

impl ProcessingStats {
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Handled => self.handled += 1,
            Outcome::Suppressed(_) => self.suppressed += 1,
            Outcome::Malformed => self.malformed += 1,
            Outcome::Exhausted { .. } => self.exhausted += 1,
        }
    }
}

pub(crate) fn suppression(
    message: &BusMessage,
    expected_type: &str,
    config: &RouterConfig,
) -> Option<Suppression> {
    let Some(message_type) = message.metadata(METADATA_TYPE) else {
        return Some(Suppression::MissingType);
    };
    if let Err(reason) = validate_metadata(&message.metadata) {
        return Some(Suppression::InvalidMetadata(reason));
    }
    if !config.known_types.contains(message_type) {
        return Some(Suppression::UnknownType(message_type.to_string()));
    }
    if message_type != expected_type {
        return Some(Suppression::OtherHandlerType(message_type.to_string()));
    }
    if config.skip_message_ids.contains(&message.id) {
        return Some(Suppression::Denylisted);
    }
    None
}

async fn dispatch(
    handler: &dyn MessageHandler,
    config: &RouterConfig,
    ctx: &MessageContext,
    message: &BusMessage,
) -> Result<Option<Suppression>, HandlerError> {
    if let Some(reason) = suppression(message, handler.message_type(), config) {
        return Ok(Some(reason));
    }
    handler.handle(ctx, message).await.map(|()| None)
}

/// Run the middleware chain for one delivery and acknowledge it
pub(crate) async fn process_delivery(
    handler: &dyn MessageHandler,
    config: &RouterConfig,
    topic: &str,
    delivery: Delivery,
) -> Outcome {
    let message = delivery.message();
    let ctx = MessageContext::from_message(message, handler.name());

    let span = info_span!(
        "handle_message",
        message_id = %message.id,
        correlation_id = %ctx.correlation_id,
        consumer_group = %handler.name(),
        topic = %topic,
        message_type = %message.metadata(METADATA_TYPE).unwrap_or("-"),
    );

    let outcome = async {
        info!("Handling a message");

        let ctx_ref = &ctx;
        let result = retry_with_policy(
            move || dispatch(handler, config, ctx_ref, message),
            &config.retry,
            handler.name(),
            HandlerError::is_retriable,
        )
        .await;

        match result {
            Ok(None) => {
                debug!("Message handled");
                Outcome::Handled
            }
            Ok(Some(reason)) => {
                info!(reason = %reason, "Message suppressed");
                Outcome::Suppressed(reason)
            }
            Err(failure) if !failure.error.is_retriable() => {
                error!(error = %failure.error, "Dropping malformed message");
                Outcome::Malformed
            }
            Err(failure) => {
                error!(
                    attempts = failure.attempts,
                    error = %failure.error,
                    "Message processing failed after retries, acknowledging without redelivery"
                );
                Outcome::Exhausted {
                    attempts: failure.attempts,
                }
            }
        }
    }
    .instrument(span.clone())
    .await;

    if let Err(e) = delivery.ack().await {
        warn!(parent: &span, error = %e, "Failed to acknowledge message, it will be redelivered");
    }

    outcome
}
