//! Registration of typed event and command handlers on a [`Router`]
//!
//! Every handler is registered under its own consumer group on the topic of
//! the message type it accepts. The router only accepts the closed set of
//! [`MessageType`]s, so a handler for anything else fails at startup.

mod command_processor;
mod event_processor;
mod typed_handler;

pub use command_processor::CommandProcessor;
pub use event_processor::EventProcessor;
pub use typed_handler::{HandlerFuture, TypedHandler};

use event_bus::{RouterConfig, RouterError};

use crate::config::RouterSettings;
use crate::contracts::MessageType;

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("handler '{handler}' registered for {message_type} on the wrong processor")]
    WrongKind {
        handler: String,
        message_type: MessageType,
    },

    #[error(transparent)]
    Router(#[from] RouterError),
}

/// Router configuration that knows every [`MessageType`]
pub fn router_config(settings: &RouterSettings) -> RouterConfig {
    RouterConfig::new(MessageType::ALL.iter().map(|t| t.as_str()))
        .with_retry(settings.retry.clone())
        .with_intake_buffer(settings.intake_buffer)
        .with_skip_message_ids(settings.skip_message_ids.iter().cloned())
}
