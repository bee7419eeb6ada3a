use event_bus::{MessageContext, Router};
use std::sync::Arc;

use super::{HandlerFuture, ProcessorError, TypedHandler};
use crate::contracts::DomainMessage;

/// Registers event handlers; one consumer group per handler
pub struct EventProcessor<'a> {
    router: &'a mut Router,
}

impl<'a> EventProcessor<'a> {
    pub fn new(router: &'a mut Router) -> Self {
        Self { router }
    }

    pub fn add_handler<M, F>(&mut self, name: &str, func: F) -> Result<(), ProcessorError>
    where
        M: DomainMessage,
        F: Fn(MessageContext, M) -> HandlerFuture + Send + Sync + 'static,
    {
        if M::TYPE.is_command() {
            return Err(ProcessorError::WrongKind {
                handler: name.to_string(),
                message_type: M::TYPE,
            });
        }
        self.router
            .add_handler(Arc::new(TypedHandler::<M, F>::new(name, func)))?;
        Ok(())
    }
}
