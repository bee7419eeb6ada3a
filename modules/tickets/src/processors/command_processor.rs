use event_bus::{MessageContext, Router};
use std::sync::Arc;

use super::{HandlerFuture, ProcessorError, TypedHandler};
use crate::contracts::DomainMessage;

/// Registers command handlers on the `commands.` topics
pub struct CommandProcessor<'a> {
    router: &'a mut Router,
}

impl<'a> CommandProcessor<'a> {
    pub fn new(router: &'a mut Router) -> Self {
        Self { router }
    }

    pub fn add_handler<M, F>(&mut self, name: &str, func: F) -> Result<(), ProcessorError>
    where
        M: DomainMessage,
        F: Fn(MessageContext, M) -> HandlerFuture + Send + Sync + 'static,
    {
        if !M::TYPE.is_command() {
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
