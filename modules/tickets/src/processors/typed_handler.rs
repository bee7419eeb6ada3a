use async_trait::async_trait;
use event_bus::{BusMessage, HandlerError, MessageContext, MessageHandler};
use futures::future::BoxFuture;
use std::marker::PhantomData;

use crate::contracts::DomainMessage;

pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Adapts a closure over a decoded message to [`MessageHandler`]
///
/// The payload is decoded into `M` before the closure runs; a payload that
/// does not decode is reported as malformed and never retried.
pub struct TypedHandler<M, F> {
    name: String,
    topic: String,
    func: F,
    _message: PhantomData<fn() -> M>,
}

impl<M, F> TypedHandler<M, F>
where
    M: DomainMessage,
    F: Fn(MessageContext, M) -> HandlerFuture + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            topic: M::TYPE.topic(),
            func,
            _message: PhantomData,
        }
    }
}

#[async_trait]
impl<M, F> MessageHandler for TypedHandler<M, F>
where
    M: DomainMessage,
    F: Fn(MessageContext, M) -> HandlerFuture + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn topic(&self) -> &str {
        &self.topic
    }

    fn message_type(&self) -> &str {
        M::TYPE.as_str()
    }

    async fn handle(&self, ctx: &MessageContext, message: &BusMessage) -> Result<(), HandlerError> {
        let decoded: M = serde_json::from_slice(&message.payload)?;
        (self.func)(ctx.clone(), decoded)
            .await
            .map_err(HandlerError::failed)
    }
}
