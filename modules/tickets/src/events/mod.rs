pub mod forwarder;
pub mod outbox;
pub mod publisher;

pub use forwarder::{Forwarder, FORWARDER_GROUP};
pub use outbox::{append, append_message, OutboxError, OutboxPosition, OutboxRecord};
pub use publisher::{BusPublisher, CorrelationPublisher, MessagePublisher, PublishError, Publisher};
