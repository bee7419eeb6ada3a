pub mod booking_repo;
pub mod idempotency_repo;
pub mod processed_repo;
pub mod show_repo;
pub mod ticket_repo;

pub use booking_repo::BookingError;
pub use processed_repo::{PgProcessedMessageRepository, ProcessedMessageRepository};
pub use show_repo::{PgShowRepository, ShowRepository};
pub use ticket_repo::{PgTicketRepository, TicketRepository};
