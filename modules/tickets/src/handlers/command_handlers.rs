use anyhow::Context;
use event_bus::MessageContext;
use std::sync::Arc;

use crate::clients::{PaymentsClient, ReceiptsClient};
use crate::contracts::RefundTicket;

#[derive(Clone)]
pub struct CommandHandlers {
    pub payments: Arc<dyn PaymentsClient>,
    pub receipts: Arc<dyn ReceiptsClient>,
}

impl CommandHandlers {
    /// Refund the payment, then void the receipt; both under the command's key
    pub async fn refund_ticket(
        &self,
        ctx: &MessageContext,
        command: &RefundTicket,
    ) -> anyhow::Result<()> {
        let key = &command.header.idempotency_key;

        self.payments
            .refund_payment(ctx, key, &command.ticket_id)
            .await
            .context("refunding payment")?;

        self.receipts
            .void_receipt(ctx, key, &command.ticket_id)
            .await
            .context("voiding receipt")?;

        tracing::info!(ticket_id = %command.ticket_id, "Ticket refunded");
        Ok(())
    }
}
