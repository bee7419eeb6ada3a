//! Process supervision
//!
//! Every router subscription, the outbox forwarder and the HTTP server run as
//! tasks of one `JoinSet` under one `CancellationToken`. The first task to
//! stop cancels the token; the others get the configured grace period to
//! finish in-flight work before they are aborted.

use anyhow::Context;
use event_bus::{EventBus, Router};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::clients::{
    ExternalBookingClient, FilesClient, HttpClients, PaymentsClient, ReceiptsClient,
    SpreadsheetsClient,
};
use crate::config::Config;
use crate::events::{Forwarder, MessagePublisher};
use crate::handlers::{register_handlers, CommandHandlers, EventHandlers};
use crate::processors::{router_config, ProcessorError};
use crate::repos::{PgProcessedMessageRepository, PgShowRepository, PgTicketRepository};
use crate::routes::{self, AppState};

/// External collaborators used by the handlers
#[derive(Clone)]
pub struct Collaborators {
    pub receipts: Arc<dyn ReceiptsClient>,
    pub spreadsheets: Arc<dyn SpreadsheetsClient>,
    pub files: Arc<dyn FilesClient>,
    pub external_bookings: Arc<dyn ExternalBookingClient>,
    pub payments: Arc<dyn PaymentsClient>,
}

impl Collaborators {
    pub fn http(clients: HttpClients) -> Self {
        let clients = Arc::new(clients);
        Self {
            receipts: clients.clone(),
            spreadsheets: clients.clone(),
            files: clients.clone(),
            external_bookings: clients.clone(),
            payments: clients,
        }
    }
}

pub struct Service {
    config: Config,
    pool: PgPool,
    bus: Arc<dyn EventBus>,
    router: Router,
    app: axum::Router,
}

impl Service {
    /// Wire handlers, routes and the forwarder; fails on an invalid handler registration
    pub fn new(
        config: Config,
        pool: PgPool,
        bus: Arc<dyn EventBus>,
        collaborators: Collaborators,
    ) -> Result<Self, ProcessorError> {
        let tickets = Arc::new(PgTicketRepository::new(pool.clone()));
        let shows = Arc::new(PgShowRepository::new(pool.clone()));

        let events = Arc::new(EventHandlers {
            receipts: collaborators.receipts.clone(),
            spreadsheets: collaborators.spreadsheets,
            files: collaborators.files,
            external_bookings: collaborators.external_bookings,
            tickets: tickets.clone(),
            shows: shows.clone(),
            processed: Arc::new(PgProcessedMessageRepository::new(pool.clone())),
            publisher: MessagePublisher::for_bus(bus.clone()),
        });
        let commands = Arc::new(CommandHandlers {
            payments: collaborators.payments,
            receipts: collaborators.receipts,
        });

        let mut router = Router::new(bus.clone(), router_config(&config.router));
        register_handlers(&mut router, events, commands)?;

        let app = routes::router(AppState {
            pool: pool.clone(),
            tickets,
            shows,
        });

        Ok(Self {
            config,
            pool,
            bus,
            router,
            app,
        })
    }

    /// HTTP routes, for driving the service without a listener
    pub fn app(&self) -> axum::Router {
        self.app.clone()
    }

    pub async fn run(self, token: CancellationToken) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding {addr}"))?;
        self.run_with_listener(listener, token).await
    }

    pub async fn run_with_listener(
        self,
        listener: TcpListener,
        token: CancellationToken,
    ) -> anyhow::Result<()> {
        let grace = self.config.shutdown_grace;
        let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();

        for subscription in self.router.into_subscriptions() {
            let token = token.clone();
            tasks.spawn(async move { subscription.run(token).await.map_err(anyhow::Error::from) });
        }

        let forwarder = Forwarder::new(self.pool.clone(), self.bus.clone(), self.config.forwarder.clone());
        tasks.spawn(forwarder.run(token.clone()));

        let shutdown = token.clone();
        let app = self.app;
        tracing::info!(addr = ?listener.local_addr().ok(), "Tickets service listening");
        tasks.spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
                .context("HTTP server failed")
        });

        let mut first_error = None;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                joined = tasks.join_next() => match joined {
                    Some(joined) => {
                        record(joined, &mut first_error);
                        // Any task stopping on its own takes the process down
                        token.cancel();
                    }
                    None => break,
                },
            }
        }

        tracing::info!(grace_secs = grace.as_secs(), "Shutting down");
        if !drain(&mut tasks, &mut first_error, grace).await {
            tracing::warn!(remaining = tasks.len(), "Grace period elapsed, aborting tasks");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Wait for every task; `false` if the grace period ran out first
async fn drain(
    tasks: &mut JoinSet<anyhow::Result<()>>,
    first_error: &mut Option<anyhow::Error>,
    grace: Duration,
) -> bool {
    let all_done = async {
        while let Some(joined) = tasks.join_next().await {
            record(joined, first_error);
        }
    };
    tokio::time::timeout(grace, all_done).await.is_ok()
}

fn record(joined: Result<anyhow::Result<()>, JoinError>, first_error: &mut Option<anyhow::Error>) {
    let result = joined.unwrap_or_else(|e| Err(anyhow::anyhow!("task panicked: {e}")));
    if let Err(e) = result {
        tracing::error!(error = ?e, "Task failed");
        first_error.get_or_insert(e);
    }
}
