//! Process wiring and ordered teardown

use crate::{
    config::Config,
    database::PgStore,
    handlers::configure_routes,
    logging::LogSink,
    repository::{LedgerRepository, RepositoryOptions},
    scheduler::{ReconciliationScheduler, ReconciliationTasks},
    service::LedgerService,
    store::LedgerStore,
    Error, Result,
};
use actix_web::{web, App, HttpServer};
use message_bus::{EventConsumer, EventPublisher, NatsClient, NatsPublisher, NatsSubscriber};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Releasable resources, in teardown order
#[derive(Default)]
pub struct Resources {
    /// Logging sink
    pub log_sink: Option<LogSink>,

    /// Store connection
    pub store: Option<Arc<dyn LedgerStore>>,

    /// Event consumer
    pub consumer: Option<Arc<dyn EventConsumer>>,

    /// Event producer
    pub publisher: Option<Arc<dyn EventPublisher>>,
}

/// Outcome of [`Resources::teardown`]
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Resources released cleanly
    pub released: Vec<&'static str>,

    /// Resources whose release failed, with the reason
    pub failures: Vec<(&'static str, String)>,
}

impl TeardownReport {
    /// Every release succeeded
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, resource: &'static str, result: Result<()>) {
        match result {
            Ok(()) => self.released.push(resource),
            Err(e) => {
                warn!(resource, "Failed to release: {}", e);
                self.failures.push((resource, e.to_string()));
            }
        }
    }
}

impl fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failures.is_empty() {
            return write!(f, "released {}", self.released.join(", "));
        }
        let failures: Vec<String> = self
            .failures
            .iter()
            .map(|(resource, reason)| format!("{}: {}", resource, reason))
            .collect();
        write!(f, "failed to release {}", failures.join("; "))
    }
}

impl Resources {
    /// Release logging sink, store, consumer and producer in that order.
    /// A failed step is recorded and the next one still runs.
    pub async fn teardown(mut self) -> TeardownReport {
        let mut report = TeardownReport::default();

        if let Some(log_sink) = self.log_sink.take() {
            report.record("logging sink", log_sink.close());
        }

        if let Some(store) = self.store.take() {
            report.record("store", store.close().await);
        }

        if let Some(consumer) = self.consumer.take() {
            let result = consumer.close().await.map_err(|e| Error::Server(e.to_string()));
            report.record("event consumer", result);
        }

        if let Some(publisher) = self.publisher.take() {
            let result = publisher.close().await.map_err(|e| Error::Server(e.to_string()));
            report.record("event producer", result);
        }

        report
    }
}

/// A started service: connections open, scheduler ticking
pub struct Runtime {
    config: Config,
    service: LedgerService,
    scheduler: ReconciliationScheduler,
    resources: Resources,
}

impl Runtime {
    /// Connect everything and start the scheduler. On failure whatever was
    /// already opened is torn down before the error is returned.
    pub async fn start(config: Config, log_sink: LogSink) -> Result<Self> {
        let mut resources = Resources {
            log_sink: Some(log_sink),
            ..Resources::default()
        };

        match Self::wire(&config, &mut resources).await {
            Ok((service, scheduler)) => Ok(Self {
                config,
                service,
                scheduler,
                resources,
            }),
            Err(e) => {
                error!("Startup failed: {}", e);
                let report = resources.teardown().await;
                info!("Teardown after failed startup: {}", report);
                Err(e)
            }
        }
    }

    async fn wire(
        config: &Config,
        resources: &mut Resources,
    ) -> Result<(LedgerService, ReconciliationScheduler)> {
        let store = PgStore::connect(&config.database).await?;
        if config.database.run_migrations {
            store.migrate().await?;
        }
        let store: Arc<dyn LedgerStore> = Arc::new(store);
        resources.store = Some(store.clone());

        let nats = NatsClient::connect(config.nats.connection())
            .await
            .map(Arc::new)
            .map_err(|e| Error::Server(e.to_string()))?;
        info!("Connected to NATS at {}", config.nats.url);

        let consumer: Arc<dyn EventConsumer> =
            Arc::new(NatsSubscriber::new(nats.clone(), config.nats.subscriber()));
        resources.consumer = Some(consumer.clone());

        let publisher: Arc<dyn EventPublisher> =
            Arc::new(NatsPublisher::new(nats, config.nats.publisher()));
        resources.publisher = Some(publisher.clone());

        let repository = Arc::new(LedgerRepository::new(
            store,
            publisher,
            RepositoryOptions::from(config),
        ));
        let service = LedgerService::new(repository.clone());

        let tasks = Arc::new(ReconciliationTasks::new(
            repository,
            consumer,
            config.scheduler.outbox_batch_size,
        ));
        let scheduler =
            ReconciliationScheduler::start(tasks, &config.scheduler, config.ledger.delivery)
                .await?;

        Ok((service, scheduler))
    }

    /// Serve HTTP until the server exits or SIGINT/SIGTERM arrives
    pub async fn serve(&self) -> Result<()> {
        let server_config = self.config.server.clone();
        let service_data = web::Data::new(self.service.clone());

        info!(
            "Starting HTTP server on {}:{}",
            server_config.host, server_config.port
        );

        let server = HttpServer::new(move || {
            App::new()
                .app_data(service_data.clone())
                .configure(configure_routes)
        })
        .workers(server_config.workers)
        .disable_signals()
        .bind((server_config.host.as_str(), server_config.port))
        .map_err(|e| Error::Server(format!("failed to bind: {}", e)))?
        .run();

        let handle = server.handle();

        tokio::select! {
            result = server => {
                result.map_err(|e| Error::Server(e.to_string()))?;
                info!("HTTP server exited");
            }
            signal = shutdown_signal() => {
                signal?;
                info!("Shutdown signal received, stopping HTTP server");
                handle.stop(true).await;
            }
        }

        Ok(())
    }

    /// Stop the scheduler, then release resources in order
    pub async fn shutdown(mut self) -> TeardownReport {
        if let Err(e) = self.scheduler.shutdown().await {
            error!("Failed to stop scheduler: {}", e);
        }

        let report = self.resources.teardown().await;
        if report.is_clean() {
            info!("Shutdown complete: {}", report);
        } else {
            error!("Shutdown incomplete: {}", report);
        }
        report
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).map_err(|e| Error::Server(e.to_string()))?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map_err(|e| Error::Server(e.to_string())),
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| Error::Server(e.to_string()))
}
