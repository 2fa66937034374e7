//! Reconciliation scheduler
//!
//! Fixed-interval background jobs started once at startup:
//!
//! - promotion: moves Pending transactions to Finalized
//! - drain: reads the event channel until the first read error
//! - outbox relay: forwards outbox rows (outbox delivery only)
//!
//! Every job logs and swallows its own failures; a bad tick never stops the
//! next one.

use crate::{
    config::{DeliveryMode, SchedulerConfig},
    metrics::SCHEDULER_RUNS_TOTAL,
    repository::LedgerRepository,
    Result,
};
use message_bus::{drain, DrainReport, EventConsumer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long shutdown waits for an interrupted drain cycle to return
const DRAIN_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// The work each job performs, callable without the scheduler
pub struct ReconciliationTasks {
    repository: Arc<LedgerRepository>,
    consumer: Arc<dyn EventConsumer>,
    outbox_batch_size: i64,
    drain_running: AtomicBool,
    cancel: CancellationToken,
}

/// Clears the drain flag however the cycle ends
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ReconciliationTasks {
    /// Bundle the repository and event consumer the jobs act on
    pub fn new(
        repository: Arc<LedgerRepository>,
        consumer: Arc<dyn EventConsumer>,
        outbox_batch_size: i64,
    ) -> Self {
        Self {
            repository,
            consumer,
            outbox_batch_size,
            drain_running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    /// Interrupt any drain cycle in flight and refuse new ones
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A drain cycle is currently reading
    pub fn is_draining(&self) -> bool {
        self.drain_running.load(Ordering::SeqCst)
    }

    /// One promotion sweep
    pub async fn run_promotion(&self) -> Result<u64> {
        let result = self.repository.promote_pending().await;
        record_run("promotion", result.is_ok());
        result
    }

    /// One drain cycle. Returns `None` when the previous cycle is still
    /// reading, in which case nothing is done.
    pub async fn run_drain(&self) -> Option<DrainReport> {
        if self.cancel.is_cancelled() {
            return None;
        }
        if self.drain_running.swap(true, Ordering::SeqCst) {
            debug!("Previous drain cycle still running, skipping tick");
            record_run("drain", true);
            return None;
        }
        let _guard = DrainGuard(&self.drain_running);

        let report = drain(self.consumer.as_ref(), &self.cancel).await;
        info!(
            drained = report.drained,
            reason = %report.error,
            "Drain cycle ended"
        );
        record_run("drain", true);
        Some(report)
    }

    /// Forward one batch of outbox rows
    pub async fn run_outbox_relay(&self) -> Result<u64> {
        let result = self.repository.relay_outbox(self.outbox_batch_size).await;
        record_run("outbox_relay", result.is_ok());
        result
    }
}

fn record_run(job: &str, ok: bool) {
    let status = if ok { "success" } else { "error" };
    SCHEDULER_RUNS_TOTAL.with_label_values(&[job, status]).inc();
}

/// Running job scheduler
pub struct ReconciliationScheduler {
    scheduler: JobScheduler,
    tasks: Arc<ReconciliationTasks>,
}

impl ReconciliationScheduler {
    /// Register the jobs and start ticking. Each job first fires one
    /// interval after startup.
    pub async fn start(
        tasks: Arc<ReconciliationTasks>,
        config: &SchedulerConfig,
        delivery: DeliveryMode,
    ) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        let promotion_tasks = tasks.clone();
        let promotion_job = Job::new_repeated_async(
            Duration::from_secs(config.promotion_interval_secs),
            move |_uuid, _lock| {
                let tasks = promotion_tasks.clone();
                Box::pin(async move {
                    if let Err(e) = tasks.run_promotion().await {
                        error!("Promotion sweep failed: {}", e);
                    }
                })
            },
        )?;
        scheduler.add(promotion_job).await?;

        let drain_tasks = tasks.clone();
        let drain_job = Job::new_repeated_async(
            Duration::from_secs(config.drain_interval_mins * 60),
            move |_uuid, _lock| {
                let tasks = drain_tasks.clone();
                Box::pin(async move {
                    tasks.run_drain().await;
                })
            },
        )?;
        scheduler.add(drain_job).await?;

        if delivery == DeliveryMode::Outbox {
            let relay_tasks = tasks.clone();
            let relay_job = Job::new_repeated_async(
                Duration::from_secs(config.outbox_relay_interval_secs),
                move |_uuid, _lock| {
                    let tasks = relay_tasks.clone();
                    Box::pin(async move {
                        if let Err(e) = tasks.run_outbox_relay().await {
                            warn!("Outbox relay failed: {}", e);
                        }
                    })
                },
            )?;
            scheduler.add(relay_job).await?;
        }

        scheduler.start().await?;

        info!(
            promotion_interval_secs = config.promotion_interval_secs,
            drain_interval_mins = config.drain_interval_mins,
            outbox_relay = delivery == DeliveryMode::Outbox,
            "Reconciliation scheduler started"
        );

        Ok(Self { scheduler, tasks })
    }

    /// Stop ticking and interrupt a drain cycle blocked on the channel.
    /// Returns once no cycle holds the consumer, or after
    /// `DRAIN_STOP_TIMEOUT`.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.tasks.cancel();
        let stopped = self.scheduler.shutdown().await;

        let idle = tokio::time::timeout(DRAIN_STOP_TIMEOUT, async {
            while self.tasks.is_draining() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        if idle.is_err() {
            warn!("Drain cycle still running after shutdown");
        }

        stopped?;
        info!("Reconciliation scheduler stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::repository::RepositoryOptions;
    use crate::types::Requisites;
    use message_bus::{EventPublisher, InMemoryChannel, InboundEvent};
    use rust_decimal_macros::dec;

    fn tasks(store: Arc<MemoryStore>, channel: Arc<InMemoryChannel>) -> ReconciliationTasks {
        let repository = Arc::new(LedgerRepository::new(
            store,
            channel.clone(),
            RepositoryOptions::default(),
        ));
        ReconciliationTasks::new(repository, channel, 10)
    }

    #[tokio::test]
    async fn test_run_promotion_and_drain() {
        let store = Arc::new(MemoryStore::seeded());
        let channel = Arc::new(InMemoryChannel::new());
        let tasks = tasks(store.clone(), channel.clone());

        let repository = LedgerRepository::new(
            store.clone(),
            channel.clone(),
            RepositoryOptions::default(),
        );
        repository
            .credit(643, dec!(50), Requisites::wallet(123456789))
            .await
            .unwrap();

        assert_eq!(tasks.run_promotion().await.unwrap(), 1);
        assert_eq!(tasks.run_promotion().await.unwrap(), 0);

        let report = tasks.run_drain().await.unwrap();
        assert_eq!(report.drained, 1);

        let report = tasks.run_drain().await.unwrap();
        assert_eq!(report.drained, 0);
    }

    struct BlockingConsumer;

    #[async_trait::async_trait]
    impl EventConsumer for BlockingConsumer {
        async fn next_event(&self) -> message_bus::Result<InboundEvent> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_overlapping_drain_is_skipped() {
        let store = Arc::new(MemoryStore::seeded());
        let channel = Arc::new(InMemoryChannel::new());
        let repository = Arc::new(LedgerRepository::new(
            store,
            channel as Arc<dyn EventPublisher>,
            RepositoryOptions::default(),
        ));
        let tasks = Arc::new(ReconciliationTasks::new(
            repository,
            Arc::new(BlockingConsumer),
            10,
        ));

        let first = {
            let tasks = tasks.clone();
            tokio::spawn(async move { tasks.run_drain().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(tasks.run_drain().await.is_none());

        first.abort();
        let _ = first.await;
        assert!(!tasks.is_draining());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_interrupts_blocked_drain() {
        let store = Arc::new(MemoryStore::seeded());
        let channel = Arc::new(InMemoryChannel::new());
        let repository = Arc::new(LedgerRepository::new(
            store,
            channel as Arc<dyn EventPublisher>,
            RepositoryOptions::default(),
        ));
        let tasks = Arc::new(ReconciliationTasks::new(
            repository,
            Arc::new(BlockingConsumer),
            10,
        ));
        let config = SchedulerConfig {
            promotion_interval_secs: 60,
            drain_interval_mins: 1,
            promotion_min_age_secs: 0,
            outbox_relay_interval_secs: 5,
            outbox_batch_size: 10,
        };

        let mut scheduler =
            ReconciliationScheduler::start(tasks.clone(), &config, DeliveryMode::Outbox)
                .await
                .unwrap();

        // same body the drain job runs on its tick
        let cycle = {
            let tasks = tasks.clone();
            tokio::spawn(async move { tasks.run_drain().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(tasks.is_draining());

        tokio::time::timeout(Duration::from_secs(5), scheduler.shutdown())
            .await
            .unwrap()
            .unwrap();
        assert!(!tasks.is_draining());

        let report = cycle.await.unwrap().unwrap();
        assert!(matches!(report.error, message_bus::Error::Cancelled));

        // no new cycle starts once shut down
        assert!(tasks.run_drain().await.is_none());
    }
}
