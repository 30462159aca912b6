//! Collection scheduler.
//!
//! Drives collection passes on a fixed interval from a single task, feeds
//! their outcomes into the failure counter, rebuilds the client when the
//! exporter has been degraded for a whole cooldown window, and gives up
//! once the counter reaches its threshold.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use lagwatch_client::config::DEFAULT_CALL_TIMEOUT;
use lagwatch_client::ClientManager;
use lagwatch_metrics::ExporterMetrics;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::error::{SchedulerError, SchedulerResult};
use crate::failure::FailureCounter;
use crate::pass::CollectionPass;

/// Minimum time between two client rebuilds.
pub const DEFAULT_REBUILD_COOLDOWN: Duration = Duration::from_secs(2 * 60);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between the starts of two passes.
    pub interval: Duration,
    /// Net failures at which the scheduler gives up.
    pub failure_threshold: NonZeroU32,
    pub rebuild_cooldown: Duration,
    /// Bound on each client call inside a pass.
    pub call_timeout: Duration,
}

impl SchedulerConfig {
    pub fn new(interval: Duration, failure_threshold: NonZeroU32) -> Self {
        Self {
            interval,
            failure_threshold,
            rebuild_cooldown: DEFAULT_REBUILD_COOLDOWN,
            call_timeout: DEFAULT_CALL_TIMEOUT.min(interval),
        }
    }

    /// Set the per-call timeout, never longer than the interval.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout.min(self.interval);
        self
    }

    pub fn with_rebuild_cooldown(mut self, cooldown: Duration) -> Self {
        self.rebuild_cooldown = cooldown;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    /// The failure threshold was reached; `run` is returning an error.
    Aborting,
    /// Shutdown was requested; `run` is returning cleanly.
    Stopped,
}

pub struct Scheduler {
    config: SchedulerConfig,
    manager: ClientManager,
    pass: CollectionPass,
    failures: FailureCounter,
    state: LoopState,
    ticks: u64,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        manager: ClientManager,
        metrics: Arc<ExporterMetrics>,
    ) -> Self {
        let pass = CollectionPass::new(metrics, config.call_timeout);
        let failures = FailureCounter::new(config.failure_threshold);
        Self {
            config,
            manager,
            pass,
            failures,
            state: LoopState::Running,
            ticks: 0,
        }
    }

    /// Run until shutdown is signalled, the failure threshold is reached,
    /// or a client rebuild fails.
    ///
    /// The first pass starts one full interval after entry. A pass that
    /// has started always runs to completion; shutdown is observed only
    /// between passes.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> SchedulerResult<()> {
        self.state = LoopState::Running;
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            threshold = self.config.failure_threshold.get(),
            "collection scheduler started"
        );

        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.config.interval, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.failures.should_abort() {
                self.state = LoopState::Aborting;
                let err = SchedulerError::CircuitOpen {
                    count: self.failures.count(),
                    recent: self.failures.last_error().cloned().map(Box::new),
                };
                error!(error = %err, "collection scheduler aborting");
                return Err(err);
            }

            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        self.state = LoopState::Aborting;
                        error!(error = %e, "collection scheduler aborting");
                        return Err(e);
                    }
                }
                changed = shutdown.changed() => {
                    // A dropped sender is treated as a shutdown request.
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.state = LoopState::Stopped;
        info!(ticks = self.ticks, "collection scheduler shutting down");
        Ok(())
    }

    /// Run one pass, record its outcome, and rebuild the client if due.
    ///
    /// Only a failed rebuild is returned; pass failures are counted.
    pub async fn tick(&mut self) -> SchedulerResult<()> {
        self.ticks += 1;
        let client = self.manager.client();

        match self.pass.run(client.as_ref(), &mut self.failures).await {
            Ok(()) => self.failures.record(None),
            Err(e) => {
                error!(
                    error = %e,
                    failures = self.failures.count() + 1,
                    "collection pass failed"
                );
                self.failures.record(Some(e));
            }
        }

        self.maybe_rebuild().await?;
        Ok(())
    }

    /// Rebuild the client if the exporter is degraded and the cooldown
    /// since the last rebuild attempt has elapsed. Returns whether a
    /// rebuild happened.
    ///
    /// A client that cannot be rebuilt is fatal, like one that cannot be
    /// connected at startup.
    pub async fn maybe_rebuild(&mut self) -> SchedulerResult<bool> {
        let cooling_down = self.manager.since_rebuild() < self.config.rebuild_cooldown;
        if !self.failures.is_degraded() || cooling_down {
            return Ok(false);
        }

        warn!(
            failures = self.failures.count(),
            "collection degraded, rebuilding kafka client"
        );
        self.manager
            .rebuild()
            .await
            .map_err(SchedulerError::Rebuild)?;
        Ok(true)
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn failures(&self) -> &FailureCounter {
        &self.failures
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn manager(&self) -> &ClientManager {
        &self.manager
    }

    pub fn metrics(&self) -> &Arc<ExporterMetrics> {
        self.pass.metrics()
    }

    /// Close the client. Call once `run` has returned.
    pub async fn close(&self) {
        self.manager.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectError;
    use lagwatch_client::memory::{MemoryCluster, Op};
    use lagwatch_client::{ClientError, GroupLag, HostPort, KafkaConfig};

    const INTERVAL: Duration = Duration::from_secs(30);

    async fn scheduler(cluster: &MemoryCluster, threshold: u32) -> Scheduler {
        let config = KafkaConfig::new(vec![HostPort::new("localhost", 9092)]).unwrap();
        let manager = ClientManager::connect(Arc::new(cluster.clone()), config)
            .await
            .unwrap();
        let metrics = Arc::new(ExporterMetrics::new().unwrap());
        let config = SchedulerConfig::new(INTERVAL, NonZeroU32::new(threshold).unwrap());
        Scheduler::new(config, manager, metrics)
    }

    #[test]
    fn call_timeout_clamped_to_interval() {
        let threshold = NonZeroU32::new(10).unwrap();
        let short = SchedulerConfig::new(Duration::from_secs(2), threshold);
        assert_eq!(short.call_timeout, Duration::from_secs(2));

        let long =
            SchedulerConfig::new(INTERVAL, threshold).with_call_timeout(Duration::from_secs(90));
        assert_eq!(long.call_timeout, INTERVAL);
        assert_eq!(long.rebuild_cooldown, DEFAULT_REBUILD_COOLDOWN);
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_after_one_interval() {
        let cluster = MemoryCluster::with_topology(1, &[], 0);
        let mut scheduler = scheduler(&cluster, 10).await;
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let result = scheduler.run(rx).await;
            (scheduler, result)
        });

        tokio::time::sleep(INTERVAL - Duration::from_secs(1)).await;
        assert_eq!(cluster.calls(Op::Metadata), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(cluster.calls(Op::Metadata), 1);

        tx.send(true).unwrap();
        let (scheduler, result) = handle.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(scheduler.state(), LoopState::Stopped);
        assert_eq!(scheduler.ticks(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_before_first_tick() {
        let cluster = MemoryCluster::with_topology(1, &[], 0);
        let mut scheduler = scheduler(&cluster, 10).await;
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        scheduler.run(rx).await.unwrap();

        assert_eq!(scheduler.state(), LoopState::Stopped);
        assert_eq!(cluster.calls(Op::Metadata), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_sender_stops() {
        let cluster = MemoryCluster::with_topology(1, &[], 0);
        let mut scheduler = scheduler(&cluster, 10).await;
        let (tx, rx) = watch::channel(false);
        drop(tx);

        scheduler.run(rx).await.unwrap();
        assert_eq!(scheduler.state(), LoopState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn circuit_opens_at_threshold() {
        let cluster = MemoryCluster::with_topology(1, &[], 0);
        cluster.fail(Op::Metadata, Some(ClientError::Broker("no leader".into())));
        let mut scheduler = scheduler(&cluster, 3).await;
        let (_tx, rx) = watch::channel(false);

        let err = scheduler.run(rx).await.unwrap_err();

        let SchedulerError::CircuitOpen { count, recent } = err else {
            panic!("expected an open circuit, got {err:?}");
        };
        assert_eq!(count, 3);
        assert!(matches!(recent.as_deref(), Some(CollectError::Metadata(_))));
        assert_eq!(scheduler.state(), LoopState::Aborting);
        assert_eq!(scheduler.ticks(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn metadata_failure_counts_once() {
        let cluster = MemoryCluster::with_topology(3, &["topic1"], 3);
        cluster.fail(Op::Metadata, Some(ClientError::Broker("no brokers".into())));
        let mut scheduler = scheduler(&cluster, 10).await;

        scheduler.tick().await.unwrap();

        assert_eq!(scheduler.failures().count(), 1);
        assert_eq!(cluster.calls(Op::EndOffsets), 0);
        assert_eq!(cluster.calls(Op::GroupLags), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn success_recovers() {
        let cluster = MemoryCluster::with_topology(1, &[], 0);
        cluster.fail(Op::Metadata, Some(ClientError::Broker("flap".into())));
        let mut scheduler = scheduler(&cluster, 10).await;

        scheduler.tick().await.unwrap();
        scheduler.tick().await.unwrap();
        assert_eq!(scheduler.failures().count(), 2);

        cluster.fail(Op::Metadata, None);
        scheduler.tick().await.unwrap();
        assert_eq!(scheduler.failures().count(), 1);
        assert!(scheduler.failures().is_degraded());
    }

    #[tokio::test(start_paused = true)]
    async fn panic_counts_once() {
        let cluster = MemoryCluster::with_topology(1, &["orders"], 1);
        cluster.panic_on(Op::GroupLags);
        let mut scheduler = scheduler(&cluster, 10).await;

        scheduler.tick().await.unwrap();

        // The fault is recorded by the pass and the pass reports success,
        // so the scheduler's own success decrements again.
        assert_eq!(scheduler.failures().count(), 0);
        assert!(matches!(
            scheduler.failures().last_error(),
            Some(CollectError::InternalFault(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn no_rebuild_while_healthy() {
        let cluster = MemoryCluster::with_topology(1, &[], 0);
        let mut scheduler = scheduler(&cluster, 10).await;

        tokio::time::advance(DEFAULT_REBUILD_COOLDOWN * 2).await;
        scheduler.tick().await.unwrap();

        assert_eq!(scheduler.manager().rebuilds(), 0);
        assert_eq!(cluster.calls(Op::Build), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rebuild_waits_for_cooldown() {
        let cluster = MemoryCluster::with_topology(1, &[], 0);
        cluster.fail(Op::Metadata, Some(ClientError::Broker("stale".into())));
        let mut scheduler = scheduler(&cluster, 10).await;

        scheduler.tick().await.unwrap();
        assert!(scheduler.failures().is_degraded());
        assert_eq!(scheduler.manager().rebuilds(), 0);

        tokio::time::advance(DEFAULT_REBUILD_COOLDOWN).await;
        scheduler.tick().await.unwrap();
        assert_eq!(scheduler.manager().rebuilds(), 1);
        assert_eq!(cluster.closed(), 1);

        // The clock restarted at the rebuild.
        scheduler.tick().await.unwrap();
        assert_eq!(scheduler.manager().rebuilds(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_rebuild_is_fatal() {
        let cluster = MemoryCluster::with_topology(1, &[], 0);
        cluster.fail(Op::Metadata, Some(ClientError::Broker("stale".into())));
        let mut scheduler = scheduler(&cluster, 10).await;
        cluster.fail(Op::Build, Some(ClientError::Connect("refused".into())));

        tokio::time::advance(DEFAULT_REBUILD_COOLDOWN).await;
        let err = scheduler.tick().await.unwrap_err();

        assert!(matches!(
            err,
            SchedulerError::Rebuild(ClientError::Connect(_))
        ));
        assert_eq!(scheduler.failures().count(), 1);
        assert_eq!(scheduler.manager().rebuilds(), 0);
        assert_eq!(cluster.closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_rebuild_ends_run() {
        let cluster = MemoryCluster::with_topology(1, &[], 0);
        cluster.fail(Op::Metadata, Some(ClientError::Broker("stale".into())));
        let mut scheduler = scheduler(&cluster, 10).await;
        cluster.fail(Op::Ping, Some(ClientError::Connect("no route".into())));
        let (_tx, rx) = watch::channel(false);

        let err = scheduler.run(rx).await.unwrap_err();

        assert!(matches!(err, SchedulerError::Rebuild(_)));
        assert_eq!(scheduler.state(), LoopState::Aborting);
        // Degraded from the first tick; the cooldown elapses at the fourth.
        assert_eq!(scheduler.ticks(), 4);
        assert_eq!(cluster.calls(Op::Build), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_pass_in_flight() {
        let cluster = MemoryCluster::with_topology(1, &["orders"], 1);
        cluster.set_groups(vec![GroupLag::idle("billing", 1, 3)]);
        // Shorter than the call timeout, so the pass completes normally.
        cluster.delay(Op::GroupLags, Duration::from_secs(5));
        let mut scheduler = scheduler(&cluster, 10).await;
        let metrics = scheduler.metrics().clone();
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let result = scheduler.run(rx).await;
            (scheduler, result)
        });

        tokio::time::sleep(INTERVAL + Duration::from_secs(1)).await;
        assert_eq!(cluster.calls(Op::GroupLags), 1);
        assert_eq!(metrics.series("kafka_consumergroup_members"), 0);
        tx.send(true).unwrap();

        let (scheduler, result) = handle.await.unwrap();
        assert!(result.is_ok());
        assert_eq!(scheduler.state(), LoopState::Stopped);
        assert_eq!(scheduler.ticks(), 1);
        assert_eq!(cluster.calls(Op::GroupLags), 1);
        assert_eq!(
            metrics.value("kafka_consumergroup_members", &[("consumergroup", "billing")]),
            Some(3.0)
        );
    }
}
