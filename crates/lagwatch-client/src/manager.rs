//! Lifecycle of the single live cluster client.
//!
//! The manager builds a client, proves it reachable with a ping before
//! handing it out, and can swap it for a fresh one when the scheduler has
//! been failing for long enough that cached client state is suspect.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::{ClientFactory, ClusterClient};
use crate::config::KafkaConfig;
use crate::error::{ClientError, ClientResult};

/// Owner of exactly one cluster client handle.
pub struct ClientManager {
    factory: Arc<dyn ClientFactory>,
    config: KafkaConfig,
    client: Arc<dyn ClusterClient>,
    /// When the current handle was built, or the last rebuild was attempted.
    last_rebuild: Instant,
    rebuilds: u64,
}

impl ClientManager {
    /// Build the first client and verify it answers a ping.
    ///
    /// Callers treat an error here as fatal: there is no retry.
    pub async fn connect(
        factory: Arc<dyn ClientFactory>,
        config: KafkaConfig,
    ) -> ClientResult<Self> {
        let client = build_and_ping(factory.as_ref(), &config).await?;
        info!(
            seeds = %config.bootstrap_servers(),
            auth = ?config.auth.mechanism().map(|m| m.as_str()),
            tls = config.transport.is_tls(),
            "connected to kafka cluster"
        );

        Ok(Self {
            factory,
            config,
            client,
            last_rebuild: Instant::now(),
            rebuilds: 0,
        })
    }

    /// The current client handle.
    pub fn client(&self) -> Arc<dyn ClusterClient> {
        self.client.clone()
    }

    /// Time since the current handle was built or a rebuild was attempted.
    pub fn since_rebuild(&self) -> Duration {
        self.last_rebuild.elapsed()
    }

    /// Number of successful rebuilds since `connect`.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    /// Close the current handle and replace it with a freshly built one.
    ///
    /// The rebuild clock restarts whether or not the attempt succeeds. On
    /// failure the manager is left holding the closed handle; callers treat
    /// the error as fatal, the same as a failed [`connect`](Self::connect).
    pub async fn rebuild(&mut self) -> ClientResult<()> {
        self.last_rebuild = Instant::now();

        self.client.close().await;
        self.client = build_and_ping(self.factory.as_ref(), &self.config).await?;
        self.rebuilds += 1;

        info!(rebuilds = self.rebuilds, "kafka client rebuilt");
        Ok(())
    }

    /// Close the current handle.
    pub async fn close(&self) {
        self.client.close().await;
        debug!("kafka client closed");
    }
}

async fn build_and_ping(
    factory: &dyn ClientFactory,
    config: &KafkaConfig,
) -> ClientResult<Arc<dyn ClusterClient>> {
    let client = factory.build(config).await?;

    let ping = tokio::time::timeout(config.timeout, client.ping())
        .await
        .unwrap_or(Err(ClientError::Timeout(config.timeout)));

    if let Err(e) = ping {
        warn!(error = %e, "kafka ping failed");
        client.close().await;
        return Err(e);
    }

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryCluster, Op};

    fn test_config() -> KafkaConfig {
        KafkaConfig::new(vec!["localhost:9092".parse().unwrap()]).unwrap()
    }

    #[tokio::test]
    async fn connect_pings_once() {
        let cluster = MemoryCluster::with_topology(3, &["topic1"], 3);
        let manager = ClientManager::connect(Arc::new(cluster.clone()), test_config())
            .await
            .unwrap();

        assert_eq!(cluster.calls(Op::Build), 1);
        assert_eq!(cluster.calls(Op::Ping), 1);
        assert_eq!(manager.rebuilds(), 0);
    }

    #[tokio::test]
    async fn connect_fails_on_build_error() {
        let cluster = MemoryCluster::new();
        cluster.fail(Op::Build, Some(ClientError::Connect("refused".into())));

        let result = ClientManager::connect(Arc::new(cluster.clone()), test_config()).await;
        assert_eq!(result.err(), Some(ClientError::Connect("refused".into())));
        assert_eq!(cluster.calls(Op::Ping), 0);
    }

    #[tokio::test]
    async fn connect_fails_and_closes_on_ping_error() {
        let cluster = MemoryCluster::new();
        cluster.fail(Op::Ping, Some(ClientError::Connect("no route".into())));

        let result = ClientManager::connect(Arc::new(cluster.clone()), test_config()).await;
        assert!(result.is_err());
        assert_eq!(cluster.closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_times_out_on_hung_ping() {
        let cluster = MemoryCluster::new();
        cluster.delay(Op::Ping, Duration::from_secs(60));
        let config = test_config().with_timeout(Duration::from_secs(1));

        let result = ClientManager::connect(Arc::new(cluster), config).await;
        assert_eq!(
            result.err(),
            Some(ClientError::Timeout(Duration::from_secs(1)))
        );
    }

    #[tokio::test]
    async fn rebuild_swaps_and_closes_old_client() {
        let cluster = MemoryCluster::with_topology(1, &[], 0);
        let mut manager = ClientManager::connect(Arc::new(cluster.clone()), test_config())
            .await
            .unwrap();
        let old = manager.client();

        manager.rebuild().await.unwrap();

        assert_eq!(manager.rebuilds(), 1);
        assert_eq!(cluster.calls(Op::Build), 2);
        assert_eq!(cluster.closed(), 1);
        assert_eq!(old.ping().await, Err(ClientError::Closed));
        assert!(manager.client().ping().await.is_ok());
    }

    #[tokio::test]
    async fn failed_rebuild_leaves_no_live_client() {
        let cluster = MemoryCluster::with_topology(1, &[], 0);
        let mut manager = ClientManager::connect(Arc::new(cluster.clone()), test_config())
            .await
            .unwrap();

        cluster.fail(Op::Build, Some(ClientError::Connect("refused".into())));
        assert_eq!(
            manager.rebuild().await,
            Err(ClientError::Connect("refused".into()))
        );

        assert_eq!(manager.rebuilds(), 0);
        assert_eq!(cluster.closed(), 1);
        assert_eq!(manager.client().ping().await, Err(ClientError::Closed));
    }

    #[tokio::test]
    async fn rebuild_closes_old_client_before_building() {
        let cluster = MemoryCluster::with_topology(1, &[], 0);
        let mut manager = ClientManager::connect(Arc::new(cluster.clone()), test_config())
            .await
            .unwrap();

        // The replacement fails its ping after the old handle is already gone.
        cluster.fail(Op::Ping, Some(ClientError::Connect("no route".into())));
        assert!(manager.rebuild().await.is_err());

        assert_eq!(cluster.calls(Op::Build), 2);
        // Old handle, then the replacement that failed its ping.
        assert_eq!(cluster.closed(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rebuild_restarts_clock_even_on_failure() {
        let cluster = MemoryCluster::with_topology(1, &[], 0);
        let mut manager = ClientManager::connect(Arc::new(cluster.clone()), test_config())
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(300)).await;
        assert!(manager.since_rebuild() >= Duration::from_secs(300));

        cluster.fail(Op::Build, Some(ClientError::Connect("refused".into())));
        let _ = manager.rebuild().await;
        assert!(manager.since_rebuild() < Duration::from_secs(1));
    }
}
