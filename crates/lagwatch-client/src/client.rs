//! The cluster client capability.
//!
//! A collection pass only ever talks to the cluster through
//! [`ClusterClient`]; the [`ClientManager`](crate::ClientManager) only ever
//! constructs one through [`ClientFactory`]. Both are injected so the
//! scheduler can run against an in-memory cluster in tests.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::KafkaConfig;
use crate::error::ClientResult;
use crate::types::{ClusterMetadata, GroupLag, ListedOffsets};

/// Read-only admin operations against a Kafka cluster.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Cheap round trip proving the cluster is reachable.
    async fn ping(&self) -> ClientResult<()>;

    /// Brokers, controller, and every topic's partition state.
    async fn metadata(&self) -> ClientResult<ClusterMetadata>;

    /// Log end offsets for every partition of `topics`.
    async fn list_end_offsets(&self, topics: &[String]) -> ClientResult<ListedOffsets>;

    /// Log start offsets for every partition of `topics`.
    async fn list_start_offsets(&self, topics: &[String]) -> ClientResult<ListedOffsets>;

    /// Committed offsets and lag for every consumer group.
    async fn group_lags(&self) -> ClientResult<Vec<GroupLag>>;

    /// Release connections. Further calls should fail with `Closed`.
    async fn close(&self);
}

/// Builds clients from connection settings.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn build(&self, config: &KafkaConfig) -> ClientResult<Arc<dyn ClusterClient>>;
}
