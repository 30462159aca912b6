//! In-process cluster for tests.
//!
//! `MemoryCluster` holds a mutable cluster description and hands out
//! `MemoryClient`s that serve it. Every operation can be made to fail,
//! hang, or panic, and every call is counted, so failure-handling paths
//! can be driven deterministically.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::client::{ClientFactory, ClusterClient};
use crate::config::KafkaConfig;
use crate::error::{ClientError, ClientResult};
use crate::types::*;

/// Operations that can be observed or sabotaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Build,
    Ping,
    Metadata,
    EndOffsets,
    StartOffsets,
    GroupLags,
}

#[derive(Default)]
struct ClusterState {
    metadata: ClusterMetadata,
    /// (topic, partition) → (start, end).
    offsets: HashMap<(String, i32), (i64, i64)>,
    offset_errors: HashMap<(String, i32), ClientError>,
    groups: Vec<GroupLag>,

    failures: HashMap<Op, ClientError>,
    panics: HashSet<Op>,
    delays: HashMap<Op, Duration>,
    calls: HashMap<Op, usize>,
    closed: usize,
}

/// What an operation should do before serving data.
struct Plan {
    delay: Option<Duration>,
    panic: bool,
    failure: Option<ClientError>,
}

/// A programmable in-memory Kafka cluster.
#[derive(Clone, Default)]
pub struct MemoryCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl MemoryCluster {
    /// An empty cluster: no brokers, no topics, no groups.
    pub fn new() -> Self {
        Self::default()
    }

    /// Brokers `1..=brokers`, broker 1 as controller, and each topic with
    /// `partitions` partitions replicated to up to three brokers. Leaders
    /// are the preferred replica.
    pub fn with_topology(brokers: i32, topics: &[&str], partitions: i32) -> Self {
        let broker_list: Vec<BrokerInfo> = (1..=brokers)
            .map(|id| BrokerInfo {
                node_id: id,
                host: "127.0.0.1".to_string(),
                port: 9091 + id,
                rack: None,
            })
            .collect();

        let replication = brokers.clamp(0, 3);
        let topic_list = topics
            .iter()
            .map(|name| TopicInfo {
                name: name.to_string(),
                is_internal: name.starts_with("__"),
                partitions: (0..partitions)
                    .map(|p| {
                        let replicas: Vec<i32> = (0..replication)
                            .map(|r| (p + r) % brokers.max(1) + 1)
                            .collect();
                        PartitionInfo {
                            partition: p,
                            leader_id: replicas.first().copied().unwrap_or(-1),
                            isr: replicas.clone(),
                            replicas,
                            offline_replicas: Vec::new(),
                            error: None,
                        }
                    })
                    .collect(),
            })
            .collect();

        let cluster = Self::new();
        cluster.set_metadata(ClusterMetadata {
            controller_id: if brokers > 0 { 1 } else { -1 },
            brokers: broker_list,
            topics: topic_list,
        });
        cluster
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_metadata(&self, metadata: ClusterMetadata) {
        self.lock().metadata = metadata;
    }

    pub fn update_metadata(&self, f: impl FnOnce(&mut ClusterMetadata)) {
        f(&mut self.lock().metadata);
    }

    /// Set the start and end offset of one partition.
    pub fn set_offsets(&self, topic: &str, partition: i32, start: i64, end: i64) {
        self.lock()
            .offsets
            .insert((topic.to_string(), partition), (start, end));
    }

    /// Make one partition's entry fail in both offset listings.
    pub fn fail_offset(&self, topic: &str, partition: i32, error: ClientError) {
        self.lock()
            .offset_errors
            .insert((topic.to_string(), partition), error);
    }

    pub fn set_groups(&self, groups: Vec<GroupLag>) {
        self.lock().groups = groups;
    }

    /// Make `op` fail with `error`, or clear the failure with `None`.
    pub fn fail(&self, op: Op, error: Option<ClientError>) {
        let mut state = self.lock();
        match error {
            Some(e) => state.failures.insert(op, e),
            None => state.failures.remove(&op),
        };
    }

    /// Make `op` panic when called.
    pub fn panic_on(&self, op: Op) {
        self.lock().panics.insert(op);
    }

    /// Make `op` sleep before answering.
    pub fn delay(&self, op: Op, delay: Duration) {
        self.lock().delays.insert(op, delay);
    }

    /// How many times `op` has been called, across every client.
    pub fn calls(&self, op: Op) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// How many clients have been closed.
    pub fn closed(&self) -> usize {
        self.lock().closed
    }

    /// A client connected to this cluster.
    pub fn client(&self) -> MemoryClient {
        MemoryClient {
            cluster: self.clone(),
            closed: AtomicBool::new(false),
        }
    }

    fn plan(&self, op: Op) -> Plan {
        let mut state = self.lock();
        *state.calls.entry(op).or_default() += 1;
        Plan {
            delay: state.delays.get(&op).copied(),
            panic: state.panics.contains(&op),
            failure: state.failures.get(&op).cloned(),
        }
    }

    /// Count the call, then delay, panic, or fail as configured.
    async fn enter(&self, op: Op) -> ClientResult<()> {
        let plan = self.plan(op);
        if let Some(delay) = plan.delay {
            tokio::time::sleep(delay).await;
        }
        if plan.panic {
            panic!("injected panic in {op:?}");
        }
        match plan.failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn offsets(&self, topics: &[String], end: bool) -> ListedOffsets {
        let state = self.lock();
        let mut listed = Vec::new();
        for topic in state.metadata.topics.iter().filter(|t| topics.contains(&t.name)) {
            for partition in &topic.partitions {
                let key = (topic.name.clone(), partition.partition);
                let (start, end_offset) = state.offsets.get(&key).copied().unwrap_or((0, 0));
                listed.push(ListedOffset {
                    topic: topic.name.clone(),
                    partition: partition.partition,
                    offset: if end { end_offset } else { start },
                    error: state.offset_errors.get(&key).cloned(),
                });
            }
        }
        listed
    }
}

#[async_trait]
impl ClientFactory for MemoryCluster {
    async fn build(&self, _config: &KafkaConfig) -> ClientResult<Arc<dyn ClusterClient>> {
        self.enter(Op::Build).await?;
        Ok(Arc::new(self.client()))
    }
}

/// A client handle onto a [`MemoryCluster`].
pub struct MemoryClient {
    cluster: MemoryCluster,
    closed: AtomicBool,
}

impl MemoryClient {
    fn check_open(&self) -> ClientResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(ClientError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ClusterClient for MemoryClient {
    async fn ping(&self) -> ClientResult<()> {
        self.check_open()?;
        self.cluster.enter(Op::Ping).await
    }

    async fn metadata(&self) -> ClientResult<ClusterMetadata> {
        self.check_open()?;
        self.cluster.enter(Op::Metadata).await?;
        Ok(self.cluster.lock().metadata.clone())
    }

    async fn list_end_offsets(&self, topics: &[String]) -> ClientResult<ListedOffsets> {
        self.check_open()?;
        self.cluster.enter(Op::EndOffsets).await?;
        Ok(self.cluster.offsets(topics, true))
    }

    async fn list_start_offsets(&self, topics: &[String]) -> ClientResult<ListedOffsets> {
        self.check_open()?;
        self.cluster.enter(Op::StartOffsets).await?;
        Ok(self.cluster.offsets(topics, false))
    }

    async fn group_lags(&self) -> ClientResult<Vec<GroupLag>> {
        self.check_open()?;
        self.cluster.enter(Op::GroupLags).await?;
        Ok(self.cluster.lock().groups.clone())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.cluster.lock().closed += 1;
        }
    }
}
