//! One collection pass.
//!
//! A pass reads the cluster through a [`ClusterClient`] and writes what it
//! finds into the exporter's gauges. Items that cannot be read are
//! recorded in the failure counter and skipped; their gauges keep the
//! value from the last pass that could read them.

use std::any::Any;
use std::backtrace::Backtrace;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use lagwatch_client::{
    ClientError, ClientResult, ClusterClient, ClusterMetadata, GroupLag, ListedOffsets,
};
use lagwatch_metrics::ExporterMetrics;
use tracing::{debug, error, warn};

use crate::error::{CollectError, OffsetClass};
use crate::failure::FailureCounter;

pub struct CollectionPass {
    metrics: Arc<ExporterMetrics>,
    /// Upper bound on every individual client call.
    call_timeout: Duration,
}

impl CollectionPass {
    pub fn new(metrics: Arc<ExporterMetrics>, call_timeout: Duration) -> Self {
        Self {
            metrics,
            call_timeout,
        }
    }

    pub fn metrics(&self) -> &Arc<ExporterMetrics> {
        &self.metrics
    }

    /// Run one pass.
    ///
    /// Returns an error only for the two failures that end a pass early
    /// (metadata and group lag); the caller records those. A panic inside
    /// the pass is recorded here and reported as success.
    pub async fn run(
        &self,
        client: &dyn ClusterClient,
        failures: &mut FailureCounter,
    ) -> Result<(), CollectError> {
        let outcome = AssertUnwindSafe(self.collect(client, failures))
            .catch_unwind()
            .await;

        match outcome {
            Ok(result) => result,
            Err(payload) => {
                let fault = CollectError::InternalFault(panic_message(payload.as_ref()));
                let backtrace = Backtrace::force_capture();
                error!(error = %fault, %backtrace, "collection pass panicked");
                failures.record(Some(fault));
                Ok(())
            }
        }
    }

    async fn collect(
        &self,
        client: &dyn ClusterClient,
        failures: &mut FailureCounter,
    ) -> Result<(), CollectError> {
        let metadata = self
            .bounded(client.metadata())
            .await
            .map_err(CollectError::Metadata)?;

        self.export_brokers(&metadata);
        self.export_topics(&metadata, failures);

        let topics = metadata.topic_names();
        for class in [OffsetClass::End, OffsetClass::Start] {
            let listed = match class {
                OffsetClass::End => self.bounded(client.list_end_offsets(&topics)).await,
                OffsetClass::Start => self.bounded(client.list_start_offsets(&topics)).await,
            };
            match listed {
                Ok(offsets) => self.export_offsets(class, &offsets, failures),
                Err(source) => record(failures, CollectError::ListOffsets { class, source }),
            }
        }

        let groups = self
            .bounded(client.group_lags())
            .await
            .map_err(CollectError::GroupLag)?;
        self.export_groups(&groups, failures);

        debug!(
            brokers = metadata.brokers.len(),
            topics = topics.len(),
            groups = groups.len(),
            "collection pass complete"
        );
        Ok(())
    }

    async fn bounded<T>(&self, call: impl Future<Output = ClientResult<T>>) -> ClientResult<T> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(self.call_timeout)),
        }
    }

    fn export_brokers(&self, metadata: &ClusterMetadata) {
        let brokers = &self.metrics.broker;
        brokers.set_count(metadata.brokers.len());
        for broker in &metadata.brokers {
            brokers.set_info(broker.node_id, &broker.address(), broker.rack.as_deref());
        }
        brokers.set_controller(metadata.controller_id);
    }

    fn export_topics(&self, metadata: &ClusterMetadata, failures: &mut FailureCounter) {
        let topics = &self.metrics.topic;
        for topic in &metadata.topics {
            topics.set_partitions(&topic.name, topic.partitions.len());

            for partition in &topic.partitions {
                if let Some(source) = &partition.error {
                    record(
                        failures,
                        CollectError::Partition {
                            topic: topic.name.clone(),
                            partition: partition.partition,
                            source: source.clone(),
                        },
                    );
                    continue;
                }

                let (name, id) = (topic.name.as_str(), partition.partition);
                topics.set_leader(name, id, partition.leader_id);
                topics.set_replicas(name, id, partition.replicas.len());
                topics.set_in_sync_replicas(name, id, partition.isr.len());
                topics.set_under_replicated(name, id, partition.offline_replicas.len());
                topics.set_leader_is_preferred(name, id, partition.leader_is_preferred());
            }
        }
    }

    fn export_offsets(
        &self,
        class: OffsetClass,
        offsets: &ListedOffsets,
        failures: &mut FailureCounter,
    ) {
        let topics = &self.metrics.topic;
        for entry in offsets {
            if let Some(source) = &entry.error {
                record(
                    failures,
                    CollectError::Offset {
                        class,
                        topic: entry.topic.clone(),
                        partition: entry.partition,
                        source: source.clone(),
                    },
                );
                continue;
            }
            match class {
                OffsetClass::End => {
                    topics.set_current_offset(&entry.topic, entry.partition, entry.offset)
                }
                OffsetClass::Start => {
                    topics.set_oldest_offset(&entry.topic, entry.partition, entry.offset)
                }
            }
        }
    }

    fn export_groups(&self, groups: &[GroupLag], failures: &mut FailureCounter) {
        let metrics = &self.metrics.group;
        for group in groups {
            if group.has_error() {
                // Both outcomes count: a clean half lets the counter down.
                failures.record(group.fetch_error.clone().map(|source| {
                    log_failure(CollectError::GroupFetch {
                        group: group.group.clone(),
                        source,
                    })
                }));
                failures.record(group.describe_error.clone().map(|source| {
                    log_failure(CollectError::GroupDescribe {
                        group: group.group.clone(),
                        source,
                    })
                }));
                continue;
            }

            metrics.set_members(&group.group, group.members);
            metrics.set_coordinator(&group.group, group.coordinator_id);

            if group.lag.is_empty() {
                warn!(group = %group.group, "consumer group has no partition lag");
                continue;
            }

            for entry in &group.lag {
                if let Some(source) = &entry.error {
                    record(
                        failures,
                        CollectError::PartitionLag {
                            group: group.group.clone(),
                            topic: entry.topic.clone(),
                            partition: entry.partition,
                            source: source.clone(),
                        },
                    );
                    continue;
                }
                metrics.set_lag(&group.group, &entry.topic, entry.partition, entry.lag);
                metrics.set_current_offset(
                    &group.group,
                    &entry.topic,
                    entry.partition,
                    entry.committed,
                );
            }
        }
    }
}

fn log_failure(error: CollectError) -> CollectError {
    warn!(error = %error, "skipping item");
    error
}

fn record(failures: &mut FailureCounter, error: CollectError) {
    failures.record(Some(log_failure(error)));
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
