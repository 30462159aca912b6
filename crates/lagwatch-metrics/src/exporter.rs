//! The exporter's gauge set.
//!
//! `ExporterMetrics` owns a private registry holding every gauge in
//! [`catalog::ALL`](crate::catalog::ALL). Collection writes through the
//! typed setters; the HTTP layer reads through [`ExporterMetrics::render`].

use prometheus::{IntGauge, IntGaugeVec, Opts, Registry};

use crate::catalog::{self, Metric, UNKNOWN_RACK};
use crate::error::MetricsResult;
use crate::prometheus::render_prometheus;

fn int_gauge(registry: &Registry, metric: &Metric) -> MetricsResult<IntGauge> {
    let gauge = IntGauge::new(metric.name, metric.help)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn int_gauge_vec(registry: &Registry, metric: &Metric) -> MetricsResult<IntGaugeVec> {
    let gauge = IntGaugeVec::new(Opts::new(metric.name, metric.help), metric.labels)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn flag(value: bool) -> i64 {
    i64::from(value)
}

pub struct BrokerMetrics {
    brokers: IntGauge,
    info: IntGaugeVec,
    controller: IntGauge,
}

impl BrokerMetrics {
    fn register(registry: &Registry) -> MetricsResult<Self> {
        Ok(Self {
            brokers: int_gauge(registry, &catalog::BROKERS)?,
            info: int_gauge_vec(registry, &catalog::BROKER_INFO)?,
            controller: int_gauge(registry, &catalog::BROKER_CONTROLLER)?,
        })
    }

    pub fn set_count(&self, brokers: usize) {
        self.brokers.set(brokers as i64);
    }

    /// Mark a broker as present. A missing rack is exported as `unknown`.
    pub fn set_info(&self, id: i32, address: &str, rack: Option<&str>) {
        let id = id.to_string();
        let rack = rack.unwrap_or(UNKNOWN_RACK);
        self.info.with_label_values(&[&id, address, rack]).set(1);
    }

    pub fn set_controller(&self, id: i32) {
        self.controller.set(i64::from(id));
    }
}

pub struct TopicMetrics {
    partitions: IntGaugeVec,
    leader: IntGaugeVec,
    replicas: IntGaugeVec,
    in_sync_replicas: IntGaugeVec,
    under_replicated: IntGaugeVec,
    leader_is_preferred: IntGaugeVec,
    current_offset: IntGaugeVec,
    oldest_offset: IntGaugeVec,
}

impl TopicMetrics {
    fn register(registry: &Registry) -> MetricsResult<Self> {
        // Declared for compatibility; collection never writes it.
        int_gauge_vec(registry, &catalog::TOPIC_IS_INTERNAL)?;
        Ok(Self {
            partitions: int_gauge_vec(registry, &catalog::TOPIC_PARTITIONS)?,
            leader: int_gauge_vec(registry, &catalog::TOPIC_PARTITION_LEADER)?,
            replicas: int_gauge_vec(registry, &catalog::TOPIC_PARTITION_REPLICAS)?,
            in_sync_replicas: int_gauge_vec(registry, &catalog::TOPIC_PARTITION_IN_SYNC_REPLICAS)?,
            under_replicated: int_gauge_vec(registry, &catalog::TOPIC_PARTITION_UNDER_REPLICATED)?,
            leader_is_preferred: int_gauge_vec(
                registry,
                &catalog::TOPIC_PARTITION_LEADER_IS_PREFERRED,
            )?,
            current_offset: int_gauge_vec(registry, &catalog::TOPIC_PARTITION_CURRENT_OFFSET)?,
            oldest_offset: int_gauge_vec(registry, &catalog::TOPIC_PARTITION_OLDEST_OFFSET)?,
        })
    }

    fn partition(gauge: &IntGaugeVec, topic: &str, partition: i32) -> IntGauge {
        gauge.with_label_values(&[topic, &partition.to_string()])
    }

    pub fn set_partitions(&self, topic: &str, count: usize) {
        self.partitions.with_label_values(&[topic]).set(count as i64);
    }

    pub fn set_leader(&self, topic: &str, partition: i32, broker: i32) {
        Self::partition(&self.leader, topic, partition).set(i64::from(broker));
    }

    pub fn set_replicas(&self, topic: &str, partition: i32, count: usize) {
        Self::partition(&self.replicas, topic, partition).set(count as i64);
    }

    pub fn set_in_sync_replicas(&self, topic: &str, partition: i32, count: usize) {
        Self::partition(&self.in_sync_replicas, topic, partition).set(count as i64);
    }

    pub fn set_under_replicated(&self, topic: &str, partition: i32, offline: usize) {
        Self::partition(&self.under_replicated, topic, partition).set(offline as i64);
    }

    pub fn set_leader_is_preferred(&self, topic: &str, partition: i32, preferred: bool) {
        Self::partition(&self.leader_is_preferred, topic, partition).set(flag(preferred));
    }

    pub fn set_current_offset(&self, topic: &str, partition: i32, offset: i64) {
        Self::partition(&self.current_offset, topic, partition).set(offset);
    }

    pub fn set_oldest_offset(&self, topic: &str, partition: i32, offset: i64) {
        Self::partition(&self.oldest_offset, topic, partition).set(offset);
    }
}

pub struct GroupMetrics {
    members: IntGaugeVec,
    coordinator: IntGaugeVec,
    lag: IntGaugeVec,
    current_offset: IntGaugeVec,
}

impl GroupMetrics {
    fn register(registry: &Registry) -> MetricsResult<Self> {
        Ok(Self {
            members: int_gauge_vec(registry, &catalog::CONSUMERGROUP_MEMBERS)?,
            coordinator: int_gauge_vec(registry, &catalog::CONSUMERGROUP_COORDINATOR)?,
            lag: int_gauge_vec(registry, &catalog::CONSUMERGROUP_LAG)?,
            current_offset: int_gauge_vec(registry, &catalog::CONSUMERGROUP_CURRENT_OFFSET)?,
        })
    }

    pub fn set_members(&self, group: &str, members: usize) {
        self.members.with_label_values(&[group]).set(members as i64);
    }

    pub fn set_coordinator(&self, group: &str, broker: i32) {
        self.coordinator.with_label_values(&[group]).set(i64::from(broker));
    }

    pub fn set_lag(&self, group: &str, topic: &str, partition: i32, lag: i64) {
        self.lag
            .with_label_values(&[group, topic, &partition.to_string()])
            .set(lag);
    }

    pub fn set_current_offset(&self, group: &str, topic: &str, partition: i32, offset: i64) {
        self.current_offset
            .with_label_values(&[group, topic, &partition.to_string()])
            .set(offset);
    }
}

/// Every gauge the exporter publishes, registered in one registry.
pub struct ExporterMetrics {
    registry: Registry,
    pub broker: BrokerMetrics,
    pub topic: TopicMetrics,
    pub group: GroupMetrics,
}

impl ExporterMetrics {
    pub fn new() -> MetricsResult<Self> {
        let registry = Registry::new();
        let broker = BrokerMetrics::register(&registry)?;
        let topic = TopicMetrics::register(&registry)?;
        let group = GroupMetrics::register(&registry)?;
        tracing::debug!(metrics = catalog::ALL.len(), "metric catalog registered");
        Ok(Self {
            registry,
            broker,
            topic,
            group,
        })
    }

    /// Text exposition of every series written so far.
    pub fn render(&self) -> MetricsResult<String> {
        render_prometheus(&self.registry)
    }

    /// Current value of the series `name` whose labels are exactly `labels`.
    pub fn value(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        self.registry
            .gather()
            .into_iter()
            .filter(|family| family.get_name() == name)
            .flat_map(|family| family.get_metric().to_vec())
            .find(|metric| {
                let pairs = metric.get_label();
                pairs.len() == labels.len()
                    && labels.iter().all(|(key, value)| {
                        pairs
                            .iter()
                            .any(|p| p.get_name() == *key && p.get_value() == *value)
                    })
            })
            .map(|metric| metric.get_gauge().get_value())
    }

    /// Number of label sets written for `name`.
    pub fn series(&self, name: &str) -> usize {
        self.registry
            .gather()
            .iter()
            .filter(|family| family.get_name() == name)
            .map(|family| family.get_metric().len())
            .sum()
    }
}
