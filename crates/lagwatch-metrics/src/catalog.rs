//! Metric names, help strings, and label sets.
//!
//! Names are part of the exporter's compatibility surface; dashboards and
//! alerts depend on them.

pub struct Metric {
    pub name: &'static str,
    pub help: &'static str,
    pub labels: &'static [&'static str],
}

pub const LABEL_ID: &str = "id";
pub const LABEL_ADDRESS: &str = "address";
pub const LABEL_RACK: &str = "rack";
pub const LABEL_TOPIC: &str = "topic";
pub const LABEL_PARTITION: &str = "partition";
pub const LABEL_CONSUMER_GROUP: &str = "consumergroup";

/// Rack label value for brokers that do not advertise one.
pub const UNKNOWN_RACK: &str = "unknown";

pub const ALL: [Metric; 16] = [
    BROKERS,
    BROKER_INFO,
    BROKER_CONTROLLER,
    TOPIC_PARTITIONS,
    TOPIC_PARTITION_LEADER,
    TOPIC_PARTITION_REPLICAS,
    TOPIC_PARTITION_IN_SYNC_REPLICAS,
    TOPIC_PARTITION_UNDER_REPLICATED,
    TOPIC_PARTITION_LEADER_IS_PREFERRED,
    TOPIC_PARTITION_CURRENT_OFFSET,
    TOPIC_PARTITION_OLDEST_OFFSET,
    TOPIC_IS_INTERNAL,
    CONSUMERGROUP_MEMBERS,
    CONSUMERGROUP_COORDINATOR,
    CONSUMERGROUP_LAG,
    CONSUMERGROUP_CURRENT_OFFSET,
];

const TOPIC_PARTITION: &[&str] = &[LABEL_TOPIC, LABEL_PARTITION];
const GROUP_TOPIC_PARTITION: &[&str] = &[LABEL_CONSUMER_GROUP, LABEL_TOPIC, LABEL_PARTITION];

// BROKER Metrics --------------------------

pub const BROKERS: Metric = Metric {
    name: "kafka_brokers",
    help: "Number of brokers in the Kafka cluster",
    labels: &[],
};

pub const BROKER_INFO: Metric = Metric {
    name: "kafka_broker_info",
    help: "Information about the broker (node_id, host, rack_id* (if present) )",
    labels: &[LABEL_ID, LABEL_ADDRESS, LABEL_RACK],
};

pub const BROKER_CONTROLLER: Metric = Metric {
    name: "kafka_broker_controller",
    help: "ID of the broker that is currently the controller for the Kafka cluster",
    labels: &[],
};

// TOPIC Metrics --------------------------

pub const TOPIC_PARTITIONS: Metric = Metric {
    name: "kafka_topic_partitions",
    help: "Number of partitions for this Topic",
    labels: &[LABEL_TOPIC],
};

pub const TOPIC_PARTITION_LEADER: Metric = Metric {
    name: "kafka_topic_partition_leader",
    help: "ID of the broker that is currently the leader for this Topic/Partition",
    labels: TOPIC_PARTITION,
};

pub const TOPIC_PARTITION_REPLICAS: Metric = Metric {
    name: "kafka_topic_partition_replicas",
    help: "Number of Replicas for this Topic/Partition",
    labels: TOPIC_PARTITION,
};

pub const TOPIC_PARTITION_IN_SYNC_REPLICAS: Metric = Metric {
    name: "kafka_topic_partition_in_sync_replicas",
    help: "Number of In-Sync Replicas for this Topic/Partition",
    labels: TOPIC_PARTITION,
};

pub const TOPIC_PARTITION_UNDER_REPLICATED: Metric = Metric {
    name: "kafka_topic_partition_under_replicated_partition",
    help: "Number of offline replicas for this Topic/Partition",
    labels: TOPIC_PARTITION,
};

pub const TOPIC_PARTITION_LEADER_IS_PREFERRED: Metric = Metric {
    name: "kafka_topic_partition_leader_is_preferred",
    help: "1 if the current broker is the preferred leader for this Topic/Partition, 0 otherwise",
    labels: TOPIC_PARTITION,
};

pub const TOPIC_PARTITION_CURRENT_OFFSET: Metric = Metric {
    name: "kafka_topic_partition_current_offset",
    help: "Current Offset of a Topic/Partition",
    labels: TOPIC_PARTITION,
};

pub const TOPIC_PARTITION_OLDEST_OFFSET: Metric = Metric {
    name: "kafka_topic_partition_oldest_offset",
    help: "Oldest Offset of a Topic/Partition",
    labels: TOPIC_PARTITION,
};

pub const TOPIC_IS_INTERNAL: Metric = Metric {
    name: "kafka_topic_is_internal",
    help: "1 if the Topic is an internal Topic, 0 otherwise",
    labels: &[LABEL_TOPIC],
};

// CONSUMER GROUP Metrics --------------------------

pub const CONSUMERGROUP_MEMBERS: Metric = Metric {
    name: "kafka_consumergroup_members",
    help: "Number of members in the consumer group",
    labels: &[LABEL_CONSUMER_GROUP],
};

pub const CONSUMERGROUP_COORDINATOR: Metric = Metric {
    name: "kafka_consumergroup_coordinator",
    help: "ID of the broker that is currently the coordinator for the consumer group",
    labels: &[LABEL_CONSUMER_GROUP],
};

pub const CONSUMERGROUP_LAG: Metric = Metric {
    name: "kafka_consumergroup_lag",
    help: "Current Approximate Lag of a ConsumerGroup at Topic/Partition",
    labels: GROUP_TOPIC_PARTITION,
};

pub const CONSUMERGROUP_CURRENT_OFFSET: Metric = Metric {
    name: "kafka_consumergroup_current_offset",
    help: "Current Offset of a ConsumerGroup at Topic/Partition",
    labels: GROUP_TOPIC_PARTITION,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_are_unique_and_prefixed() {
        let names: HashSet<&str> = ALL.iter().map(|m| m.name).collect();
        assert_eq!(names.len(), ALL.len());
        assert!(ALL.iter().all(|m| m.name.starts_with("kafka_")));
    }

    #[test]
    fn partition_metrics_carry_topic_and_partition() {
        for metric in ALL.iter().filter(|m| m.name.starts_with("kafka_topic_partition_")) {
            assert_eq!(metric.labels, TOPIC_PARTITION, "{}", metric.name);
        }
    }
}
