//! Cluster snapshot types.
//!
//! Everything here is rebuilt from scratch on every collection pass and
//! dropped at its end.

use crate::error::ClientError;

/// Cluster-wide metadata: brokers, controller, topics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterMetadata {
    /// Broker id of the current controller.
    pub controller_id: i32,
    /// Live brokers, in the order the cluster reported them.
    pub brokers: Vec<BrokerInfo>,
    pub topics: Vec<TopicInfo>,
}

impl ClusterMetadata {
    /// Names of every topic in the snapshot.
    pub fn topic_names(&self) -> Vec<String> {
        self.topics.iter().map(|t| t.name.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerInfo {
    pub node_id: i32,
    pub host: String,
    pub port: i32,
    pub rack: Option<String>,
}

impl BrokerInfo {
    /// `host:port` as advertised by the broker.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopicInfo {
    pub name: String,
    pub is_internal: bool,
    pub partitions: Vec<PartitionInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionInfo {
    pub partition: i32,
    pub leader_id: i32,
    /// Replica broker ids; index 0 is the preferred leader.
    pub replicas: Vec<i32>,
    pub isr: Vec<i32>,
    pub offline_replicas: Vec<i32>,
    /// Set when the cluster could not describe this partition.
    pub error: Option<ClientError>,
}

impl PartitionInfo {
    /// Whether the current leader is the first entry of the replica list.
    ///
    /// An empty replica list never has a preferred leader.
    pub fn leader_is_preferred(&self) -> bool {
        self.replicas.first() == Some(&self.leader_id)
    }
}

/// One partition's offset from a list-offsets call.
#[derive(Debug, Clone, PartialEq)]
pub struct ListedOffset {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub error: Option<ClientError>,
}

pub type ListedOffsets = Vec<ListedOffset>;

/// Lag state of one consumer group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupLag {
    pub group: String,
    pub coordinator_id: i32,
    /// Number of members currently in the group.
    pub members: usize,
    pub lag: Vec<PartitionLag>,
    /// Failure fetching the group's committed offsets.
    pub fetch_error: Option<ClientError>,
    /// Failure describing the group.
    pub describe_error: Option<ClientError>,
}

impl GroupLag {
    /// A healthy group with no tracked partitions.
    pub fn idle(group: &str, coordinator_id: i32, members: usize) -> Self {
        Self {
            group: group.to_string(),
            coordinator_id,
            members,
            lag: Vec::new(),
            fetch_error: None,
            describe_error: None,
        }
    }

    pub fn has_error(&self) -> bool {
        self.fetch_error.is_some() || self.describe_error.is_some()
    }
}

/// Lag of a consumer group on a single partition.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionLag {
    pub topic: String,
    pub partition: i32,
    pub lag: i64,
    /// Offset the group last committed.
    pub committed: i64,
    pub error: Option<ClientError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition(leader_id: i32, replicas: Vec<i32>) -> PartitionInfo {
        PartitionInfo {
            partition: 0,
            leader_id,
            replicas,
            isr: Vec::new(),
            offline_replicas: Vec::new(),
            error: None,
        }
    }

    #[test]
    fn preferred_when_leader_is_first_replica() {
        assert!(partition(1, vec![1, 2, 3]).leader_is_preferred());
    }

    #[test]
    fn not_preferred_when_leader_is_later_replica() {
        assert!(!partition(2, vec![1, 2, 3]).leader_is_preferred());
    }

    #[test]
    fn empty_replicas_never_preferred() {
        assert!(!partition(0, vec![]).leader_is_preferred());
        assert!(!partition(-1, vec![]).leader_is_preferred());
    }

    #[test]
    fn broker_address_joins_host_and_port() {
        let broker = BrokerInfo {
            node_id: 1,
            host: "kafka-1".to_string(),
            port: 9092,
            rack: None,
        };
        assert_eq!(broker.address(), "kafka-1:9092");
    }

    #[test]
    fn group_error_detection() {
        let mut group = GroupLag::idle("g", 1, 0);
        assert!(!group.has_error());
        group.describe_error = Some(ClientError::Broker("COORDINATOR_NOT_AVAILABLE".into()));
        assert!(group.has_error());
    }
}
