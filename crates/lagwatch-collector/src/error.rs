//! Collection and scheduler error types.

use std::fmt;

use lagwatch_client::ClientError;
use thiserror::Error;

/// Which offset listing a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetClass {
    /// Newest offset (high watermark).
    End,
    /// Oldest retained offset.
    Start,
}

impl fmt::Display for OffsetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OffsetClass::End => f.write_str("end"),
            OffsetClass::Start => f.write_str("start"),
        }
    }
}

/// A failure observed while collecting.
///
/// `Metadata` and `GroupLag` end the pass; the rest are item-level and
/// recorded without interrupting it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectError {
    #[error("cannot get cluster metadata: {0}")]
    Metadata(#[source] ClientError),

    #[error("cannot get consumer group lag: {0}")]
    GroupLag(#[source] ClientError),

    #[error("cannot list {class} offsets: {source}")]
    ListOffsets {
        class: OffsetClass,
        source: ClientError,
    },

    #[error("partition {topic}/{partition} reported an error: {source}")]
    Partition {
        topic: String,
        partition: i32,
        source: ClientError,
    },

    #[error("cannot get {class} offset for {topic}/{partition}: {source}")]
    Offset {
        class: OffsetClass,
        topic: String,
        partition: i32,
        source: ClientError,
    },

    #[error("cannot fetch offsets of consumer group {group}: {source}")]
    GroupFetch { group: String, source: ClientError },

    #[error("cannot describe consumer group {group}: {source}")]
    GroupDescribe { group: String, source: ClientError },

    #[error("cannot get lag of consumer group {group} on {topic}/{partition}: {source}")]
    PartitionLag {
        group: String,
        topic: String,
        partition: i32,
        source: ClientError,
    },

    #[error("collection pass panicked: {0}")]
    InternalFault(String),
}

/// Errors that end [`Scheduler::run`](crate::Scheduler::run).
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("giving up after {count} unrecovered collection failures{}", describe_recent(.recent))]
    CircuitOpen {
        count: u32,
        recent: Option<Box<CollectError>>,
    },

    #[error("kafka client rebuild failed: {0}")]
    Rebuild(#[source] ClientError),
}

fn describe_recent(recent: &Option<Box<CollectError>>) -> String {
    match recent {
        Some(error) => format!(", most recent: {error}"),
        None => String::new(),
    }
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
