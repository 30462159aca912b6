//! lagwatch-metrics — the exporter's metric catalog.
//!
//! Declares every Kafka gauge lagwatch exposes, registers them in a
//! dedicated Prometheus registry, and renders the registry in the text
//! exposition format for the `/metrics` endpoint.
//!
//! # Architecture
//!
//! ```text
//! ExporterMetrics
//!   ├── broker: BrokerMetrics   ← kafka_broker*
//!   ├── topic:  TopicMetrics    ← kafka_topic_*
//!   ├── group:  GroupMetrics    ← kafka_consumergroup_*
//!   └── render() → text/plain for /metrics
//! ```
//!
//! Gauges keep their last written value until overwritten. Nothing is ever
//! removed, so a series whose refresh failed keeps serving the previous
//! value.

pub mod catalog;
pub mod error;
pub mod exporter;
pub mod prometheus;

pub use error::{MetricsError, MetricsResult};
pub use exporter::{BrokerMetrics, ExporterMetrics, GroupMetrics, TopicMetrics};
pub use prometheus::{render_prometheus, CONTENT_TYPE};
