//! lagwatch-client — the seam between lagwatch and a Kafka cluster.
//!
//! Defines the snapshot types a collection pass consumes, the
//! `ClusterClient` capability that produces them, connection settings
//! (seed brokers, SASL, TLS), and the `ClientManager` that owns the one
//! live client handle.
//!
//! # Architecture
//!
//! ```text
//! ClientManager
//!   ├── ClientFactory::build(&KafkaConfig) → Arc<dyn ClusterClient>
//!   ├── ClusterClient::ping()              ← liveness gate before first use
//!   └── rebuild()                          ← build + ping new, close old
//!
//! ClusterClient
//!   ├── metadata()           → ClusterMetadata
//!   ├── list_end_offsets()   → ListedOffsets
//!   ├── list_start_offsets() → ListedOffsets
//!   └── group_lags()         → Vec<GroupLag>
//! ```
//!
//! Backends: a librdkafka-backed client behind the `rdkafka` feature, and
//! `memory::MemoryCluster` (in-process, programmable) behind the `testing`
//! feature for the test suites of dependent crates.

pub mod client;
pub mod config;
pub mod error;
#[cfg(feature = "rdkafka")]
pub mod librdkafka;
pub mod manager;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod types;

pub use client::{ClientFactory, ClusterClient};
pub use config::{Auth, HostPort, KafkaConfig, SaslMechanism, Transport};
pub use error::{ClientError, ClientResult, ConfigError};
pub use manager::ClientManager;
pub use types::*;
