//! lagwatch-collector — the collection scheduler and failure containment.
//!
//! Decides when to sample the cluster, how a single pass degrades under
//! partial failure, when the client is rebuilt, and when the exporter
//! gives up.
//!
//! # Architecture
//!
//! ```text
//! Scheduler::run()                        ← one serialized task
//!   ├── FailureCounter::should_abort()    ← circuit check, top of loop
//!   ├── select! { tick, shutdown }
//!   ├── CollectionPass::run()             ← metadata, offsets, group lag
//!   │     └── catch_unwind fault boundary
//!   └── maybe_rebuild()                   ← degraded + cooldown elapsed
//! ```
//!
//! Item-level failures are recorded by the pass itself and never abort it.
//! Only metadata and group-lag failures end a pass early. The scheduler
//! itself ends on an open circuit or a client that cannot be rebuilt.

pub mod error;
pub mod failure;
pub mod pass;
pub mod scheduler;

pub use error::{CollectError, OffsetClass, SchedulerError, SchedulerResult};
pub use failure::FailureCounter;
pub use pass::CollectionPass;
pub use scheduler::{LoopState, Scheduler, SchedulerConfig, DEFAULT_REBUILD_COOLDOWN};
