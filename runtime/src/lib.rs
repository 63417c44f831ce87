//! # Strand Runtime
//!
//! Async coordination around [`strand_engine`]:
//!
//! - [`TransformLog`]: ordered, persisted list of applied transform ids
//! - [`TaskQueue`]: runs tasks one at a time through a [`Performer`], halting
//!   on failure until the caller retries, skips or clears
//! - [`Bucket`]: key-value persistence for both, in memory or on disk
//! - [`TransformPerformer`]: applies queued transforms to a record source
//!   and records them in a log
//!
//! Logs and queues share the same lifecycle. The first call waits for
//! persisted state to be loaded from the bucket, mutations are serialized,
//! and each mutation is persisted before subscribers are notified.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use strand_engine::{MemorySource, Record, RecordOperation, Shared, Transform};
//! use strand_runtime::{
//!     transform_task, LogSettings, TaskQueue, TaskQueueSettings, TransformLog,
//!     TransformPerformer,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let log = TransformLog::new(LogSettings::new())?;
//! let source = Arc::new(Shared::new(MemorySource::new()));
//! let performer = Arc::new(TransformPerformer::new(source, log.clone()));
//! let queue = TaskQueue::new(performer, TaskQueueSettings::new())?;
//!
//! let transform = Transform::new(vec![RecordOperation::add_record(
//!     Record::new("planet", "earth").with_attribute("name", json!("Earth")),
//! )]);
//! queue.push(transform_task(&transform)?).await?;
//!
//! assert_eq!(log.head().await?, Some(transform.id));
//! # Ok(())
//! # }
//! ```

pub mod bucket;
pub mod config;
pub mod error;
pub mod log;
pub mod performer;
pub mod queue;
pub mod task;

// Re-export main types at crate root
pub use bucket::{Bucket, FileBucket, MemoryBucket};
pub use config::{Config, ConfigError, LogSettings, TaskQueueSettings};
pub use error::{Error, TaskError};
pub use log::{LogEvent, TransformLog};
pub use performer::{transform_task, TransformPerformer, TRANSFORM_TASK};
pub use queue::{QueueEvent, TaskQueue};
pub use task::{Performer, Task, TaskProcessor};
