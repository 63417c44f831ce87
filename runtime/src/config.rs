//! Configuration for logs and queues.

use crate::bucket::{Bucket, FileBucket};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use strand_engine::TransformId;

/// Settings for a [`TransformLog`](crate::TransformLog).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogSettings {
    /// Key the log is persisted under; required with a bucket
    pub name: Option<String>,
    /// Initial ids. When given, persisted ids are not loaded.
    pub data: Vec<TransformId>,
    #[serde(skip)]
    pub bucket: Option<Arc<dyn Bucket>>,
}

impl LogSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_bucket(mut self, bucket: Arc<dyn Bucket>) -> Self {
        self.bucket = Some(bucket);
        self
    }

    pub fn with_data<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TransformId>,
    {
        self.data = ids.into_iter().map(Into::into).collect();
        self
    }
}

/// Settings for a [`TaskQueue`](crate::TaskQueue).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskQueueSettings {
    /// Key the queue is persisted under; required with a bucket
    pub name: Option<String>,
    /// Start processing as soon as a task is added
    pub auto_process: bool,
    #[serde(skip)]
    pub bucket: Option<Arc<dyn Bucket>>,
}

impl Default for TaskQueueSettings {
    fn default() -> Self {
        Self {
            name: None,
            auto_process: true,
            bucket: None,
        }
    }
}

impl TaskQueueSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_auto_process(mut self, auto_process: bool) -> Self {
        self.auto_process = auto_process;
        self
    }

    pub fn with_bucket(mut self, bucket: Arc<dyn Bucket>) -> Self {
        self.bucket = Some(bucket);
        self
    }
}

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Name of the task queue
    pub queue_name: String,
    /// Name of the transform log
    pub log_name: String,
    /// Whether the queue processes tasks as they are pushed
    pub auto_process: bool,
    /// Directory for persisted state; no persistence when unset
    pub bucket_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let queue_name = lookup("STRAND_QUEUE_NAME").unwrap_or_else(|| "queue".to_string());
        if queue_name.trim().is_empty() {
            return Err(ConfigError::EmptyName("STRAND_QUEUE_NAME"));
        }

        let log_name = lookup("STRAND_LOG_NAME").unwrap_or_else(|| "log".to_string());
        if log_name.trim().is_empty() {
            return Err(ConfigError::EmptyName("STRAND_LOG_NAME"));
        }
        if log_name == queue_name {
            return Err(ConfigError::SharedName(log_name));
        }

        let auto_process = match lookup("STRAND_AUTO_PROCESS").as_deref() {
            None => true,
            Some("true" | "1") => true,
            Some("false" | "0") => false,
            Some(other) => return Err(ConfigError::InvalidAutoProcess(other.to_string())),
        };

        let bucket_dir = lookup("STRAND_BUCKET_DIR")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            queue_name,
            log_name,
            auto_process,
            bucket_dir,
        })
    }

    /// The bucket selected by this configuration, if any.
    pub fn bucket(&self) -> Option<Arc<dyn Bucket>> {
        self.bucket_dir
            .as_ref()
            .map(|dir| Arc::new(FileBucket::new(dir)) as Arc<dyn Bucket>)
    }

    /// Settings for a log and a queue sharing one bucket.
    pub fn settings(&self) -> (LogSettings, TaskQueueSettings) {
        let bucket = self.bucket();
        let log = LogSettings {
            name: Some(self.log_name.clone()),
            data: Vec::new(),
            bucket: bucket.clone(),
        };
        let queue = TaskQueueSettings {
            name: Some(self.queue_name.clone()),
            auto_process: self.auto_process,
            bucket,
        };
        (log, queue)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    EmptyName(&'static str),

    #[error("queue and log cannot share the name {0}")]
    SharedName(String),

    #[error("invalid STRAND_AUTO_PROCESS value: {0}")]
    InvalidAutoProcess(String),
}
