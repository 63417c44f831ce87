//! Tasks and their processors.
//!
//! A [`TaskProcessor`] runs one task through a [`Performer`] and holds its
//! single settlement. The first call to [`TaskProcessor::process`] starts
//! the work; later calls wait for the same outcome. [`TaskProcessor::reset`]
//! clears the outcome so the task can be attempted again.

use crate::error::TaskError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// A unit of work for a [`TaskQueue`](crate::TaskQueue).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Kind of work; performers dispatch on it
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Task {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            id: None,
            data,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Executes tasks on behalf of a queue.
#[async_trait]
pub trait Performer: Send + Sync {
    /// Perform a task. Called once per attempt.
    async fn perform(&self, task: &Task) -> Result<Value, TaskError>;
}

type Settlement = Option<Result<Value, TaskError>>;

/// Runs a task and holds its outcome.
pub struct TaskProcessor {
    task: Task,
    performer: Arc<dyn Performer>,
    settlement: watch::Sender<Settlement>,
    started: AtomicBool,
    attempt: AtomicU64,
}

impl std::fmt::Debug for TaskProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskProcessor")
            .field("task", &self.task)
            .field("started", &self.started())
            .field("settled", &self.settled())
            .finish()
    }
}

impl TaskProcessor {
    pub fn new(performer: Arc<dyn Performer>, task: Task) -> Self {
        let (settlement, _) = watch::channel(None);
        Self {
            task,
            performer,
            settlement,
            started: AtomicBool::new(false),
            attempt: AtomicU64::new(0),
        }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Whether the current attempt has been started.
    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Whether the current attempt has an outcome.
    pub fn settled(&self) -> bool {
        self.settlement.borrow().is_some()
    }

    /// Start the task if it has not been started, then wait for its outcome.
    ///
    /// The performer runs on its own tokio task, so dropping this future
    /// or rejecting the settlement does not interrupt it.
    pub async fn process(self: &Arc<Self>) -> Result<Value, TaskError> {
        if !self.started.swap(true, Ordering::SeqCst) {
            let attempt = self.attempt.load(Ordering::SeqCst);
            let processor = Arc::clone(self);
            tokio::spawn(async move {
                let performer = Arc::clone(&processor.performer);
                let task = processor.task.clone();
                let result = match tokio::spawn(async move { performer.perform(&task).await }).await
                {
                    Ok(result) => result,
                    Err(err) => Err(TaskError::failed(format!("performer aborted: {err}"))),
                };
                // A reset since this attempt began makes its outcome stale
                if processor.attempt.load(Ordering::SeqCst) == attempt {
                    processor.settle(result);
                }
            });
        }
        self.outcome().await
    }

    /// Wait for the outcome of the current attempt.
    pub async fn outcome(&self) -> Result<Value, TaskError> {
        let mut receiver = self.settlement.subscribe();
        let settled = receiver.wait_for(Option::is_some).await;
        match settled {
            Ok(settlement) => (*settlement)
                .clone()
                .unwrap_or_else(|| Err(TaskError::cancelled("task was reset"))),
            Err(_) => Err(TaskError::cancelled("task processor dropped")),
        }
    }

    /// Record an outcome unless one is already recorded.
    pub fn settle(&self, result: Result<Value, TaskError>) {
        self.settlement.send_if_modified(|settlement| {
            if settlement.is_some() {
                return false;
            }
            *settlement = Some(result);
            true
        });
    }

    /// Reject the task unless it has already settled.
    pub fn reject(&self, error: TaskError) {
        self.settle(Err(error));
    }

    /// Forget the outcome so the task can run again.
    pub fn reset(&self) {
        self.attempt.fetch_add(1, Ordering::SeqCst);
        self.settlement.send_replace(None);
        self.started.store(false, Ordering::SeqCst);
    }
}
