//! Shared helpers for runtime integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use strand_runtime::{Performer, QueueEvent, Task, TaskError};
use tokio::sync::{broadcast, Notify};

/// Route runtime logs through the test harness. Set `RUST_LOG` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Records every task it runs and echoes the task data.
///
/// Tasks of type `"flaky"` fail while `failing` is set. Tasks of type
/// `"gated"` wait for `gate` before finishing.
#[derive(Default)]
pub struct Recorder {
    runs: Mutex<Vec<Value>>,
    failing: AtomicBool,
    pub gate: Notify,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let recorder = Self::default();
        recorder.failing.store(true, Ordering::SeqCst);
        Arc::new(recorder)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Data of each task run so far, in the order runs began.
    pub fn runs(&self) -> Vec<Value> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Performer for Recorder {
    async fn perform(&self, task: &Task) -> Result<Value, TaskError> {
        self.runs.lock().unwrap().push(task.data.clone());
        match task.kind.as_str() {
            "flaky" if self.failing.load(Ordering::SeqCst) => {
                Err(TaskError::failed(format!("{} refused", task.data)))
            }
            "gated" => {
                self.gate.notified().await;
                Ok(task.data.clone())
            }
            _ => Ok(task.data.clone()),
        }
    }
}

/// Collect queue events up to and including the first match.
pub async fn events_until(
    events: &mut broadcast::Receiver<QueueEvent>,
    done: impl Fn(&QueueEvent) -> bool,
) -> Vec<QueueEvent> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for queue event")
            .expect("queue event channel closed");
        let finished = done(&event);
        seen.push(event);
        if finished {
            return seen;
        }
    }
}
