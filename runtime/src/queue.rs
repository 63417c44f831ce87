//! Task queue: runs tasks one at a time, in FIFO order.
//!
//! Processing drives the queue until it is empty or a task fails. A failed
//! task halts the queue with its error recorded; nothing else runs until
//! [`TaskQueue::retry`], [`TaskQueue::skip`], [`TaskQueue::clear`] or
//! [`TaskQueue::shift`] is called.
//!
//! Only one drive runs at a time. Calling [`TaskQueue::process`] while one
//! is in flight waits for it instead of starting another. Methods that
//! reorder the queue cancel the current drive; the performer's in-flight
//! work keeps running but its outcome no longer advances the queue.

use crate::bucket::Bucket;
use crate::config::TaskQueueSettings;
use crate::error::{Error, Result, TaskError};
use crate::task::{Performer, Task, TaskProcessor};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex, OnceCell};
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 256;

/// Notifications emitted by a queue.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    /// The persisted task list changed.
    Change,
    BeforeTask(Task),
    /// A task completed successfully and was removed.
    Task(Task),
    Fail(Task, TaskError),
    /// The queue drained.
    Complete,
}

#[derive(Debug, Clone, PartialEq)]
enum Status {
    Idle,
    /// A drive with this generation is running
    Processing(u64),
    Failed(TaskError),
}

#[derive(Debug, Default)]
struct QueueState {
    processors: VecDeque<Arc<TaskProcessor>>,
    /// Bumped to cancel the running drive
    generation: u64,
}

impl QueueState {
    fn cancel(&mut self) {
        self.generation += 1;
    }
}

struct QueueInner {
    name: Option<String>,
    bucket: Option<Arc<dyn Bucket>>,
    auto_process: bool,
    performer: Arc<dyn Performer>,
    state: Mutex<QueueState>,
    reified: OnceCell<()>,
    status: watch::Sender<Status>,
    events: broadcast::Sender<QueueEvent>,
}

/// Shared handle to a task queue.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("name", &self.inner.name)
            .field("auto_process", &self.inner.auto_process)
            .field("status", &*self.inner.status.borrow())
            .finish()
    }
}

impl TaskQueue {
    /// Create a queue whose tasks are run by `performer`.
    ///
    /// With a bucket, tasks persisted under the queue's name are loaded
    /// before the first operation. They run on the next
    /// [`process`](Self::process) or auto-processed push.
    pub fn new(performer: Arc<dyn Performer>, settings: TaskQueueSettings) -> Result<Self> {
        if settings.bucket.is_some() && settings.name.is_none() {
            return Err(Error::MissingName);
        }

        let reified = if settings.bucket.is_some() {
            OnceCell::new()
        } else {
            OnceCell::new_with(Some(()))
        };
        let (status, _) = watch::channel(Status::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(QueueInner {
                name: settings.name,
                bucket: settings.bucket,
                auto_process: settings.auto_process,
                performer,
                state: Mutex::new(QueueState::default()),
                reified,
                status,
                events,
            }),
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn auto_process(&self) -> bool {
        self.inner.auto_process
    }

    /// Subscribe to queue events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }

    /// Wait until persisted tasks have been loaded.
    pub async fn reified(&self) -> Result<()> {
        self.inner
            .reified
            .get_or_try_init(|| self.reify())
            .await
            .map(|_| ())
    }

    async fn reify(&self) -> Result<()> {
        let (Some(bucket), Some(name)) = (&self.inner.bucket, &self.inner.name) else {
            return Ok(());
        };
        let Some(value) = bucket.get_item(name).await? else {
            return Ok(());
        };
        let tasks: Vec<Task> =
            serde_json::from_value(value).map_err(|e| Error::InvalidState(e.to_string()))?;

        info!(queue = %name, tasks = tasks.len(), "reified task queue");
        let mut state = self.inner.state.lock().await;
        state.processors = tasks.into_iter().map(|task| self.processor(task)).collect();
        Ok(())
    }

    fn processor(&self, task: Task) -> Arc<TaskProcessor> {
        Arc::new(TaskProcessor::new(Arc::clone(&self.inner.performer), task))
    }

    async fn persist(&self, processors: &VecDeque<Arc<TaskProcessor>>) -> Result<()> {
        if let (Some(bucket), Some(name)) = (&self.inner.bucket, &self.inner.name) {
            let tasks: Vec<&Task> = processors.iter().map(|p| p.task()).collect();
            let value =
                serde_json::to_value(tasks).map_err(|e| Error::InvalidState(e.to_string()))?;
            bucket.set_item(name, value).await?;
        }
        Ok(())
    }

    fn emit(&self, event: QueueEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    fn label(&self) -> &str {
        self.name().unwrap_or("<unnamed>")
    }

    /// The task at the head of the queue.
    pub async fn current(&self) -> Result<Option<Task>> {
        self.reified().await?;
        let state = self.inner.state.lock().await;
        Ok(state.processors.front().map(|p| p.task().clone()))
    }

    /// All queued tasks, head first.
    pub async fn entries(&self) -> Result<Vec<Task>> {
        self.reified().await?;
        let state = self.inner.state.lock().await;
        Ok(state.processors.iter().map(|p| p.task().clone()).collect())
    }

    pub async fn len(&self) -> Result<usize> {
        self.reified().await?;
        Ok(self.inner.state.lock().await.processors.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// The error that halted processing, if any.
    pub fn error(&self) -> Option<TaskError> {
        match &*self.inner.status.borrow() {
            Status::Failed(err) => Some(err.clone()),
            _ => None,
        }
    }

    pub fn is_processing(&self) -> bool {
        matches!(*self.inner.status.borrow(), Status::Processing(_))
    }

    /// Add a task to the end of the queue and wait for its result.
    ///
    /// Without auto-processing the result only arrives once something
    /// calls [`process`](Self::process).
    pub async fn push(&self, task: Task) -> Result<Value> {
        let processor = self.enqueue(task).await?;
        processor.outcome().await.map_err(Error::Task)
    }

    /// Add a task to the end of the queue without waiting for it.
    ///
    /// The returned processor resolves with the task's outcome.
    pub async fn enqueue(&self, task: Task) -> Result<Arc<TaskProcessor>> {
        self.reified().await?;
        let processor = self.processor(task);
        {
            let mut state = self.inner.state.lock().await;
            state.processors.push_back(Arc::clone(&processor));
            if let Err(err) = self.persist(&state.processors).await {
                state.processors.pop_back();
                return Err(err);
            }
        }

        debug!(queue = %self.label(), task_type = %processor.task().kind, "task pushed");
        self.emit(QueueEvent::Change);
        if self.inner.auto_process {
            self.start().await;
        }
        Ok(processor)
    }

    /// Insert a task at the head of the queue and wait for its result.
    ///
    /// A task already in flight finishes first; the new task runs next.
    pub async fn unshift(&self, task: Task) -> Result<Value> {
        self.reified().await?;
        let processor = self.processor(task);
        {
            let mut state = self.inner.state.lock().await;
            state.processors.push_front(Arc::clone(&processor));
            if let Err(err) = self.persist(&state.processors).await {
                state.processors.pop_front();
                return Err(err);
            }
        }

        debug!(queue = %self.label(), task_type = %processor.task().kind, "task unshifted");
        self.emit(QueueEvent::Change);
        if self.inner.auto_process {
            self.start().await;
        }
        processor.outcome().await.map_err(Error::Task)
    }

    /// Remove the head task without resuming processing.
    ///
    /// Its settlement is rejected with `error`, or a cancellation naming
    /// this method. The queue is left idle.
    pub async fn shift(&self, error: Option<TaskError>) -> Result<Option<Task>> {
        self.reified().await?;
        let shifted = {
            let mut state = self.inner.state.lock().await;
            state.cancel();
            let Some(processor) = state.processors.pop_front() else {
                return Ok(None);
            };
            self.persist(&state.processors).await?;
            self.inner.status.send_replace(Status::Idle);
            processor
        };

        shifted.reject(error.unwrap_or_else(|| {
            TaskError::cancelled("processing cancelled via TaskQueue::shift")
        }));
        debug!(queue = %self.label(), task_type = %shifted.task().kind, "task shifted");
        self.emit(QueueEvent::Change);
        Ok(Some(shifted.task().clone()))
    }

    /// Reset the head task and resume processing from it.
    pub async fn retry(&self) -> Result<()> {
        self.reified().await?;
        {
            let mut state = self.inner.state.lock().await;
            state.cancel();
            if let Some(processor) = state.processors.front() {
                processor.reset();
                debug!(queue = %self.label(), task_type = %processor.task().kind, "retrying task");
            }
            self.persist(&state.processors).await?;
        }
        self.emit(QueueEvent::Change);
        self.process().await
    }

    /// Drop the head task and continue with the next one.
    ///
    /// Its settlement is rejected with `error`, or a cancellation naming
    /// this method.
    pub async fn skip(&self, error: Option<TaskError>) -> Result<()> {
        self.reified().await?;
        let skipped = {
            let mut state = self.inner.state.lock().await;
            state.cancel();
            let skipped = state.processors.pop_front();
            self.persist(&state.processors).await?;
            skipped
        };

        if let Some(processor) = skipped {
            processor.reject(error.unwrap_or_else(|| {
                TaskError::cancelled("processing cancelled via TaskQueue::skip")
            }));
            debug!(queue = %self.label(), task_type = %processor.task().kind, "task skipped");
        }
        self.emit(QueueEvent::Change);
        self.process().await
    }

    /// Drop every task, rejecting those that have not settled, and go idle.
    pub async fn clear(&self, error: Option<TaskError>) -> Result<()> {
        self.reified().await?;
        let cleared = {
            let mut state = self.inner.state.lock().await;
            state.cancel();
            let cleared = std::mem::take(&mut state.processors);
            self.persist(&state.processors).await?;
            cleared
        };

        let error = error
            .unwrap_or_else(|| TaskError::cancelled("processing cancelled via TaskQueue::clear"));
        for processor in &cleared {
            processor.reject(error.clone());
        }
        debug!(queue = %self.label(), cleared = cleared.len(), "task queue cleared");
        self.emit(QueueEvent::Change);
        self.process().await
    }

    /// Process tasks until the queue is empty or a task fails.
    ///
    /// Resolves once the queue drains; fails with the halting task's error.
    pub async fn process(&self) -> Result<()> {
        self.reified().await?;
        let mut status = self.start().await;
        let settled = status
            .wait_for(|status| !matches!(status, Status::Processing(_)))
            .await
            .map(|status| status.clone());

        match settled {
            Ok(Status::Failed(err)) => Err(Error::Task(err)),
            Ok(_) => Ok(()),
            Err(_) => Err(Error::Task(TaskError::cancelled("task queue dropped"))),
        }
    }

    /// Start a drive unless one is running for the current generation.
    ///
    /// The returned receiver is subscribed before any status change made
    /// here, so waiters cannot miss the drive's outcome.
    async fn start(&self) -> watch::Receiver<Status> {
        let state = self.inner.state.lock().await;
        let receiver = self.inner.status.subscribe();

        let running = matches!(
            *self.inner.status.borrow(),
            Status::Processing(generation) if generation == state.generation
        );
        if running {
            return receiver;
        }

        if state.processors.is_empty() {
            self.inner.status.send_replace(Status::Idle);
            drop(state);
            self.emit(QueueEvent::Complete);
        } else {
            let generation = state.generation;
            self.inner.status.send_replace(Status::Processing(generation));
            drop(state);
            tokio::spawn(self.clone().drive(generation));
        }
        receiver
    }

    async fn drive(self, generation: u64) {
        loop {
            let processor = {
                let state = self.inner.state.lock().await;
                if state.generation != generation {
                    return;
                }
                match state.processors.front() {
                    Some(processor) => Arc::clone(processor),
                    None => {
                        self.inner.status.send_replace(Status::Idle);
                        drop(state);
                        debug!(queue = %self.label(), "task queue drained");
                        self.emit(QueueEvent::Complete);
                        return;
                    }
                }
            };

            let task = processor.task().clone();
            self.emit(QueueEvent::BeforeTask(task.clone()));
            let outcome = processor.process().await;

            let mut state = self.inner.state.lock().await;
            if state.generation != generation {
                return;
            }

            let outcome = match outcome {
                Ok(_) => {
                    if let Some(index) = state
                        .processors
                        .iter()
                        .position(|p| Arc::ptr_eq(p, &processor))
                    {
                        state.processors.remove(index);
                    }
                    self.persist(&state.processors)
                        .await
                        .map_err(TaskError::from)
                }
                Err(err) => Err(err),
            };

            match outcome {
                Ok(()) => {
                    drop(state);
                    debug!(queue = %self.label(), task_type = %task.kind, "task completed");
                    self.emit(QueueEvent::Change);
                    self.emit(QueueEvent::Task(task));
                }
                Err(err) => {
                    self.inner.status.send_replace(Status::Failed(err.clone()));
                    drop(state);
                    warn!(queue = %self.label(), task_type = %task.kind, error = %err, "task failed");
                    self.emit(QueueEvent::Fail(task, err));
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Performer for Echo {
        async fn perform(&self, task: &Task) -> std::result::Result<Value, TaskError> {
            if task.kind == "fail" {
                return Err(TaskError::failed("refused"));
            }
            Ok(task.data.clone())
        }
    }

    fn queue(auto_process: bool) -> TaskQueue {
        let settings = TaskQueueSettings::new().with_auto_process(auto_process);
        TaskQueue::new(Arc::new(Echo), settings).unwrap()
    }

    #[tokio::test]
    async fn push_returns_result() {
        let queue = queue(true);
        assert_eq!(queue.push(Task::new("echo", json!(1))).await, Ok(json!(1)));

        // Waits for the drive that settled the task to finish
        queue.process().await.unwrap();
        assert!(queue.is_empty().await.unwrap());
        assert!(!queue.is_processing());
    }

    #[tokio::test]
    async fn process_empty_queue_completes() {
        let queue = queue(false);
        let mut events = queue.subscribe();
        queue.process().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), QueueEvent::Complete);
    }

    #[tokio::test]
    async fn manual_processing() {
        let queue = queue(false);
        let first = queue.enqueue(Task::new("echo", json!("a"))).await.unwrap();
        let second = queue.enqueue(Task::new("echo", json!("b"))).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 2);
        assert!(!first.started());

        queue.process().await.unwrap();
        assert_eq!(first.outcome().await, Ok(json!("a")));
        assert_eq!(second.outcome().await, Ok(json!("b")));
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn failure_halts_queue() {
        let queue = queue(false);
        queue.enqueue(Task::new("fail", Value::Null)).await.unwrap();
        let next = queue.enqueue(Task::new("echo", json!(2))).await.unwrap();

        let err = queue.process().await.unwrap_err();
        assert_eq!(err, Error::Task(TaskError::failed("refused")));
        assert_eq!(queue.error(), Some(TaskError::failed("refused")));
        assert!(!next.started());
        assert_eq!(queue.len().await.unwrap(), 2);

        // Processing again hits the same settled failure
        assert!(queue.process().await.is_err());

        queue.skip(None).await.unwrap();
        assert_eq!(next.outcome().await, Ok(json!(2)));
        assert_eq!(queue.error(), None);
    }

    #[tokio::test]
    async fn shift_without_resuming() {
        let queue = queue(false);
        let head = queue.enqueue(Task::new("fail", Value::Null)).await.unwrap();
        let next = queue.enqueue(Task::new("echo", json!(2))).await.unwrap();
        let _ = queue.process().await;

        let shifted = queue.shift(None).await.unwrap();
        assert_eq!(shifted.map(|t| t.kind), Some("fail".to_string()));
        assert_eq!(head.outcome().await, Err(TaskError::failed("refused")));
        assert!(!next.started());
        assert_eq!(queue.error(), None);

        assert_eq!(queue.shift(None).await.unwrap().map(|t| t.kind), Some("echo".into()));
        assert_eq!(
            next.outcome().await,
            Err(TaskError::cancelled("processing cancelled via TaskQueue::shift"))
        );
        assert_eq!(queue.shift(None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_rejects_pending() {
        let queue = queue(false);
        let a = queue.enqueue(Task::new("echo", json!(1))).await.unwrap();
        let b = queue.enqueue(Task::new("echo", json!(2))).await.unwrap();

        queue
            .clear(Some(TaskError::cancelled("shutting down")))
            .await
            .unwrap();
        assert_eq!(a.outcome().await, Err(TaskError::cancelled("shutting down")));
        assert_eq!(b.outcome().await, Err(TaskError::cancelled("shutting down")));
        assert!(queue.is_empty().await.unwrap());
    }

    #[test]
    fn bucket_requires_name() {
        let settings =
            TaskQueueSettings::new().with_bucket(Arc::new(crate::bucket::MemoryBucket::new()));
        let err = TaskQueue::new(Arc::new(Echo), settings).unwrap_err();
        assert_eq!(err, Error::MissingName);
    }
}
