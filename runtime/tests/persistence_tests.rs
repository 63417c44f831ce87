//! Logs and queues restored from a file bucket.

mod common;

use common::{init_tracing, Recorder};
use serde_json::json;
use std::sync::Arc;
use strand_runtime::{
    Bucket, Error, FileBucket, LogSettings, Task, TaskQueue, TaskQueueSettings, TransformLog,
};
use tempfile::TempDir;

fn bucket(dir: &TempDir) -> Arc<dyn Bucket> {
    Arc::new(FileBucket::new(dir.path()))
}

fn log_settings(bucket: &Arc<dyn Bucket>) -> LogSettings {
    LogSettings::new().with_name("log").with_bucket(bucket.clone())
}

fn queue_settings(bucket: &Arc<dyn Bucket>) -> TaskQueueSettings {
    TaskQueueSettings::new()
        .with_name("queue")
        .with_auto_process(false)
        .with_bucket(bucket.clone())
}

// ============================================================================
// Transform log
// ============================================================================

#[tokio::test]
async fn log_survives_restart() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let bucket = bucket(&dir);

    let log = TransformLog::new(log_settings(&bucket)).unwrap();
    log.append(["a", "b", "c"]).await.unwrap();
    log.truncate("b", 0).await.unwrap();
    drop(log);

    assert_eq!(bucket.get_item("log").await.unwrap(), Some(json!(["b", "c"])));

    let restored = TransformLog::new(log_settings(&bucket)).unwrap();
    assert_eq!(restored.entries().await.unwrap(), vec!["b", "c"]);
    assert_eq!(restored.head().await.unwrap().as_deref(), Some("c"));
}

#[tokio::test]
async fn first_call_waits_for_reify() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let bucket = bucket(&dir);
    bucket.set_item("log", json!(["a", "b"])).await.unwrap();

    // Appending straight away lands after the persisted ids
    let log = TransformLog::new(log_settings(&bucket)).unwrap();
    log.append(["c"]).await.unwrap();
    assert_eq!(log.entries().await.unwrap(), vec!["a", "b", "c"]);
    assert_eq!(bucket.get_item("log").await.unwrap(), Some(json!(["a", "b", "c"])));
}

#[tokio::test]
async fn seed_data_overrides_bucket() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let bucket = bucket(&dir);
    bucket.set_item("log", json!(["old"])).await.unwrap();

    let log = TransformLog::new(log_settings(&bucket).with_data(["x", "y"])).unwrap();
    assert_eq!(log.entries().await.unwrap(), vec!["x", "y"]);
}

#[tokio::test]
async fn corrupt_state_is_reported() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let bucket = bucket(&dir);
    bucket.set_item("log", json!({"not": "a list"})).await.unwrap();

    let log = TransformLog::new(log_settings(&bucket)).unwrap();
    assert!(matches!(log.entries().await, Err(Error::InvalidState(_))));
}

// ============================================================================
// Task queue
// ============================================================================

#[tokio::test]
async fn queue_survives_restart() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let bucket = bucket(&dir);
    let performer = Recorder::new();

    let queue = TaskQueue::new(performer.clone(), queue_settings(&bucket)).unwrap();
    queue.enqueue(Task::new("echo", json!(1))).await.unwrap();
    queue.enqueue(Task::new("echo", json!(2)).with_id("second")).await.unwrap();
    drop(queue);

    assert_eq!(
        bucket.get_item("queue").await.unwrap(),
        Some(json!([
            {"type": "echo", "data": 1},
            {"type": "echo", "id": "second", "data": 2},
        ]))
    );

    // Restored tasks wait for an explicit process
    let restored = TaskQueue::new(performer.clone(), queue_settings(&bucket)).unwrap();
    restored.enqueue(Task::new("echo", json!(3))).await.unwrap();
    assert_eq!(restored.len().await.unwrap(), 3);
    assert!(performer.runs().is_empty());

    restored.process().await.unwrap();
    assert_eq!(performer.runs(), vec![json!(1), json!(2), json!(3)]);
    assert_eq!(bucket.get_item("queue").await.unwrap(), Some(json!([])));
}

#[tokio::test]
async fn failed_task_stays_persisted() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let bucket = bucket(&dir);
    let performer = Recorder::failing();

    let queue = TaskQueue::new(performer.clone(), queue_settings(&bucket)).unwrap();
    queue.enqueue(Task::new("flaky", json!("x"))).await.unwrap();
    assert!(queue.process().await.is_err());
    drop(queue);

    performer.set_failing(false);
    let restored = TaskQueue::new(performer.clone(), queue_settings(&bucket)).unwrap();
    assert_eq!(
        restored.current().await.unwrap(),
        Some(Task::new("flaky", json!("x")))
    );
    restored.process().await.unwrap();
    assert!(restored.is_empty().await.unwrap());
}

#[tokio::test]
async fn log_and_queue_share_a_directory() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let bucket = bucket(&dir);

    let log = TransformLog::new(log_settings(&bucket)).unwrap();
    let queue = TaskQueue::new(Recorder::new(), queue_settings(&bucket)).unwrap();
    log.append(["t1"]).await.unwrap();
    queue.enqueue(Task::new("echo", json!(null))).await.unwrap();

    assert_eq!(bucket.get_item("log").await.unwrap(), Some(json!(["t1"])));
    assert_eq!(bucket.get_item("queue").await.unwrap(), Some(json!([{"type": "echo"}])));
}
