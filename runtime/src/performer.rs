//! Applies transforms from a task queue to a record source.
//!
//! [`TransformPerformer`] runs tasks of type [`TRANSFORM_TASK`]. Each one
//! patches the shared accessor, appends the transform id to the log, and
//! keeps the inverse operations so the transform can be rolled back later.

use crate::error::{Error, Result, TaskError};
use crate::log::TransformLog;
use crate::task::{Performer, Task};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use strand_engine::{
    apply_transform_async, patch_async, ApplyOptions, AsyncRecordAccessor, RecordOperation,
    Transform, TransformId,
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Task type handled by [`TransformPerformer`].
pub const TRANSFORM_TASK: &str = "transform";

/// Build the task that applies `transform`.
pub fn transform_task(transform: &Transform) -> Result<Task> {
    let data = serde_json::to_value(transform).map_err(|e| Error::InvalidState(e.to_string()))?;
    Ok(Task::new(TRANSFORM_TASK, data).with_id(transform.id.clone()))
}

pub struct TransformPerformer<A: ?Sized> {
    accessor: Arc<A>,
    log: TransformLog,
    options: ApplyOptions,
    inverses: Mutex<HashMap<TransformId, Vec<RecordOperation>>>,
}

impl<A: AsyncRecordAccessor + ?Sized> TransformPerformer<A> {
    pub fn new(accessor: Arc<A>, log: TransformLog) -> Self {
        Self {
            accessor,
            log,
            options: ApplyOptions::default(),
            inverses: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_options(mut self, options: ApplyOptions) -> Self {
        self.options = options;
        self
    }

    pub fn accessor(&self) -> &Arc<A> {
        &self.accessor
    }

    pub fn log(&self) -> &TransformLog {
        &self.log
    }

    /// Undo every transform logged after the resolved position, newest
    /// first, then roll the log back to it.
    ///
    /// Position bounds are those of [`TransformLog::rollback`]. Transforms
    /// applied by another performer have no recorded inverse and are only
    /// removed from the log. Returns the removed ids.
    ///
    /// If undoing a transform fails, that transform and everything older
    /// stay logged with their inverses, so the rollback can be retried. The
    /// newer transforms that were already undone leave the log.
    pub async fn rollback(&self, id: &str, relative_position: isize) -> Result<Vec<TransformId>> {
        let undone = self.log.after(id, relative_position).await?;

        let mut inverses = self.inverses.lock().await;
        for (index, transform_id) in undone.iter().enumerate().rev() {
            let Some(inverse) = inverses.get(transform_id) else {
                warn!(transform = %transform_id, "no inverse recorded for transform");
                continue;
            };
            if let Err(err) = patch_async(self.accessor.as_ref(), inverse, &self.options).await {
                warn!(transform = %transform_id, error = %err, "failed to undo transform");
                if index + 1 < undone.len() {
                    for removed in self.log.rollback(transform_id, 0).await? {
                        inverses.remove(&removed);
                    }
                }
                return Err(err.into());
            }
            debug!(transform = %transform_id, "transform undone");
        }

        let removed = self.log.rollback(id, relative_position).await?;
        for transform_id in &removed {
            inverses.remove(transform_id);
        }
        Ok(removed)
    }
}

#[async_trait]
impl<A: AsyncRecordAccessor + ?Sized> Performer for TransformPerformer<A> {
    async fn perform(&self, task: &Task) -> std::result::Result<Value, TaskError> {
        if task.kind != TRANSFORM_TASK {
            return Err(TaskError::failed(format!(
                "unsupported task type: {}",
                task.kind
            )));
        }
        let transform: Transform = serde_json::from_value(task.data.clone())
            .map_err(|e| TaskError::failed(format!("invalid transform: {e}")))?;

        // Applying the same transform twice is a no-op
        if self.log.contains(&transform.id).await? {
            debug!(transform = %transform.id, "transform already applied");
            return Ok(Value::Null);
        }

        let result = apply_transform_async(self.accessor.as_ref(), &transform, &self.options)
            .await
            .map_err(Error::from)?;

        if let Err(err) = self.log.append([transform.id.clone()]).await {
            if let Err(undo) = patch_async(self.accessor.as_ref(), &result.inverse, &self.options).await {
                warn!(transform = %transform.id, error = %undo, "failed to undo unlogged transform");
            }
            return Err(err.into());
        }
        self.inverses
            .lock()
            .await
            .insert(transform.id.clone(), result.inverse);

        debug!(
            transform = %transform.id,
            operations = transform.operations.len(),
            "transform applied"
        );
        serde_json::to_value(&result.data)
            .map_err(|e| TaskError::failed(format!("unserializable result: {e}")))
    }
}
