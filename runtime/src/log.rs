//! Transform log: the ordered list of transform ids applied to a source.
//!
//! Positions are resolved as `index(id) + relative_position`. Unknown ids
//! fail with [`Error::NotLogged`]; positions outside the bounds of an
//! operation fail with [`Error::OutOfRange`] and are never clamped.
//!
//! Every call first waits for the log to be reified (its persisted ids
//! loaded from the bucket). Mutations are serialized, persisted, and only
//! then announced to subscribers.

use crate::bucket::Bucket;
use crate::config::LogSettings;
use crate::error::{Error, Result};
use std::sync::Arc;
use strand_engine::TransformId;
use tokio::sync::{broadcast, Mutex, OnceCell};
use tracing::{debug, info};

const EVENT_CAPACITY: usize = 256;

/// Notifications emitted after a log mutation has been persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    /// Emitted after every mutation, before the specific event.
    Change,
    Append(Vec<TransformId>),
    Truncate {
        id: TransformId,
        relative_position: isize,
        removed: Vec<TransformId>,
    },
    Rollback {
        id: TransformId,
        relative_position: isize,
        removed: Vec<TransformId>,
    },
    Clear(Vec<TransformId>),
}

/// Shared handle to a transform log.
#[derive(Debug, Clone)]
pub struct TransformLog {
    inner: Arc<LogInner>,
}

#[derive(Debug)]
struct LogInner {
    name: Option<String>,
    bucket: Option<Arc<dyn Bucket>>,
    data: Mutex<Vec<TransformId>>,
    reified: OnceCell<()>,
    events: broadcast::Sender<LogEvent>,
}

impl TransformLog {
    /// Create a log.
    ///
    /// Seed ids in the settings take precedence over persisted ones; the
    /// bucket is only read when no seed is given.
    pub fn new(settings: LogSettings) -> Result<Self> {
        if settings.bucket.is_some() && settings.name.is_none() {
            return Err(Error::MissingName);
        }

        let reified = if settings.data.is_empty() && settings.bucket.is_some() {
            OnceCell::new()
        } else {
            OnceCell::new_with(Some(()))
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(LogInner {
                name: settings.name,
                bucket: settings.bucket,
                data: Mutex::new(settings.data),
                reified,
                events,
            }),
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Subscribe to log events.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.inner.events.subscribe()
    }

    /// Wait until persisted state has been loaded.
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
        let ids: Vec<TransformId> =
            serde_json::from_value(value).map_err(|e| Error::InvalidState(e.to_string()))?;

        info!(log = %name, entries = ids.len(), "reified transform log");
        *self.inner.data.lock().await = ids;
        Ok(())
    }

    async fn persist(&self, data: &[TransformId]) -> Result<()> {
        if let (Some(bucket), Some(name)) = (&self.inner.bucket, &self.inner.name) {
            let value =
                serde_json::to_value(data).map_err(|e| Error::InvalidState(e.to_string()))?;
            bucket.set_item(name, value).await?;
        }
        Ok(())
    }

    fn emit(&self, event: LogEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(LogEvent::Change);
        let _ = self.inner.events.send(event);
    }

    fn label(&self) -> &str {
        self.name().unwrap_or("<unnamed>")
    }

    /// The most recently appended id.
    pub async fn head(&self) -> Result<Option<TransformId>> {
        self.reified().await?;
        Ok(self.inner.data.lock().await.last().cloned())
    }

    /// All ids, oldest first.
    pub async fn entries(&self) -> Result<Vec<TransformId>> {
        self.reified().await?;
        Ok(self.inner.data.lock().await.clone())
    }

    pub async fn len(&self) -> Result<usize> {
        self.reified().await?;
        Ok(self.inner.data.lock().await.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    pub async fn contains(&self, id: &str) -> Result<bool> {
        self.reified().await?;
        Ok(self.inner.data.lock().await.iter().any(|entry| entry == id))
    }

    /// Append ids in order. Ids already in the log, or repeated within the
    /// call, are rejected and nothing is appended.
    pub async fn append<I, S>(&self, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<TransformId>,
    {
        self.reified().await?;
        let ids: Vec<TransformId> = ids.into_iter().map(Into::into).collect();

        let mut data = self.inner.data.lock().await;
        let mut next = data.clone();
        for id in &ids {
            if next.contains(id) {
                return Err(Error::AlreadyLogged(id.clone()));
            }
            next.push(id.clone());
        }

        self.persist(&next).await?;
        *data = next;
        drop(data);

        debug!(log = %self.label(), ids = ?ids, "appended to transform log");
        self.emit(LogEvent::Append(ids));
        Ok(())
    }

    /// Ids before the resolved position.
    ///
    /// Valid positions are `0..len`.
    pub async fn before(&self, id: &str, relative_position: isize) -> Result<Vec<TransformId>> {
        self.reified().await?;
        let data = self.inner.data.lock().await;
        let position = resolve(&data, id, relative_position, 0, len(&data) - 1)?;
        Ok(data[..position as usize].to_vec())
    }

    /// Ids after the resolved position.
    ///
    /// Valid positions are `-1..len`; `-1` returns every id.
    pub async fn after(&self, id: &str, relative_position: isize) -> Result<Vec<TransformId>> {
        self.reified().await?;
        let data = self.inner.data.lock().await;
        let position = resolve(&data, id, relative_position, -1, len(&data) - 1)?;
        Ok(data[(position + 1) as usize..].to_vec())
    }

    /// Drop every id before the resolved position, keeping the rest.
    ///
    /// Valid positions are `0..=len`. Returns the removed ids.
    pub async fn truncate(&self, id: &str, relative_position: isize) -> Result<Vec<TransformId>> {
        self.reified().await?;
        let mut data = self.inner.data.lock().await;
        let position = resolve(&data, id, relative_position, 0, len(&data))? as usize;

        let removed = data[..position].to_vec();
        let kept = data[position..].to_vec();
        self.persist(&kept).await?;
        *data = kept;
        drop(data);

        debug!(log = %self.label(), id = %id, removed = removed.len(), "truncated transform log");
        self.emit(LogEvent::Truncate {
            id: id.to_string(),
            relative_position,
            removed: removed.clone(),
        });
        Ok(removed)
    }

    /// Keep every id up to and including the resolved position, dropping
    /// the rest.
    ///
    /// Valid positions are `-1..len`; `-1` empties the log. Returns the
    /// removed ids.
    pub async fn rollback(&self, id: &str, relative_position: isize) -> Result<Vec<TransformId>> {
        self.reified().await?;
        let mut data = self.inner.data.lock().await;
        let position = resolve(&data, id, relative_position, -1, len(&data) - 1)?;
        let split = (position + 1) as usize;

        let removed = data[split..].to_vec();
        let kept = data[..split].to_vec();
        self.persist(&kept).await?;
        *data = kept;
        drop(data);

        debug!(log = %self.label(), id = %id, removed = removed.len(), "rolled back transform log");
        self.emit(LogEvent::Rollback {
            id: id.to_string(),
            relative_position,
            removed: removed.clone(),
        });
        Ok(removed)
    }

    /// Remove every id. Returns the removed ids.
    pub async fn clear(&self) -> Result<Vec<TransformId>> {
        self.reified().await?;
        let mut data = self.inner.data.lock().await;

        self.persist(&[]).await?;
        let removed = std::mem::take(&mut *data);
        drop(data);

        debug!(log = %self.label(), removed = removed.len(), "cleared transform log");
        self.emit(LogEvent::Clear(removed.clone()));
        Ok(removed)
    }
}

fn len(data: &[TransformId]) -> isize {
    data.len() as isize
}

fn resolve(
    data: &[TransformId],
    id: &str,
    relative_position: isize,
    min: isize,
    max: isize,
) -> Result<isize> {
    let index = data
        .iter()
        .position(|entry| entry == id)
        .ok_or_else(|| Error::NotLogged(id.to_string()))?;
    let position = index as isize + relative_position;
    if position < min || position > max {
        return Err(Error::OutOfRange(position));
    }
    Ok(position)
}
