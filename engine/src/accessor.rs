//! Record accessors: the narrow interface the engine reads and writes through.
//!
//! The engine never owns records. Every operator reads an owned snapshot of
//! the target record, computes a new owned value and hands it back to the
//! accessor. Two calling conventions are supported: [`RecordAccessor`] for
//! blocking backends and [`AsyncRecordAccessor`] for suspending ones.

use crate::{error::Result, Error, Record, RecordIdentity};
use async_trait::async_trait;
use std::sync::Mutex;

/// Which records a bulk read should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSelector<'a> {
    /// Every record of a type
    Type(&'a str),
    /// The given records, in order; missing ones are skipped
    Identities(&'a [RecordIdentity]),
}

fn related_record_of(record: Option<Record>, relationship: &str) -> Option<Option<RecordIdentity>> {
    record?
        .related_record(relationship)
        .map(|related| related.cloned())
}

fn related_records_of(record: Option<Record>, relationship: &str) -> Option<Vec<RecordIdentity>> {
    let record = record?;
    Some(
        record
            .related_records(relationship)
            .map(<[RecordIdentity]>::to_vec)
            .unwrap_or_default(),
    )
}

/// Blocking access to a record store.
pub trait RecordAccessor {
    /// Read a record.
    fn get_record(&self, identity: &RecordIdentity) -> Result<Option<Record>>;

    /// Read several records.
    fn get_records(&self, selector: RecordSelector<'_>) -> Result<Vec<Record>>;

    /// Write a record, replacing any existing one.
    fn set_record(&mut self, record: Record) -> Result<()>;

    /// Delete a record, returning it if it existed.
    fn remove_record(&mut self, identity: &RecordIdentity) -> Result<Option<Record>>;

    /// Target of a to-one relationship. `None` if the record does not exist
    /// or the relationship is not a to-one relationship on it.
    fn get_related_record(
        &self,
        identity: &RecordIdentity,
        relationship: &str,
    ) -> Result<Option<Option<RecordIdentity>>> {
        Ok(related_record_of(self.get_record(identity)?, relationship))
    }

    /// Members of a to-many relationship. `None` if the record does not
    /// exist; an absent relationship reads as empty.
    fn get_related_records(
        &self,
        identity: &RecordIdentity,
        relationship: &str,
    ) -> Result<Option<Vec<RecordIdentity>>> {
        Ok(related_records_of(self.get_record(identity)?, relationship))
    }

    /// Called after every record the engine writes. Accessors that keep a
    /// [`KeyMap`](crate::KeyMap) register the record's keys here.
    fn register_keys(&mut self, _record: &Record) -> Result<()> {
        Ok(())
    }
}

/// Suspending access to a record store.
///
/// Writes take `&self`; implementations synchronize internally.
#[async_trait]
pub trait AsyncRecordAccessor: Send + Sync {
    async fn get_record(&self, identity: &RecordIdentity) -> Result<Option<Record>>;

    async fn get_records(&self, selector: RecordSelector<'_>) -> Result<Vec<Record>>;

    async fn set_record(&self, record: Record) -> Result<()>;

    async fn remove_record(&self, identity: &RecordIdentity) -> Result<Option<Record>>;

    async fn get_related_record(
        &self,
        identity: &RecordIdentity,
        relationship: &str,
    ) -> Result<Option<Option<RecordIdentity>>> {
        Ok(related_record_of(self.get_record(identity).await?, relationship))
    }

    async fn get_related_records(
        &self,
        identity: &RecordIdentity,
        relationship: &str,
    ) -> Result<Option<Vec<RecordIdentity>>> {
        Ok(related_records_of(self.get_record(identity).await?, relationship))
    }

    async fn register_keys(&self, _record: &Record) -> Result<()> {
        Ok(())
    }
}

/// Shares a blocking accessor behind a mutex so it can be used through
/// [`AsyncRecordAccessor`].
///
/// The lock is only held for the duration of a single accessor call.
#[derive(Debug, Default)]
pub struct Shared<A> {
    inner: Mutex<A>,
}

impl<A: RecordAccessor> Shared<A> {
    pub fn new(accessor: A) -> Self {
        Self {
            inner: Mutex::new(accessor),
        }
    }

    /// Run a closure against the wrapped accessor.
    pub fn with<T>(&self, f: impl FnOnce(&mut A) -> Result<T>) -> Result<T> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| Error::Accessor("accessor lock poisoned".into()))?;
        f(&mut guard)
    }

    /// Unwrap the shared accessor.
    pub fn into_inner(self) -> Result<A> {
        self.inner
            .into_inner()
            .map_err(|_| Error::Accessor("accessor lock poisoned".into()))
    }
}

#[async_trait]
impl<A: RecordAccessor + Send> AsyncRecordAccessor for Shared<A> {
    async fn get_record(&self, identity: &RecordIdentity) -> Result<Option<Record>> {
        self.with(|a| a.get_record(identity))
    }

    async fn get_records(&self, selector: RecordSelector<'_>) -> Result<Vec<Record>> {
        self.with(|a| a.get_records(selector))
    }

    async fn set_record(&self, record: Record) -> Result<()> {
        self.with(|a| a.set_record(record))
    }

    async fn remove_record(&self, identity: &RecordIdentity) -> Result<Option<Record>> {
        self.with(|a| a.remove_record(identity))
    }

    async fn register_keys(&self, record: &Record) -> Result<()> {
        self.with(|a| a.register_keys(record))
    }
}
