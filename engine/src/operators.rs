//! Forward operators: applying operations to a record accessor.
//!
//! Each operator is expressed once, as a pure step from the target record's
//! current state to a [`Change`]. The blocking and async drivers only differ
//! in how they read the current record and commit the change.

use crate::accessor::{AsyncRecordAccessor, RecordAccessor};
use crate::inverse::invert;
use crate::{error::Result, Error, Record, RecordIdentity, RecordOperation, Relationship, Transform};
use serde::{Deserialize, Serialize};

/// Options shared by the operation and query engines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApplyOptions {
    /// Fail with [`Error::RecordNotFound`] when a target record is missing,
    /// instead of synthesizing an empty one (or returning nothing).
    pub raise_not_found_exceptions: bool,
}

impl ApplyOptions {
    /// Options that raise on missing records.
    pub fn raising() -> Self {
        Self {
            raise_not_found_exceptions: true,
        }
    }

    pub(crate) fn not_found<T>(&self, identity: &RecordIdentity) -> Result<Option<T>> {
        if self.raise_not_found_exceptions {
            Err(Error::RecordNotFound(identity.clone()))
        } else {
            Ok(None)
        }
    }
}

/// What an operator wants done to the accessor.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Change {
    /// Write this record and report it
    Write(Record),
    /// Delete this record and report whatever was removed
    Remove(RecordIdentity),
    /// Leave the accessor alone and report this
    Unchanged(Option<Record>),
}

/// Results of applying a batch of operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatchResult {
    /// One entry per applied operation
    pub data: Vec<Option<Record>>,
    /// Operations that undo the batch, in the order they must be applied
    pub inverse: Vec<RecordOperation>,
}

fn clone_or_create(
    current: Option<Record>,
    identity: &RecordIdentity,
    options: &ApplyOptions,
) -> Result<Record> {
    match current {
        Some(record) => Ok(record),
        None if options.raise_not_found_exceptions => {
            Err(Error::RecordNotFound(identity.clone()))
        }
        None => Ok(Record::from_identity(identity.clone())),
    }
}

/// Whether the operator reads the target record before writing.
fn reads_current(operation: &RecordOperation) -> bool {
    !matches!(operation, RecordOperation::AddRecord { .. })
}

pub(crate) fn forward(
    operation: &RecordOperation,
    current: Option<Record>,
    options: &ApplyOptions,
) -> Result<Change> {
    let change = match operation {
        RecordOperation::AddRecord { record } => Change::Write(record.clone()),

        RecordOperation::UpdateRecord { record } => {
            if current.is_none() && options.raise_not_found_exceptions {
                return Err(Error::RecordNotFound(record.identity()));
            }
            Change::Write(Record::merge(current.as_ref(), record))
        }

        RecordOperation::RemoveRecord { record } => match current {
            Some(_) => Change::Remove(record.clone()),
            None => Change::Unchanged(options.not_found(record)?),
        },

        RecordOperation::ReplaceKey { record, key, value } => {
            let mut target = clone_or_create(current, record, options)?;
            target.keys.insert(key.clone(), value.clone());
            Change::Write(target)
        }

        RecordOperation::ReplaceAttribute {
            record,
            attribute,
            value,
        } => {
            let mut target = clone_or_create(current, record, options)?;
            target.attributes.insert(attribute.clone(), value.clone());
            Change::Write(target)
        }

        RecordOperation::AddToRelatedRecords {
            record,
            relationship,
            related_record,
        } => {
            let mut target = clone_or_create(current, record, options)?;
            target.add_related(relationship, related_record.clone());
            Change::Write(target)
        }

        RecordOperation::RemoveFromRelatedRecords {
            record,
            relationship,
            related_record,
        } => match current {
            Some(mut target) => {
                target.remove_related(relationship, related_record);
                Change::Write(target)
            }
            None => Change::Unchanged(options.not_found(record)?),
        },

        RecordOperation::ReplaceRelatedRecords {
            record,
            relationship,
            related_records,
        } => {
            let mut target = clone_or_create(current, record, options)?;
            target.relationships.insert(
                relationship.clone(),
                Relationship::to_many(related_records.iter().cloned()),
            );
            Change::Write(target)
        }

        RecordOperation::ReplaceRelatedRecord {
            record,
            relationship,
            related_record,
        } => {
            let mut target = clone_or_create(current, record, options)?;
            target.relationships.insert(
                relationship.clone(),
                Relationship::to_one(related_record.clone()),
            );
            Change::Write(target)
        }
    };
    Ok(change)
}

fn commit<A: RecordAccessor + ?Sized>(accessor: &mut A, change: Change) -> Result<Option<Record>> {
    match change {
        Change::Write(record) => {
            accessor.set_record(record.clone())?;
            accessor.register_keys(&record)?;
            Ok(Some(record))
        }
        Change::Remove(identity) => accessor.remove_record(&identity),
        Change::Unchanged(result) => Ok(result),
    }
}

async fn commit_async<A: AsyncRecordAccessor + ?Sized>(
    accessor: &A,
    change: Change,
) -> Result<Option<Record>> {
    match change {
        Change::Write(record) => {
            accessor.set_record(record.clone()).await?;
            accessor.register_keys(&record).await?;
            Ok(Some(record))
        }
        Change::Remove(identity) => accessor.remove_record(&identity).await,
        Change::Unchanged(result) => Ok(result),
    }
}

/// Apply a single operation.
///
/// Returns the resulting record, or `None` when there is nothing to report
/// (e.g. removing a record that does not exist).
pub fn apply_operation<A: RecordAccessor + ?Sized>(
    accessor: &mut A,
    operation: &RecordOperation,
    options: &ApplyOptions,
) -> Result<Option<Record>> {
    let current = if reads_current(operation) {
        accessor.get_record(&operation.target())?
    } else {
        None
    };
    let change = forward(operation, current, options)?;
    commit(accessor, change)
}

/// Async counterpart of [`apply_operation`].
pub async fn apply_operation_async<A: AsyncRecordAccessor + ?Sized>(
    accessor: &A,
    operation: &RecordOperation,
    options: &ApplyOptions,
) -> Result<Option<Record>> {
    let current = if reads_current(operation) {
        accessor.get_record(&operation.target()).await?
    } else {
        None
    };
    let change = forward(operation, current, options)?;
    commit_async(accessor, change).await
}

/// Apply operations in order, collecting the inverse of each one against
/// the state right before it ran.
///
/// The batch is all-or-nothing: if an operation fails, the inverses
/// collected so far are applied to undo the earlier operations and the
/// original error is returned. If one of those inverses fails as well,
/// undoing stops there and [`Error::UndoFailed`] carries both errors.
pub fn patch<A: RecordAccessor + ?Sized>(
    accessor: &mut A,
    operations: &[RecordOperation],
    options: &ApplyOptions,
) -> Result<PatchResult> {
    let mut result = PatchResult::default();
    for operation in operations {
        if let Err(err) = patch_one(accessor, operation, options, &mut result) {
            for inverse in result.inverse.iter().rev() {
                if let Err(undo) = apply_operation(accessor, inverse, &ApplyOptions::default()) {
                    return Err(Error::undo_failed(err, undo));
                }
            }
            return Err(err);
        }
    }
    result.inverse.reverse();
    Ok(result)
}

fn patch_one<A: RecordAccessor + ?Sized>(
    accessor: &mut A,
    operation: &RecordOperation,
    options: &ApplyOptions,
    result: &mut PatchResult,
) -> Result<()> {
    let current = accessor.get_record(&operation.target())?;
    let inverse = invert(operation, current.as_ref(), options)?;
    let change = forward(operation, current, options)?;
    result.data.push(commit(accessor, change)?);
    result.inverse.extend(inverse);
    Ok(())
}

/// Async counterpart of [`patch`].
pub async fn patch_async<A: AsyncRecordAccessor + ?Sized>(
    accessor: &A,
    operations: &[RecordOperation],
    options: &ApplyOptions,
) -> Result<PatchResult> {
    let mut result = PatchResult::default();
    for operation in operations {
        if let Err(err) = patch_one_async(accessor, operation, options, &mut result).await {
            for inverse in result.inverse.iter().rev() {
                if let Err(undo) =
                    apply_operation_async(accessor, inverse, &ApplyOptions::default()).await
                {
                    return Err(Error::undo_failed(err, undo));
                }
            }
            return Err(err);
        }
    }
    result.inverse.reverse();
    Ok(result)
}

async fn patch_one_async<A: AsyncRecordAccessor + ?Sized>(
    accessor: &A,
    operation: &RecordOperation,
    options: &ApplyOptions,
    result: &mut PatchResult,
) -> Result<()> {
    let current = accessor.get_record(&operation.target()).await?;
    let inverse = invert(operation, current.as_ref(), options)?;
    let change = forward(operation, current, options)?;
    result.data.push(commit_async(accessor, change).await?);
    result.inverse.extend(inverse);
    Ok(())
}

/// Apply every operation of a transform. See [`patch`].
pub fn apply_transform<A: RecordAccessor + ?Sized>(
    accessor: &mut A,
    transform: &Transform,
    options: &ApplyOptions,
) -> Result<PatchResult> {
    patch(accessor, &transform.operations, options)
}

/// Async counterpart of [`apply_transform`].
pub async fn apply_transform_async<A: AsyncRecordAccessor + ?Sized>(
    accessor: &A,
    transform: &Transform,
    options: &ApplyOptions,
) -> Result<PatchResult> {
    patch_async(accessor, &transform.operations, options).await
}
