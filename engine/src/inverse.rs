//! Inverse operators.
//!
//! An inverse is computed against the accessor state *before* its forward
//! operation is applied. Applying the inverse after the forward operation
//! restores that state. When the forward operation would change nothing,
//! there is no inverse.
//!
//! Relationship data is compared by identity (to-one) or set equality
//! (to-many), never by position. A relationship that is absent on an
//! existing record reads as empty: an empty set or a null target.
//!
//! Operators that create a missing target record invert to removing it.

use crate::accessor::{AsyncRecordAccessor, RecordAccessor};
use crate::{
    error::Result, equal_identity_sets, ApplyOptions, Record, RecordOperation, Relationship,
    RelationshipData,
};
use serde_json::Value;

/// Whether the forward operator writes a fresh record when its target is
/// missing.
fn creates_missing(operation: &RecordOperation) -> bool {
    !matches!(
        operation,
        RecordOperation::RemoveRecord { .. } | RecordOperation::RemoveFromRelatedRecords { .. }
    )
}

pub(crate) fn invert(
    operation: &RecordOperation,
    current: Option<&Record>,
    options: &ApplyOptions,
) -> Result<Option<RecordOperation>> {
    if current.is_none()
        && options.raise_not_found_exceptions
        && !matches!(operation, RecordOperation::AddRecord { .. })
    {
        return options.not_found(&operation.target());
    }
    if current.is_none() && creates_missing(operation) {
        return Ok(Some(RecordOperation::remove_record(operation.target())));
    }

    let inverse = match operation {
        // Restoring the prior record through a merge cannot drop fields that
        // only the new record has, so those survive an undo.
        RecordOperation::AddRecord { record } => match current {
            Some(prior) if prior == record => None,
            Some(prior) => Some(RecordOperation::update_record(prior.clone())),
            None => Some(RecordOperation::remove_record(record.identity())),
        },

        RecordOperation::UpdateRecord { record } => match current {
            Some(prior) => invert_update(prior, record),
            None => Some(RecordOperation::remove_record(record.identity())),
        },

        RecordOperation::RemoveRecord { .. } => {
            current.map(|prior| RecordOperation::add_record(prior.clone()))
        }

        RecordOperation::ReplaceKey { record, key, value } => {
            let prior = current.and_then(|r| r.key(key)).map(str::to_string);
            (prior != *value).then(|| RecordOperation::replace_key(record.clone(), key, prior))
        }

        RecordOperation::ReplaceAttribute {
            record,
            attribute,
            value,
        } => {
            let prior = current.and_then(|r| r.attribute(attribute));
            (prior != Some(value)).then(|| {
                RecordOperation::replace_attribute(
                    record.clone(),
                    attribute,
                    prior.cloned().unwrap_or(Value::Null),
                )
            })
        }

        RecordOperation::AddToRelatedRecords {
            record,
            relationship,
            related_record,
        } => {
            let member = current
                .and_then(|r| r.related_records(relationship))
                .is_some_and(|members| members.contains(related_record));
            (!member).then(|| {
                RecordOperation::remove_from_related_records(
                    record.clone(),
                    relationship,
                    related_record.clone(),
                )
            })
        }

        RecordOperation::RemoveFromRelatedRecords {
            record,
            relationship,
            related_record,
        } => {
            let member = current
                .and_then(|r| r.related_records(relationship))
                .is_some_and(|members| members.contains(related_record));
            member.then(|| {
                RecordOperation::add_to_related_records(
                    record.clone(),
                    relationship,
                    related_record.clone(),
                )
            })
        }

        RecordOperation::ReplaceRelatedRecords {
            record,
            relationship,
            related_records,
        } => {
            let prior = current
                .and_then(|r| r.related_records(relationship))
                .unwrap_or_default();
            (!equal_identity_sets(prior, related_records)).then(|| {
                RecordOperation::replace_related_records(
                    record.clone(),
                    relationship,
                    prior.to_vec(),
                )
            })
        }

        RecordOperation::ReplaceRelatedRecord {
            record,
            relationship,
            related_record,
        } => {
            let prior = current
                .and_then(|r| r.related_record(relationship))
                .flatten();
            (prior != related_record.as_ref()).then(|| {
                RecordOperation::replace_related_record(
                    record.clone(),
                    relationship,
                    prior.cloned(),
                )
            })
        }
    };
    Ok(inverse)
}

/// Inverse of an update: for every field the update touches and changes,
/// carry the prior value (null when there was none).
fn invert_update(prior: &Record, replacement: &Record) -> Option<RecordOperation> {
    let mut result = Record::from_identity(replacement.identity());

    for (name, value) in &replacement.keys {
        let before = prior.keys.get(name).cloned().flatten();
        if before != *value {
            result.keys.insert(name.clone(), before);
        }
    }

    for (name, value) in &replacement.attributes {
        let before = prior.attributes.get(name);
        if before != Some(value) {
            result
                .attributes
                .insert(name.clone(), before.cloned().unwrap_or(Value::Null));
        }
    }

    for (name, relationship) in &replacement.relationships {
        let before = match (prior.relationship(name), &relationship.data) {
            (Some(data), _) => data.clone(),
            (None, RelationshipData::ToMany(_)) => RelationshipData::ToMany(Vec::new()),
            (None, RelationshipData::ToOne(_)) => RelationshipData::ToOne(None),
        };
        if before != relationship.data {
            result
                .relationships
                .insert(name.clone(), Relationship { data: before });
        }
    }

    let changed =
        !(result.keys.is_empty() && result.attributes.is_empty() && result.relationships.is_empty());
    changed.then(|| RecordOperation::update_record(result))
}

/// Compute the operation that undoes `operation`, reading the current
/// (pre-operation) state from the accessor.
pub fn invert_operation<A: RecordAccessor + ?Sized>(
    accessor: &A,
    operation: &RecordOperation,
    options: &ApplyOptions,
) -> Result<Option<RecordOperation>> {
    let current = accessor.get_record(&operation.target())?;
    invert(operation, current.as_ref(), options)
}

/// Async counterpart of [`invert_operation`].
pub async fn invert_operation_async<A: AsyncRecordAccessor + ?Sized>(
    accessor: &A,
    operation: &RecordOperation,
    options: &ApplyOptions,
) -> Result<Option<RecordOperation>> {
    let current = accessor.get_record(&operation.target()).await?;
    invert(operation, current.as_ref(), options)
}
