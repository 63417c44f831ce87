//! Operation types for expressing changes.
//!
//! Changes are expressed as operations, not direct mutations. Operations are
//! grouped into transforms, which are the unit tracked by a transform log.

use crate::{Record, RecordIdentity};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unique identifier for a transform.
pub type TransformId = String;

/// A single mutation of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "op",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum RecordOperation {
    /// Write a whole record, replacing any existing one.
    AddRecord { record: Record },
    /// Merge fields into an existing record.
    UpdateRecord { record: Record },
    /// Delete a record.
    RemoveRecord { record: RecordIdentity },
    /// Set a single key. `None` writes the empty-key sentinel.
    ReplaceKey {
        record: RecordIdentity,
        key: String,
        value: Option<String>,
    },
    /// Set a single attribute.
    ReplaceAttribute {
        record: RecordIdentity,
        attribute: String,
        value: Value,
    },
    /// Add a member to a to-many relationship.
    AddToRelatedRecords {
        record: RecordIdentity,
        relationship: String,
        related_record: RecordIdentity,
    },
    /// Remove a member from a to-many relationship.
    RemoveFromRelatedRecords {
        record: RecordIdentity,
        relationship: String,
        related_record: RecordIdentity,
    },
    /// Overwrite the members of a to-many relationship.
    ReplaceRelatedRecords {
        record: RecordIdentity,
        relationship: String,
        related_records: Vec<RecordIdentity>,
    },
    /// Overwrite the target of a to-one relationship.
    ReplaceRelatedRecord {
        record: RecordIdentity,
        relationship: String,
        related_record: Option<RecordIdentity>,
    },
}

impl RecordOperation {
    pub fn add_record(record: Record) -> Self {
        RecordOperation::AddRecord { record }
    }

    pub fn update_record(record: Record) -> Self {
        RecordOperation::UpdateRecord { record }
    }

    pub fn remove_record(record: RecordIdentity) -> Self {
        RecordOperation::RemoveRecord { record }
    }

    pub fn replace_key(
        record: RecordIdentity,
        key: impl Into<String>,
        value: Option<String>,
    ) -> Self {
        RecordOperation::ReplaceKey {
            record,
            key: key.into(),
            value,
        }
    }

    pub fn replace_attribute(
        record: RecordIdentity,
        attribute: impl Into<String>,
        value: Value,
    ) -> Self {
        RecordOperation::ReplaceAttribute {
            record,
            attribute: attribute.into(),
            value,
        }
    }

    pub fn add_to_related_records(
        record: RecordIdentity,
        relationship: impl Into<String>,
        related_record: RecordIdentity,
    ) -> Self {
        RecordOperation::AddToRelatedRecords {
            record,
            relationship: relationship.into(),
            related_record,
        }
    }

    pub fn remove_from_related_records(
        record: RecordIdentity,
        relationship: impl Into<String>,
        related_record: RecordIdentity,
    ) -> Self {
        RecordOperation::RemoveFromRelatedRecords {
            record,
            relationship: relationship.into(),
            related_record,
        }
    }

    pub fn replace_related_records(
        record: RecordIdentity,
        relationship: impl Into<String>,
        related_records: Vec<RecordIdentity>,
    ) -> Self {
        RecordOperation::ReplaceRelatedRecords {
            record,
            relationship: relationship.into(),
            related_records,
        }
    }

    pub fn replace_related_record(
        record: RecordIdentity,
        relationship: impl Into<String>,
        related_record: Option<RecordIdentity>,
    ) -> Self {
        RecordOperation::ReplaceRelatedRecord {
            record,
            relationship: relationship.into(),
            related_record,
        }
    }

    /// Get the identity of the record this operation targets.
    pub fn target(&self) -> RecordIdentity {
        match self {
            RecordOperation::AddRecord { record } | RecordOperation::UpdateRecord { record } => {
                record.identity()
            }
            RecordOperation::RemoveRecord { record }
            | RecordOperation::ReplaceKey { record, .. }
            | RecordOperation::ReplaceAttribute { record, .. }
            | RecordOperation::AddToRelatedRecords { record, .. }
            | RecordOperation::RemoveFromRelatedRecords { record, .. }
            | RecordOperation::ReplaceRelatedRecords { record, .. }
            | RecordOperation::ReplaceRelatedRecord { record, .. } => record.clone(),
        }
    }

    /// Name of the operation kind, as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            RecordOperation::AddRecord { .. } => "addRecord",
            RecordOperation::UpdateRecord { .. } => "updateRecord",
            RecordOperation::RemoveRecord { .. } => "removeRecord",
            RecordOperation::ReplaceKey { .. } => "replaceKey",
            RecordOperation::ReplaceAttribute { .. } => "replaceAttribute",
            RecordOperation::AddToRelatedRecords { .. } => "addToRelatedRecords",
            RecordOperation::RemoveFromRelatedRecords { .. } => "removeFromRelatedRecords",
            RecordOperation::ReplaceRelatedRecords { .. } => "replaceRelatedRecords",
            RecordOperation::ReplaceRelatedRecord { .. } => "replaceRelatedRecord",
        }
    }
}

/// An identified, ordered batch of operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Unique transform id
    pub id: TransformId,
    /// Operations, applied in order
    pub operations: Vec<RecordOperation>,
}

impl Transform {
    /// Create a transform with a freshly generated id.
    pub fn new(operations: Vec<RecordOperation>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), operations)
    }

    /// Create a transform with an explicit id.
    pub fn with_id(id: impl Into<TransformId>, operations: Vec<RecordOperation>) -> Self {
        Self {
            id: id.into(),
            operations,
        }
    }
}

impl From<RecordOperation> for Transform {
    fn from(operation: RecordOperation) -> Self {
        Transform::new(vec![operation])
    }
}
