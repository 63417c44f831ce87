//! Snapshot types for persisting and restoring a [`MemorySource`](crate::MemorySource).
//!
//! Snapshots use `BTreeMap`s so their JSON form has a deterministic order.

use crate::{error::Result, Error, Record, RecordId, RecordType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the snapshot format for future compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A point-in-time copy of every record in a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSnapshot {
    /// Snapshot format version
    pub format_version: u32,
    /// Records by type, then by id
    pub records: BTreeMap<RecordType, BTreeMap<RecordId, Record>>,
}

impl Default for SourceSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceSnapshot {
    /// Create a new empty snapshot.
    pub fn new() -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            records: BTreeMap::new(),
        }
    }

    /// Add a record to the snapshot.
    pub fn add_record(&mut self, record: Record) {
        self.records
            .entry(record.kind.clone())
            .or_default()
            .insert(record.id.clone(), record);
    }

    /// Get a record from the snapshot.
    pub fn get_record(&self, kind: &str, id: &str) -> Option<&Record> {
        self.records.get(kind)?.get(id)
    }

    /// Count records across all types.
    pub fn record_count(&self) -> usize {
        self.records.values().map(BTreeMap::len).sum()
    }

    /// Check that every record is filed under its own type and id.
    pub fn validate(&self) -> Result<()> {
        for (kind, records) in &self.records {
            for (id, record) in records {
                if &record.kind != kind || &record.id != id {
                    return Err(Error::InvalidSnapshot(format!(
                        "record {} filed under {}:{}",
                        record.identity(),
                        kind,
                        id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        snapshot.validate()?;
        Ok(snapshot)
    }
}
