//! Bidirectional mapping between record ids and alternate keys.

use crate::{Record, RecordId, RecordType};
use std::collections::{BTreeMap, HashMap};

/// Maps `(type, key name, key value)` to record ids and back.
///
/// Records written by the operation engine are registered here when the
/// accessor owns a key map.
#[derive(Debug, Clone, Default)]
pub struct KeyMap {
    keys_to_ids: HashMap<(RecordType, String), HashMap<String, RecordId>>,
    ids_to_keys: HashMap<(RecordType, String), HashMap<RecordId, String>>,
}

impl KeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the id of a record by one of its keys.
    pub fn key_to_id(&self, kind: &str, key_name: &str, key_value: &str) -> Option<&RecordId> {
        self.keys_to_ids
            .get(&(kind.to_string(), key_name.to_string()))?
            .get(key_value)
    }

    /// Look up the value of a key for a record id.
    pub fn id_to_key(&self, kind: &str, key_name: &str, id: &str) -> Option<&str> {
        self.ids_to_keys
            .get(&(kind.to_string(), key_name.to_string()))?
            .get(id)
            .map(String::as_str)
    }

    /// Register the keys of a record, replacing whatever was registered
    /// for it before. A key that is absent or empty clears the record's
    /// mapping for that key name.
    pub fn push_record(&mut self, record: &Record) {
        for (name, value) in &record.keys {
            let slot = (record.kind.clone(), name.clone());
            let keys = self.keys_to_ids.entry(slot.clone()).or_default();
            let ids = self.ids_to_keys.entry(slot).or_default();

            if let Some(old) = ids.remove(&record.id) {
                if keys.get(&old) == Some(&record.id) {
                    keys.remove(&old);
                }
            }
            let Some(value) = value.as_deref().filter(|v| !v.is_empty()) else {
                continue;
            };
            // A key value names one record; its previous owner loses it
            if let Some(previous) = keys.insert(value.to_string(), record.id.clone()) {
                if previous != record.id && ids.get(&previous).map(String::as_str) == Some(value) {
                    ids.remove(&previous);
                }
            }
            ids.insert(record.id.clone(), value.to_string());
        }
    }

    /// Find the first id that any of the given keys maps to.
    pub fn id_from_keys(&self, kind: &str, keys: &BTreeMap<String, Option<String>>) -> Option<&RecordId> {
        keys.iter().find_map(|(name, value)| {
            let value = value.as_deref()?;
            self.key_to_id(kind, name, value)
        })
    }

    /// Forget all mappings.
    pub fn reset(&mut self) {
        self.keys_to_ids.clear();
        self.ids_to_keys.clear();
    }
}
