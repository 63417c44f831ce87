//! MemorySource - an in-memory record accessor.
//!
//! Records are held per type in a [`Collection`]. An optional [`KeyMap`] is
//! kept up to date with every record the engine writes.

use crate::accessor::{RecordAccessor, RecordSelector};
use crate::{
    error::Result, KeyMap, Record, RecordId, RecordIdentity, RecordType, SourceSnapshot,
};
use std::collections::{BTreeMap, HashMap};

/// The records of a single type.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    records: BTreeMap<RecordId, Record>,
}

impl Collection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a record by id.
    pub fn get(&self, id: &str) -> Option<&Record> {
        self.records.get(id)
    }

    /// Insert a record.
    pub fn insert(&mut self, record: Record) {
        self.records.insert(record.id.clone(), record);
    }

    /// Remove a record by id.
    pub fn remove(&mut self, id: &str) -> Option<Record> {
        self.records.remove(id)
    }

    /// All records, ordered by id.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// In-memory [`RecordAccessor`].
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    collections: HashMap<RecordType, Collection>,
    key_map: Option<KeyMap>,
}

impl MemorySource {
    /// Create an empty source without a key map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty source that maintains a key map.
    pub fn with_key_map() -> Self {
        Self {
            collections: HashMap::new(),
            key_map: Some(KeyMap::new()),
        }
    }

    /// The key map, if this source keeps one.
    pub fn key_map(&self) -> Option<&KeyMap> {
        self.key_map.as_ref()
    }

    /// Get the records of a type.
    pub fn collection(&self, kind: &str) -> Option<&Collection> {
        self.collections.get(kind)
    }

    /// Total number of records.
    pub fn len(&self) -> usize {
        self.collections.values().map(Collection::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Export every record as a snapshot.
    pub fn export_snapshot(&self) -> SourceSnapshot {
        let mut snapshot = SourceSnapshot::new();
        for collection in self.collections.values() {
            for record in collection.records() {
                snapshot.add_record(record.clone());
            }
        }
        snapshot
    }

    /// Replace every record with the snapshot's records.
    ///
    /// The key map, if any, is rebuilt from the imported records.
    pub fn import_snapshot(&mut self, snapshot: SourceSnapshot) -> Result<()> {
        snapshot.validate()?;

        self.collections.clear();
        if let Some(key_map) = &mut self.key_map {
            key_map.reset();
        }

        for records in snapshot.records.into_values() {
            for record in records.into_values() {
                if let Some(key_map) = &mut self.key_map {
                    key_map.push_record(&record);
                }
                self.collections
                    .entry(record.kind.clone())
                    .or_default()
                    .insert(record);
            }
        }
        Ok(())
    }
}

impl RecordAccessor for MemorySource {
    fn get_record(&self, identity: &RecordIdentity) -> Result<Option<Record>> {
        Ok(self
            .collections
            .get(&identity.kind)
            .and_then(|c| c.get(&identity.id))
            .cloned())
    }

    fn get_records(&self, selector: RecordSelector<'_>) -> Result<Vec<Record>> {
        let records = match selector {
            RecordSelector::Type(kind) => self
                .collections
                .get(kind)
                .map(|c| c.records().cloned().collect())
                .unwrap_or_default(),
            RecordSelector::Identities(identities) => identities
                .iter()
                .filter_map(|identity| {
                    self.collections
                        .get(&identity.kind)
                        .and_then(|c| c.get(&identity.id))
                        .cloned()
                })
                .collect(),
        };
        Ok(records)
    }

    fn set_record(&mut self, record: Record) -> Result<()> {
        self.collections
            .entry(record.kind.clone())
            .or_default()
            .insert(record);
        Ok(())
    }

    fn remove_record(&mut self, identity: &RecordIdentity) -> Result<Option<Record>> {
        Ok(self
            .collections
            .get_mut(&identity.kind)
            .and_then(|c| c.remove(&identity.id)))
    }

    fn register_keys(&mut self, record: &Record) -> Result<()> {
        if let Some(key_map) = &mut self.key_map {
            key_map.push_record(record);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn planet(id: &str, name: &str) -> Record {
        Record::new("planet", id).with_attribute("name", json!(name))
    }

    #[test]
    fn set_get_remove() {
        let mut source = MemorySource::new();
        source.set_record(planet("earth", "Earth")).unwrap();

        let earth = RecordIdentity::new("planet", "earth");
        assert_eq!(source.get_record(&earth).unwrap(), Some(planet("earth", "Earth")));
        assert_eq!(source.len(), 1);

        assert!(source.remove_record(&earth).unwrap().is_some());
        assert!(source.remove_record(&earth).unwrap().is_none());
        assert!(source.is_empty());
    }

    #[test]
    fn get_records_by_type_and_identity() {
        let mut source = MemorySource::new();
        source.set_record(planet("mars", "Mars")).unwrap();
        source.set_record(planet("earth", "Earth")).unwrap();
        source.set_record(Record::new("moon", "luna")).unwrap();

        let planets = source.get_records(RecordSelector::Type("planet")).unwrap();
        assert_eq!(planets.len(), 2);
        assert!(source.get_records(RecordSelector::Type("star")).unwrap().is_empty());

        let wanted = [
            RecordIdentity::new("moon", "luna"),
            RecordIdentity::new("planet", "pluto"),
            RecordIdentity::new("planet", "mars"),
        ];
        let found = source.get_records(RecordSelector::Identities(&wanted)).unwrap();
        let ids: Vec<_> = found.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["luna", "mars"]);
    }

    #[test]
    fn snapshot_roundtrip() {
        let mut source = MemorySource::with_key_map();
        source
            .set_record(planet("earth", "Earth").with_key("remoteId", "p-3"))
            .unwrap();
        source.set_record(Record::new("moon", "luna")).unwrap();

        let snapshot = source.export_snapshot();
        assert_eq!(snapshot.record_count(), 2);

        let mut restored = MemorySource::with_key_map();
        restored.set_record(planet("vulcan", "Vulcan")).unwrap();
        restored.import_snapshot(snapshot.clone()).unwrap();

        assert_eq!(restored.export_snapshot(), snapshot);
        assert_eq!(
            restored
                .key_map()
                .unwrap()
                .key_to_id("planet", "remoteId", "p-3")
                .map(String::as_str),
            Some("earth")
        );
    }
}
