//! Record types for storing data.

use crate::{RecordId, RecordType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// The identity of a record: its type and its id.
///
/// Equality, hashing and ordering are all by `(type, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordIdentity {
    /// Record type (e.g. `"planet"`)
    #[serde(rename = "type")]
    pub kind: RecordType,
    /// Record id, unique within its type
    pub id: RecordId,
}

impl RecordIdentity {
    /// Create a new identity.
    pub fn new(kind: impl Into<RecordType>, id: impl Into<RecordId>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Compare two identity lists as sets.
pub fn equal_identity_sets(a: &[RecordIdentity], b: &[RecordIdentity]) -> bool {
    a.iter().collect::<BTreeSet<_>>() == b.iter().collect::<BTreeSet<_>>()
}

/// Linkage carried by a relationship.
///
/// A to-many relationship is an ordered set: membership is unique and order
/// carries no meaning, so equality is set equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelationshipData {
    ToMany(Vec<RecordIdentity>),
    ToOne(Option<RecordIdentity>),
}

impl PartialEq for RelationshipData {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RelationshipData::ToMany(a), RelationshipData::ToMany(b)) => {
                equal_identity_sets(a, b)
            }
            (RelationshipData::ToOne(a), RelationshipData::ToOne(b)) => a == b,
            _ => false,
        }
    }
}

/// A named relationship of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub data: RelationshipData,
}

impl Relationship {
    /// A to-one relationship (`None` links to nothing).
    pub fn to_one(related: Option<RecordIdentity>) -> Self {
        Self {
            data: RelationshipData::ToOne(related),
        }
    }

    /// A to-many relationship. Duplicate identities are dropped.
    pub fn to_many(related: impl IntoIterator<Item = RecordIdentity>) -> Self {
        let mut members: Vec<RecordIdentity> = Vec::new();
        for identity in related {
            if !members.contains(&identity) {
                members.push(identity);
            }
        }
        Self {
            data: RelationshipData::ToMany(members),
        }
    }
}

/// A typed record: identity plus keys, attributes and relationships.
///
/// Absent and empty groupings are equivalent and are not serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Record type
    #[serde(rename = "type")]
    pub kind: RecordType,
    /// Record id
    pub id: RecordId,
    /// Alternate identifiers (e.g. a remote id). A `None` value is the
    /// "no prior key" sentinel written by inverse operations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub keys: BTreeMap<String, Option<String>>,
    /// Attribute values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
    /// Relationships by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, Relationship>,
}

impl Record {
    /// Create an empty record.
    pub fn new(kind: impl Into<RecordType>, id: impl Into<RecordId>) -> Self {
        Self::from_identity(RecordIdentity::new(kind, id))
    }

    /// Create an empty record with the given identity.
    pub fn from_identity(identity: RecordIdentity) -> Self {
        Self {
            kind: identity.kind,
            id: identity.id,
            keys: BTreeMap::new(),
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    /// The identity of this record.
    pub fn identity(&self) -> RecordIdentity {
        RecordIdentity::new(self.kind.clone(), self.id.clone())
    }

    /// Whether this record has the given identity.
    pub fn is(&self, identity: &RecordIdentity) -> bool {
        self.kind == identity.kind && self.id == identity.id
    }

    pub fn with_key(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.keys.insert(name.into(), Some(value.into()));
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn with_to_one(mut self, name: impl Into<String>, related: Option<RecordIdentity>) -> Self {
        self.relationships
            .insert(name.into(), Relationship::to_one(related));
        self
    }

    pub fn with_to_many(
        mut self,
        name: impl Into<String>,
        related: impl IntoIterator<Item = RecordIdentity>,
    ) -> Self {
        self.relationships
            .insert(name.into(), Relationship::to_many(related));
        self
    }

    /// Get a key value.
    pub fn key(&self, name: &str) -> Option<&str> {
        self.keys.get(name).and_then(|v| v.as_deref())
    }

    /// Get an attribute value.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Get the linkage of a relationship, if the relationship is present.
    pub fn relationship(&self, name: &str) -> Option<&RelationshipData> {
        self.relationships.get(name).map(|r| &r.data)
    }

    /// Members of a to-many relationship. `None` if the relationship is
    /// absent or is to-one.
    pub fn related_records(&self, name: &str) -> Option<&[RecordIdentity]> {
        match self.relationship(name)? {
            RelationshipData::ToMany(members) => Some(members),
            RelationshipData::ToOne(_) => None,
        }
    }

    /// Target of a to-one relationship. The outer `None` means the
    /// relationship is absent or is to-many.
    pub fn related_record(&self, name: &str) -> Option<Option<&RecordIdentity>> {
        match self.relationship(name)? {
            RelationshipData::ToOne(related) => Some(related.as_ref()),
            RelationshipData::ToMany(_) => None,
        }
    }

    /// Add a member to a to-many relationship unless it is already present.
    ///
    /// A missing or to-one relationship becomes a to-many one.
    pub fn add_related(&mut self, name: &str, related: RecordIdentity) {
        match self.relationships.get_mut(name) {
            Some(Relationship {
                data: RelationshipData::ToMany(members),
            }) => {
                if !members.contains(&related) {
                    members.push(related);
                }
            }
            _ => {
                self.relationships
                    .insert(name.to_string(), Relationship::to_many([related]));
            }
        }
    }

    /// Remove a member from a to-many relationship. Does nothing if the
    /// relationship is absent.
    pub fn remove_related(&mut self, name: &str, related: &RecordIdentity) {
        if let Some(Relationship {
            data: RelationshipData::ToMany(members),
        }) = self.relationships.get_mut(name)
        {
            members.retain(|member| member != related);
        }
    }

    /// Merge `updates` over `current`.
    ///
    /// Keys and attributes are replaced one field at a time. Relationships
    /// are replaced wholesale per relationship name, so a to-many set present
    /// in `updates` replaces the current set rather than being unioned with it.
    /// Without a current record the updates are taken as-is.
    pub fn merge(current: Option<&Record>, updates: &Record) -> Record {
        let Some(current) = current else {
            return updates.clone();
        };

        let mut merged = current.clone();
        for (name, value) in &updates.keys {
            merged.keys.insert(name.clone(), value.clone());
        }
        for (name, value) in &updates.attributes {
            merged.attributes.insert(name.clone(), value.clone());
        }
        for (name, relationship) in &updates.relationships {
            let data = match &relationship.data {
                RelationshipData::ToMany(members) => {
                    Relationship::to_many(members.iter().cloned())
                }
                RelationshipData::ToOne(related) => Relationship::to_one(related.clone()),
            };
            merged.relationships.insert(name.clone(), data);
        }
        merged
    }
}

impl From<RecordIdentity> for Record {
    fn from(identity: RecordIdentity) -> Self {
        Record::from_identity(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn planet(id: &str) -> RecordIdentity {
        RecordIdentity::new("planet", id)
    }

    #[test]
    fn create_record() {
        let record = Record::new("planet", "jupiter")
            .with_key("remoteId", "p-5")
            .with_attribute("name", json!("Jupiter"));

        assert_eq!(record.identity(), planet("jupiter"));
        assert_eq!(record.key("remoteId"), Some("p-5"));
        assert_eq!(record.attribute("name"), Some(&json!("Jupiter")));
        assert!(record.relationships.is_empty());
    }

    #[test]
    fn to_many_is_a_set() {
        let a = RelationshipData::ToMany(vec![planet("a"), planet("b")]);
        let b = RelationshipData::ToMany(vec![planet("b"), planet("a")]);
        assert_eq!(a, b);

        let rel = Relationship::to_many([planet("a"), planet("a")]);
        assert_eq!(rel.data, RelationshipData::ToMany(vec![planet("a")]));
    }

    #[test]
    fn add_and_remove_related() {
        let mut record = Record::new("star", "sun");
        record.add_related("planets", planet("earth"));
        record.add_related("planets", planet("earth"));
        record.add_related("planets", planet("mars"));
        assert_eq!(
            record.related_records("planets"),
            Some(&[planet("earth"), planet("mars")][..])
        );

        record.remove_related("planets", &planet("earth"));
        assert_eq!(record.related_records("planets"), Some(&[planet("mars")][..]));

        record.remove_related("moons", &planet("earth"));
        assert!(record.relationship("moons").is_none());
    }

    #[test]
    fn merge_replaces_fields_and_relationships() {
        let current = Record::new("planet", "earth")
            .with_attribute("name", json!("Earth"))
            .with_attribute("classification", json!("terrestrial"))
            .with_to_many("moons", [RecordIdentity::new("moon", "luna")]);
        let updates = Record::new("planet", "earth")
            .with_attribute("name", json!("Terra"))
            .with_to_many("moons", [RecordIdentity::new("moon", "phobos")]);

        let merged = Record::merge(Some(&current), &updates);
        assert_eq!(merged.attribute("name"), Some(&json!("Terra")));
        assert_eq!(merged.attribute("classification"), Some(&json!("terrestrial")));
        assert_eq!(
            merged.related_records("moons"),
            Some(&[RecordIdentity::new("moon", "phobos")][..])
        );

        assert_eq!(Record::merge(None, &updates), updates);
    }

    #[test]
    fn related_record_accessors() {
        let record = Record::new("moon", "luna")
            .with_to_one("planet", Some(planet("earth")))
            .with_to_one("star", None);

        assert_eq!(record.related_record("planet"), Some(Some(&planet("earth"))));
        assert_eq!(record.related_record("star"), Some(None));
        assert_eq!(record.related_record("orbit"), None);
        assert_eq!(record.related_records("planet"), None);
    }

    #[test]
    fn serialization_roundtrip() {
        let record = Record::new("moon", "luna")
            .with_attribute("name", json!("Luna"))
            .with_to_one("planet", Some(planet("earth")))
            .with_to_one("star", None)
            .with_to_many("visitors", [RecordIdentity::new("probe", "luna-2")]);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "moon");
        assert_eq!(json["relationships"]["star"]["data"], Value::Null);
        assert_eq!(json["relationships"]["planet"]["data"]["id"], "earth");

        let parsed: Record = serde_json::from_value(json).unwrap();
        assert_eq!(record, parsed);
    }

    #[test]
    fn empty_groupings_are_skipped() {
        let json = serde_json::to_value(Record::new("planet", "pluto")).unwrap();
        assert_eq!(json, json!({"type": "planet", "id": "pluto"}));
    }
}
