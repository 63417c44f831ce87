//! # Strand Engine
//!
//! Record operations, their inverses, and queries for offline-first
//! applications.
//!
//! The engine has no IO. It reads and writes records through a
//! [`RecordAccessor`] (or [`AsyncRecordAccessor`]) that the caller supplies,
//! so the same operators run against an in-memory cache, a database, or
//! anything else that can get and set records.
//!
//! ## Core Concepts
//!
//! ### Records
//!
//! A [`Record`] is identified by a type and an id ([`RecordIdentity`]) and
//! carries three groupings:
//! - keys (alternate identifiers, see [`KeyMap`])
//! - attributes (JSON values)
//! - relationships (to-one or to-many links to other records)
//!
//! ### Operations
//!
//! Changes are expressed as [`RecordOperation`]s grouped into a
//! [`Transform`]. Each operation has a forward operator
//! ([`apply_operation`]) and an inverse operator ([`invert_operation`]) that
//! computes the operation undoing it, read against the state *before* the
//! forward step.
//!
//! [`patch`] applies a batch and returns the results together with the
//! inverse operations, newest first. A failing batch is rolled back.
//!
//! ### Queries
//!
//! [`QueryExpression`]s find one record, many records, or the records
//! linked through a relationship. Collection results can be filtered,
//! sorted and paged.
//!
//! ## Quick Start
//!
//! ```rust
//! use strand_engine::{
//!     patch, query, ApplyOptions, ComparisonOperator, FilterSpecifier, MemorySource,
//!     QueryExpression, Record, RecordIdentity, RecordOperation, SortSpecifier,
//! };
//! use serde_json::json;
//!
//! let mut source = MemorySource::new();
//! let options = ApplyOptions::default();
//!
//! // 1. Apply a batch of operations
//! let operations = vec![
//!     RecordOperation::add_record(
//!         Record::new("planet", "earth").with_attribute("name", json!("Earth")),
//!     ),
//!     RecordOperation::add_record(
//!         Record::new("planet", "mars").with_attribute("name", json!("Mars")),
//!     ),
//! ];
//! let result = patch(&mut source, &operations, &options).unwrap();
//! assert_eq!(result.inverse.len(), 2);
//!
//! // 2. Query
//! let expression = QueryExpression::find_records("planet")
//!     .filter(FilterSpecifier::attribute("name", ComparisonOperator::Gt, json!("Earth")))
//!     .sort(SortSpecifier::ascending("name"));
//! let found = query(&source, &expression, &options).unwrap().into_records();
//! assert_eq!(found.len(), 1);
//!
//! // 3. Undo
//! patch(&mut source, &result.inverse, &options).unwrap();
//! assert!(source.is_empty());
//! ```
//!
//! ## Persistence
//!
//! Use [`MemorySource::export_snapshot`] and [`MemorySource::import_snapshot`]
//! with [`SourceSnapshot`]. Snapshots serialize to JSON with deterministic
//! ordering.

pub mod accessor;
pub mod error;
pub mod inverse;
pub mod key_map;
pub mod memory;
pub mod operation;
pub mod operators;
pub mod query;
pub mod record;
pub mod snapshot;

// Re-export main types at crate root
pub use accessor::{AsyncRecordAccessor, RecordAccessor, RecordSelector, Shared};
pub use error::Error;
pub use inverse::{invert_operation, invert_operation_async};
pub use key_map::KeyMap;
pub use memory::{Collection, MemorySource};
pub use operation::{RecordOperation, Transform, TransformId};
pub use operators::{
    apply_operation, apply_operation_async, apply_transform, apply_transform_async, patch,
    patch_async, ApplyOptions, PatchResult,
};
pub use query::{
    query, query_async, ComparisonOperator, FilterSpecifier, PageSpecifier, QueryExpression,
    QueryResult, SetComparisonOperator, SortOrder, SortSpecifier,
};
pub use record::{equal_identity_sets, Record, RecordIdentity, Relationship, RelationshipData};
pub use snapshot::{SourceSnapshot, SNAPSHOT_FORMAT_VERSION};

/// Type aliases for clarity
pub type RecordId = String;
pub type RecordType = String;
