//! Query engine: read-only expressions evaluated against a record accessor.
//!
//! Four expression kinds are supported: `findRecord`, `findRecords`,
//! `findRelatedRecord` and `findRelatedRecords`. Collection results can be
//! refined with filters, a multi-key stable sort, and offset/limit paging.

use crate::accessor::{AsyncRecordAccessor, RecordAccessor, RecordSelector};
use crate::{
    error::Result, ApplyOptions, Error, Record, RecordIdentity, RecordType, RelationshipData,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Comparison applied to an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComparisonOperator {
    Equal,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Comparison between a to-many relationship and a set of identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SetComparisonOperator {
    /// Same members
    Equal,
    /// Contains every expected identity
    All,
    /// Contains at least one expected identity
    Some,
    /// Contains none of the expected identities
    None,
}

/// A predicate records must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "kind",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum FilterSpecifier {
    Attribute {
        attribute: String,
        op: ComparisonOperator,
        value: Value,
    },
    RelatedRecords {
        relation: String,
        op: SetComparisonOperator,
        records: Vec<RecordIdentity>,
    },
    /// Matches a to-one relationship. `record` is a single identity, null,
    /// or a list meaning "any of these". Only `equal` is supported.
    RelatedRecord {
        relation: String,
        op: ComparisonOperator,
        record: RelationshipData,
    },
}

impl FilterSpecifier {
    pub fn attribute(attribute: impl Into<String>, op: ComparisonOperator, value: Value) -> Self {
        FilterSpecifier::Attribute {
            attribute: attribute.into(),
            op,
            value,
        }
    }

    pub fn related_records(
        relation: impl Into<String>,
        op: SetComparisonOperator,
        records: Vec<RecordIdentity>,
    ) -> Self {
        FilterSpecifier::RelatedRecords {
            relation: relation.into(),
            op,
            records,
        }
    }

    pub fn related_record(relation: impl Into<String>, record: Option<RecordIdentity>) -> Self {
        FilterSpecifier::RelatedRecord {
            relation: relation.into(),
            op: ComparisonOperator::Equal,
            record: RelationshipData::ToOne(record),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// One key of a sort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "kind",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum SortSpecifier {
    Attribute {
        attribute: String,
        #[serde(default)]
        order: SortOrder,
    },
}

impl SortSpecifier {
    pub fn ascending(attribute: impl Into<String>) -> Self {
        SortSpecifier::Attribute {
            attribute: attribute.into(),
            order: SortOrder::Ascending,
        }
    }

    pub fn descending(attribute: impl Into<String>) -> Self {
        SortSpecifier::Attribute {
            attribute: attribute.into(),
            order: SortOrder::Descending,
        }
    }
}

/// Offset/limit paging. `limit` is required at evaluation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpecifier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl PageSpecifier {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset: Some(offset),
            limit: Some(limit),
        }
    }
}

/// A read-only query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "op",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum QueryExpression {
    FindRecord {
        record: RecordIdentity,
    },
    /// Records of a type, or an explicit list of records.
    FindRecords {
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        kind: Option<RecordType>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        records: Option<Vec<RecordIdentity>>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        filter: Vec<FilterSpecifier>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        sort: Vec<SortSpecifier>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        page: Option<PageSpecifier>,
    },
    FindRelatedRecord {
        record: RecordIdentity,
        relationship: String,
    },
    FindRelatedRecords {
        record: RecordIdentity,
        relationship: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        filter: Vec<FilterSpecifier>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        sort: Vec<SortSpecifier>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        page: Option<PageSpecifier>,
    },
}

impl QueryExpression {
    pub fn find_record(record: RecordIdentity) -> Self {
        QueryExpression::FindRecord { record }
    }

    pub fn find_records(kind: impl Into<RecordType>) -> Self {
        QueryExpression::FindRecords {
            kind: Some(kind.into()),
            records: None,
            filter: Vec::new(),
            sort: Vec::new(),
            page: None,
        }
    }

    pub fn find_records_by_identity(records: Vec<RecordIdentity>) -> Self {
        QueryExpression::FindRecords {
            kind: None,
            records: Some(records),
            filter: Vec::new(),
            sort: Vec::new(),
            page: None,
        }
    }

    pub fn find_related_record(record: RecordIdentity, relationship: impl Into<String>) -> Self {
        QueryExpression::FindRelatedRecord {
            record,
            relationship: relationship.into(),
        }
    }

    pub fn find_related_records(record: RecordIdentity, relationship: impl Into<String>) -> Self {
        QueryExpression::FindRelatedRecords {
            record,
            relationship: relationship.into(),
            filter: Vec::new(),
            sort: Vec::new(),
            page: None,
        }
    }

    /// Parse an expression from JSON.
    pub fn from_json(json: Value) -> Result<Self> {
        serde_json::from_value(json).map_err(|e| Error::QueryExpressionParse(e.to_string()))
    }

    /// Add a filter. Has no effect on single-record expressions.
    pub fn filter(mut self, specifier: FilterSpecifier) -> Self {
        if let Some((filter, _, _)) = self.refinements_mut() {
            filter.push(specifier);
        }
        self
    }

    /// Add a sort key. Has no effect on single-record expressions.
    pub fn sort(mut self, specifier: SortSpecifier) -> Self {
        if let Some((_, sort, _)) = self.refinements_mut() {
            sort.push(specifier);
        }
        self
    }

    /// Set paging. Has no effect on single-record expressions.
    pub fn page(mut self, specifier: PageSpecifier) -> Self {
        if let Some((_, _, page)) = self.refinements_mut() {
            *page = Some(specifier);
        }
        self
    }

    #[allow(clippy::type_complexity)]
    fn refinements_mut(
        &mut self,
    ) -> Option<(
        &mut Vec<FilterSpecifier>,
        &mut Vec<SortSpecifier>,
        &mut Option<PageSpecifier>,
    )> {
        match self {
            QueryExpression::FindRecords {
                filter, sort, page, ..
            }
            | QueryExpression::FindRelatedRecords {
                filter, sort, page, ..
            } => Some((filter, sort, page)),
            _ => None,
        }
    }
}

/// Result of evaluating a query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Result of a single-record expression
    Record(Option<Record>),
    /// Result of a collection expression; `None` if the owning record of a
    /// related-records query does not exist
    Records(Option<Vec<Record>>),
}

impl QueryResult {
    pub fn into_record(self) -> Option<Record> {
        match self {
            QueryResult::Record(record) => record,
            QueryResult::Records(_) => None,
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            QueryResult::Records(records) => records.unwrap_or_default(),
            QueryResult::Record(record) => record.into_iter().collect(),
        }
    }
}

fn selector<'a>(
    kind: &'a Option<RecordType>,
    records: &'a Option<Vec<RecordIdentity>>,
) -> Result<RecordSelector<'a>> {
    match (records, kind) {
        (Some(records), _) => Ok(RecordSelector::Identities(records)),
        (None, Some(kind)) => Ok(RecordSelector::Type(kind)),
        (None, None) => Err(Error::QueryExpressionParse(
            "findRecords requires either a type or a list of records".into(),
        )),
    }
}

fn validate(filter: &[FilterSpecifier], page: Option<&PageSpecifier>) -> Result<()> {
    for specifier in filter {
        if let FilterSpecifier::RelatedRecord { op, .. } = specifier {
            if *op != ComparisonOperator::Equal {
                return Err(Error::QueryExpressionParse(format!(
                    "filter operation {op:?} not recognized for relatedRecord"
                )));
            }
        }
    }
    if let Some(page) = page {
        if page.limit.is_none() {
            return Err(Error::QueryExpressionParse(
                "pagination options not recognized; specify `offset` and `limit`".into(),
            ));
        }
    }
    Ok(())
}

/// Order two JSON values of the same kind. Values of different kinds do not
/// compare.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

fn matches(record: &Record, specifier: &FilterSpecifier) -> bool {
    match specifier {
        FilterSpecifier::Attribute {
            attribute,
            op,
            value,
        } => {
            let Some(actual) = record.attribute(attribute) else {
                return false;
            };
            let ordering = compare_values(actual, value);
            match op {
                ComparisonOperator::Equal => {
                    actual == value || ordering == Some(Ordering::Equal)
                }
                ComparisonOperator::Gt => ordering == Some(Ordering::Greater),
                ComparisonOperator::Gte => {
                    matches!(ordering, Some(Ordering::Greater | Ordering::Equal))
                }
                ComparisonOperator::Lt => ordering == Some(Ordering::Less),
                ComparisonOperator::Lte => {
                    matches!(ordering, Some(Ordering::Less | Ordering::Equal))
                }
            }
        }

        FilterSpecifier::RelatedRecords {
            relation,
            op,
            records: expected,
        } => {
            let actual = record.related_records(relation).unwrap_or_default();
            match op {
                SetComparisonOperator::Equal => {
                    actual.len() == expected.len() && expected.iter().all(|e| actual.contains(e))
                }
                SetComparisonOperator::All => expected.iter().all(|e| actual.contains(e)),
                SetComparisonOperator::Some => expected.iter().any(|e| actual.contains(e)),
                SetComparisonOperator::None => !expected.iter().any(|e| actual.contains(e)),
            }
        }

        FilterSpecifier::RelatedRecord {
            relation,
            record: expected,
            ..
        } => {
            let Some(actual) = record.related_record(relation) else {
                return false;
            };
            match (actual, expected) {
                (None, RelationshipData::ToOne(None)) => true,
                (None, _) => false,
                (Some(actual), RelationshipData::ToMany(any_of)) => any_of.contains(actual),
                (Some(actual), RelationshipData::ToOne(Some(expected))) => actual == expected,
                (Some(_), RelationshipData::ToOne(None)) => false,
            }
        }
    }
}

fn sort_key<'a>(record: &'a Record, specifier: &SortSpecifier) -> Option<&'a Value> {
    match specifier {
        SortSpecifier::Attribute { attribute, .. } => {
            record.attribute(attribute).filter(|v| !v.is_null())
        }
    }
}

/// Compare two records by the sort keys. Missing and null values sort after
/// defined ones; descending keys reverse that along with everything else.
fn compare_records(a: &Record, b: &Record, sort: &[SortSpecifier]) -> Ordering {
    for specifier in sort {
        let SortSpecifier::Attribute { order, .. } = specifier;
        let ordering = match (sort_key(a, specifier), sort_key(b, specifier)) {
            (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        let ordering = match order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Filter, sort and page a set of records.
pub fn refine(
    records: Vec<Record>,
    filter: &[FilterSpecifier],
    sort: &[SortSpecifier],
    page: Option<&PageSpecifier>,
) -> Result<Vec<Record>> {
    validate(filter, page)?;

    let mut records: Vec<Record> = records
        .into_iter()
        .filter(|record| filter.iter().all(|specifier| matches(record, specifier)))
        .collect();

    if !sort.is_empty() {
        records.sort_by(|a, b| compare_records(a, b, sort));
    }

    if let Some(PageSpecifier {
        offset,
        limit: Some(limit),
    }) = page
    {
        records = records
            .into_iter()
            .skip(offset.unwrap_or(0))
            .take(*limit)
            .collect();
    }

    Ok(records)
}

/// Filter, sort and page settings carried by a multi-record query.
#[derive(Debug, Clone, Copy)]
struct Refinement<'a> {
    filter: &'a [FilterSpecifier],
    sort: &'a [SortSpecifier],
    page: Option<&'a PageSpecifier>,
}

impl Refinement<'_> {
    fn apply(&self, records: Vec<Record>) -> Result<QueryResult> {
        let records = refine(records, self.filter, self.sort, self.page)?;
        Ok(QueryResult::Records(Some(records)))
    }
}

/// A query with its expression checked, reduced to the reads it needs.
enum Plan<'a> {
    Record(&'a RecordIdentity),
    Records(RecordSelector<'a>, Refinement<'a>),
    RelatedRecord(&'a RecordIdentity, &'a str),
    RelatedRecords(&'a RecordIdentity, &'a str, Refinement<'a>),
}

fn plan(expression: &QueryExpression) -> Result<Plan<'_>> {
    let plan = match expression {
        QueryExpression::FindRecord { record } => Plan::Record(record),
        QueryExpression::FindRecords {
            kind,
            records,
            filter,
            sort,
            page,
        } => {
            validate(filter, page.as_ref())?;
            Plan::Records(
                selector(kind, records)?,
                Refinement {
                    filter,
                    sort,
                    page: page.as_ref(),
                },
            )
        }
        QueryExpression::FindRelatedRecord {
            record,
            relationship,
        } => Plan::RelatedRecord(record, relationship),
        QueryExpression::FindRelatedRecords {
            record,
            relationship,
            filter,
            sort,
            page,
        } => {
            validate(filter, page.as_ref())?;
            Plan::RelatedRecords(
                record,
                relationship,
                Refinement {
                    filter,
                    sort,
                    page: page.as_ref(),
                },
            )
        }
    };
    Ok(plan)
}

/// Where a to-one lookup goes after reading the relationship.
enum RelatedTarget {
    Fetch(RecordIdentity),
    Empty,
    /// The relationship is unreadable; whether that is an error depends on
    /// the owning record existing
    CheckOwner,
}

fn related_target(related: Option<Option<RecordIdentity>>) -> RelatedTarget {
    match related {
        Some(Some(identity)) => RelatedTarget::Fetch(identity),
        Some(None) => RelatedTarget::Empty,
        None => RelatedTarget::CheckOwner,
    }
}

fn found_record(
    found: Option<Record>,
    identity: &RecordIdentity,
    options: &ApplyOptions,
) -> Result<QueryResult> {
    match found {
        Some(found) => Ok(QueryResult::Record(Some(found))),
        None => Ok(QueryResult::Record(options.not_found(identity)?)),
    }
}

fn owner_checked(
    owner: Option<Record>,
    identity: &RecordIdentity,
    options: &ApplyOptions,
) -> Result<QueryResult> {
    match owner {
        Some(_) => Ok(QueryResult::Record(None)),
        None => Ok(QueryResult::Record(options.not_found(identity)?)),
    }
}

fn missing_owner(identity: &RecordIdentity, options: &ApplyOptions) -> Result<QueryResult> {
    Ok(QueryResult::Records(options.not_found(identity)?))
}

/// Evaluate a query.
pub fn query<A: RecordAccessor + ?Sized>(
    accessor: &A,
    expression: &QueryExpression,
    options: &ApplyOptions,
) -> Result<QueryResult> {
    match plan(expression)? {
        Plan::Record(record) => found_record(accessor.get_record(record)?, record, options),

        Plan::Records(selector, refinement) => refinement.apply(accessor.get_records(selector)?),

        Plan::RelatedRecord(record, relationship) => {
            match related_target(accessor.get_related_record(record, relationship)?) {
                RelatedTarget::Fetch(related) => {
                    Ok(QueryResult::Record(accessor.get_record(&related)?))
                }
                RelatedTarget::Empty => Ok(QueryResult::Record(None)),
                RelatedTarget::CheckOwner => {
                    owner_checked(accessor.get_record(record)?, record, options)
                }
            }
        }

        Plan::RelatedRecords(record, relationship, refinement) => {
            match accessor.get_related_records(record, relationship)? {
                Some(related) => refinement
                    .apply(accessor.get_records(RecordSelector::Identities(&related))?),
                None => missing_owner(record, options),
            }
        }
    }
}

/// Async counterpart of [`query`].
pub async fn query_async<A: AsyncRecordAccessor + ?Sized>(
    accessor: &A,
    expression: &QueryExpression,
    options: &ApplyOptions,
) -> Result<QueryResult> {
    match plan(expression)? {
        Plan::Record(record) => found_record(accessor.get_record(record).await?, record, options),

        Plan::Records(selector, refinement) => {
            refinement.apply(accessor.get_records(selector).await?)
        }

        Plan::RelatedRecord(record, relationship) => {
            match related_target(accessor.get_related_record(record, relationship).await?) {
                RelatedTarget::Fetch(related) => {
                    Ok(QueryResult::Record(accessor.get_record(&related).await?))
                }
                RelatedTarget::Empty => Ok(QueryResult::Record(None)),
                RelatedTarget::CheckOwner => {
                    owner_checked(accessor.get_record(record).await?, record, options)
                }
            }
        }

        Plan::RelatedRecords(record, relationship, refinement) => {
            match accessor.get_related_records(record, relationship).await? {
                Some(related) => refinement.apply(
                    accessor
                        .get_records(RecordSelector::Identities(&related))
                        .await?,
                ),
                None => missing_owner(record, options),
            }
        }
    }
}
