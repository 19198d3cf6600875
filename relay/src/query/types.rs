//! Elasticsearch request body types
//!
//! Only the slice of the Query DSL the relay emits is modelled here.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Backend ceiling on `from + size` (Elasticsearch `index.max_result_window`)
pub const MAX_RESULT_WINDOW: usize = 10_000;

/// Record attributes that can be filtered on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordField {
    StudentId,
    Year,
    SemesterCode,
    InstallmentPart,
}

impl RecordField {
    /// Field name in the backend index
    pub fn backend_field(&self) -> &'static str {
        match self {
            Self::StudentId => "STDNO",
            Self::Year => "SCH_YEAR",
            Self::SemesterCode => "SMT_RCD",
            Self::InstallmentPart => "INPART",
        }
    }
}

/// Exact-match `term` clause, evaluated in filter context
#[derive(Debug, Clone, PartialEq)]
pub struct ExactMatchClause {
    pub field: RecordField,
    pub value: Value,
}

impl ExactMatchClause {
    pub fn new(field: RecordField, value: impl Into<Value>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }
}

impl Serialize for ExactMatchClause {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut term = BTreeMap::new();
        term.insert(self.field.backend_field(), &self.value);

        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("term", &term)?;
        map.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatchAllQuery {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryStringQuery {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoolFilterQuery {
    pub filter: Vec<ExactMatchClause>,
}

/// Top-level query clause
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryClause {
    MatchAll(MatchAllQuery),
    QueryString(QueryStringQuery),
    Bool(BoolFilterQuery),
}

impl QueryClause {
    pub fn match_all() -> Self {
        Self::MatchAll(MatchAllQuery {})
    }

    /// Exact-match clauses carried by this query (empty unless it is a bool filter)
    pub fn filters(&self) -> &[ExactMatchClause] {
        match self {
            Self::Bool(b) => &b.filter,
            _ => &[],
        }
    }
}

/// Fields records may be sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortField {
    CreatedTimestamp,
    FiscalYear,
    StudentId,
    SequenceId,
}

impl SortField {
    pub const ALL: [SortField; 4] = [
        Self::CreatedTimestamp,
        Self::FiscalYear,
        Self::StudentId,
        Self::SequenceId,
    ];

    pub fn backend_field(&self) -> &'static str {
        match self {
            Self::CreatedTimestamp => "CRT_DTTM",
            Self::FiscalYear => "SCH_YEAR",
            Self::StudentId => "STDNO",
            Self::SequenceId => "SCAL_SEQ",
        }
    }

    pub fn from_backend_field(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.backend_field() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Serialized as `{ "<field>": "<direction>" }`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortClause {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Serialize for SortClause {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.field.backend_field(), &self.direction)?;
        map.end()
    }
}

/// The three facets the stats endpoint breaks records down by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facet {
    Year,
    Nationality,
    ScholarshipName,
}

impl Facet {
    pub const ALL: [Facet; 3] = [Self::Year, Self::Nationality, Self::ScholarshipName];

    /// Aggregation name in the request and in the response envelope
    pub fn name(&self) -> &'static str {
        match self {
            Self::Year => "by_year",
            Self::Nationality => "by_nat",
            Self::ScholarshipName => "by_scal_nm",
        }
    }

    pub fn backend_field(&self) -> &'static str {
        match self {
            Self::Year => "SCH_YEAR",
            Self::Nationality => "NAT",
            // Text field; bucket on its keyword sub-field
            Self::ScholarshipName => "SCAL_NM.keyword",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermsAggregation {
    pub field: String,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Terms(TermsAggregation),
}

/// A validated, backend-ready search request
///
/// Serializes to the `_search` request body; the index travels in the URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendQueryDescriptor {
    #[serde(skip)]
    pub index: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<usize>,

    pub size: usize,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortClause>,

    pub query: QueryClause,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub aggs: BTreeMap<String, Aggregation>,
}

impl BackendQueryDescriptor {
    pub fn new(index: impl Into<String>, query: QueryClause, size: usize) -> Self {
        Self {
            index: index.into(),
            from: None,
            size,
            sort: Vec::new(),
            query,
            aggs: BTreeMap::new(),
        }
    }

    pub fn with_from(mut self, from: usize) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_sort(mut self, sort: Vec<SortClause>) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_aggregation(mut self, name: impl Into<String>, agg: Aggregation) -> Self {
        self.aggs.insert(name.into(), agg);
        self
    }
}
