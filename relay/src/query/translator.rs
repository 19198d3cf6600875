//! Translation from validated request parameters to backend queries

use crate::config::Config;
use crate::error::RelayError;
use crate::Result;
use crate::query::params::*;
use crate::query::types::*;
use crate::response::{PageContext, ResponseMode, StatsContext};

/// Routes served by the relay, each with its own parameters and response mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Free-text search on a caller-chosen index, passed through untouched
    Search,
    /// Match-all over the records index
    Records,
    /// Exact-match filtered records
    RecordsQuery,
    /// Filtered, sorted, paginated records with metadata
    RecordsPage,
    /// Facet counts over the records index
    RecordsStats,
}

impl Endpoint {
    /// Label used in logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Records => "records",
            Self::RecordsQuery => "records_query",
            Self::RecordsPage => "records_page",
            Self::RecordsStats => "records_stats",
        }
    }
}

/// A backend query plus the shaping its result needs
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedRequest {
    pub descriptor: BackendQueryDescriptor,
    pub mode: ResponseMode,
}

/// Indices the `/search` endpoint may touch
///
/// An empty list permits every index. That is a development-mode escape hatch;
/// see the [`config`](crate::config) module docs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexAllowList {
    indices: Vec<String>,
}

impl IndexAllowList {
    pub fn new(indices: Vec<String>) -> Self {
        Self { indices }
    }

    pub fn is_permissive(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn permits(&self, index: &str) -> bool {
        self.is_permissive() || self.indices.iter().any(|i| i == index)
    }
}

/// Validates parameters and builds [`BackendQueryDescriptor`]s
///
/// Holds only read-only configuration, so one instance is shared by all
/// requests.
#[derive(Debug, Clone)]
pub struct QueryTranslator {
    allow_list: IndexAllowList,
    records_index: String,
}

impl QueryTranslator {
    pub fn new(allow_list: IndexAllowList, records_index: impl Into<String>) -> Self {
        Self {
            allow_list,
            records_index: records_index.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            IndexAllowList::new(config.access.allowed_indices.clone()),
            config.records.index.clone(),
        )
    }

    pub fn allow_list(&self) -> &IndexAllowList {
        &self.allow_list
    }

    pub fn records_index(&self) -> &str {
        &self.records_index
    }

    /// Parse `raw` for `endpoint` and build the backend request.
    ///
    /// Every validation error surfaces here, before anything reaches the
    /// backend.
    pub fn translate(
        &self,
        endpoint: Endpoint,
        raw: &RawParams,
    ) -> Result<TranslatedRequest> {
        match endpoint {
            Endpoint::Search => {
                let params = SearchRequestParams::parse(raw)?;
                Ok(TranslatedRequest {
                    descriptor: self.build_search_descriptor(&params)?,
                    mode: ResponseMode::Passthrough,
                })
            }
            Endpoint::Records | Endpoint::RecordsQuery => {
                let params = ListQueryParams::parse(raw, endpoint == Endpoint::RecordsQuery)?;
                Ok(TranslatedRequest {
                    descriptor: self.build_list_descriptor(&params),
                    mode: ResponseMode::Unwrapped,
                })
            }
            Endpoint::RecordsPage => {
                let params = PageQueryParams::parse(raw)?;
                let descriptor = self.build_page_descriptor(&params)?;
                let from = descriptor.from.unwrap_or(0);
                Ok(TranslatedRequest {
                    descriptor,
                    mode: ResponseMode::Paginated(PageContext {
                        index: self.records_index.clone(),
                        from,
                        params,
                    }),
                })
            }
            Endpoint::RecordsStats => {
                let params = StatsQueryParams::parse(raw)?;
                Ok(TranslatedRequest {
                    descriptor: self.build_stats_descriptor(&params),
                    mode: ResponseMode::Stats(StatsContext {
                        index: self.records_index.clone(),
                        params,
                    }),
                })
            }
        }
    }

    /// Fails with `IndexForbidden` when a non-empty allow-list lacks `index`.
    pub fn check_index_allowed(&self, index: &str) -> Result<()> {
        if self.allow_list.permits(index) {
            Ok(())
        } else {
            Err(RelayError::IndexForbidden(index.to_string()))
        }
    }

    /// Query-string clause for a non-empty free-text term, match-all otherwise.
    ///
    /// The term is not escaped: callers can use the backend's full query-string
    /// syntax (field names, wildcards, boolean operators). Anyone who can reach
    /// `/search` can query any field of an allowed index this way.
    pub fn build_free_text_query(params: &SearchRequestParams) -> QueryClause {
        match params.free_text.as_deref() {
            Some(term) if !term.is_empty() => QueryClause::QueryString(QueryStringQuery {
                query: term.to_string(),
            }),
            _ => QueryClause::match_all(),
        }
    }

    /// One exact-match clause per present filter field
    pub fn build_filter_clauses(filters: &RecordFilterParams) -> Vec<ExactMatchClause> {
        let mut clauses = Vec::new();
        if let Some(student_id) = &filters.student_id {
            clauses.push(ExactMatchClause::new(RecordField::StudentId, student_id.as_str()));
        }
        if let Some(year) = filters.year {
            clauses.push(ExactMatchClause::new(RecordField::Year, year));
        }
        if let Some(semester) = &filters.semester_code {
            clauses.push(ExactMatchClause::new(RecordField::SemesterCode, semester.as_str()));
        }
        if let Some(part) = &filters.installment_part {
            clauses.push(ExactMatchClause::new(RecordField::InstallmentPart, part.as_str()));
        }
        clauses
    }

    /// AND of the filter clauses in unscored filter context; match-all when there are none
    pub fn build_filter_query(filters: &RecordFilterParams) -> QueryClause {
        let filter = Self::build_filter_clauses(filters);
        if filter.is_empty() {
            QueryClause::match_all()
        } else {
            QueryClause::Bool(BoolFilterQuery { filter })
        }
    }

    /// Parse `field[:direction]` into a single sort clause.
    ///
    /// Returns an empty list when no sort was requested. The direction defaults
    /// to ascending and is case-insensitive; the field must be one of
    /// [`SortField::ALL`].
    pub fn parse_sort(sort: Option<&str>) -> Result<Vec<SortClause>> {
        let Some(sort) = sort.filter(|s| !s.is_empty()) else {
            return Ok(Vec::new());
        };

        let (field, direction) = match sort.split_once(':') {
            Some((field, direction)) => (field, direction),
            None => (sort, ""),
        };

        let field = SortField::from_backend_field(field).ok_or_else(|| {
            RelayError::InvalidSortSpec {
                kind: "field",
                value: field.to_string(),
            }
        })?;

        let direction = match direction.to_ascii_lowercase().as_str() {
            "" | "asc" => SortDirection::Asc,
            "desc" => SortDirection::Desc,
            other => {
                return Err(RelayError::InvalidSortSpec {
                    kind: "direction",
                    value: other.to_string(),
                })
            }
        };

        Ok(vec![SortClause { field, direction }])
    }

    /// `/search`: allow-list check, then a free-text or match-all query
    pub fn build_search_descriptor(
        &self,
        params: &SearchRequestParams,
    ) -> Result<BackendQueryDescriptor> {
        self.check_index_allowed(&params.index)?;

        Ok(BackendQueryDescriptor::new(
            params.index.clone(),
            Self::build_free_text_query(params),
            params.limit,
        )
        .with_from(params.offset))
    }

    /// `/records` and `/records/query`
    pub fn build_list_descriptor(&self, params: &ListQueryParams) -> BackendQueryDescriptor {
        BackendQueryDescriptor::new(
            self.records_index.clone(),
            Self::build_filter_query(&params.filters),
            params.size,
        )
    }

    /// `/records/custom-response`: offset from page number, deep-pagination
    /// ceiling, then filters and sort
    pub fn build_page_descriptor(
        &self,
        params: &PageQueryParams,
    ) -> Result<BackendQueryDescriptor> {
        let window_end = params
            .offset()
            .and_then(|from| from.checked_add(params.size).map(|end| (from, end)));

        let from = match window_end {
            Some((from, end)) if end <= MAX_RESULT_WINDOW => from,
            _ => {
                return Err(RelayError::PaginationTooDeep {
                    from: params.offset().unwrap_or(usize::MAX),
                    size: params.size,
                    limit: MAX_RESULT_WINDOW,
                })
            }
        };

        let sort = Self::parse_sort(params.sort.as_deref())?;

        Ok(BackendQueryDescriptor::new(
            self.records_index.clone(),
            Self::build_filter_query(&params.filters),
            params.size,
        )
        .with_from(from)
        .with_sort(sort))
    }

    /// `/records/stats`: no hits, one terms aggregation per [`Facet`]
    pub fn build_stats_descriptor(&self, params: &StatsQueryParams) -> BackendQueryDescriptor {
        Facet::ALL.into_iter().fold(
            BackendQueryDescriptor::new(
                self.records_index.clone(),
                Self::build_filter_query(&params.filters()),
                0,
            ),
            |descriptor, facet| {
                descriptor.with_aggregation(
                    facet.name(),
                    Aggregation::Terms(TermsAggregation {
                        field: facet.backend_field().to_string(),
                        size: params.top_n,
                    }),
                )
            },
        )
    }
}
