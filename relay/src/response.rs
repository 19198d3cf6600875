//! Shaping of raw backend results into response envelopes

use crate::error::BackendError;
use crate::query::params::{PageQueryParams, RecordFilterParams, StatsQueryParams};
use crate::query::types::Facet;
use serde::Serialize;
use serde_json::value::RawValue;
use serde_json::Value;

/// Keys that mark a client-library transport wrapper around the real result
const TRANSPORT_KEYS: [&str; 4] = ["statusCode", "headers", "meta", "warnings"];

/// How a backend result is turned into the HTTP response
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseMode {
    /// Backend result returned exactly as received
    Passthrough,
    /// Backend result minus any transport wrapper
    Unwrapped,
    /// Hits plus page metadata
    Paginated(PageContext),
    /// Facet bucket lists plus metadata
    Stats(StatsContext),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageContext {
    pub index: String,
    /// Computed offset of the page
    pub from: usize,
    pub params: PageQueryParams,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsContext {
    pub index: String,
    pub params: StatsQueryParams,
}

/// Response envelopes, serialized without a variant tag
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResponseEnvelope {
    /// Backend body, written out exactly as received
    RawPassthrough(Box<RawValue>),
    Unwrapped(Value),
    Paginated(PaginatedResult),
    Stats(StatsResult),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageMeta {
    pub index: String,
    pub page: usize,
    pub size: usize,
    pub from: usize,
    pub sort: Option<String>,
    pub filters: RecordFilterParams,
    pub total: u64,
    /// Backend-reported elapsed milliseconds
    pub took: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaginatedResult {
    pub meta: PageMeta,
    pub items: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsFilters {
    pub stdno: Option<String>,
    pub year: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsMeta {
    pub index: String,
    pub filters: StatsFilters,
    #[serde(rename = "topN")]
    pub top_n: usize,
    pub took: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacetBuckets {
    pub by_year: Vec<Value>,
    pub by_nat: Vec<Value>,
    pub by_scal_nm: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsResult {
    pub meta: StatsMeta,
    pub aggregations: FacetBuckets,
}

/// Response shaper
pub struct ResponseShaper;

impl ResponseShaper {
    /// Apply `mode` to a raw backend result.
    ///
    /// Passthrough never parses the body. The other modes parse it keeping
    /// object key order.
    pub fn shape(
        mode: &ResponseMode,
        raw: Box<RawValue>,
    ) -> Result<ResponseEnvelope, BackendError> {
        if let ResponseMode::Passthrough = mode {
            return Ok(Self::to_passthrough(raw));
        }

        let parsed: Value =
            serde_json::from_str(raw.get()).map_err(|e| BackendError::Decode(e.to_string()))?;
        let result = Self::unwrap_transport(parsed);

        Ok(match mode {
            ResponseMode::Paginated(ctx) => {
                ResponseEnvelope::Paginated(Self::to_paginated(result, ctx))
            }
            ResponseMode::Stats(ctx) => ResponseEnvelope::Stats(Self::to_stats(result, ctx)),
            ResponseMode::Passthrough | ResponseMode::Unwrapped => {
                ResponseEnvelope::Unwrapped(result)
            }
        })
    }

    /// Strip one transport wrapper (`{ body, statusCode, headers, .. }`) if present.
    ///
    /// Search results never carry those keys next to a `body`, so applying
    /// this to an already unwrapped result changes nothing.
    pub fn unwrap_transport(raw: Value) -> Value {
        let is_wrapped = raw.as_object().is_some_and(|obj| {
            obj.get("body").is_some_and(|b| !b.is_null())
                && TRANSPORT_KEYS.iter().any(|k| obj.contains_key(*k))
        });

        match raw {
            Value::Object(mut obj) if is_wrapped => obj.remove("body").unwrap_or(Value::Null),
            other => other,
        }
    }

    pub fn to_passthrough(raw: Box<RawValue>) -> ResponseEnvelope {
        ResponseEnvelope::RawPassthrough(raw)
    }

    /// Hits, total and page metadata from an unwrapped search result
    pub fn to_paginated(result: Value, ctx: &PageContext) -> PaginatedResult {
        let hits: Vec<Value> = result
            .pointer("/hits/hits")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let total = total_hits(&result, hits.len());

        let items = if ctx.params.source_only {
            hits.into_iter()
                .map(|mut hit| {
                    hit.get_mut("_source")
                        .map(Value::take)
                        .unwrap_or(Value::Null)
                })
                .collect()
        } else {
            hits
        };

        let meta = PageMeta {
            index: ctx.index.clone(),
            page: ctx.params.page,
            size: ctx.params.size,
            from: ctx.from,
            sort: ctx.params.sort.clone(),
            filters: ctx.params.filters.clone(),
            total,
            took: took(&result),
        };

        PaginatedResult {
            meta,
            items,
            raw: ctx.params.include_raw.then_some(result),
        }
    }

    /// The three facet bucket lists; a missing aggregation yields an empty list
    pub fn to_stats(result: Value, ctx: &StatsContext) -> StatsResult {
        let buckets = |facet: Facet| -> Vec<Value> {
            result
                .get("aggregations")
                .and_then(|aggs| aggs.get(facet.name()))
                .and_then(|agg| agg.get("buckets"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };

        StatsResult {
            meta: StatsMeta {
                index: ctx.index.clone(),
                filters: StatsFilters {
                    stdno: ctx.params.student_id.clone(),
                    year: ctx.params.year,
                },
                top_n: ctx.params.top_n,
                took: took(&result),
            },
            aggregations: FacetBuckets {
                by_year: buckets(Facet::Year),
                by_nat: buckets(Facet::Nationality),
                by_scal_nm: buckets(Facet::ScholarshipName),
            },
        }
    }
}

/// `hits.total` as `{ "value": n }` (ES 7+) or a bare number (ES 6); hit count otherwise
fn total_hits(result: &Value, hit_count: usize) -> u64 {
    let fallback = hit_count as u64;
    match result.pointer("/hits/total") {
        Some(Value::Object(total)) => total
            .get("value")
            .and_then(Value::as_u64)
            .unwrap_or(fallback),
        Some(total) => total.as_u64().unwrap_or(fallback),
        None => fallback,
    }
}

fn took(result: &Value) -> Option<u64> {
    result.get("took").and_then(Value::as_u64)
}
