//! HTTP relay in front of an Elasticsearch cluster holding scholarship records
//!
//! The relay accepts REST query parameters, translates them into
//! Elasticsearch `_search` bodies and hands the backend results back, either
//! untouched or reshaped into a small set of stable envelopes.
//!
//! # Endpoints
//!
//! Served under a configurable prefix (default `/api`):
//!
//! - `GET /api/health` - Liveness probe
//! - `GET /api/v1/search` - Free-text search on an allow-listed index
//! - `GET /api/v1/records` - Match-all over the records index
//! - `GET /api/v1/records/query` - Exact-match filtered records
//! - `GET /api/v1/records/custom-response` - Paginated records with meta
//! - `GET /api/v1/records/stats` - Facet counts by year, nationality and scholarship
//!
//! # Layers
//!
//! - [`query`] validates raw parameters and builds a [`query::BackendQueryDescriptor`]
//! - [`backend`] executes descriptors against the search engine
//! - [`response`] shapes raw backend results into envelopes
//! - [`api`] wires the above into an axum router

pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod metrics;
pub mod query;
pub mod response;

pub use config::Config;
pub use error::{BackendError, RelayError};

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;
