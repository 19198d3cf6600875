//! Route handlers
//!
//! Every data route runs the same pipeline, parameterized by [`Endpoint`]:
//! translate the query string, call the backend, shape the result.

use crate::api::server::AppState;
use crate::error::{FieldErrors, RelayError};
use crate::metrics;
use crate::query::{Endpoint, RawParams};
use crate::response::{ResponseEnvelope, ResponseShaper};
use axum::extract::rejection::QueryRejection;
use axum::extract::{OriginalUri, Query, State};
use axum::http::{Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use std::time::Instant;

type QueryParams = Result<Query<Vec<(String, String)>>, QueryRejection>;

/// GET /search
pub async fn search(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    query: QueryParams,
) -> Response {
    relay(Endpoint::Search, state, uri, query).await
}

/// GET /records
pub async fn records(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    query: QueryParams,
) -> Response {
    relay(Endpoint::Records, state, uri, query).await
}

/// GET /records/query
pub async fn records_query(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    query: QueryParams,
) -> Response {
    relay(Endpoint::RecordsQuery, state, uri, query).await
}

/// GET /records/custom-response
pub async fn records_page(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    query: QueryParams,
) -> Response {
    relay(Endpoint::RecordsPage, state, uri, query).await
}

/// GET /records/stats
pub async fn records_stats(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    query: QueryParams,
) -> Response {
    relay(Endpoint::RecordsStats, state, uri, query).await
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

/// Fallback for unmatched routes and methods
pub async fn not_found(method: Method, OriginalUri(uri): OriginalUri) -> Response {
    let path = request_path(&uri);
    RelayError::RouteNotFound {
        method: method.to_string(),
        path: path.clone(),
    }
    .at(path)
    .into_response()
}

async fn relay(endpoint: Endpoint, state: AppState, uri: Uri, query: QueryParams) -> Response {
    let start = Instant::now();

    let response = match execute(endpoint, &state, query).await {
        Ok(envelope) => Json(envelope).into_response(),
        Err(e) => e.at(request_path(&uri)).into_response(),
    };

    metrics::record_request(endpoint.name(), response.status().as_u16(), start.elapsed());
    response
}

async fn execute(
    endpoint: Endpoint,
    state: &AppState,
    query: QueryParams,
) -> Result<ResponseEnvelope, RelayError> {
    let Query(pairs) = query.map_err(|rejection| {
        let mut errors = FieldErrors::new();
        errors.add_form(rejection.body_text());
        RelayError::InvalidQueryParams(errors)
    })?;
    let raw: RawParams = pairs.into_iter().collect();

    let request = state.translator.translate(endpoint, &raw)?;

    tracing::debug!(
        endpoint = endpoint.name(),
        index = %request.descriptor.index,
        backend = state.backend.backend_name(),
        "Dispatching search"
    );

    let started = Instant::now();
    let outcome = state.backend.search(&request.descriptor).await;
    metrics::record_backend_call(endpoint.name(), outcome.is_ok(), started.elapsed());

    Ok(ResponseShaper::shape(&request.mode, outcome?)?)
}

/// Path and query of the request as the client sent it
fn request_path(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}
