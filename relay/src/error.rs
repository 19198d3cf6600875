//! Error types for the relay

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Validation messages keyed by query parameter name, plus messages about
/// the query string as a whole
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors {
    #[serde(rename = "formErrors")]
    form: Vec<String>,
    #[serde(rename = "fieldErrors")]
    fields: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Record a problem that belongs to no single parameter
    pub fn add_form(&mut self, message: impl Into<String>) {
        self.form.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.form.is_empty() && self.fields.is_empty()
    }

    pub fn form_errors(&self) -> &[String] {
        &self.form
    }

    /// Messages recorded for `field`, if any
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// `Ok(value)` when nothing was recorded, `InvalidQueryParams` otherwise
    pub fn into_result<T>(self, value: T) -> Result<T, RelayError> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(RelayError::InvalidQueryParams(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for message in &self.form {
            if !first {
                f.write_str("; ")?;
            }
            f.write_str(message)?;
            first = false;
        }
        for (field, messages) in &self.fields {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Failures raised while talking to the search backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend responded with status {status}: {reason}")]
    Status { status: u16, reason: String },

    #[error("backend returned an unreadable body: {0}")]
    Decode(String),

    #[error("invalid backend configuration: {0}")]
    Config(String),
}

impl BackendError {
    /// Client-side statuses reported by the backend are forwarded as-is.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Status { status, .. } if (400..500).contains(status) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Relay errors
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Invalid query params")]
    InvalidQueryParams(FieldErrors),

    #[error("Invalid sort {kind}: {value}")]
    InvalidSortSpec { kind: &'static str, value: String },

    #[error("Index not allowed: {0}")]
    IndexForbidden(String),

    #[error("Too deep pagination: from+size must be <= {limit} (got from={from}, size={size})")]
    PaginationTooDeep {
        from: usize,
        size: usize,
        limit: usize,
    },

    #[error("Route not found: {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("Backend failure: {0}")]
    Backend(#[from] BackendError),
}

impl RelayError {
    /// Stable identifier sent to clients in the `code` field
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidQueryParams(_) => "INVALID_QUERY_PARAMS",
            Self::InvalidSortSpec { .. } => "INVALID_SORT_SPEC",
            Self::IndexForbidden(_) => "INDEX_FORBIDDEN",
            Self::PaginationTooDeep { .. } => "PAGINATION_TOO_DEEP",
            Self::RouteNotFound { .. } => "ROUTE_NOT_FOUND",
            Self::Backend(_) => "BACKEND_FAILURE",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidQueryParams(_)
            | Self::InvalidSortSpec { .. }
            | Self::PaginationTooDeep { .. } => StatusCode::BAD_REQUEST,
            Self::IndexForbidden(_) => StatusCode::FORBIDDEN,
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Backend(e) => e.status_code(),
        }
    }

    /// Field-level detail; only validation failures carry one
    pub fn detail(&self) -> Option<Value> {
        match self {
            Self::InvalidQueryParams(fields) => serde_json::to_value(fields).ok(),
            _ => None,
        }
    }

    /// Bind the error to the request URL it is answering
    pub fn at(self, path: impl Into<String>) -> ErrorResponse {
        ErrorResponse {
            error: self,
            path: path.into(),
        }
    }
}

/// Uniform error body: `{ code, message, detail, path }`
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    detail: Option<Value>,
    path: String,
}

/// A [`RelayError`] paired with the URL of the request that failed
#[derive(Debug)]
pub struct ErrorResponse {
    pub error: RelayError,
    pub path: String,
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = self.error.status_code();

        if status.is_server_error() {
            tracing::error!(path = %self.path, code = self.error.code(), "{}", self.error);
        } else {
            tracing::warn!(path = %self.path, code = self.error.code(), "{}", self.error);
        }

        let body = ErrorBody {
            code: self.error.code(),
            message: self.error.to_string(),
            detail: self.error.detail(),
            path: self.path,
        };

        (status, axum::Json(body)).into_response()
    }
}
