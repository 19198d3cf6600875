//! Search backend adapters

mod elasticsearch;

pub use elasticsearch::ElasticsearchBackend;

use crate::error::BackendError;
use crate::query::BackendQueryDescriptor;
use async_trait::async_trait;
use serde_json::value::RawValue;

/// Executes translated queries against a search engine.
///
/// Implementations return the backend's result body verbatim, checked only
/// for being well-formed JSON; shaping happens in [`crate::response`]. No
/// retries are expected at this layer.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(
        &self,
        descriptor: &BackendQueryDescriptor,
    ) -> Result<Box<RawValue>, BackendError>;

    fn backend_name(&self) -> &str;
}
