//! Elasticsearch `_search` over HTTP

use super::SearchBackend;
use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::query::BackendQueryDescriptor;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::value::RawValue;
use serde_json::Value;
use std::time::Duration;

/// Talks to a single Elasticsearch node or load balancer
pub struct ElasticsearchBackend {
    client: Client,
    base_url: Url,
}

impl ElasticsearchBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| BackendError::Config(format!("{}: {e}", config.url)))?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::Config(format!(
                "{} cannot be used as a base URL",
                config.url
            )));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `<base>/<index>/_search`, with the index percent-encoded as one path segment
    fn search_url(&self, index: &str) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::Config(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .push(index)
            .push("_search");
        Ok(url)
    }
}

#[async_trait]
impl SearchBackend for ElasticsearchBackend {
    async fn search(
        &self,
        descriptor: &BackendQueryDescriptor,
    ) -> Result<Box<RawValue>, BackendError> {
        let url = self.search_url(&descriptor.index)?;
        tracing::debug!(%url, "Sending search request");

        let response = self.client.post(url).json(descriptor).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                reason: error_reason(&body),
            });
        }

        let body = response.text().await?;
        RawValue::from_string(body).map_err(|e| BackendError::Decode(e.to_string()))
    }

    fn backend_name(&self) -> &str {
        "elasticsearch"
    }
}

/// Pull `error.reason` (or `error.type`) out of an Elasticsearch error body
fn error_reason(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));

    error
        .and_then(|e| e.get("reason").or_else(|| e.get("type")))
        .or(error)
        .and_then(Value::as_str)
        .map(String::from)
        .unwrap_or_else(|| body.chars().take(512).collect())
}
