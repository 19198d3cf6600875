//! End-to-end HTTP tests for the relay.
//!
//! Each test starts the real router on a random port, backed by a recording
//! in-memory backend, and drives it with reqwest.

use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusBuilder;
use relay::api::ApiServer;
use relay::backend::SearchBackend;
use relay::query::BackendQueryDescriptor;
use relay::{BackendError, Config};
use reqwest::Client;
use serde_json::value::RawValue;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// Returns a canned reply and remembers every query it was sent
struct RecordingBackend {
    reply: Mutex<Result<String, (u16, String)>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl RecordingBackend {
    fn replying(reply: Value) -> Arc<Self> {
        Self::replying_raw(&reply.to_string())
    }

    /// Reply with `body` exactly as written
    fn replying_raw(body: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(Ok(body.to_string())),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn failing(status: u16, reason: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(Err((status, reason.to_string()))),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchBackend for RecordingBackend {
    async fn search(
        &self,
        descriptor: &BackendQueryDescriptor,
    ) -> Result<Box<RawValue>, BackendError> {
        self.calls.lock().unwrap().push((
            descriptor.index.clone(),
            serde_json::to_value(descriptor).unwrap(),
        ));
        match &*self.reply.lock().unwrap() {
            Ok(body) => Ok(RawValue::from_string(body.clone()).unwrap()),
            Err((status, reason)) => Err(BackendError::Status {
                status: *status,
                reason: reason.clone(),
            }),
        }
    }

    fn backend_name(&self) -> &str {
        "recording"
    }
}

fn config(allowed: &[&str]) -> Config {
    let mut config = Config::default();
    config.access.allowed_indices = allowed.iter().map(|s| s.to_string()).collect();
    config
}

/// Start a real HTTP server on a random port and return the base URL.
async fn start_server(config: Config, backend: Arc<RecordingBackend>) -> String {
    let handle = PrometheusBuilder::new().build_recorder().handle();
    let router = ApiServer::new(&config, backend)
        .with_metrics(Some(handle))
        .router();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{}", addr)
}

async fn get(url: &str) -> (u16, Value) {
    let resp = Client::new().get(url).send().await.unwrap();
    let status = resp.status().as_u16();
    let body = resp.json::<Value>().await.unwrap();
    (status, body)
}

fn search_result() -> Value {
    json!({
        "took": 7,
        "timed_out": false,
        "hits": {
            "total": { "value": 2, "relation": "eq" },
            "hits": [
                { "_id": "a", "_source": { "STDNO": "2020001", "SCH_YEAR": 2023 } },
                { "_id": "b", "_source": { "STDNO": "2020002", "SCH_YEAR": 2023 } }
            ]
        }
    })
}

// ============================================================================
// Health and routing
// ============================================================================

#[tokio::test]
async fn test_health() {
    let backend = RecordingBackend::replying(json!({}));
    let base = start_server(config(&[]), backend.clone()).await;

    let (status, body) = get(&format!("{base}/api/health")).await;
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "ok": true }));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_route_echoes_path() {
    let backend = RecordingBackend::replying(json!({}));
    let base = start_server(config(&[]), backend).await;

    let (status, body) = get(&format!("{base}/api/v1/nope?x=1")).await;
    assert_eq!(status, 404);
    assert_eq!(body["code"], "ROUTE_NOT_FOUND");
    assert_eq!(body["path"], "/api/v1/nope?x=1");
    assert_eq!(body["detail"], Value::Null);
}

#[tokio::test]
async fn test_wrong_method_is_not_found() {
    let backend = RecordingBackend::replying(json!({}));
    let base = start_server(config(&[]), backend.clone()).await;

    let resp = Client::new()
        .post(format!("{base}/api/v1/search?index=x"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "ROUTE_NOT_FOUND");
    assert!(body["message"].as_str().unwrap().starts_with("Route not found: POST"));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_empty_prefix_mounts_at_root() {
    let backend = RecordingBackend::replying(json!({}));
    let mut cfg = config(&[]);
    cfg.server.path_prefix = String::new();
    let base = start_server(cfg, backend).await;

    let (status, _) = get(&format!("{base}/health")).await;
    assert_eq!(status, 200);
    let (status, _) = get(&format!("{base}/api/health")).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let backend = RecordingBackend::replying(json!({}));
    let base = start_server(config(&[]), backend).await;

    let resp = Client::new()
        .get(format!("{base}/metrics"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
}

// ============================================================================
// /search
// ============================================================================

#[tokio::test]
async fn test_search_passthrough() {
    let raw = json!({ "statusCode": 200, "body": { "hits": { "hits": [] } } });
    let backend = RecordingBackend::replying(raw.clone());
    let base = start_server(config(&["scholarship"]), backend.clone()).await;

    let (status, body) =
        get(&format!("{base}/api/v1/search?index=scholarship&q=kim&from=20&size=5")).await;
    assert_eq!(status, 200);
    assert_eq!(body, raw);

    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    let (index, query) = &calls[0];
    assert_eq!(index, "scholarship");
    assert_eq!(query["from"], 20);
    assert_eq!(query["size"], 5);
    assert_eq!(query["query"], json!({ "query_string": { "query": "kim" } }));
}

#[tokio::test]
async fn test_search_relays_body_verbatim() {
    let body = r#"{"took":3,"timed_out":false,"_shards":{"total":1,"successful":1,"skipped":0,"failed":0},"hits":{"total":{"value":1,"relation":"eq"},"max_score":1.0,"hits":[{"_index":"scholarship","_id":"7","_score":1.0,"_source":{"STDNO":"2020001","NAT":"KR","CRT_DTTM":"2024-03-01T09:00:00"}}]}}"#;
    let backend = RecordingBackend::replying_raw(body);
    let base = start_server(config(&["scholarship"]), backend).await;

    let resp = Client::new()
        .get(format!("{base}/api/v1/search?index=scholarship"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert_eq!(resp.text().await.unwrap(), body);
}

#[tokio::test]
async fn test_page_items_keep_source_key_order() {
    let body = r#"{"took":3,"hits":{"total":{"value":1,"relation":"eq"},"hits":[{"_id":"7","_source":{"STDNO":"2020001","NAT":"KR","CRT_DTTM":"2024-03-01T09:00:00"}}]}}"#;
    let backend = RecordingBackend::replying_raw(body);
    let base = start_server(config(&[]), backend).await;

    let text = Client::new()
        .get(format!("{base}/api/v1/records/custom-response"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.contains(
        r#""items":[{"STDNO":"2020001","NAT":"KR","CRT_DTTM":"2024-03-01T09:00:00"}]"#
    ));
}

#[tokio::test]
async fn test_search_forbidden_index() {
    let backend = RecordingBackend::replying(json!({}));
    let base = start_server(config(&["scholarship"]), backend.clone()).await;

    let (status, body) = get(&format!("{base}/api/v1/search?index=payroll")).await;
    assert_eq!(status, 403);
    assert_eq!(body["code"], "INDEX_FORBIDDEN");
    assert!(body["message"].as_str().unwrap().contains("payroll"));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_search_size_too_large() {
    let backend = RecordingBackend::replying(json!({}));
    let base = start_server(config(&[]), backend.clone()).await;

    let (status, body) = get(&format!("{base}/api/v1/search?index=any&size=101")).await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "INVALID_QUERY_PARAMS");
    assert!(body["detail"]["fieldErrors"]["size"].is_array());
    assert_eq!(body["path"], "/api/v1/search?index=any&size=101");
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_search_reports_every_bad_field() {
    let backend = RecordingBackend::replying(json!({}));
    let base = start_server(config(&[]), backend).await;

    let (status, body) = get(&format!("{base}/api/v1/search?from=-1&size=0")).await;
    assert_eq!(status, 400);
    let fields = &body["detail"]["fieldErrors"];
    assert!(fields["index"].is_array());
    assert!(fields["from"].is_array());
    assert!(fields["size"].is_array());
}

#[tokio::test]
async fn test_repeated_parameter_rejected() {
    let backend = RecordingBackend::replying(search_result());
    let base = start_server(config(&["scholarship"]), backend.clone()).await;

    let (status, body) =
        get(&format!("{base}/api/v1/search?index=scholarship&size=500&size=5")).await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "INVALID_QUERY_PARAMS");
    assert!(body["detail"]["fieldErrors"]["size"].is_array());

    let (status, body) = get(&format!(
        "{base}/api/v1/records/query?stdno=2020001&stdno=2020002"
    ))
    .await;
    assert_eq!(status, 400);
    assert_eq!(
        body["detail"],
        json!({
            "formErrors": [],
            "fieldErrors": { "stdno": ["expected a single value, received 2"] }
        })
    );

    assert!(backend.calls().is_empty());
}

// ============================================================================
// /records and /records/query
// ============================================================================

#[tokio::test]
async fn test_records_unwraps_transport() {
    let backend = RecordingBackend::replying(json!({
        "body": search_result(),
        "statusCode": 200,
        "headers": {},
        "meta": {}
    }));
    let base = start_server(config(&[]), backend.clone()).await;

    let (status, body) = get(&format!("{base}/api/v1/records")).await;
    assert_eq!(status, 200);
    assert_eq!(body, search_result());

    let (index, query) = &backend.calls()[0];
    assert_eq!(index, "scholarship");
    assert_eq!(query["size"], 1000);
    assert_eq!(query["query"], json!({ "match_all": {} }));
}

#[tokio::test]
async fn test_records_query_filters() {
    let backend = RecordingBackend::replying(search_result());
    let base = start_server(config(&[]), backend.clone()).await;

    let (status, _) = get(&format!(
        "{base}/api/v1/records/query?stdno=2020001&year=2023&size=20"
    ))
    .await;
    assert_eq!(status, 200);

    let (_, query) = &backend.calls()[0];
    assert_eq!(query["size"], 20);
    assert_eq!(
        query["query"],
        json!({ "bool": { "filter": [
            { "term": { "STDNO": "2020001" } },
            { "term": { "SCH_YEAR": 2023 } }
        ] } })
    );
}

// ============================================================================
// /records/custom-response
// ============================================================================

#[tokio::test]
async fn test_page_meta_and_items() {
    let backend = RecordingBackend::replying(search_result());
    let base = start_server(config(&[]), backend.clone()).await;

    let (status, body) = get(&format!(
        "{base}/api/v1/records/custom-response?page=3&size=100&sort=CRT_DTTM:desc&year=2023"
    ))
    .await;
    assert_eq!(status, 200);

    let meta = &body["meta"];
    assert_eq!(meta["index"], "scholarship");
    assert_eq!(meta["page"], 3);
    assert_eq!(meta["size"], 100);
    assert_eq!(meta["from"], 200);
    assert_eq!(meta["sort"], "CRT_DTTM:desc");
    assert_eq!(meta["filters"]["year"], 2023);
    assert_eq!(meta["total"], 2);
    assert_eq!(meta["took"], 7);
    assert_eq!(
        body["items"],
        json!([
            { "STDNO": "2020001", "SCH_YEAR": 2023 },
            { "STDNO": "2020002", "SCH_YEAR": 2023 }
        ])
    );
    assert!(body.get("raw").is_none());

    let (_, query) = &backend.calls()[0];
    assert_eq!(query["from"], 200);
    assert_eq!(query["sort"], json!([{ "CRT_DTTM": "desc" }]));
}

#[tokio::test]
async fn test_page_full_hits_with_raw() {
    let backend = RecordingBackend::replying(search_result());
    let base = start_server(config(&[]), backend).await;

    let (status, body) = get(&format!(
        "{base}/api/v1/records/custom-response?sourceOnly=false&includeRaw=true"
    ))
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["items"][0]["_id"], "a");
    assert_eq!(body["raw"], search_result());
    assert_eq!(body["meta"]["sort"], Value::Null);
}

#[tokio::test]
async fn test_page_too_deep() {
    let backend = RecordingBackend::replying(search_result());
    let base = start_server(config(&[]), backend.clone()).await;

    let (status, body) = get(&format!(
        "{base}/api/v1/records/custom-response?page=11&size=1000"
    ))
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "PAGINATION_TOO_DEEP");
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_page_bad_sort() {
    let backend = RecordingBackend::replying(search_result());
    let base = start_server(config(&[]), backend.clone()).await;

    let (status, body) = get(&format!(
        "{base}/api/v1/records/custom-response?sort=FOO:asc"
    ))
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "INVALID_SORT_SPEC");

    let (status, body) = get(&format!(
        "{base}/api/v1/records/custom-response?sort=CRT_DTTM:sideways"
    ))
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "INVALID_SORT_SPEC");
    assert!(body["message"].as_str().unwrap().contains("sideways"));

    assert!(backend.calls().is_empty());
}

// ============================================================================
// /records/stats
// ============================================================================

#[tokio::test]
async fn test_stats_defaults_without_aggregations() {
    let backend = RecordingBackend::replying(json!({ "took": 3, "hits": { "hits": [] } }));
    let base = start_server(config(&[]), backend.clone()).await;

    let (status, body) = get(&format!("{base}/api/v1/records/stats")).await;
    assert_eq!(status, 200);
    assert_eq!(body["meta"]["topN"], 10);
    assert_eq!(body["meta"]["filters"], json!({ "stdno": null, "year": null }));
    assert_eq!(
        body["aggregations"],
        json!({ "by_year": [], "by_nat": [], "by_scal_nm": [] })
    );

    let (_, query) = &backend.calls()[0];
    assert_eq!(query["size"], 0);
    assert_eq!(query["aggs"]["by_nat"]["terms"]["field"], "NAT");
    assert_eq!(query["aggs"]["by_scal_nm"]["terms"]["size"], 10);
}

#[tokio::test]
async fn test_stats_buckets() {
    let backend = RecordingBackend::replying(json!({
        "took": 3,
        "aggregations": {
            "by_year": { "buckets": [{ "key": 2023, "doc_count": 40 }] },
            "by_nat": { "buckets": [{ "key": "KR", "doc_count": 38 }] }
        }
    }));
    let base = start_server(config(&[]), backend).await;

    let (status, body) = get(&format!("{base}/api/v1/records/stats?stdno=2020001&topN=5")).await;
    assert_eq!(status, 200);
    assert_eq!(body["meta"]["topN"], 5);
    assert_eq!(body["meta"]["filters"]["stdno"], "2020001");
    assert_eq!(body["aggregations"]["by_year"][0]["doc_count"], 40);
    assert_eq!(body["aggregations"]["by_nat"][0]["key"], "KR");
    assert_eq!(body["aggregations"]["by_scal_nm"], json!([]));
}

// ============================================================================
// Backend failures
// ============================================================================

#[tokio::test]
async fn test_backend_client_error_is_forwarded() {
    let backend = RecordingBackend::failing(404, "no such index [scholarship]");
    let base = start_server(config(&[]), backend).await;

    let (status, body) = get(&format!("{base}/api/v1/records")).await;
    assert_eq!(status, 404);
    assert_eq!(body["code"], "BACKEND_FAILURE");
    assert!(body["message"].as_str().unwrap().contains("no such index"));
}

#[tokio::test]
async fn test_backend_server_error_is_500() {
    let backend = RecordingBackend::failing(503, "cluster unavailable");
    let base = start_server(config(&[]), backend).await;

    let (status, body) = get(&format!("{base}/api/v1/records/stats")).await;
    assert_eq!(status, 500);
    assert_eq!(body["code"], "BACKEND_FAILURE");
    assert_eq!(body["path"], "/api/v1/records/stats");
}
