use crate::api::handlers;
use crate::backend::SearchBackend;
use crate::config::{Config, CorsConfig};
use crate::query::QueryTranslator;
use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub translator: Arc<QueryTranslator>,
    pub backend: Arc<dyn SearchBackend>,
}

pub struct ApiServer {
    state: AppState,
    prefix: String,
    cors_config: CorsConfig,
    metrics: Option<PrometheusHandle>,
}

impl ApiServer {
    pub fn new(config: &Config, backend: Arc<dyn SearchBackend>) -> Self {
        let translator = QueryTranslator::from_config(config);
        if translator.allow_list().is_permissive() {
            tracing::warn!(
                "ALLOWED_INDICES is empty: /search accepts any index. Do not run like this in production"
            );
        }

        Self {
            state: AppState {
                translator: Arc::new(translator),
                backend,
            },
            prefix: config.server.path_prefix.trim_end_matches('/').to_string(),
            cors_config: config.server.cors.clone(),
            metrics: None,
        }
    }

    /// Expose `/metrics` from the given Prometheus recorder
    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }

    /// Build CORS layer from configuration
    fn build_cors_layer(&self) -> CorsLayer {
        if !self.cors_config.enabled {
            return CorsLayer::new();
        }

        let origins: Vec<HeaderValue> = self
            .cors_config
            .origins
            .iter()
            .filter(|o| o.as_str() != "*")
            .filter_map(|o| o.parse().ok())
            .collect();

        let has_wildcard = self.cors_config.origins.iter().any(|o| o == "*");

        let cors = if has_wildcard {
            CorsLayer::new().allow_origin(tower_http::cors::Any)
        } else if origins.is_empty() {
            CorsLayer::new()
        } else {
            CorsLayer::new().allow_origin(origins)
        };

        cors.allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers(tower_http::cors::Any)
    }

    pub fn router(&self) -> Router {
        // Wrong-method requests on a known path get the same 404 body as unknown paths
        let v1 = Router::new()
            .route(
                "/search",
                get(handlers::search).fallback(handlers::not_found),
            )
            .route(
                "/records",
                get(handlers::records).fallback(handlers::not_found),
            )
            .route(
                "/records/query",
                get(handlers::records_query).fallback(handlers::not_found),
            )
            .route(
                "/records/custom-response",
                get(handlers::records_page).fallback(handlers::not_found),
            )
            .route(
                "/records/stats",
                get(handlers::records_stats).fallback(handlers::not_found),
            );

        let api = Router::new()
            .route(
                "/health",
                get(handlers::health).fallback(handlers::not_found),
            )
            .nest("/v1", v1);

        let mut router = if self.prefix.is_empty() {
            Router::new().merge(api)
        } else {
            Router::new().nest(&self.prefix, api)
        };

        if let Some(handle) = self.metrics.clone() {
            router = router.route(
                "/metrics",
                get(move || {
                    let handle = handle.clone();
                    async move { handle.render() }
                }),
            );
        }

        router
            .fallback(handlers::not_found)
            .with_state(self.state.clone())
            .layer(self.build_cors_layer())
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until `shutdown` resolves
    pub async fn serve<F>(self, addr: &str, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Relay listening on http://{}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }
}
