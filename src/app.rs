use crate::config::{LOCAL_OPENAI_PATH, LOCAL_RAW_PATH, ProxyConfig};
use crate::error::{AppError, AppResult};
use axum::Router;
use axum::extract::{DefaultBodyLimit, Request};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::{Arc, Once, OnceLock};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

pub const PROXY_NAME: &str = "k2proxy";
const PREFLIGHT_MAX_AGE_SECS: u64 = 86_400;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProxyConfig>,
    pub http: reqwest::Client,
    pub metrics: PrometheusHandle,
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static METRICS_ERROR: OnceLock<AppError> = OnceLock::new();
static METRICS_INIT: Once = Once::new();

pub fn load_state() -> AppResult<AppState> {
    load_state_with_config(ProxyConfig::from_env())
}

pub fn load_state_with_config(config: ProxyConfig) -> AppResult<AppState> {
    config.validate()?;
    let http = crate::upstream::build_client(&config.upstream).map_err(|err| {
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            .with_code("http_client_init_failed")
    })?;
    let metrics = init_metrics()?;
    tracing::info!(
        upstream = %config.upstream.endpoint(),
        model = %config.catalog.id,
        "proxy state ready"
    );
    Ok(AppState {
        config: Arc::new(config),
        http,
        metrics,
    })
}

fn init_metrics() -> AppResult<PrometheusHandle> {
    METRICS_INIT.call_once(|| {
        match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = METRICS_HANDLE.set(handle);
            }
            Err(err) => {
                let _ = METRICS_ERROR.set(
                    AppError::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
                        .with_code("metrics_init_failed"),
                );
            }
        }
    });

    if let Some(err) = METRICS_ERROR.get() {
        return Err(err.clone());
    }
    METRICS_HANDLE.get().cloned().ok_or_else(|| {
        AppError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "metrics recorder not available",
        )
        .with_code("metrics_init_failed")
    })
}

/// Permissive CORS. Preflights are answered here with an empty body; see
/// [`reject_bare_options`] for what counts as one.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(Duration::from_secs(PREFLIGHT_MAX_AGE_SECS))
}

fn is_preflight(headers: &HeaderMap) -> bool {
    headers.contains_key(header::ORIGIN)
        && headers.contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

/// `CorsLayer` treats every OPTIONS as a preflight. Only OPTIONS carrying both
/// `Origin` and `Access-Control-Request-Method` is one; the rest get the 404.
async fn reject_bare_options(req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS && !is_preflight(req.headers()) {
        let mut resp = crate::handlers::not_found().await.into_response();
        crate::handlers::merge_cors_headers(resp.headers_mut());
        return resp;
    }
    next.run(req).await
}

pub fn build_app(state: AppState) -> Router {
    let metrics_path = state.config.metrics_path.clone();
    Router::new()
        .route("/", get(crate::handlers::discovery))
        .route("/health", get(crate::handlers::health))
        .route("/v1/models", get(crate::handlers::list_models))
        .route("/v1/models/{*id}", get(crate::handlers::get_model))
        .route(LOCAL_RAW_PATH, post(crate::handlers::raw_passthrough))
        .route(LOCAL_OPENAI_PATH, post(crate::handlers::chat_completions))
        .route(&metrics_path, get(crate::handlers::metrics))
        .fallback(crate::handlers::not_found)
        .method_not_allowed_fallback(crate::handlers::not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(cors_layer())
        .layer(middleware::from_fn(reject_bare_options))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-proxy-by"),
            HeaderValue::from_static(PROXY_NAME),
        ))
        .layer(SetRequestIdLayer::new(
            HeaderName::from_static("x-request-id"),
            MakeRequestUuid,
        ))
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
            "x-request-id",
        )))
        .layer(TraceLayer::new_for_http())
}
