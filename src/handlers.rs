use crate::app::{AppState, PROXY_NAME};
use crate::config::{LOCAL_OPENAI_PATH, LOCAL_RAW_PATH};
use crate::error::{AppError, AppResult};
use crate::models::{ModelList, ModelObject};
use crate::request::ChatRequest;
use crate::sanitize::RequestTuning;
use crate::stream::{StreamEmitter, into_event_stream};
use crate::synth::{CompletionContext, ShapedContent, build_completion};
use crate::upstream;
use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response, Sse};
use bytes::Bytes;
use serde_json::{Value, json};
use std::collections::HashMap;

/// Stripped from passthrough responses; the body is re-framed locally.
const HOP_BY_HOP: [header::HeaderName; 4] = [
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::CONTENT_ENCODING,
    header::CONNECTION,
];

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "upstream": state.config.upstream.endpoint(),
    }))
}

pub async fn discovery(State(state): State<AppState>) -> Json<Value> {
    let cfg = &state.config;
    Json(json!({
        "name": PROXY_NAME,
        "endpoints": {
            "raw": LOCAL_RAW_PATH,
            "openai_compatible": LOCAL_OPENAI_PATH,
            "health": "/health",
            "models": "/v1/models",
            "metrics": cfg.metrics_path,
        },
        "upstream": cfg.upstream.endpoint(),
        "model": cfg.catalog.id,
        "aliases": cfg.catalog.aliases,
    }))
}

pub async fn list_models(State(state): State<AppState>) -> Json<ModelList> {
    Json(state.config.catalog.list(now_ts()))
}

pub async fn get_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<ModelObject>> {
    state
        .config
        .catalog
        .lookup(&id, now_ts())
        .map(Json)
        .ok_or_else(AppError::model_not_found)
}

pub async fn not_found() -> AppError {
    AppError::new(
        StatusCode::NOT_FOUND,
        format!("Not found. Use {LOCAL_RAW_PATH} or {LOCAL_OPENAI_PATH}"),
    )
    .with_code("not_found")
}

/// Forwards the body with only the model alias rewritten and hands the
/// upstream response back as-is, headers included.
pub async fn raw_passthrough(State(state): State<AppState>, body: Bytes) -> AppResult<Response> {
    let cfg = &state.config;
    let (outbound, accept) = match ChatRequest::parse(&body) {
        Ok(mut req) => {
            req.normalize_model(&cfg.catalog);
            let accept = if req.wants_stream() {
                mime::TEXT_EVENT_STREAM
            } else {
                mime::APPLICATION_JSON
            };
            (Bytes::from(req.into_value().to_string()), accept)
        }
        Err(_) => (body, mime::APPLICATION_JSON),
    };

    let resp =
        upstream::forward_raw(&state.http, &cfg.upstream, outbound, accept.as_ref()).await?;
    let status = resp.status();
    tracing::debug!(status = %status, "raw passthrough response");

    let mut headers = resp.headers().clone();
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    merge_cors_headers(&mut headers);

    let mut out = Response::new(Body::from_stream(resp.bytes_stream()));
    *out.status_mut() = status;
    *out.headers_mut() = headers;
    Ok(out)
}

/// OpenAI-compatible completions. The upstream is always asked for a full
/// answer; streaming is synthesized from it.
pub async fn chat_completions(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let cfg = &state.config;
    let tuning = RequestTuning::resolve(&query, &headers);
    let mut req = ChatRequest::parse(&body)?;
    let wants_stream = req.wants_stream();
    req.normalize_model(&cfg.catalog);
    let payload = req.without_stream().into_value();

    let reply = upstream::fetch_completion(&state.http, &cfg.upstream, &payload).await?;

    let ctx = CompletionContext::for_reply(&reply, &cfg.catalog.id, now_ts());
    let content = ShapedContent::from_reply(&reply, tuning.flatten);
    tracing::info!(
        id = %ctx.id,
        stream = wants_stream,
        flatten = tuning.flatten,
        had_tags = content.had_tags,
        chunk_delay_ms = tuning.chunk_delay.as_millis() as u64,
        "chat completion synthesized"
    );

    if !wants_stream {
        return Ok(Json(build_completion(&ctx, &reply, &content)).into_response());
    }

    let events = into_event_stream(StreamEmitter::new(ctx, &content), tuning.chunk_delay);
    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Sse::new(events),
    )
        .into_response())
}

pub(crate) fn merge_cors_headers(headers: &mut HeaderMap) {
    let fixed = [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"),
        (header::ACCESS_CONTROL_ALLOW_HEADERS, "*"),
        (header::ACCESS_CONTROL_MAX_AGE, "86400"),
        (header::VARY, "Origin"),
    ];
    for (name, value) in fixed {
        headers.insert(name, HeaderValue::from_static(value));
    }
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::merge_cors_headers;
    use axum::http::{HeaderMap, HeaderValue, header};

    #[test]
    fn merge_overrides_upstream_cors() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("https://www.k2think.ai"),
        );
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        merge_cors_headers(&mut headers);
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "86400");
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
    }
}
