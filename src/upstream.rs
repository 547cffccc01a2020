use crate::config::UpstreamConfig;
use crate::error::AppError;
use crate::synth::UpstreamCompletion;
use axum::http::StatusCode;
use bytes::Bytes;
use serde_json::Value;
use std::time::Duration;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Fixed browser-like identity sent with every upstream call.
pub const BROWSER_HEADERS: &[(&str, &str)] = &[
    ("origin", "https://www.k2think.ai"),
    ("referer", "https://www.k2think.ai/k2think"),
    ("accept-language", "en-US,en;q=0.9,zh;q=0.8"),
    ("sec-fetch-mode", "cors"),
    ("sec-fetch-site", "same-origin"),
    ("sec-fetch-dest", "empty"),
];

#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamCallError {
    #[error("upstream unreachable: {0}")]
    Network(String),
    #[error("upstream status {status}: {message}")]
    Status { status: StatusCode, message: String },
    #[error("invalid upstream JSON: {0}")]
    InvalidJson(String),
}

impl From<UpstreamCallError> for AppError {
    fn from(err: UpstreamCallError) -> Self {
        match err {
            UpstreamCallError::Status { status, message } => AppError::upstream(status, message),
            UpstreamCallError::InvalidJson(_) => {
                AppError::new(StatusCode::BAD_GATEWAY, "Invalid upstream JSON")
                    .with_type("upstream_error")
            }
            UpstreamCallError::Network(message) => AppError::new(StatusCode::BAD_GATEWAY, message)
                .with_type("upstream_error")
                .with_code("upstream_unreachable"),
        }
    }
}

/// Redirects are never followed; a 3xx is handed back as-is.
pub fn build_client(cfg: &UpstreamConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_millis(cfg.timeout_ms))
        .build()
}

fn request(
    client: &reqwest::Client,
    cfg: &UpstreamConfig,
    accept: &str,
) -> reqwest::RequestBuilder {
    let mut req = client
        .post(cfg.endpoint())
        .header("accept", accept)
        .header("content-type", "application/json");
    for (name, value) in BROWSER_HEADERS {
        req = req.header(*name, *value);
    }
    req
}

/// Single non-streaming completion call. The payload must already have
/// `stream` removed.
pub async fn fetch_completion(
    client: &reqwest::Client,
    cfg: &UpstreamConfig,
    payload: &Value,
) -> Result<UpstreamCompletion, UpstreamCallError> {
    let resp = request(client, cfg, "application/json")
        .body(payload.to_string())
        .send()
        .await
        .map_err(|err| UpstreamCallError::Network(err.to_string()))?;
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|err| UpstreamCallError::Network(err.to_string()))?;
    if !status.is_success() {
        metrics::counter!("k2proxy_upstream_requests_total", "outcome" => "http_error")
            .increment(1);
        tracing::warn!(status = %status, "upstream returned an error status");
        return Err(UpstreamCallError::Status {
            status,
            message: extract_error_message(&text),
        });
    }
    let value: Value = serde_json::from_str(&text).map_err(|err| {
        metrics::counter!("k2proxy_upstream_requests_total", "outcome" => "invalid_json")
            .increment(1);
        UpstreamCallError::InvalidJson(err.to_string())
    })?;
    metrics::counter!("k2proxy_upstream_requests_total", "outcome" => "ok").increment(1);
    Ok(UpstreamCompletion::new(value))
}

/// Raw passthrough: the body goes out as given and the response comes back unread.
pub async fn forward_raw(
    client: &reqwest::Client,
    cfg: &UpstreamConfig,
    body: Bytes,
    accept: &str,
) -> Result<reqwest::Response, UpstreamCallError> {
    let resp = request(client, cfg, accept)
        .body(body)
        .send()
        .await
        .map_err(|err| UpstreamCallError::Network(err.to_string()))?;
    metrics::counter!("k2proxy_upstream_requests_total", "outcome" => "passthrough")
        .increment(1);
    Ok(resp)
}

/// Best-effort message from an upstream error body: `detail`, then
/// `message`, then the raw text.
pub fn extract_error_message(text: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return text.to_string();
    };
    ["detail", "message"]
        .iter()
        .filter_map(|key| value.get(*key))
        .find_map(|v| match v {
            Value::Null | Value::Bool(false) => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
        .unwrap_or_else(|| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::{UpstreamCallError, extract_error_message};
    use crate::error::AppError;
    use axum::http::StatusCode;

    #[test]
    fn prefers_detail_then_message() {
        assert_eq!(
            extract_error_message(r#"{"detail":"rate limited","message":"m"}"#),
            "rate limited"
        );
        assert_eq!(extract_error_message(r#"{"message":"bad"}"#), "bad");
        assert_eq!(
            extract_error_message(r#"{"detail":"","message":"fallback"}"#),
            "fallback"
        );
    }

    #[test]
    fn falls_back_to_raw_text() {
        assert_eq!(extract_error_message("gateway exploded"), "gateway exploded");
        assert_eq!(extract_error_message(r#"{"error":"x"}"#), r#"{"error":"x"}"#);
        assert_eq!(extract_error_message(""), "");
    }

    #[test]
    fn structured_detail_is_rendered_as_json() {
        assert_eq!(
            extract_error_message(r#"{"detail":[{"loc":"body"}]}"#),
            r#"[{"loc":"body"}]"#
        );
    }

    #[test]
    fn status_errors_keep_upstream_status() {
        let err: AppError = UpstreamCallError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "rate limited".to_string(),
        }
        .into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error_type, "upstream_error");
        assert_eq!(err.message, "rate limited");
    }

    #[test]
    fn invalid_json_maps_to_bad_gateway() {
        let err: AppError = UpstreamCallError::InvalidJson("eof".to_string()).into();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.message, "Invalid upstream JSON");
    }
}
