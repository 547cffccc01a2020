use crate::error::{AppError, AppResult};
use crate::models::ModelCatalog;
use serde_json::{Map, Value};

/// Inbound chat payload. Only `model` and `stream` are interpreted; every
/// other field is carried to the upstream untouched.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    body: Map<String, Value>,
}

impl ChatRequest {
    /// Strict parse used by the OpenAI-compatible endpoint. An empty body is
    /// treated as `{}`; anything that is not a JSON object is rejected.
    pub fn parse(raw: &[u8]) -> AppResult<Self> {
        if raw.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Self::default());
        }
        match serde_json::from_slice::<Value>(raw) {
            Ok(Value::Object(body)) => Ok(Self { body }),
            _ => Err(AppError::invalid_request("Invalid JSON body")),
        }
    }

    pub fn model(&self) -> Option<&str> {
        self.body.get("model").and_then(|v| v.as_str())
    }

    pub fn wants_stream(&self) -> bool {
        self.body.get("stream").and_then(|v| v.as_bool()) == Some(true)
    }

    /// Rewrites an alias to the canonical id in place. Returns true when rewritten.
    pub fn normalize_model(&mut self, catalog: &ModelCatalog) -> bool {
        let Some(canonical) = self.model().and_then(|m| catalog.canonicalize(m)) else {
            return false;
        };
        let canonical = canonical.to_string();
        tracing::debug!(
            from = self.model().unwrap_or_default(),
            to = %canonical,
            "rewrote model alias"
        );
        self.body.insert("model".to_string(), Value::String(canonical));
        true
    }

    /// The upstream never streams; all streaming is synthesized locally.
    pub fn without_stream(mut self) -> Self {
        self.body.remove("stream");
        self
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.body)
    }
}
