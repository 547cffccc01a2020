use crate::error::{AppError, AppResult};
use crate::models::ModelCatalog;
use axum::http::StatusCode;

pub const DEFAULT_UPSTREAM_BASE: &str = "https://www.k2think.ai";
pub const DEFAULT_UPSTREAM_PATH: &str = "/api/guest/chat/completions";
pub const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 300_000;

/// Paths served locally.
pub const LOCAL_RAW_PATH: &str = "/api/guest/chat/completions";
pub const LOCAL_OPENAI_PATH: &str = "/v1/chat/completions";

/// Routes owned by the proxy; the metrics route must not shadow any of them.
pub const RESERVED_PATHS: [&str; 5] = [
    "/",
    "/health",
    "/v1/models",
    LOCAL_RAW_PATH,
    LOCAL_OPENAI_PATH,
];
const MODEL_LOOKUP_PREFIX: &str = "/v1/models/";

/// Process-wide settings, resolved once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listen: String,
    pub metrics_path: String,
    pub upstream: UpstreamConfig,
    pub catalog: ModelCatalog,
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub path: String,
    pub timeout_ms: u64,
}

impl UpstreamConfig {
    pub fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = self.path.trim_start_matches('/');
        if path.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, path)
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_BASE.to_string(),
            path: DEFAULT_UPSTREAM_PATH.to_string(),
            timeout_ms: DEFAULT_UPSTREAM_TIMEOUT_MS,
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            metrics_path: "/metrics".to_string(),
            upstream: UpstreamConfig::default(),
            catalog: ModelCatalog::default(),
        }
    }
}

impl ProxyConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let listen = env_non_blank("K2PROXY_LISTEN").unwrap_or(defaults.listen);
        let metrics_path = env_non_blank("K2PROXY_METRICS_PATH").unwrap_or(defaults.metrics_path);
        let base_url =
            env_non_blank("K2PROXY_UPSTREAM_BASE").unwrap_or(defaults.upstream.base_url);
        let path = env_non_blank("K2PROXY_UPSTREAM_PATH").unwrap_or(defaults.upstream.path);
        let timeout_ms = env_non_blank("K2PROXY_UPSTREAM_TIMEOUT_MS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(defaults.upstream.timeout_ms);
        Self {
            listen,
            metrics_path,
            upstream: UpstreamConfig {
                base_url,
                path,
                timeout_ms,
            },
            catalog: defaults.catalog,
        }
    }

    /// Rejects a metrics path the router could not mount next to the fixed routes.
    pub fn validate(&self) -> AppResult<()> {
        let path = self.metrics_path.as_str();
        let malformed = !path.starts_with('/') || path.contains(['{', '}', '*']);
        let taken = RESERVED_PATHS.contains(&path) || path.starts_with(MODEL_LOOKUP_PREFIX);
        if malformed || taken {
            return Err(AppError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("metrics path {path:?} is malformed or collides with a proxy route"),
            )
            .with_code("metrics_path_invalid"));
        }
        Ok(())
    }
}

fn env_non_blank(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::{ProxyConfig, UpstreamConfig};

    fn with_metrics_path(path: &str) -> ProxyConfig {
        ProxyConfig {
            metrics_path: path.to_string(),
            ..ProxyConfig::default()
        }
    }

    #[test]
    fn metrics_path_must_not_collide_with_routes() {
        for path in [
            "/health",
            "/",
            "/v1/models",
            "/v1/models/extra",
            "/v1/chat/completions",
            "/api/guest/chat/completions",
        ] {
            let err = with_metrics_path(path).validate().unwrap_err();
            assert_eq!(err.code, Some("metrics_path_invalid".into()), "{path}");
        }
    }

    #[test]
    fn metrics_path_must_be_a_plain_absolute_path() {
        assert!(with_metrics_path("metrics").validate().is_err());
        assert!(with_metrics_path("/m/{id}").validate().is_err());
        assert!(with_metrics_path("/metrics").validate().is_ok());
        assert!(with_metrics_path("/internal/metrics").validate().is_ok());
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let cfg = UpstreamConfig {
            base_url: "http://127.0.0.1:9000/".to_string(),
            path: "/api/guest/chat/completions".to_string(),
            timeout_ms: 1,
        };
        assert_eq!(
            cfg.endpoint(),
            "http://127.0.0.1:9000/api/guest/chat/completions"
        );
    }

    #[test]
    fn endpoint_with_empty_path_is_base() {
        let cfg = UpstreamConfig {
            base_url: "http://upstream".to_string(),
            path: String::new(),
            timeout_ms: 1,
        };
        assert_eq!(cfg.endpoint(), "http://upstream");
    }
}
