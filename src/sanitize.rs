use axum::http::HeaderMap;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

static NEWLINE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n]+").expect("newline pattern compiles"));

const FLATTEN_KEYS: [&str; 3] = ["flat", "strip_newlines", "flat_content"];
const CHUNK_DELAY_QUERY: &str = "chunk_delay_ms";
const CHUNK_DELAY_HEADER: &str = "x-chunk-delay-ms";
pub const MAX_CHUNK_DELAY_MS: u64 = 2_000;

/// Collapses every CR/LF run into one space when `flatten` is set.
pub fn sanitize_content(text: &str, flatten: bool) -> String {
    if flatten {
        NEWLINE_RUNS.replace_all(text, " ").into_owned()
    } else {
        text.to_string()
    }
}

/// Per-request knobs for the OpenAI-compatible endpoint, resolved once before
/// the upstream call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestTuning {
    pub flatten: bool,
    pub chunk_delay: Duration,
}

impl RequestTuning {
    pub fn resolve(query: &HashMap<String, String>, headers: &HeaderMap) -> Self {
        Self {
            flatten: wants_flat(query, headers),
            chunk_delay: chunk_delay(query, headers),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn is_on(value: &str) -> bool {
    value.is_empty() || value == "1"
}

fn wants_flat(query: &HashMap<String, String>, headers: &HeaderMap) -> bool {
    FLATTEN_KEYS.iter().any(|key| {
        let from_query = query.get(*key).is_some_and(|v| is_on(v));
        let from_header = header_str(headers, &format!("x-{key}")).is_some_and(is_on);
        from_query || from_header
    })
}

fn chunk_delay(query: &HashMap<String, String>, headers: &HeaderMap) -> Duration {
    let raw = query
        .get(CHUNK_DELAY_QUERY)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .or_else(|| header_str(headers, CHUNK_DELAY_HEADER))
        .unwrap_or("0");
    Duration::from_millis(clamp_delay_ms(raw))
}

fn clamp_delay_ms(raw: &str) -> u64 {
    let ms = raw.trim().parse::<f64>().unwrap_or(0.0);
    if !ms.is_finite() {
        return 0;
    }
    ms.clamp(0.0, MAX_CHUNK_DELAY_MS as f64) as u64
}
