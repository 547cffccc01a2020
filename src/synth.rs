use crate::sanitize::sanitize_content;
use crate::splitter::{SplitContent, split_think_answer};
use rand_core::{OsRng, RngCore};
use serde::Serialize;
use serde_json::Value;

pub const COMPLETION_ID_PREFIX: &str = "chatcmpl_";

/// Non-streaming upstream reply. Only a handful of fields are interpreted.
#[derive(Debug, Clone)]
pub struct UpstreamCompletion {
    raw: Value,
}

impl UpstreamCompletion {
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    pub fn content(&self) -> &str {
        self.raw
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
    }

    pub fn id(&self) -> Option<String> {
        match self.raw.get("id")? {
            Value::Null | Value::Bool(false) => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    fn field(&self, key: &str) -> Option<Value> {
        self.raw.get(key).cloned()
    }
}

/// Identity shared by every object synthesized for one request, so the
/// non-stream body and its streamed counterpart agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionContext {
    pub id: String,
    pub created: i64,
    pub model: String,
}

impl CompletionContext {
    pub fn for_reply(reply: &UpstreamCompletion, model: &str, created: i64) -> Self {
        Self {
            id: reply.id().unwrap_or_else(random_completion_id),
            created,
            model: model.to_string(),
        }
    }
}

/// Prefix plus 24 lowercase hex chars from 12 OS-random bytes.
pub fn random_completion_id() -> String {
    let mut bytes = [0u8; 12];
    OsRng.fill_bytes(&mut bytes);
    format!("{}{}", COMPLETION_ID_PREFIX, hex::encode(bytes))
}

/// Split + flatten result for one upstream reply. The answer is already
/// flattened when requested; reasoning never is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapedContent {
    pub reasoning: String,
    pub answer: String,
    pub had_tags: bool,
}

impl ShapedContent {
    pub fn from_reply(reply: &UpstreamCompletion, flatten: bool) -> Self {
        Self::from_split(split_think_answer(reply.content()), flatten)
    }

    pub fn from_split(split: SplitContent, flatten: bool) -> Self {
        Self {
            answer: sanitize_content(&split.answer, flatten),
            reasoning: split.reasoning,
            had_tags: split.had_tags,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<Value>,
    pub choices: Vec<CompletionChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_info: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionChoice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssistantMessage {
    pub role: &'static str,
    pub content: String,
    pub reasoning_content: String,
}

pub fn build_completion(
    ctx: &CompletionContext,
    reply: &UpstreamCompletion,
    content: &ShapedContent,
) -> ChatCompletion {
    ChatCompletion {
        id: ctx.id.clone(),
        object: "chat.completion",
        created: ctx.created,
        model: ctx.model.clone(),
        system_fingerprint: reply.field("system_fingerprint"),
        choices: vec![CompletionChoice {
            index: 0,
            message: AssistantMessage {
                role: "assistant",
                content: content.answer.clone(),
                reasoning_content: content.reasoning.clone(),
            },
            finish_reason: "stop",
        }],
        usage: reply.field("usage"),
        time_info: reply.field("time_info"),
    }
}
