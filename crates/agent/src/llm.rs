use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use vakman_core::registry::BackendId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: MessageRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }
}

/// Schema-constrained structured output the backend is asked to emit
/// alongside free text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackendRequest {
    pub backend: BackendId,
    pub messages: Vec<ChatMessage>,
    pub tool: Option<ToolSpec>,
}

/// One incremental piece of a backend response. Fragments arrive strictly
/// in order; the end of the stream is the terminal signal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StreamFragment {
    /// Free-text delta, appended to the running response buffer.
    TextDelta(String),
    /// Incremental chunk of a structured tool-call payload. The `arguments`
    /// chunks concatenate into one JSON document parsed at stream end.
    ToolCallDelta { name: Option<String>, arguments: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Network/timeout/provider-side failure; worth retrying.
    #[error("transient backend failure: {0}")]
    Transient(String),
    /// The backend rejected the request outright; retrying cannot help.
    #[error("backend rejected the request: {0}")]
    Fatal(String),
}

pub type FragmentStream = BoxStream<'static, Result<StreamFragment, BackendError>>;

/// Seam to the language-model providers. Implementations own the provider
/// SDK glue; everything in this crate only sees ordered fragments.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn stream(&self, request: BackendRequest) -> Result<FragmentStream, BackendError>;
}
