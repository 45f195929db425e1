//! Core traits for the four external-service capabilities a node may invoke.
//!
//! # Supported Capabilities
//!
//! | Trait | Node type | Invoked with |
//! |-------|-----------|--------------|
//! | [`ChatModel`] | `llm`, and `router` in `llm` strategy | rendered prompt + options |
//! | [`ImageModel`] | `image` | rendered prompt + options |
//! | [`DbQuerier`] | `db` | rendered read-only query + params + limit |
//! | [`HttpCaller`] | (reserved for `api` sources) | a generic request |
//!
//! Implementations must be `Send + Sync` so they can be shared across
//! concurrently executing workflow invocations via `Arc<dyn Trait>`.
//!
//! Rate-limit conditions are never surfaced through these traits — they are
//! handled upstream by the queue manager before a node's adapter call is
//! reached. Implementations should only return [`AdapterError`] for
//! conditions visible to the caller (missing credentials, transport
//! failure, disallowed operations).

use crate::error::AdapterError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Options accepted by a chat-completion call.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    /// Optional system prompt prepended to the conversation.
    pub system_prompt: Option<String>,
    /// Sampling temperature, provider-defined range.
    pub temperature: Option<f64>,
    /// Maximum number of tokens to generate.
    pub max_tokens: Option<u32>,
}

/// Result of a chat-completion call.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    /// The generated text.
    pub text: String,
    /// Tokens billed for this call (prompt + completion, provider-reported).
    pub tokens_used: u64,
}

/// Capability for invoking a chat-completion (LLM) service.
///
/// # Example
///
/// ```rust,ignore
/// use workflow_adapters::{ChatModel, traits::ChatOptions};
///
/// async fn example(model: &dyn ChatModel, source_config: &serde_json::Value) {
///     let completion = model.complete(source_config, "Say hi", ChatOptions::default()).await.unwrap();
///     println!("{}", completion.text);
/// }
/// ```
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate a completion for `prompt` using the source's configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::MissingCredential`] if the config's
    /// `api_key_env` variable is unset, or
    /// [`AdapterError::UnavailableExternalService`] on transport failure.
    async fn complete(
        &self,
        source_config: &Value,
        prompt: &str,
        options: ChatOptions,
    ) -> Result<ChatCompletion, AdapterError>;
}

/// Options accepted by an image-generation call.
#[derive(Debug, Clone, Default)]
pub struct ImageOptions {
    /// Requested image size, e.g. `"1024x1024"`.
    pub size: Option<String>,
}

/// Result of an image-generation call.
#[derive(Debug, Clone)]
pub struct ImageResult {
    /// URL (or URI) of the generated image.
    pub url: String,
    /// Provider-specific metadata, merged into the node's output alongside
    /// `url`, `prompt`, and `size`.
    pub metadata: HashMap<String, Value>,
}

/// Capability for invoking an image-generation service.
#[async_trait]
pub trait ImageModel: Send + Sync {
    /// Generate an image for `prompt` using the source's configuration.
    async fn generate(
        &self,
        source_config: &Value,
        prompt: &str,
        options: ImageOptions,
    ) -> Result<ImageResult, AdapterError>;
}

/// A single result row from a [`DbQuerier::query`] call.
pub type Row = serde_json::Map<String, Value>;

/// Capability for invoking a read-only database query.
///
/// # Contract
///
/// Implementations MUST reject any statement that is not a `SELECT` with
/// [`AdapterError::InvalidOperation`]. The core never sends write
/// statements, but an adapter wrapping a user-editable query template must
/// still enforce this itself, since the query text originates from the
/// workflow declaration.
#[async_trait]
pub trait DbQuerier: Send + Sync {
    /// Execute `sql` with positional/named `params` against the source,
    /// returning at most `limit` rows (`None` meaning unbounded).
    async fn query(
        &self,
        source_config: &Value,
        sql: &str,
        params: &HashMap<String, Value>,
        limit: Option<usize>,
    ) -> Result<Vec<Row>, AdapterError>;
}

/// A generic outbound HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method, e.g. `"GET"`.
    pub method: String,
    /// Fully-qualified request URL.
    pub url: String,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// Optional JSON request body.
    pub body: Option<Value>,
}

/// Response from a [`HttpCaller::call`] invocation.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Parsed JSON body, if the response was JSON.
    pub body: Option<Value>,
}

/// Capability for invoking a generic HTTP API, reserved for `api`-kind
/// sources.
#[async_trait]
pub trait HttpCaller: Send + Sync {
    /// Perform `request` against the source's configuration.
    ///
    /// Transport-level failures (DNS, connection refused, timeout) surface
    /// as [`AdapterError::UnavailableExternalService`].
    async fn call(
        &self,
        source_config: &Value,
        request: HttpRequest,
    ) -> Result<HttpResponse, AdapterError>;
}
