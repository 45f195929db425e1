//! In-memory mock implementations of the adapter traits.
//!
//! Used by `workflow-core`'s own test suite and by `workflow-cli run --mock`,
//! so the executor and node behaviors are exercisable without a real
//! chat-completion service, image generator, database, or HTTP endpoint.

use crate::error::AdapterError;
use crate::traits::{
    ChatCompletion, ChatModel, ChatOptions, DbQuerier, HttpCaller, HttpRequest, HttpResponse,
    ImageModel, ImageOptions, ImageResult, Row,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// Echoes the prompt back as the completion, reporting a deterministic
/// token count derived from the prompt length so tests can assert on
/// `tokens_used` without depending on a real tokenizer.
#[derive(Debug, Clone, Default)]
pub struct MockChatModel {
    /// Fixed number of tokens to report per call. When `None`, token count
    /// is `prompt.len() / 4` (a rough whitespace-token approximation).
    pub fixed_tokens: Option<u64>,
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(
        &self,
        source_config: &Value,
        prompt: &str,
        _options: ChatOptions,
    ) -> Result<ChatCompletion, AdapterError> {
        if let Some(env_var) = source_config.get("api_key_env").and_then(Value::as_str) {
            require_env(env_var)?;
        }
        let tokens_used = self.fixed_tokens.unwrap_or((prompt.len() as u64 / 4).max(1));
        Ok(ChatCompletion {
            text: format!("mock-response: {prompt}"),
            tokens_used,
        })
    }
}

/// Returns a deterministic fake URL built from the prompt.
#[derive(Debug, Clone, Default)]
pub struct MockImageModel;

#[async_trait]
impl ImageModel for MockImageModel {
    async fn generate(
        &self,
        source_config: &Value,
        prompt: &str,
        options: ImageOptions,
    ) -> Result<ImageResult, AdapterError> {
        if let Some(env_var) = source_config.get("api_key_env").and_then(Value::as_str) {
            require_env(env_var)?;
        }
        let mut metadata = HashMap::new();
        metadata.insert(
            "size".to_string(),
            Value::String(options.size.clone().unwrap_or_else(|| "1024x1024".to_string())),
        );
        Ok(ImageResult {
            url: format!("mock://image/{}", slugify(prompt)),
            metadata,
        })
    }
}

/// Returns a fixed row set registered by table name, or an empty result for
/// unknown tables. Rejects any statement that does not start with `SELECT`
/// (case-insensitive), per the adapter contract.
#[derive(Debug, Clone, Default)]
pub struct MockDbQuerier {
    /// Canned rows keyed by the lowercased table name found in the query.
    pub tables: HashMap<String, Vec<Row>>,
}

#[async_trait]
impl DbQuerier for MockDbQuerier {
    async fn query(
        &self,
        source_config: &Value,
        sql: &str,
        _params: &HashMap<String, Value>,
        limit: Option<usize>,
    ) -> Result<Vec<Row>, AdapterError> {
        if let Some(env_var) = source_config.get("dsn_env").and_then(Value::as_str) {
            require_env(env_var)?;
        }
        let trimmed = sql.trim_start();
        if !trimmed.get(0..6).map(|s| s.eq_ignore_ascii_case("select")).unwrap_or(false) {
            return Err(AdapterError::InvalidOperation(format!(
                "only SELECT statements are permitted, got: {sql}"
            )));
        }
        let table = trimmed
            .to_ascii_lowercase()
            .split("from")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric() && c != '_').to_string())
            .unwrap_or_default();
        let mut rows = self.tables.get(&table).cloned().unwrap_or_default();
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}

/// Returns a fixed `200 OK` JSON response.
#[derive(Debug, Clone, Default)]
pub struct MockHttpCaller;

#[async_trait]
impl HttpCaller for MockHttpCaller {
    async fn call(
        &self,
        source_config: &Value,
        request: HttpRequest,
    ) -> Result<HttpResponse, AdapterError> {
        if let Some(env_var) = source_config.get("auth_env").and_then(Value::as_str) {
            require_env(env_var)?;
        }
        Ok(HttpResponse {
            status: 200,
            body: Some(serde_json::json!({
                "echo": { "method": request.method, "url": request.url },
            })),
        })
    }
}

fn require_env(name: &str) -> Result<String, AdapterError> {
    std::env::var(name).map_err(|_| AdapterError::MissingCredential(name.to_string()))
}

fn slugify(prompt: &str) -> String {
    prompt
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .take(32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn mock_chat_model_echoes_prompt() {
        let model = MockChatModel::default();
        let completion = model
            .complete(&json!({}), "hello world", ChatOptions::default())
            .await
            .unwrap();
        assert!(completion.text.contains("hello world"));
        assert!(completion.tokens_used > 0);
    }

    #[tokio::test]
    async fn mock_chat_model_missing_credential() {
        let model = MockChatModel::default();
        let err = model
            .complete(
                &json!({"api_key_env": "WORKFLOW_TEST_DOES_NOT_EXIST"}),
                "hi",
                ChatOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::MissingCredential(_)));
    }

    #[tokio::test]
    async fn mock_db_rejects_write_statements() {
        let querier = MockDbQuerier::default();
        let err = querier
            .query(&json!({}), "DELETE FROM users", &HashMap::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn mock_db_returns_registered_rows_with_limit() {
        let mut tables = HashMap::new();
        let mut row = Row::new();
        row.insert("id".to_string(), json!(1));
        tables.insert("users".to_string(), vec![row.clone(), row.clone(), row]);
        let querier = MockDbQuerier { tables };
        let rows = querier
            .query(&json!({}), "SELECT * FROM users", &HashMap::new(), Some(2))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }
}
