//! The `router` behavior: classifies intent and writes `intent` into state.
//!
//! Strategy is selected by `metadata.strategy`:
//! - `keyword` — `metadata.rules: [{intent, keywords: [String]}]`, matched
//!   as a case-insensitive substring against the text at `metadata.input_key`
//!   (default `user_input`), in declaration order; first match wins.
//! - `pattern` — `metadata.rules: [{intent, pattern}]`, `pattern` a regular
//!   expression matched against the same input text.
//! - `rules` — `metadata.rules: [{intent, predicate}]`, `predicate` a
//!   condition-expression string (§ [`crate::condition`]) evaluated over
//!   state; first satisfied wins.
//! - `llm` — delegates classification to the `llm` behavior; the completion
//!   text, trimmed, is used as the intent token.
//! - `default` (or any unrecognized strategy) — unconditionally
//!   `metadata.default_intent`.
//!
//! Every strategy falls back to `metadata.default_intent` (default:
//! `"default"`) when no rule matches.

use crate::behaviors::{llm, Adapters};
use crate::condition;
use crate::error::{NodeError, NodeErrorKind};
use crate::registry::SourceRegistry;
use crate::spec::NodeDef;
use crate::state::State;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct KeywordRule {
    intent: String,
    keywords: Vec<String>,
}

#[derive(Deserialize)]
struct PatternRule {
    intent: String,
    pattern: String,
}

#[derive(Deserialize)]
struct PredicateRule {
    intent: String,
    predicate: String,
}

pub async fn run(
    node: &NodeDef,
    registry: &SourceRegistry<'_>,
    adapters: &Adapters,
    mut state: State,
) -> Result<State, NodeError> {
    let strategy = node.metadata.get("strategy").and_then(|v| v.as_str()).unwrap_or("default");
    let default_intent = node
        .metadata
        .get("default_intent")
        .and_then(|v| v.as_str())
        .unwrap_or("default")
        .to_string();

    let intent = match strategy {
        "keyword" => classify_keyword(node, &state, &default_intent)?,
        "pattern" => classify_pattern(node, &state, &default_intent)?,
        "rules" => classify_rules(node, &state, &default_intent)?,
        "llm" => {
            let (text, warnings) = llm::classify(node, registry, adapters, &state).await?;
            for warning in warnings {
                state.push_warning(warning);
            }
            if text.is_empty() {
                default_intent
            } else {
                text
            }
        }
        _ => default_intent,
    };

    state.set("intent", json!(intent));
    state.push_execution_path(&node.id);
    Ok(state)
}

fn input_text(node: &NodeDef, state: &State) -> String {
    let key = node.metadata.get("input_key").and_then(|v| v.as_str()).unwrap_or("user_input");
    state.get(key).and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default()
}

fn rules(node: &NodeDef) -> Result<Vec<serde_json::Value>, NodeError> {
    Ok(node
        .metadata
        .get("rules")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default())
}

fn classify_keyword(node: &NodeDef, state: &State, default_intent: &str) -> Result<String, NodeError> {
    let text = input_text(node, state).to_lowercase();
    for raw in rules(node)? {
        let rule: KeywordRule = serde_json::from_value(raw)
            .map_err(|e| NodeError::new(&node.id, NodeErrorKind::InvalidInput, format!("invalid keyword rule: {e}")))?;
        if rule.keywords.iter().any(|kw| text.contains(&kw.to_lowercase())) {
            return Ok(rule.intent);
        }
    }
    Ok(default_intent.to_string())
}

fn classify_pattern(node: &NodeDef, state: &State, default_intent: &str) -> Result<String, NodeError> {
    let text = input_text(node, state);
    for raw in rules(node)? {
        let rule: PatternRule = serde_json::from_value(raw)
            .map_err(|e| NodeError::new(&node.id, NodeErrorKind::InvalidInput, format!("invalid pattern rule: {e}")))?;
        let regex = Regex::new(&rule.pattern)
            .map_err(|e| NodeError::new(&node.id, NodeErrorKind::InvalidInput, format!("invalid regex '{}': {e}", rule.pattern)))?;
        if regex.is_match(&text) {
            return Ok(rule.intent);
        }
    }
    Ok(default_intent.to_string())
}

fn classify_rules(node: &NodeDef, state: &State, default_intent: &str) -> Result<String, NodeError> {
    for raw in rules(node)? {
        let rule: PredicateRule = serde_json::from_value(raw)
            .map_err(|e| NodeError::new(&node.id, NodeErrorKind::InvalidInput, format!("invalid predicate rule: {e}")))?;
        let expr = condition::parse(&rule.predicate)
            .map_err(|e| NodeError::new(&node.id, NodeErrorKind::InvalidInput, e.to_string()))?;
        let (matched, _warnings) = expr.evaluate(state);
        if matched {
            return Ok(rule.intent);
        }
    }
    Ok(default_intent.to_string())
}
