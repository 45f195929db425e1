//! Error taxonomy for the workflow core.
//!
//! - [`SpecError`] — malformed JSON or wrong field types, surfaces before
//!   validation even runs.
//! - [`ValidationError`] — static, aggregated; [`validate`](crate::validate)
//!   always returns the complete list rather than stopping at the first.
//! - [`NodeError`] — behavior-level runtime failure, recorded into
//!   `state.errors` rather than aborting sibling branches.
//! - [`WorkflowError`] — the crate-boundary error composing the above plus
//!   compiler and cancellation failures.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Failure parsing a raw declaration into a [`crate::spec::WorkflowSpec`].
#[derive(Error, Debug)]
pub enum SpecError {
    #[error("malformed workflow spec: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("failed to read workflow spec: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable error codes, part of the wire contract alongside the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Malformed JSON / schema violation.
    E001,
    /// Missing required field.
    E002,
    /// Invalid value type.
    E003,
    /// `start_node` does not exist.
    E005,
    /// Edge references a non-existent node.
    E006,
    /// Queue references a non-existent node.
    E007,
    /// Node references a non-existent source.
    E008,
    /// Duplicate node id.
    E009,
    /// Duplicate queue id.
    E010,
    /// Duplicate source id.
    E011,
    /// Invalid bandwidth configuration.
    E012,
    /// Cycle detected.
    E013,
    /// Node type requires a source.
    E014,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One independently-detected validation failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    pub code: ErrorCode,
    pub message: String,
    pub field_path: String,
    pub node_id: Option<String>,
    pub queue_id: Option<String>,
}

impl ValidationError {
    pub fn new(code: ErrorCode, field_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field_path: field_path.into(),
            node_id: None,
            queue_id: None,
        }
    }

    pub fn with_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn with_queue(mut self, queue_id: impl Into<String>) -> Self {
        self.queue_id = Some(queue_id.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.code, self.message, self.field_path)
    }
}

/// The kind of a runtime node failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeErrorKind {
    InvalidInput,
    UnresolvedPlaceholder,
    UnavailableExternalService,
    MissingCredential,
    InvalidOperation,
    Timeout,
}

/// A behavior-level failure recorded into `state.errors`. Descendants of the
/// edge that produced this error are not scheduled, but sibling fan-out
/// branches continue unaffected.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[error("node '{node_id}' failed ({kind:?}): {message}")]
pub struct NodeError {
    pub node_id: String,
    pub kind: NodeErrorKind,
    pub message: String,
}

impl NodeError {
    pub fn new(node_id: impl Into<String>, kind: NodeErrorKind, message: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            kind,
            message: message.into(),
        }
    }
}

/// The crate-boundary error, composing spec parsing, validation, internal
/// compiler invariants, and cancellation.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error("spec failed validation with {} error(s)", .0.len())]
    Validation(Vec<ValidationError>),

    /// An internal invariant the compiler assumes (a validated spec) was
    /// broken — this indicates a bug, not a user-facing validation failure.
    #[error("internal compiler invariant violated: {0}")]
    Compile(String),

    #[error("execution cancelled")]
    Cancelled,
}

impl From<workflow_limiter::LimiterError> for WorkflowError {
    fn from(_: workflow_limiter::LimiterError) -> Self {
        // Both LimiterError variants (Cancelled, Shutdown) surface as
        // Cancelled at the executor boundary, per the error handling design.
        WorkflowError::Cancelled
    }
}
