//! Errors surfaced by adapter invocations.
//!
//! These map directly onto the `NodeError::kind` variants a workflow node
//! records into `state.errors` when an adapter call fails (see
//! `workflow_core::error::NodeErrorKind`).

use thiserror::Error;

/// Failure returned by a [`crate::ChatModel`], [`crate::ImageModel`],
/// [`crate::DbQuerier`], or [`crate::HttpCaller`] invocation.
#[derive(Error, Debug, Clone)]
pub enum AdapterError {
    /// The named environment variable holding secret material was not set
    /// at invocation time.
    #[error("missing credential: environment variable '{0}' is not set")]
    MissingCredential(String),

    /// The external service could not be reached or returned a transport
    /// error (network failure, non-2xx response, timeout at the transport
    /// layer).
    #[error("external service unavailable: {0}")]
    UnavailableExternalService(String),

    /// The requested operation is not permitted by the adapter contract,
    /// e.g. a non-`SELECT` statement submitted to [`crate::DbQuerier::query`].
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}
