//! Validator, compiler, and executor for declarative multi-agent workflow
//! graphs.
//!
//! A workflow is declared as JSON: a set of [`spec::NodeDef`]s (input,
//! router, llm, image, db, aggregator), [`spec::EdgeDef`]s wiring them
//! together (optionally conditional, optionally rate-limited by a queue),
//! [`spec::QueueDef`]s describing bandwidth policy, and [`spec::SourceDef`]s
//! describing the external services nodes call out to.
//!
//! The public surface mirrors the three-stage pipeline the declaration goes
//! through:
//!
//! ```text
//! WorkflowSpec::from_json  →  validate  →  compile  →  invoke
//! ```
//!
//! `validate` never short-circuits: it returns every [`error::ValidationError`]
//! it can find in one pass so a caller gets a complete remediation list.
//! `compile` turns an already-validated spec into a [`compiler::CompiledGraph`],
//! an immutable, freely shareable runnable form. `invoke` walks that graph
//! against an initial [`state::State`], fanning out in parallel across
//! branching edges and joining deterministically at fan-in points.

pub mod behaviors;
pub mod compiler;
pub mod condition;
pub mod error;
pub mod executor;
pub mod registry;
pub mod spec;
pub mod state;
pub mod validator;

pub use compiler::{compile, CompiledGraph};
pub use error::{ErrorCode, NodeError, NodeErrorKind, ValidationError, WorkflowError};
pub use executor::{invoke, ExecutionMetrics, ExecutionResult, ExecutionStatus};
pub use spec::{EdgeDef, EdgeTarget, NodeDef, NodeType, QueueDef, SourceDef, WorkflowSpec};
pub use state::State;
pub use validator::validate;
