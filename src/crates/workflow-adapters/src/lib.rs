//! Capability traits for the external services a workflow node can invoke.
//!
//! `workflow-core` never talks to a concrete chat-completion service, image
//! generator, database, or HTTP API. Instead it depends on the four traits in
//! this crate ([`ChatModel`], [`ImageModel`], [`DbQuerier`], [`HttpCaller`]).
//! Production binaries wire in real providers; this crate also ships a mock
//! implementation of each trait for tests and for `workflow-cli run --mock`.
//!
//! # Architecture Philosophy
//!
//! Mirrors the split between orchestration and provider concerns: the core
//! library provides traits, callers implement them for whichever provider
//! they use, and the framework itself stays provider-agnostic.

pub mod error;
pub mod mock;
pub mod traits;

pub use error::AdapterError;
pub use traits::{ChatModel, DbQuerier, HttpCaller, ImageModel};
