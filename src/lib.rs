//! # Loomstack: resilient model calls, typed pipelines and agent loops.

/// The `agent` module drives a pull-based loop of model-chosen actions.
pub mod agent;
/// The `llm` module provides the model contract and its decorators.
pub mod llm;
/// The `pipeline` module turns typed inputs into typed outputs through a model.
pub mod pipeline;
/// Deterministic models for tests and local experiments.
pub mod testing;

pub use agent::{Agent, AgentError, AgentStep, Handler, Transition};
pub use llm::{CallContext, DynModel, Message, Model, ModelFactory, ModelResponse, Role, Usage};
pub use pipeline::{Pipeline, PipelineError};
