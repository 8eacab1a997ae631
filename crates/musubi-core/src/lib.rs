//! Core traits and types for the musubi event orchestration engine.
//!
//! This crate holds the vocabulary shared by step authors and the engine,
//! without the scheduler itself. Depend on it to implement custom steps.
//!
//! # Core Types
//!
//! - [`Event`] / [`EventKind`] - Typed events routed between steps
//! - [`Step`] - An async handler bound to a [`Trigger`]
//! - [`StepInput`] / [`StepOutput`] - What a step receives and emits
//! - [`ContextStore`] / [`Context`] - Per-run shared state and the per-invocation handle
//! - [`ProgressSink`] - Receiver for step lifecycle notices
//! - [`WorkflowError`] - Error types for workflow execution

mod context;
mod error;
mod event;
mod progress;
mod step;

pub use context::{Context, ContextKey, ContextStore, RunId};
pub use error::WorkflowError;
pub use event::{Event, EventKind};
pub use progress::{NoopSink, Phase, ProgressNotice, ProgressSink};
pub use step::{Step, StepConfig, StepInput, StepName, StepOutput, Trigger};
