//! An event-driven step orchestration engine.
//!
//! Steps declare the event kinds they consume and emit; the engine routes
//! each event to the matching steps, runs independent steps concurrently,
//! holds multi-input steps back until every required kind has arrived, and
//! ends the run when the terminal kind is emitted.
//!
//! # Example
//!
//! ```rust
//! use musubi::prelude::*;
//! use async_trait::async_trait;
//!
//! const START: EventKind = EventKind::new("Start");
//! const DONE: EventKind = EventKind::new("Done");
//!
//! #[derive(Debug, Clone)]
//! enum Ev {
//!     Start(String),
//!     Done(String),
//! }
//!
//! impl Event for Ev {
//!     fn kind(&self) -> EventKind {
//!         match self {
//!             Ev::Start(_) => START,
//!             Ev::Done(_) => DONE,
//!         }
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct Greet;
//!
//! #[async_trait]
//! impl Step<Ev> for Greet {
//!     async fn execute(&self, input: StepInput<Ev>, _ctx: &Context) -> Result<StepOutput<Ev>, WorkflowError> {
//!         match input.into_event() {
//!             Some(Ev::Start(name)) => Ok(StepOutput::emit(Ev::Done(format!("hello, {name}")))),
//!             other => Err(WorkflowError::step(self.name(), format!("unexpected {other:?}"))),
//!         }
//!     }
//!
//!     fn name(&self) -> StepName {
//!         StepName::new("greet")
//!     }
//!
//!     fn trigger(&self) -> Trigger {
//!         Trigger::on(START)
//!     }
//!
//!     fn emits(&self) -> Vec<EventKind> {
//!         vec![DONE]
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let workflow = Workflow::builder()
//!     .add_step(Greet)
//!     .start_with(START)
//!     .finish_on(DONE)
//!     .build()
//!     .expect("valid workflow");
//!
//! let result = workflow.run(Ev::Start("musubi".into())).await.expect("run failed");
//! assert!(matches!(result, Ev::Done(ref greeting) if greeting == "hello, musubi"));
//! # }
//! ```

mod config;
mod dispatcher;
mod join;
mod registry;
mod sink;
pub mod telemetry;
mod workflow;

// Re-export core types
pub use musubi_core::*;

pub use config::EngineConfig;
pub use join::{Contribution, JoinBuffer, PendingJoin};
pub use registry::StepRegistry;
pub use sink::{ChannelSink, TracingSink};
pub use workflow::{RunOutcome, Workflow, WorkflowBuilder};

/// Re-exported so callers can cancel runs without a direct dependency.
pub use tokio_util::sync::CancellationToken;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        CancellationToken, Context, ContextKey, ContextStore, EngineConfig, Event, EventKind,
        Phase, ProgressNotice, ProgressSink, RunOutcome, Step, StepConfig, StepInput, StepName,
        StepOutput, Trigger, Workflow, WorkflowBuilder, WorkflowError,
    };
}
