//! Workflow error types.

use crate::event::EventKind;
use crate::step::StepName;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while building or running a workflow.
///
/// Configuration errors are raised by the builder or on the first event that
/// exposes them. Step errors carry the name of the failing step. A run fails
/// with exactly one of these.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum WorkflowError {
    /// A step failed during execution.
    #[error("Step failed: {step_name}, details: {details}")]
    StepError {
        /// The name of the step that failed.
        step_name: StepName,
        /// Details about the failure.
        details: String,
    },

    /// A step exceeded its timeout duration.
    #[error("Timeout occurred in step: {step_name}")]
    Timeout {
        /// The name of the step that timed out.
        step_name: StepName,
    },

    /// A step body panicked or its task was torn down unexpectedly.
    #[error("Step panicked: {step_name}, details: {details}")]
    StepPanicked {
        /// The name of the step whose task died.
        step_name: StepName,
        /// Details reported by the runtime.
        details: String,
    },

    /// An event was produced that no registered step consumes.
    #[error("No step is registered for event kind '{kind}'")]
    UnroutedEvent {
        /// Kind of the orphaned event.
        kind: EventKind,
    },

    /// A step emitted an event kind it did not declare.
    #[error("Step '{step_name}' emitted undeclared event kind '{kind}'")]
    UndeclaredEmission {
        /// The emitting step.
        step_name: StepName,
        /// The undeclared kind.
        kind: EventKind,
    },

    /// Two steps were registered under the same name.
    #[error("Duplicate step name: {0}")]
    DuplicateStep(StepName),

    /// The workflow configuration is invalid.
    #[error("Invalid workflow configuration: {0}")]
    Configuration(String),

    /// A join released its inputs more than once in a single run.
    #[error("Join for step '{step_name}' fired more than once")]
    JoinIntegrity {
        /// The joining step.
        step_name: StepName,
    },

    /// Nothing is queued or running, yet no terminal event was produced.
    #[error("Run stalled before the terminal event (waiting: [{}])", .waiting.join(", "))]
    Stalled {
        /// Human-readable description of each incomplete join.
        waiting: Vec<String>,
    },

    /// The run launched more steps than the configured limit.
    #[error("Dispatch limit of {0} step launches exceeded")]
    DispatchLimitExceeded(usize),

    /// The whole run exceeded its time budget.
    #[error("Run exceeded its timeout of {0:?}")]
    RunTimeout(Duration),

    /// The run was cancelled by the caller.
    #[error("Run was cancelled")]
    Cancelled,
}

impl WorkflowError {
    /// Creates a [`WorkflowError::StepError`].
    pub fn step(step_name: impl Into<StepName>, details: impl Into<String>) -> Self {
        Self::StepError {
            step_name: step_name.into(),
            details: details.into(),
        }
    }

    /// Returns `true` for errors caused by how the workflow was declared.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnroutedEvent { .. }
                | Self::UndeclaredEmission { .. }
                | Self::DuplicateStep(_)
                | Self::Configuration(_)
        )
    }

    /// Returns the step this error is attributed to, if any.
    pub fn step_name(&self) -> Option<&StepName> {
        match self {
            Self::StepError { step_name, .. }
            | Self::Timeout { step_name }
            | Self::StepPanicked { step_name, .. }
            | Self::UndeclaredEmission { step_name, .. }
            | Self::JoinIntegrity { step_name }
            | Self::DuplicateStep(step_name) => Some(step_name),
            _ => None,
        }
    }
}
