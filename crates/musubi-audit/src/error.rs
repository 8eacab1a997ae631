//! Audit pipeline errors.

use musubi::{StepName, WorkflowError};
use thiserror::Error;

/// Failures raised by the audit steps and their collaborators.
///
/// Steps convert these into [`WorkflowError::StepError`] so the run fails
/// with the name of the step that hit them.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Cannot merge an empty list of parse results")]
    EmptyMerge,

    #[error("No {0} document was submitted")]
    MissingDocument(crate::model::DocumentRole),

    #[error("More than one {0} document was submitted")]
    DuplicateDocument(crate::model::DocumentRole),

    #[error("Failed to parse '{file}': {reason}")]
    Parse { file: String, reason: String },

    #[error("Rule extraction failed: {0}")]
    Extraction(String),

    #[error("Report validation failed: {0}")]
    Validation(String),

    #[error("Context value '{0}' is missing")]
    MissingContext(&'static str),

    #[error("Unexpected input: {0}")]
    UnexpectedInput(String),
}

impl AuditError {
    /// Wraps the error as the failure of `step`.
    pub fn into_step_error(self, step: StepName) -> WorkflowError {
        WorkflowError::step(step, self.to_string())
    }
}
