//! Insurance claims audit built on the musubi engine.
//!
//! A run receives a policy and a repair report. Both are parsed
//! concurrently; rules are extracted from the policy while the report parse
//! waits in a join, and the report is validated once both are available.
//! The run ends with an [`AuditReport`].
//!
//! Parsing and the language-model calls are injected through the
//! [`DocumentParser`], [`RulesExtractor`] and [`ReportValidator`] traits.

mod collaborators;
mod error;
pub mod events;
pub mod model;
pub mod steps;

pub use collaborators::{DocumentParser, ReportValidator, RulesExtractor};
pub use error::AuditError;
pub use events::AuditEvent;
pub use model::{
    AuditReport, Decision, DocumentRole, ExtractedRules, File, Heading, ItemCheck, Page, PageItem,
    ParseResult, ReportValidation,
};

use musubi::{Workflow, WorkflowBuilder, WorkflowError};
use std::sync::Arc;

/// Returns a builder with every audit step registered.
///
/// Use this to attach a progress sink or engine configuration before
/// building; [`audit_workflow`] builds with the defaults.
pub fn audit_workflow_builder(
    parser: Arc<dyn DocumentParser>,
    extractor: Arc<dyn RulesExtractor>,
    validator: Arc<dyn ReportValidator>,
) -> WorkflowBuilder<AuditEvent> {
    Workflow::builder()
        .add_step(steps::DispatchFiles)
        .add_step(steps::ParseDocument::new(parser))
        .add_step(steps::ExtractRules::new(extractor))
        .add_step(steps::ValidateReport::new(validator))
        .add_step(steps::AssembleReport)
        .start_with(events::START)
        .finish_on(events::FINISHED)
}

/// Builds the audit workflow with the default engine configuration.
pub fn audit_workflow(
    parser: Arc<dyn DocumentParser>,
    extractor: Arc<dyn RulesExtractor>,
    validator: Arc<dyn ReportValidator>,
) -> Result<Workflow<AuditEvent>, WorkflowError> {
    audit_workflow_builder(parser, extractor, validator).build()
}

/// Runs one audit over `files` and returns the final report.
pub async fn run_audit(
    workflow: &Workflow<AuditEvent>,
    files: impl IntoIterator<Item = File>,
) -> Result<AuditReport, WorkflowError> {
    let terminal = workflow.run(AuditEvent::start(files)).await?;
    terminal.into_report().ok_or_else(|| {
        WorkflowError::Configuration("audit run ended without a report".to_string())
    })
}
