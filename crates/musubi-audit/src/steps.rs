//! The audit steps.
//!
//! ```text
//! Start -> dispatch_files -> FileReady x2 -> parse_document
//!   PolicyParsed -> extract_rules -> RulesExtracted --+
//!   ReportParsed ------------------------------------+-> validate_report
//!   ReportValidated -> assemble_report -> Finished
//! ```

use crate::collaborators::{DocumentParser, ReportValidator, RulesExtractor};
use crate::error::AuditError;
use crate::events::{
    AuditEvent, FILE_READY, FINISHED, POLICY_PARSED, REPORT_PARSED, REPORT_VALIDATED,
    RULES_EXTRACTED, START,
};
use crate::model::{AuditReport, DocumentRole, ExtractedRules, ReportValidation};
use async_trait::async_trait;
use musubi::{Context, EventKind, Step, StepInput, StepName, StepOutput, Trigger, WorkflowError};
use std::sync::Arc;
use tracing::info;

/// Context key holding the [`ExtractedRules`] written by [`ExtractRules`].
pub const EXTRACTED_RULES_KEY: &str = "extracted_rules";
/// Context key holding the [`ReportValidation`] written by [`ValidateReport`].
pub const VALIDATED_REPORT_KEY: &str = "validated_report";

fn unexpected(step: StepName, event: Option<AuditEvent>) -> WorkflowError {
    AuditError::UnexpectedInput(format!("{event:?}")).into_step_error(step)
}

/// Fans the submitted documents out into one `FileReady` per file.
///
/// A run needs exactly one policy and one report.
#[derive(Debug, Default)]
pub struct DispatchFiles;

#[async_trait]
impl Step<AuditEvent> for DispatchFiles {
    async fn execute(
        &self,
        input: StepInput<AuditEvent>,
        ctx: &Context,
    ) -> Result<StepOutput<AuditEvent>, WorkflowError> {
        let files = match input.into_event() {
            Some(AuditEvent::Start { files }) => files,
            other => return Err(unexpected(self.name(), other)),
        };

        for role in [DocumentRole::Policy, DocumentRole::Report] {
            match files.iter().filter(|file| file.role == role).count() {
                0 => return Err(AuditError::MissingDocument(role).into_step_error(self.name())),
                1 => {}
                _ => return Err(AuditError::DuplicateDocument(role).into_step_error(self.name())),
            }
        }

        ctx.progress(format!("dispatching {} documents", files.len()));
        Ok(StepOutput::emit_all(
            files.into_iter().map(|file| AuditEvent::FileReady { file }),
        ))
    }

    fn name(&self) -> StepName {
        StepName::new("dispatch_files")
    }

    fn trigger(&self) -> Trigger {
        Trigger::on(START)
    }

    fn emits(&self) -> Vec<EventKind> {
        vec![FILE_READY]
    }
}

/// Parses one document and routes the result by the document's role.
#[derive(Debug)]
pub struct ParseDocument {
    parser: Arc<dyn DocumentParser>,
}

impl ParseDocument {
    pub fn new(parser: Arc<dyn DocumentParser>) -> Self {
        Self { parser }
    }
}

#[async_trait]
impl Step<AuditEvent> for ParseDocument {
    async fn execute(
        &self,
        input: StepInput<AuditEvent>,
        ctx: &Context,
    ) -> Result<StepOutput<AuditEvent>, WorkflowError> {
        let file = match input.into_event() {
            Some(AuditEvent::FileReady { file }) => file,
            other => return Err(unexpected(self.name(), other)),
        };

        info!(file_path = %file.path, role = %file.role, "parse_started");
        ctx.progress(format!("parsing {}", file.name));

        let parse = self
            .parser
            .parse(&file)
            .await
            .map_err(|e| e.into_step_error(self.name()))?;

        info!(
            file_path = %file.path,
            page_count = parse.page_count,
            table_count = parse.table_count(),
            "parse_completed"
        );
        ctx.progress(format!(
            "parsed {}: {} pages, {} tables",
            file.name,
            parse.page_count,
            parse.table_count()
        ));

        let event = match file.role {
            DocumentRole::Policy => AuditEvent::PolicyParsed { parse },
            DocumentRole::Report => AuditEvent::ReportParsed { parse },
        };
        Ok(StepOutput::emit(event))
    }

    fn name(&self) -> StepName {
        StepName::new("parse_document")
    }

    fn trigger(&self) -> Trigger {
        Trigger::on(FILE_READY)
    }

    fn emits(&self) -> Vec<EventKind> {
        vec![POLICY_PARSED, REPORT_PARSED]
    }
}

/// Extracts the policy rules and stores them for the final report.
#[derive(Debug)]
pub struct ExtractRules {
    extractor: Arc<dyn RulesExtractor>,
}

impl ExtractRules {
    pub fn new(extractor: Arc<dyn RulesExtractor>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl Step<AuditEvent> for ExtractRules {
    async fn execute(
        &self,
        input: StepInput<AuditEvent>,
        ctx: &Context,
    ) -> Result<StepOutput<AuditEvent>, WorkflowError> {
        let parse = match input.into_event() {
            Some(AuditEvent::PolicyParsed { parse }) => parse,
            other => return Err(unexpected(self.name(), other)),
        };

        info!(
            page_count = parse.page_count,
            table_count = parse.table_count(),
            "extract_rules_started"
        );

        let rules = self
            .extractor
            .extract(&parse)
            .await
            .map_err(|e| e.into_step_error(self.name()))?;

        ctx.insert(EXTRACTED_RULES_KEY, rules.clone());
        info!(
            rule_count = rules.key_rules.len(),
            deductible = rules.deductible,
            "extract_rules_completed"
        );
        ctx.progress(format!("extracted {} rules", rules.key_rules.len()));

        Ok(StepOutput::emit(AuditEvent::RulesExtracted { rules }))
    }

    fn name(&self) -> StepName {
        StepName::new("extract_rules")
    }

    fn trigger(&self) -> Trigger {
        Trigger::on(POLICY_PARSED)
    }

    fn emits(&self) -> Vec<EventKind> {
        vec![RULES_EXTRACTED]
    }
}

/// Checks the parsed report against the extracted rules.
///
/// Fires once both the report parse and the rules are available, in either
/// arrival order.
#[derive(Debug)]
pub struct ValidateReport {
    validator: Arc<dyn ReportValidator>,
}

impl ValidateReport {
    pub fn new(validator: Arc<dyn ReportValidator>) -> Self {
        Self { validator }
    }
}

#[async_trait]
impl Step<AuditEvent> for ValidateReport {
    async fn execute(
        &self,
        mut input: StepInput<AuditEvent>,
        ctx: &Context,
    ) -> Result<StepOutput<AuditEvent>, WorkflowError> {
        let parse = match input.take(REPORT_PARSED) {
            Some(AuditEvent::ReportParsed { parse }) => parse,
            other => return Err(unexpected(self.name(), other)),
        };
        let rules = match input.take(RULES_EXTRACTED) {
            Some(AuditEvent::RulesExtracted { rules }) => rules,
            other => return Err(unexpected(self.name(), other)),
        };

        ctx.progress("validating report against policy rules");
        let validation = self
            .validator
            .validate(&parse, &rules)
            .await
            .map_err(|e| e.into_step_error(self.name()))?;

        ctx.insert(VALIDATED_REPORT_KEY, validation.clone());
        info!(
            items = validation.items.len(),
            total_approved = validation.total_approved,
            "validate_report_completed"
        );

        Ok(StepOutput::emit(AuditEvent::ReportValidated { validation }))
    }

    fn name(&self) -> StepName {
        StepName::new("validate_report")
    }

    fn trigger(&self) -> Trigger {
        Trigger::join([REPORT_PARSED, RULES_EXTRACTED])
    }

    fn emits(&self) -> Vec<EventKind> {
        vec![REPORT_VALIDATED]
    }
}

/// Builds the final report from the values stored by earlier steps.
#[derive(Debug, Default)]
pub struct AssembleReport;

#[async_trait]
impl Step<AuditEvent> for AssembleReport {
    async fn execute(
        &self,
        _input: StepInput<AuditEvent>,
        ctx: &Context,
    ) -> Result<StepOutput<AuditEvent>, WorkflowError> {
        let validation = ctx
            .get_cloned::<ReportValidation>(VALIDATED_REPORT_KEY)
            .ok_or_else(|| {
                AuditError::MissingContext(VALIDATED_REPORT_KEY).into_step_error(self.name())
            })?;
        let rules = ctx
            .get_cloned::<ExtractedRules>(EXTRACTED_RULES_KEY)
            .ok_or_else(|| {
                AuditError::MissingContext(EXTRACTED_RULES_KEY).into_step_error(self.name())
            })?;

        let report = AuditReport::new(validation, rules);
        info!(
            items = report.validated_items.len(),
            total_approved = report.total_approved,
            "audit_report_assembled"
        );

        Ok(StepOutput::emit(AuditEvent::Finished { report }))
    }

    fn name(&self) -> StepName {
        StepName::new("assemble_report")
    }

    fn trigger(&self) -> Trigger {
        Trigger::on(REPORT_VALIDATED)
    }

    fn emits(&self) -> Vec<EventKind> {
        vec![FINISHED]
    }
}
