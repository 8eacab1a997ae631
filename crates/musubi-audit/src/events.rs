//! Events exchanged between the audit steps.

use crate::model::{AuditReport, ExtractedRules, File, ParseResult, ReportValidation};
use musubi::{Event, EventKind};

pub const START: EventKind = EventKind::new("Start");
pub const FILE_READY: EventKind = EventKind::new("FileReady");
pub const POLICY_PARSED: EventKind = EventKind::new("PolicyParsed");
pub const REPORT_PARSED: EventKind = EventKind::new("ReportParsed");
pub const RULES_EXTRACTED: EventKind = EventKind::new("RulesExtracted");
pub const REPORT_VALIDATED: EventKind = EventKind::new("ReportValidated");
pub const FINISHED: EventKind = EventKind::new("Finished");

/// Everything that can happen during an audit run.
#[derive(Debug, Clone)]
pub enum AuditEvent {
    /// Seeds a run with the submitted documents.
    Start { files: Vec<File> },
    /// One document is ready to be parsed.
    FileReady { file: File },
    /// The policy document was parsed.
    PolicyParsed { parse: ParseResult },
    /// The report document was parsed.
    ReportParsed { parse: ParseResult },
    /// Rules were extracted from the policy.
    RulesExtracted { rules: ExtractedRules },
    /// The report was checked against the rules.
    ReportValidated { validation: ReportValidation },
    /// The run's final result.
    Finished { report: AuditReport },
}

impl AuditEvent {
    /// Creates the start event for the given documents.
    pub fn start(files: impl IntoIterator<Item = File>) -> Self {
        AuditEvent::Start {
            files: files.into_iter().collect(),
        }
    }

    /// Returns the final report if this is the terminal event.
    pub fn into_report(self) -> Option<AuditReport> {
        match self {
            AuditEvent::Finished { report } => Some(report),
            _ => None,
        }
    }
}

impl Event for AuditEvent {
    fn kind(&self) -> EventKind {
        match self {
            AuditEvent::Start { .. } => START,
            AuditEvent::FileReady { .. } => FILE_READY,
            AuditEvent::PolicyParsed { .. } => POLICY_PARSED,
            AuditEvent::ReportParsed { .. } => REPORT_PARSED,
            AuditEvent::RulesExtracted { .. } => RULES_EXTRACTED,
            AuditEvent::ReportValidated { .. } => REPORT_VALIDATED,
            AuditEvent::Finished { .. } => FINISHED,
        }
    }
}
