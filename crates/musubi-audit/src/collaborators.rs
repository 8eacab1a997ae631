//! Contracts for the external services the audit delegates to.
//!
//! Document parsing and the language-model calls live outside this crate.
//! Implementations own their retry and timeout policy; a returned error
//! fails the run.

use crate::error::AuditError;
use crate::model::{ExtractedRules, File, ParseResult, ReportValidation};
use async_trait::async_trait;
use std::fmt::Debug;

/// Turns a document into structured pages, text and tables.
#[async_trait]
pub trait DocumentParser: Send + Sync + Debug {
    async fn parse(&self, file: &File) -> Result<ParseResult, AuditError>;
}

/// Extracts the operational rules from a parsed policy.
#[async_trait]
pub trait RulesExtractor: Send + Sync + Debug {
    async fn extract(&self, policy: &ParseResult) -> Result<ExtractedRules, AuditError>;
}

/// Reconciles a parsed report against extracted rules.
#[async_trait]
pub trait ReportValidator: Send + Sync + Debug {
    async fn validate(
        &self,
        report: &ParseResult,
        rules: &ExtractedRules,
    ) -> Result<ReportValidation, AuditError>;
}
