//! Claims audit.
//!
//! Runs the audit pipeline over a policy and a repair report with stand-in
//! collaborators that simulate parser and model latency:
//! 1. Both documents are parsed concurrently
//! 2. Rules are extracted from the policy
//! 3. The report is validated once the rules are ready
//! 4. The final report is printed as JSON
//!
//! Progress notices are rendered live from a channel sink.
//! Set `RUST_LOG=debug` to see the engine's routing decisions.

use async_trait::async_trait;
use musubi::telemetry::init_tracing;
use musubi::{ChannelSink, Phase};
use musubi_audit::{
    audit_workflow_builder, run_audit, AuditError, Decision, DocumentParser, DocumentRole,
    ExtractedRules, File, ItemCheck, Page, PageItem, ParseResult, ReportValidation,
    ReportValidator, RulesExtractor,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
struct SimulatedParser;

#[async_trait]
impl DocumentParser for SimulatedParser {
    async fn parse(&self, file: &File) -> Result<ParseResult, AuditError> {
        let (delay, lines) = match file.role {
            DocumentRole::Policy => (
                400,
                vec![
                    "Paint and bodywork are capped at $4,000.",
                    "Hidden structural damage is covered with a technical note.",
                    "Maintenance is excluded. Deductible: 5%.",
                ],
            ),
            DocumentRole::Report => (
                150,
                vec![
                    "Paint | 5000",
                    "Bumper absorber | 1200 | note: fracture found on disassembly",
                    "Oil change | 90",
                ],
            ),
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;

        let text = lines.join("\n");
        let rows: Vec<Vec<String>> = lines
            .iter()
            .map(|line| line.split(" | ").map(str::to_string).collect())
            .collect();
        Ok(ParseResult {
            job_id: format!("sim-{}", file.name),
            markdown: Some(format!("# {}\n\n{text}", file.name)),
            text: text.clone(),
            pages: vec![Page {
                number: 1,
                text,
                markdown: None,
                items: vec![
                    PageItem::Heading {
                        level: 1,
                        text: file.name.clone(),
                    },
                    PageItem::Table { rows },
                ],
            }],
            page_count: 1,
        })
    }
}

#[derive(Debug)]
struct SimulatedExtractor;

#[async_trait]
impl RulesExtractor for SimulatedExtractor {
    async fn extract(&self, _policy: &ParseResult) -> Result<ExtractedRules, AuditError> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok(ExtractedRules {
            key_rules: vec![
                "Paint capped at $4,000".to_string(),
                "Hidden damage covered only with a technical note".to_string(),
                "Maintenance excluded".to_string(),
            ],
            deductible: 0.05,
        })
    }
}

#[derive(Debug)]
struct SimulatedValidator;

#[async_trait]
impl ReportValidator for SimulatedValidator {
    async fn validate(
        &self,
        report: &ParseResult,
        rules: &ExtractedRules,
    ) -> Result<ReportValidation, AuditError> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        println!("validating with context:\n{}\n", rules.context_summary());
        println!("report outline:\n{}\n", report.headings_text());

        let items = vec![
            ItemCheck {
                item: "Paint".to_string(),
                cost: 5000.0,
                decision: Decision::Rejected,
                explanation: "Exceeds the $4,000 cap".to_string(),
            },
            ItemCheck {
                item: "Bumper absorber".to_string(),
                cost: 1200.0,
                decision: Decision::JustifiedByNote,
                explanation: "Hidden damage backed by a technical note".to_string(),
            },
            ItemCheck {
                item: "Oil change".to_string(),
                cost: 90.0,
                decision: Decision::Rejected,
                explanation: "Maintenance is excluded".to_string(),
            },
        ];
        let total_approved: f64 = items
            .iter()
            .filter(|item| item.decision != Decision::Rejected)
            .map(|item| item.cost)
            .sum();
        Ok(ReportValidation {
            items,
            total_approved,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let (sink, mut notices) = ChannelSink::channel();
    let renderer = tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            let marker = match notice.phase {
                Phase::Started => ">",
                Phase::Completed => "+",
                Phase::Failed => "!",
                Phase::Progress => " ",
            };
            println!("{marker} {notice}");
        }
    });

    let workflow = audit_workflow_builder(
        Arc::new(SimulatedParser),
        Arc::new(SimulatedExtractor),
        Arc::new(SimulatedValidator),
    )
    .progress_sink(sink)
    .build()?;

    let files = [
        File::policy("data/policy.pdf", "policy.pdf"),
        File::report("data/report.pdf", "report.pdf"),
    ];
    let report = run_audit(&workflow, files).await?;

    // Dropping the workflow closes the channel so the renderer drains and exits.
    drop(workflow);
    renderer.await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
