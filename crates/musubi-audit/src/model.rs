//! Documents and results carried through the audit pipeline.

use crate::error::AuditError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a submitted document is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentRole {
    /// The insurance policy the rules are extracted from.
    Policy,
    /// The repair report whose line items are audited.
    Report,
}

impl fmt::Display for DocumentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentRole::Policy => write!(f, "policy"),
            DocumentRole::Report => write!(f, "report"),
        }
    }
}

/// A document submitted for auditing.
///
/// Path and display name travel together so progress output and results
/// always refer to the same file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
    /// Full path or URI of the document.
    pub path: String,
    /// Display name, usually the original file name.
    pub name: String,
    /// Role of the document in the audit.
    pub role: DocumentRole,
}

impl File {
    /// Creates a new file descriptor.
    pub fn new(path: impl Into<String>, name: impl Into<String>, role: DocumentRole) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            role,
        }
    }

    /// Creates a policy document descriptor.
    pub fn policy(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(path, name, DocumentRole::Policy)
    }

    /// Creates a report document descriptor.
    pub fn report(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(path, name, DocumentRole::Report)
    }
}

/// One structural element detected on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageItem {
    /// A heading with its outline level (1 is top level).
    Heading { level: u8, text: String },
    /// A table as rows of cells.
    Table { rows: Vec<Vec<String>> },
    /// A run of body text.
    Text { text: String },
}

impl PageItem {
    /// Plain-text rendition of the item.
    pub fn text(&self) -> String {
        match self {
            PageItem::Heading { text, .. } | PageItem::Text { text } => text.clone(),
            PageItem::Table { rows } => rows
                .iter()
                .map(|row| row.join(" | "))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Markdown rendition of the item.
    pub fn markdown(&self) -> String {
        match self {
            PageItem::Heading { level, text } => {
                format!("{} {text}", "#".repeat(usize::from((*level).max(1))))
            }
            PageItem::Text { text } => text.clone(),
            PageItem::Table { rows } => rows
                .iter()
                .map(|row| format!("| {} |", row.join(" | ")))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A single parsed page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// One-based page number.
    pub number: u32,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(default)]
    pub items: Vec<PageItem>,
}

/// A node in the heading outline of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heading {
    pub heading: String,
    pub level: u8,
    pub subheadings: Vec<Heading>,
}

/// Structured output of the document parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    /// Parser job id. Merged results join their ids with `|`.
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    pub text: String,
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(default)]
    pub page_count: usize,
}

impl ParseResult {
    /// Returns every table as `(page number, item)` pairs in page order.
    pub fn tables(&self) -> Vec<(u32, &PageItem)> {
        self.pages
            .iter()
            .flat_map(|page| {
                page.items
                    .iter()
                    .filter(|item| matches!(item, PageItem::Table { .. }))
                    .map(move |item| (page.number, item))
            })
            .collect()
    }

    /// Total number of tables detected.
    pub fn table_count(&self) -> usize {
        self.tables().len()
    }

    /// Page numbers in ascending order.
    pub fn page_numbers(&self) -> Vec<u32> {
        let mut numbers: Vec<u32> = self.pages.iter().map(|page| page.number).collect();
        numbers.sort_unstable();
        numbers
    }

    /// Builds the heading outline.
    ///
    /// A heading nests under the closest preceding heading with a lower level.
    pub fn headings(&self) -> Vec<Heading> {
        let mut root = Vec::new();
        for item in self.pages.iter().flat_map(|page| page.items.iter()) {
            if let PageItem::Heading { level, text } = item {
                insert_heading(
                    &mut root,
                    Heading {
                        heading: text.clone(),
                        level: *level,
                        subheadings: Vec::new(),
                    },
                );
            }
        }
        root
    }

    /// Renders the heading outline as an indented bullet list.
    pub fn headings_text(&self) -> String {
        let mut lines = Vec::new();
        format_headings(&self.headings(), 0, &mut lines);
        lines.join("\n")
    }

    /// Returns a copy restricted to the given page numbers.
    ///
    /// An empty selection keeps every page.
    pub fn filter_by_pages(&self, selected: &[u32]) -> ParseResult {
        if selected.is_empty() {
            return self.clone();
        }
        let pages: Vec<Page> = self
            .pages
            .iter()
            .filter(|page| selected.contains(&page.number))
            .cloned()
            .collect();
        self.rebuild(pages)
    }

    /// Extracts the section under a heading path, subheadings included.
    ///
    /// `path` lists heading texts from the top level down to the target. The
    /// section ends at the next heading whose level is equal to or above the
    /// target's. Returns `None` for an empty path or when no heading matches.
    pub fn section(&self, path: &[&str]) -> Option<ParseResult> {
        if path.is_empty() {
            return None;
        }

        let mut outline: Vec<(u8, &str)> = Vec::new();
        let mut section_level: Option<u8> = None;
        let mut collected: Vec<(&Page, Vec<&PageItem>)> = Vec::new();

        for page in &self.pages {
            let mut items = Vec::new();
            let mut ended = false;
            for item in &page.items {
                if let PageItem::Heading { level, text } = item {
                    while outline.last().is_some_and(|(open, _)| *open >= *level) {
                        outline.pop();
                    }
                    outline.push((*level, text.as_str()));

                    match section_level {
                        None if outline.iter().map(|(_, t)| *t).eq(path.iter().copied()) => {
                            section_level = Some(*level);
                        }
                        Some(target) if *level <= target => {
                            ended = true;
                            break;
                        }
                        _ => {}
                    }
                }
                if section_level.is_some() {
                    items.push(item);
                }
            }

            if !items.is_empty() {
                collected.push((page, items));
            }
            if ended {
                break;
            }
        }

        if collected.is_empty() {
            return None;
        }

        let pages = collected
            .into_iter()
            .map(|(page, items)| {
                let texts: Vec<String> = items
                    .iter()
                    .map(|item| item.text())
                    .filter(|text| !text.is_empty())
                    .collect();
                let markdowns: Vec<String> = items
                    .iter()
                    .map(|item| item.markdown())
                    .filter(|md| !md.is_empty())
                    .collect();
                Page {
                    number: page.number,
                    text: texts.join("\n\n"),
                    markdown: (!markdowns.is_empty()).then(|| markdowns.join("\n\n")),
                    items: items.into_iter().cloned().collect(),
                }
            })
            .collect();
        Some(self.rebuild(pages))
    }

    fn rebuild(&self, pages: Vec<Page>) -> ParseResult {
        let texts: Vec<&str> = pages
            .iter()
            .map(|page| page.text.as_str())
            .filter(|text| !text.is_empty())
            .collect();
        let markdowns: Vec<&str> = pages
            .iter()
            .filter_map(|page| page.markdown.as_deref())
            .filter(|md| !md.is_empty())
            .collect();

        ParseResult {
            job_id: self.job_id.clone(),
            markdown: (!markdowns.is_empty()).then(|| markdowns.join("\n\n")),
            text: texts.join("\n\n"),
            page_count: pages.len(),
            pages,
        }
    }

    /// Merges several results into one document with continuous page numbering.
    ///
    /// When `source_names` are given, each document's markdown is preceded by
    /// a `## Document: <name>` header. A single result is returned unchanged.
    pub fn merge(
        results: Vec<ParseResult>,
        source_names: &[String],
    ) -> Result<ParseResult, AuditError> {
        if results.len() <= 1 {
            return results.into_iter().next().ok_or(AuditError::EmptyMerge);
        }

        let job_id = results
            .iter()
            .map(|r| r.job_id.as_str())
            .collect::<Vec<_>>()
            .join("|");
        let mut pages = Vec::new();
        let mut markdowns: Vec<String> = Vec::new();
        let mut texts: Vec<String> = Vec::new();
        let mut offset = 0u32;

        for (index, result) in results.into_iter().enumerate() {
            if let Some(name) = source_names.get(index) {
                if markdowns.is_empty() {
                    markdowns.push(format!("## Document: {name}\n\n"));
                } else {
                    markdowns.push(format!("\n\n---\n\n## Document: {name}\n\n"));
                }
            }
            if let Some(markdown) = result.markdown.filter(|md| !md.is_empty()) {
                markdowns.push(markdown);
            }
            if !result.text.is_empty() {
                texts.push(result.text);
            }

            let page_count = u32::try_from(result.page_count).unwrap_or(u32::MAX);
            pages.extend(result.pages.into_iter().map(|page| Page {
                number: page.number.saturating_add(offset),
                ..page
            }));
            offset = offset.saturating_add(page_count);
        }

        Ok(ParseResult {
            job_id,
            markdown: (!markdowns.is_empty()).then(|| markdowns.join("\n\n")),
            text: texts.join("\n\n"),
            page_count: pages.len(),
            pages,
        })
    }

    /// The best textual rendition: markdown when present, plain text otherwise.
    pub fn content(&self) -> &str {
        self.markdown
            .as_deref()
            .filter(|md| !md.is_empty())
            .unwrap_or(&self.text)
    }
}

fn insert_heading(siblings: &mut Vec<Heading>, heading: Heading) {
    match siblings.last_mut() {
        Some(last) if last.level < heading.level => insert_heading(&mut last.subheadings, heading),
        _ => siblings.push(heading),
    }
}

fn format_headings(headings: &[Heading], depth: usize, lines: &mut Vec<String>) {
    for heading in headings {
        lines.push(format!("{}- {}", "  ".repeat(depth), heading.heading));
        format_headings(&heading.subheadings, depth + 1, lines);
    }
}

/// Operational rules extracted from a policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRules {
    /// Short statements of the relevant limits and exclusions.
    pub key_rules: Vec<String>,
    /// Deductible as a fraction, e.g. `0.05`.
    pub deductible: f64,
}

impl ExtractedRules {
    /// Formats the rules as the context handed to the report validator.
    pub fn context_summary(&self) -> String {
        let mut summary = format!("Deductible: {}\nRules:", self.deductible);
        for rule in &self.key_rules {
            summary.push_str("\n- ");
            summary.push_str(rule);
        }
        summary
    }
}

/// Verdict on one report line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    #[serde(rename = "APROBADO")]
    Approved,
    #[serde(rename = "RECHAZADO")]
    Rejected,
    #[serde(rename = "JUSTIFICADO_POR_NOTA")]
    JustifiedByNote,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Approved => write!(f, "APROBADO"),
            Decision::Rejected => write!(f, "RECHAZADO"),
            Decision::JustifiedByNote => write!(f, "JUSTIFICADO_POR_NOTA"),
        }
    }
}

/// Validation of a single report line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemCheck {
    /// Part or service name.
    pub item: String,
    /// Cost exactly as invoiced.
    pub cost: f64,
    pub decision: Decision,
    pub explanation: String,
}

/// Line-by-line validation of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportValidation {
    pub items: Vec<ItemCheck>,
    pub total_approved: f64,
}

impl ReportValidation {
    /// Number of lines with the given decision.
    pub fn count(&self, decision: Decision) -> usize {
        self.items
            .iter()
            .filter(|item| item.decision == decision)
            .count()
    }
}

/// Terminal result of an audit run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub validated_items: Vec<ItemCheck>,
    pub total_approved: f64,
    pub extracted_rules: ExtractedRules,
}

impl AuditReport {
    /// Combines a validation with the rules it was checked against.
    pub fn new(validation: ReportValidation, extracted_rules: ExtractedRules) -> Self {
        Self {
            validated_items: validation.items,
            total_approved: validation.total_approved,
            extracted_rules,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heading(level: u8, text: &str) -> PageItem {
        PageItem::Heading {
            level,
            text: text.to_string(),
        }
    }

    fn page(number: u32, text: &str, items: Vec<PageItem>) -> Page {
        Page {
            number,
            text: text.to_string(),
            markdown: Some(format!("# {text}")),
            items,
        }
    }

    fn parsed(job_id: &str, pages: Vec<Page>) -> ParseResult {
        let texts: Vec<String> = pages.iter().map(|p| p.text.clone()).collect();
        ParseResult {
            job_id: job_id.to_string(),
            markdown: Some(format!("markdown of {job_id}")),
            text: texts.join("\n\n"),
            page_count: pages.len(),
            pages,
        }
    }

    #[test]
    fn test_headings_build_outline() {
        let result = parsed(
            "job",
            vec![
                page(1, "one", vec![heading(1, "Coverage"), heading(2, "Paint")]),
                page(
                    2,
                    "two",
                    vec![heading(2, "Hidden damage"), heading(3, "Notes"), heading(1, "Exclusions")],
                ),
            ],
        );

        let outline = result.headings();
        assert_eq!(outline.len(), 2);
        assert_eq!(outline[0].heading, "Coverage");
        assert_eq!(outline[0].subheadings.len(), 2);
        assert_eq!(outline[0].subheadings[1].subheadings[0].heading, "Notes");
        assert_eq!(outline[1].heading, "Exclusions");

        assert_eq!(
            result.headings_text(),
            "- Coverage\n  - Paint\n  - Hidden damage\n    - Notes\n- Exclusions"
        );
    }

    #[test]
    fn test_tables_and_page_numbers() {
        let table = PageItem::Table {
            rows: vec![vec!["Paint".to_string(), "4500".to_string()]],
        };
        let result = parsed(
            "job",
            vec![
                page(3, "three", vec![table.clone()]),
                page(1, "one", vec![table.clone(), table]),
            ],
        );

        assert_eq!(result.table_count(), 3);
        assert_eq!(result.tables()[0].0, 3);
        assert_eq!(result.page_numbers(), vec![1, 3]);
    }

    #[test]
    fn test_filter_by_pages() {
        let result = parsed(
            "job",
            vec![page(1, "one", vec![]), page(2, "two", vec![]), page(3, "three", vec![])],
        );

        let filtered = result.filter_by_pages(&[1, 3]);
        assert_eq!(filtered.page_count, 2);
        assert_eq!(filtered.text, "one\n\nthree");
        assert_eq!(filtered.markdown.as_deref(), Some("# one\n\n# three"));
        assert_eq!(filtered.job_id, "job");

        assert_eq!(result.filter_by_pages(&[]), result);
    }

    #[test]
    fn test_merge_renumbers_pages() {
        let first = parsed("a", vec![page(1, "one", vec![]), page(2, "two", vec![])]);
        let second = parsed("b", vec![page(1, "uno", vec![])]);
        let names = vec!["first.pdf".to_string(), "second.pdf".to_string()];

        let merged = ParseResult::merge(vec![first, second], &names).unwrap();

        assert_eq!(merged.job_id, "a|b");
        assert_eq!(merged.page_numbers(), vec![1, 2, 3]);
        assert_eq!(merged.page_count, 3);
        assert_eq!(merged.text, "one\n\ntwo\n\nuno");
        let markdown = merged.markdown.unwrap();
        assert!(markdown.starts_with("## Document: first.pdf"));
        assert!(markdown.contains("---\n\n## Document: second.pdf"));
    }

    #[test]
    fn test_merge_edge_cases() {
        assert!(matches!(
            ParseResult::merge(Vec::new(), &[]),
            Err(AuditError::EmptyMerge)
        ));

        let single = parsed("only", vec![page(4, "four", vec![])]);
        assert_eq!(ParseResult::merge(vec![single.clone()], &[]).unwrap(), single);
    }

    #[test]
    fn test_content_prefers_markdown() {
        let mut result = parsed("job", vec![page(1, "plain", vec![])]);
        assert_eq!(result.content(), "markdown of job");

        result.markdown = Some(String::new());
        assert_eq!(result.content(), "plain");
        result.markdown = None;
        assert_eq!(result.content(), "plain");
    }

    fn body(text: &str) -> PageItem {
        PageItem::Text {
            text: text.to_string(),
        }
    }

    fn policy_with_sections() -> ParseResult {
        parsed(
            "job",
            vec![
                page(
                    1,
                    "one",
                    vec![
                        heading(1, "Coverage"),
                        body("Covered repairs."),
                        heading(2, "Paint"),
                        body("Capped at $4,000."),
                    ],
                ),
                page(
                    2,
                    "two",
                    vec![
                        heading(2, "Hidden damage"),
                        body("Needs a technical note."),
                        PageItem::Table {
                            rows: vec![
                                vec!["Part".to_string(), "Note".to_string()],
                                vec!["Absorber".to_string(), "fracture".to_string()],
                            ],
                        },
                        heading(3, "Notes"),
                        body("Photos required."),
                        heading(1, "Exclusions"),
                        body("Maintenance."),
                    ],
                ),
                page(3, "three", vec![body("Wear and tear.")]),
            ],
        )
    }

    #[test]
    fn test_section_by_nested_path() {
        let section = policy_with_sections()
            .section(&["Coverage", "Hidden damage"])
            .unwrap();

        assert_eq!(section.job_id, "job");
        assert_eq!(section.page_numbers(), vec![2]);
        assert_eq!(section.pages[0].items.len(), 5);
        assert_eq!(
            section.text,
            "Hidden damage\n\nNeeds a technical note.\n\nPart | Note\nAbsorber | fracture\n\nNotes\n\nPhotos required."
        );
        assert_eq!(
            section.markdown.as_deref(),
            Some("## Hidden damage\n\nNeeds a technical note.\n\n| Part | Note |\n| Absorber | fracture |\n\n### Notes\n\nPhotos required.")
        );

        let paint = policy_with_sections().section(&["Coverage", "Paint"]).unwrap();
        assert_eq!(paint.page_numbers(), vec![1]);
        assert_eq!(paint.text, "Paint\n\nCapped at $4,000.");
    }

    #[test]
    fn test_section_spans_pages() {
        let coverage = policy_with_sections().section(&["Coverage"]).unwrap();
        assert_eq!(coverage.page_numbers(), vec![1, 2]);
        assert_eq!(coverage.page_count, 2);
        assert!(coverage.text.starts_with("Coverage\n\nCovered repairs."));
        assert!(coverage.text.contains("Photos required."));
        assert!(!coverage.text.contains("Exclusions"));
        assert!(!coverage.text.contains("Maintenance."));

        let exclusions = policy_with_sections().section(&["Exclusions"]).unwrap();
        assert_eq!(exclusions.page_numbers(), vec![2, 3]);
        assert_eq!(exclusions.pages[1].text, "Wear and tear.");
        assert_eq!(
            exclusions.text,
            "Exclusions\n\nMaintenance.\n\nWear and tear."
        );
    }

    #[test]
    fn test_section_unknown_path() {
        let result = policy_with_sections();
        assert!(result.section(&["Deductibles"]).is_none());
        assert!(result.section(&["Paint"]).is_none());
        assert!(result.section(&["Coverage", "Exclusions"]).is_none());
        assert!(result.section(&[]).is_none());
    }

    #[test]
    fn test_rules_context_summary() {
        let rules = ExtractedRules {
            key_rules: vec!["Paint capped at $4500".to_string(), "No maintenance".to_string()],
            deductible: 0.05,
        };
        assert_eq!(
            rules.context_summary(),
            "Deductible: 0.05\nRules:\n- Paint capped at $4500\n- No maintenance"
        );
    }

    #[test]
    fn test_decision_wire_names() {
        let check = ItemCheck {
            item: "Bumper absorber".to_string(),
            cost: 1200.0,
            decision: Decision::JustifiedByNote,
            explanation: "Technical note reports a fracture".to_string(),
        };
        let json = serde_json::to_value(&check).unwrap();
        assert_eq!(json["decision"], "JUSTIFICADO_POR_NOTA");

        let decoded: Decision = serde_json::from_str("\"RECHAZADO\"").unwrap();
        assert_eq!(decoded, Decision::Rejected);
        assert_eq!(Decision::Approved.to_string(), "APROBADO");
    }

    #[test]
    fn test_report_from_validation() {
        let validation = ReportValidation {
            items: vec![
                ItemCheck {
                    item: "Paint".to_string(),
                    cost: 5000.0,
                    decision: Decision::Rejected,
                    explanation: "Exceeds the $4,000 cap".to_string(),
                },
                ItemCheck {
                    item: "Labor".to_string(),
                    cost: 800.0,
                    decision: Decision::Approved,
                    explanation: "Within limits".to_string(),
                },
            ],
            total_approved: 800.0,
        };
        assert_eq!(validation.count(Decision::Rejected), 1);

        let rules = ExtractedRules {
            key_rules: vec![],
            deductible: 0.1,
        };
        let report = AuditReport::new(validation, rules.clone());
        assert_eq!(report.validated_items.len(), 2);
        assert_eq!(report.total_approved, 800.0);
        assert_eq!(report.extracted_rules, rules);
    }
}
