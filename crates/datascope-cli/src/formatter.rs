//! Output formatters for command results.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use datascope_core::proto::StatementKind;
use datascope_core::PolicyDeclaration;
use serde::Serialize;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// One row of `check` output.
#[derive(Debug, Clone, Serialize)]
pub struct PolicySummary {
    pub target: String,
    pub mappings: Vec<String>,
    pub join: String,
}

impl PolicySummary {
    pub fn from_declaration(declaration: &PolicyDeclaration) -> Self {
        let mappings = declaration
            .mappings
            .iter()
            .map(|m| {
                let pairs: Vec<String> = m
                    .keys
                    .iter()
                    .zip(&m.values)
                    .map(|(k, v)| format!("{k} -> {v}"))
                    .collect();
                match &m.capability {
                    Some(cap) => format!("{} [unless {cap}]", pairs.join(", ")),
                    None => pairs.join(", "),
                }
            })
            .collect();
        Self {
            target: declaration.target.clone(),
            mappings,
            join: declaration
                .join
                .map(|j| j.to_string().to_lowercase())
                .unwrap_or_else(|| "default".to_string()),
        }
    }
}

/// Result of `explain`.
#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub query: String,
    pub kind: StatementKind,
    pub original: Option<String>,
    pub rewritten: Option<String>,
    pub outcome: String,
}

/// Trait for formatting output.
pub trait Formatter {
    /// Format the validated policy table.
    fn format_policies(&self, policies: &[PolicySummary]) -> String;

    /// Format an explained statement.
    fn format_explanation(&self, explanation: &Explanation) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_policies(&self, policies: &[PolicySummary]) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Target", "Mappings", "Join"]);
        for policy in policies {
            table.add_row(vec![
                Cell::new(&policy.target),
                Cell::new(policy.mappings.join("\n")),
                Cell::new(&policy.join),
            ]);
        }
        format!("{table}\n{} polic(ies) valid", policies.len())
    }

    fn format_explanation(&self, explanation: &Explanation) -> String {
        let none = || "<none>".to_string();
        let mut table = Table::new();
        table.set_header(vec!["Field", "Value"]);
        table.add_row(vec![Cell::new("query"), Cell::new(&explanation.query)]);
        table.add_row(vec![Cell::new("statement"), Cell::new(explanation.kind)]);
        table.add_row(vec![
            Cell::new("original"),
            Cell::new(explanation.original.clone().unwrap_or_else(none)),
        ]);
        table.add_row(vec![
            Cell::new("rewritten"),
            Cell::new(explanation.rewritten.clone().unwrap_or_else(none)),
        ]);
        table.add_row(vec![Cell::new("outcome"), Cell::new(&explanation.outcome)]);
        table.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_policies(&self, policies: &[PolicySummary]) -> String {
        serde_json::to_string_pretty(policies).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }

    fn format_explanation(&self, explanation: &Explanation) -> String {
        serde_json::to_string_pretty(explanation)
            .unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datascope_core::PolicyDeclarations;

    fn summaries() -> Vec<PolicySummary> {
        let decls = PolicyDeclarations::from_json(
            r#"[{ "target": "SysDeptMapper", "mappings": [{ "keys": ["deptName"], "values": ["dept_id"], "capability": "dept:all" }], "join": "or" }]"#,
        )
        .unwrap();
        decls.policies.iter().map(PolicySummary::from_declaration).collect()
    }

    #[test]
    fn test_summary() {
        let summary = &summaries()[0];
        assert_eq!(summary.mappings, vec!["deptName -> dept_id [unless dept:all]"]);
        assert_eq!(summary.join, "or");
    }

    #[test]
    fn test_table_output() {
        let output = TableFormatter.format_policies(&summaries());
        assert!(output.contains("SysDeptMapper"));
        assert!(output.ends_with("1 polic(ies) valid"));
    }

    #[test]
    fn test_json_explanation() {
        let explanation = Explanation {
            query: "SysDeptMapper.list".into(),
            kind: StatementKind::Select,
            original: None,
            rewritten: Some("(dept_id = 103)".into()),
            outcome: "filtered".into(),
        };
        let json: serde_json::Value =
            serde_json::from_str(&JsonFormatter.format_explanation(&explanation)).unwrap();
        assert_eq!(json["kind"], "select");
        assert_eq!(json["rewritten"], "(dept_id = 103)");
        assert!(json["original"].is_null());
    }
}
