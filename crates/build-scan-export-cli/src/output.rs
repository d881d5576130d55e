//! Rendering of fetched records.

use anyhow::Result;
use build_scan_export::BuildValidationRecord;
use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Json,
}

const CSV_HEADER: [&str; 9] = [
    "Root Project Name",
    "Gradle Enterprise Server",
    "Build Scan",
    "Build Scan ID",
    "Git URL",
    "Git Branch",
    "Git Commit ID",
    "Requested Tasks",
    "Build Outcome",
];

pub fn render(format: OutputFormat, records: &[BuildValidationRecord]) -> Result<String> {
    match format {
        OutputFormat::Csv => Ok(render_csv(records)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(records)? + "\n"),
    }
}

pub fn render_csv(records: &[BuildValidationRecord]) -> String {
    let mut out = csv_line(CSV_HEADER.iter().map(|h| h.to_string()));
    for record in records {
        out.push_str(&csv_line(csv_row(record)));
    }
    out
}

fn csv_row(record: &BuildValidationRecord) -> [String; 9] {
    let outcome = if record.build_successful() {
        "SUCCESS"
    } else {
        "FAILED"
    };
    [
        record.root_project_name().to_string(),
        record.server_url().to_string(),
        record.build_scan_url(),
        record.build_scan_id().to_string(),
        record.git_url().to_string(),
        record.git_branch().to_string(),
        record.git_commit_id().to_string(),
        record.requested_tasks().join(" "),
        outcome.to_string(),
    ]
}

fn csv_line(values: impl IntoIterator<Item = String>) -> String {
    let mut line = values
        .into_iter()
        .map(|v| escape_csv(&v))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

fn escape_csv(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
