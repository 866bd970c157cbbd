//! Result export as JSON or CSV.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use openkeywords_shared::{OpenKeywordsError, Result};

use crate::pipeline::PipelineResult;

const CSV_HEADERS: [&str; 10] = [
    "keyword",
    "intent",
    "score",
    "cluster",
    "is_question",
    "volume",
    "difficulty",
    "source",
    "has_featured_snippet",
    "has_paa",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    /// Pick a format from a file extension. Anything but `.csv` is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Self::Csv,
            _ => Self::Json,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Csv => "csv",
        })
    }
}

impl FromStr for ExportFormat {
    type Err = OpenKeywordsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(OpenKeywordsError::validation(format!(
                "unknown export format '{other}', expected json or csv"
            ))),
        }
    }
}

/// Render a result in the given format.
pub fn render(result: &PipelineResult, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => to_json(result),
        ExportFormat::Csv => Ok(to_csv(result)),
    }
}

pub fn to_json(result: &PipelineResult) -> Result<String> {
    serde_json::to_string_pretty(result).map_err(|e| OpenKeywordsError::Export(e.to_string()))
}

/// One row per keyword, in result order.
pub fn to_csv(result: &PipelineResult) -> String {
    let mut out = CSV_HEADERS.join(",");
    out.push('\n');
    for k in &result.keywords {
        let c = &k.scored.candidate;
        let m = &k.scored.metrics;
        let row = [
            c.keyword.clone(),
            c.intent.to_string(),
            k.score().to_string(),
            k.cluster_label().to_string(),
            c.is_question.to_string(),
            m.volume.to_string(),
            m.difficulty.to_string(),
            c.source.to_string(),
            m.has_featured_snippet.to_string(),
            m.has_paa.to_string(),
        ];
        let cells: Vec<String> = row.iter().map(|v| csv_cell(v)).collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}

/// Neutralize spreadsheet formulas by prefixing `'`.
fn sanitize(value: &str) -> String {
    if value.starts_with(['=', '+', '-', '@', '\t', '\r']) {
        format!("'{value}")
    } else {
        value.to_string()
    }
}

fn csv_cell(value: &str) -> String {
    let value = sanitize(value);
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value
    }
}
