//! Data model shared by every pipeline stage.
//!
//! A [`ProspectusDocument`] is built once per input file and dropped as soon
//! as its [`OutputRow`] has been appended to the results file. Nothing here
//! is shared across files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// CSV header, in output column order.
pub const FIELDNAMES: [&str; 10] = [
    "股票代码",
    "公司简称",
    "最大风投机构名称",
    "最大风投机构股权占比",
    "风投机构是否委派董事",
    "风投机构是否委派监事",
    "风投机构是否委派高管",
    "风投机构委派董事的类型",
    "风投机构委派监事的类型",
    "风投机构委派高管的类型",
];

/// One prospectus after text extraction.
#[derive(Debug, Clone)]
pub struct ProspectusDocument {
    /// Path the document was read from.
    pub path: PathBuf,
    /// File name component of `path`.
    pub filename: String,
    /// Extracted text, one entry per page, in page order.
    pub pages: Vec<String>,
    /// Stock code derived from the filename.
    pub stock_code: Option<String>,
    /// Company short name derived from the filename.
    pub company_name: Option<String>,
}

impl ProspectusDocument {
    /// All pages joined with newlines.
    pub fn full_text(&self) -> String {
        self.pages.join("\n")
    }
}

/// Background of a nominee placed on the board, the supervisory board or
/// in senior management by a VC shareholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentType {
    /// 财务型: finance or investment background only.
    Financial,
    /// 技术型: technical or R&D background only.
    Technical,
    /// 复合型: both, or several nominees of different kinds.
    Composite,
}

impl AppointmentType {
    /// The label written to the CSV.
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentType::Financial => "财务型",
            AppointmentType::Technical => "技术型",
            AppointmentType::Composite => "复合型",
        }
    }

    /// Parse one of the three CSV labels.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "财务型" => Some(AppointmentType::Financial),
            "技术型" => Some(AppointmentType::Technical),
            "复合型" => Some(AppointmentType::Composite),
            _ => None,
        }
    }

    /// Classify from the presence of financial/technical background cues.
    pub fn from_cues(financial: bool, technical: bool) -> Option<Self> {
        match (financial, technical) {
            (true, true) => Some(AppointmentType::Composite),
            (true, false) => Some(AppointmentType::Financial),
            (false, true) => Some(AppointmentType::Technical),
            (false, false) => None,
        }
    }
}

impl fmt::Display for AppointmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A VC institution found by the rule engine, aggregated over all of its
/// mentions in one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VcCandidate {
    pub institution_name: String,
    /// Largest percentage found near any mention, 0–100, two decimals.
    pub equity_percentage: Option<f64>,
    pub governs_director: bool,
    pub governs_supervisor: bool,
    pub governs_executive: bool,
    pub director_type: Option<AppointmentType>,
    pub supervisor_type: Option<AppointmentType>,
    pub executive_type: Option<AppointmentType>,
    /// Byte offset of the first mention in the document text.
    pub first_offset: usize,
    /// Text window around the most informative mention, used as LLM evidence.
    pub context: String,
}

/// Everything the rule engine concluded about one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleGuess {
    pub stock_code: Option<String>,
    pub company_name: Option<String>,
    /// All candidates, ordered by first mention.
    pub candidates: Vec<VcCandidate>,
    /// The largest VC holder, if any candidate was found.
    pub top: Option<VcCandidate>,
}

/// The validated output row for one prospectus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRow {
    pub stock_code: String,
    pub company_name: String,
    pub vc_name: String,
    pub equity_percentage: Option<f64>,
    pub governs_director: bool,
    pub governs_supervisor: bool,
    pub governs_executive: bool,
    pub director_type: Option<AppointmentType>,
    pub supervisor_type: Option<AppointmentType>,
    pub executive_type: Option<AppointmentType>,
}

impl OutputRow {
    /// Render the row as ten CSV cells in [`FIELDNAMES`] order.
    pub fn to_record(&self) -> [String; 10] {
        let flag = |b: bool| if b { "1".to_string() } else { "0".to_string() };
        let kind = |t: Option<AppointmentType>| t.map(|t| t.as_str().to_string()).unwrap_or_default();
        [
            self.stock_code.clone(),
            self.company_name.clone(),
            self.vc_name.clone(),
            self.equity_percentage
                .map(format_percentage)
                .unwrap_or_default(),
            flag(self.governs_director),
            flag(self.governs_supervisor),
            flag(self.governs_executive),
            kind(self.director_type),
            kind(self.supervisor_type),
            kind(self.executive_type),
        ]
    }
}

/// Format a percentage with at most two decimals and no trailing zeros:
/// `12.5 → "12.5"`, `8.0 → "8"`, `33.333 → "33.33"`.
pub fn format_percentage(value: f64) -> String {
    let s = format!("{:.2}", round2(value));
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Summary of one run over the input directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Files found in the input directory.
    pub files_found: usize,
    /// Rows appended to the results file.
    pub rows_written: usize,
    /// Files skipped because text extraction failed.
    pub files_skipped: usize,
    /// Rows where the LLM pass succeeded.
    pub refined: usize,
    /// Rows that fell back to the rule-engine guess after an LLM failure.
    pub refinement_failures: usize,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
}
