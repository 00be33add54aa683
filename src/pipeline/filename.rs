//! Filename cues: stock code and company short name from the file name.
//!
//! Prospectus collections are usually named `300750_宁德时代.pdf`,
//! `宁德时代-300750-招股说明书.pdf` or `宁德时代：首次公开发行股票招股说明书.pdf`.
//! The code is the first run of exactly six digits; the short name is the
//! first delimiter-separated segment that is not the code, cut before any
//! boilerplate title.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

/// Cues derived from a file name. Either may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilenameCues {
    pub stock_code: Option<String>,
    pub company_name: Option<String>,
}

// A six-digit run not touching other digits. The regex crate has no
// lookaround, so the neighbours are matched and the run is group 1.
static RE_SIX_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^0-9])([0-9]{6})(?:[^0-9]|$)").unwrap());

static RE_DELIMITERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[_\-—–·、,，:：;；\s()（）\[\]【】]+").unwrap());

/// Title boilerplate that follows the company name.
const TITLE_MARKERS: &[&str] = &[
    "首次公开发行",
    "公开发行",
    "招股说明书",
    "招股意向书",
    "申报稿",
    "注册稿",
    "上会稿",
    "披露稿",
    "股份有限公司",
];

/// Parse the stock code and company short name from a file name.
///
/// Accepts a bare name or a path; only the final component is used and the
/// extension is ignored.
pub fn parse_filename(filename: &str) -> FilenameCues {
    let path = Path::new(filename);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string());

    let stock_code = RE_SIX_DIGITS
        .captures(&stem)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    let company_name = RE_DELIMITERS
        .split(&stem)
        .map(str::trim)
        .filter(|seg| !seg.is_empty())
        // The code may be glued to the name ("300001特锐德").
        .map(|seg| match stock_code.as_deref() {
            Some(code) => seg.replacen(code, "", 1),
            None => seg.to_string(),
        })
        .find_map(|seg| strip_title(&seg));

    FilenameCues {
        stock_code,
        company_name,
    }
}

/// Cut a segment before its first title marker; reject what is left if it
/// carries no name.
fn strip_title(segment: &str) -> Option<String> {
    let cut = TITLE_MARKERS
        .iter()
        .filter_map(|m| segment.find(m))
        .min()
        .unwrap_or(segment.len());
    let name = segment[..cut].trim();
    if name.is_empty() || name.chars().all(|c| c.is_ascii_digit()) {
        None
    } else {
        Some(name.to_string())
    }
}
