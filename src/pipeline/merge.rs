//! Row merging: combine the rule guess with the model's answer.
//!
//! The model's fields win only when they are well-formed; anything else
//! keeps the rule value. After merging, the row is normalised so the CSV
//! invariants always hold:
//!
//! - percentage is a number in 0–100 with two decimals, or empty
//! - every flag is exactly 0 or 1
//! - a role's type is empty unless its flag is 1
//! - a row without a VC name has no percentage
//! - stock code and company name fall back to the filename cues

use crate::output::{round2, AppointmentType, OutputRow, ProspectusDocument, RuleGuess};
use crate::pipeline::llm::RefinedRow;
use serde_json::Value;
use tracing::debug;

/// Build the output row for one document.
pub fn merge_row(doc: &ProspectusDocument, guess: &RuleGuess, refined: Option<&RefinedRow>) -> OutputRow {
    let mut row = rules_row(doc, guess);
    if let Some(r) = refined {
        apply_refinement(&mut row, r, &doc.filename);
    }
    finalize(&mut row, doc);
    row
}

fn rules_row(doc: &ProspectusDocument, guess: &RuleGuess) -> OutputRow {
    let stock_code = guess
        .stock_code
        .clone()
        .or_else(|| doc.stock_code.clone())
        .unwrap_or_default();
    let company_name = guess
        .company_name
        .clone()
        .or_else(|| doc.company_name.clone())
        .unwrap_or_default();

    match &guess.top {
        Some(top) => OutputRow {
            stock_code,
            company_name,
            vc_name: top.institution_name.clone(),
            equity_percentage: top.equity_percentage,
            governs_director: top.governs_director,
            governs_supervisor: top.governs_supervisor,
            governs_executive: top.governs_executive,
            director_type: top.director_type,
            supervisor_type: top.supervisor_type,
            executive_type: top.executive_type,
        },
        None => OutputRow {
            stock_code,
            company_name,
            vc_name: String::new(),
            equity_percentage: None,
            governs_director: false,
            governs_supervisor: false,
            governs_executive: false,
            director_type: None,
            supervisor_type: None,
            executive_type: None,
        },
    }
}

fn apply_refinement(row: &mut OutputRow, r: &RefinedRow, filename: &str) {
    if let Some(code) = r.stock_code.as_ref().and_then(normalize_stock_code) {
        row.stock_code = code;
    }
    if let Some(name) = r.company_name.as_ref().and_then(non_empty_string) {
        row.company_name = name;
    }
    match r.vc_name.as_ref().and_then(non_empty_string) {
        Some(name) if is_explicit_none(&name) => row.vc_name.clear(),
        Some(name) => row.vc_name = name,
        None => {}
    }
    if let Some(p) = r.equity_percentage.as_ref().and_then(normalize_percentage) {
        row.equity_percentage = Some(p);
    }

    let flags = [
        (&r.governs_director, &mut row.governs_director),
        (&r.governs_supervisor, &mut row.governs_supervisor),
        (&r.governs_executive, &mut row.governs_executive),
    ];
    for (value, slot) in flags {
        if let Some(b) = value.as_ref().and_then(coerce_flag) {
            *slot = b;
        }
    }

    let types = [
        (&r.director_type, &mut row.director_type),
        (&r.supervisor_type, &mut row.supervisor_type),
        (&r.executive_type, &mut row.executive_type),
    ];
    for (value, slot) in types {
        if let Some(t) = value.as_ref().and_then(parse_type) {
            *slot = t;
        }
    }

    debug!("Merged LLM answer for {}: {:?}", filename, row);
}

fn finalize(row: &mut OutputRow, doc: &ProspectusDocument) {
    if row.stock_code.is_empty() {
        row.stock_code = doc.stock_code.clone().unwrap_or_default();
    }
    if row.company_name.is_empty() {
        row.company_name = doc.company_name.clone().unwrap_or_default();
    }
    row.equity_percentage = row
        .equity_percentage
        .filter(|p| p.is_finite())
        .map(|p| round2(p.clamp(0.0, 100.0)));
    if row.vc_name.is_empty() {
        row.equity_percentage = None;
    }
    if !row.governs_director {
        row.director_type = None;
    }
    if !row.governs_supervisor {
        row.supervisor_type = None;
    }
    if !row.governs_executive {
        row.executive_type = None;
    }
}

// ── Field coercion ───────────────────────────────────────────────────────

/// A 6-digit code, given as a string or as an integer that lost its zeros.
pub fn normalize_stock_code(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            let s = s.trim();
            (s.len() == 6 && s.bytes().all(|b| b.is_ascii_digit())).then(|| s.to_string())
        }
        Value::Number(n) => n
            .as_u64()
            .filter(|n| *n < 1_000_000)
            .map(|n| format!("{:06}", n)),
        _ => None,
    }
}

fn non_empty_string(v: &Value) -> Option<String> {
    v.as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn is_explicit_none(name: &str) -> bool {
    matches!(name, "无" | "（无）" | "(无)" | "无风投" | "不适用")
}

/// A percentage as a number or a numeric string with an optional `%`.
///
/// Values outside 0–100 are clamped; the result has two decimals.
pub fn normalize_percentage(v: &Value) -> Option<f64> {
    let raw = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s
            .trim()
            .trim_end_matches(['%', '％'])
            .trim()
            .parse::<f64>()
            .ok()?,
        _ => return None,
    };
    raw.is_finite().then(|| round2(raw.clamp(0.0, 100.0)))
}

/// `0/1`, `"0"/"1"`, booleans, or `"是"/"否"`.
pub fn coerce_flag(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64() {
            Some(x) if x == 0.0 => Some(false),
            Some(x) if x == 1.0 => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim() {
            "1" | "是" | "true" | "True" => Some(true),
            "0" | "否" | "false" | "False" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// One of the three labels, or an explicit empty string.
///
/// `Some(None)` clears the type; `None` means "not well-formed, keep".
pub fn parse_type(v: &Value) -> Option<Option<AppointmentType>> {
    let s = v.as_str()?.trim();
    if s.is_empty() {
        return Some(None);
    }
    AppointmentType::from_label(s).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::VcCandidate;
    use serde_json::json;
    use std::path::PathBuf;

    fn doc() -> ProspectusDocument {
        ProspectusDocument {
            path: PathBuf::from("input/000001_Acme控股.pdf"),
            filename: "000001_Acme控股.pdf".into(),
            pages: vec!["A创投 委派董事一名，持股12.5%".into()],
            stock_code: Some("000001".into()),
            company_name: Some("Acme控股".into()),
        }
    }

    fn guess() -> RuleGuess {
        let top = VcCandidate {
            institution_name: "A创投".into(),
            equity_percentage: Some(12.5),
            governs_director: true,
            governs_supervisor: false,
            governs_executive: false,
            director_type: None,
            supervisor_type: None,
            executive_type: None,
            first_offset: 0,
            context: String::new(),
        };
        RuleGuess {
            stock_code: Some("000001".into()),
            company_name: Some("Acme控股".into()),
            candidates: vec![top.clone()],
            top: Some(top),
        }
    }

    fn refined(v: Value) -> RefinedRow {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn rules_only_scenario_row() {
        let row = merge_row(&doc(), &guess(), None);
        assert_eq!(
            row.to_record(),
            ["000001", "Acme控股", "A创投", "12.5", "1", "0", "0", "", "", ""].map(String::from)
        );
    }

    #[test]
    fn well_formed_llm_fields_override() {
        let r = refined(json!({
            "最大风投机构名称": "B资本",
            "最大风投机构股权占比": "15.00%",
            "风投机构是否委派监事": "是",
            "风投机构委派监事的类型": "技术型",
            "风投机构委派董事的类型": "复合型"
        }));
        let row = merge_row(&doc(), &guess(), Some(&r));
        assert_eq!(row.vc_name, "B资本");
        assert_eq!(row.equity_percentage, Some(15.0));
        assert!(row.governs_director, "absent flag keeps rule value");
        assert!(row.governs_supervisor);
        assert_eq!(row.supervisor_type, Some(AppointmentType::Technical));
        assert_eq!(row.director_type, Some(AppointmentType::Composite));
    }

    #[test]
    fn malformed_fields_keep_rule_values() {
        let r = refined(json!({
            "股票代码": "1234",
            "公司简称": "",
            "最大风投机构名称": 42,
            "最大风投机构股权占比": "约一成",
            "风投机构是否委派董事": "maybe",
            "风投机构委派董事的类型": "管理型"
        }));
        let row = merge_row(&doc(), &guess(), Some(&r));
        assert_eq!(row, merge_row(&doc(), &guess(), None));
    }

    #[test]
    fn explicit_no_vc_clears_name_and_percentage() {
        let r = refined(json!({"最大风投机构名称": "（无）", "最大风投机构股权占比": "0%"}));
        let row = merge_row(&doc(), &guess(), Some(&r));
        assert_eq!(row.vc_name, "");
        assert_eq!(row.equity_percentage, None);
        assert_eq!(row.to_record()[3], "");
    }

    #[test]
    fn type_cleared_when_flag_is_zero() {
        let r = refined(json!({
            "风投机构是否委派董事": 0,
            "风投机构委派董事的类型": "财务型"
        }));
        let row = merge_row(&doc(), &guess(), Some(&r));
        assert!(!row.governs_director);
        assert_eq!(row.director_type, None);
    }

    #[test]
    fn identity_falls_back_to_filename() {
        let mut g = guess();
        g.stock_code = None;
        g.company_name = None;
        let row = merge_row(&doc(), &g, Some(&RefinedRow::default()));
        assert_eq!(row.stock_code, "000001");
        assert_eq!(row.company_name, "Acme控股");
    }

    #[test]
    fn stock_code_forms() {
        assert_eq!(normalize_stock_code(&json!("300750")).as_deref(), Some("300750"));
        assert_eq!(normalize_stock_code(&json!(" 000001 ")).as_deref(), Some("000001"));
        assert_eq!(normalize_stock_code(&json!(1)).as_deref(), Some("000001"));
        assert_eq!(normalize_stock_code(&json!(1234567)), None);
        assert_eq!(normalize_stock_code(&json!("30075")), None);
        assert_eq!(normalize_stock_code(&json!(-5)), None);
        assert_eq!(normalize_stock_code(&json!(null)), None);
    }

    #[test]
    fn percentage_forms() {
        assert_eq!(normalize_percentage(&json!(12.5)), Some(12.5));
        assert_eq!(normalize_percentage(&json!("8.00%")), Some(8.0));
        assert_eq!(normalize_percentage(&json!(" 3.333％ ")), Some(3.33));
        assert_eq!(normalize_percentage(&json!(150)), Some(100.0));
        assert_eq!(normalize_percentage(&json!(-2)), Some(0.0));
        assert_eq!(normalize_percentage(&json!("")), None);
        assert_eq!(normalize_percentage(&json!("n/a")), None);
        assert_eq!(normalize_percentage(&json!(true)), None);
    }

    #[test]
    fn flag_forms() {
        assert_eq!(coerce_flag(&json!(1)), Some(true));
        assert_eq!(coerce_flag(&json!("0")), Some(false));
        assert_eq!(coerce_flag(&json!(true)), Some(true));
        assert_eq!(coerce_flag(&json!("否")), Some(false));
        assert_eq!(coerce_flag(&json!(2)), None);
        assert_eq!(coerce_flag(&json!("yes please")), None);
        assert_eq!(coerce_flag(&json!([1])), None);
    }

    #[test]
    fn flags_are_always_binary_under_malformed_answers() {
        let junk = [
            json!(null),
            json!(""),
            json!("2"),
            json!(-1),
            json!(0.5),
            json!({"x": 1}),
            json!([0, 1]),
            json!("是的"),
            json!(f64::MAX),
        ];
        for v in &junk {
            let r = refined(json!({
                "风投机构是否委派董事": v,
                "风投机构是否委派监事": v,
                "风投机构是否委派高管": v,
                "最大风投机构股权占比": v,
                "风投机构委派董事的类型": v
            }));
            let rec = merge_row(&doc(), &guess(), Some(&r)).to_record();
            for cell in &rec[4..7] {
                assert!(cell == "0" || cell == "1", "value {v} gave flag {cell:?}");
            }
            assert!(rec[3].is_empty() || rec[3].parse::<f64>().is_ok());
        }
    }
}
