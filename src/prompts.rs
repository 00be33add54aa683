//! Prompts for the LLM refinement pass.
//!
//! All wording lives here so the field rules can be tuned in one place and
//! inspected in unit tests without calling a model.
//!
//! The system prompt states the ten output fields and how to fill them. The
//! user message is either the rule engine's candidate list with evidence
//! snippets ([`candidate_prompt`]) or the whole prospectus text
//! ([`full_text_prompt`]).

use crate::output::{format_percentage, RuleGuess, FIELDNAMES};
use std::fmt::Write;

/// Candidates beyond this many are left out of the prompt.
pub const MAX_PROMPT_CANDIDATES: usize = 20;

/// System prompt: output contract and field rules.
pub const SYSTEM_PROMPT: &str = r#"你是资本市场研究助手，负责从中国A股招股说明书中提取风险投资（风投/创投）股东信息。
请只输出一个 JSON 对象，不要 Markdown 代码块，不要任何解释文字。字段要求：
- "股票代码": 6位数字字符串；无法确定则为空字符串。
- "公司简称": 发行人简称；无法确定则为空字符串。
- "最大风投机构名称": 持股比例最高的风投/创投机构名称（非自然人、非产业方）。若无风投股东填"（无）"。
- "最大风投机构股权占比": 该机构持股比例，形式如"8.00%"；若无填""。
- "风投机构是否委派董事": 若任一风投机构（直接或通过关联方）委派董事填"1"，否则填"0"。
- "风投机构是否委派监事": 若任一风投机构委派监事填"1"，否则填"0"。
- "风投机构是否委派高管": 若任一风投机构委派高级管理人员填"1"，否则填"0"。
- "风投机构委派董事的类型": "财务型"/"技术型"/"复合型"；未委派则为空字符串。
- "风投机构委派监事的类型": 同上。
- "风投机构委派高管的类型": 同上。

类型判别：仅有金融/投资背景为"财务型"；仅有技术/研发背景为"技术型"；兼具两者，或多名人员各属一种，为"复合型"。"#;

/// User message for candidate mode: filename, rule guess and evidence.
pub fn candidate_prompt(filename: &str, guess: &RuleGuess) -> String {
    let mut p = String::new();
    let _ = writeln!(p, "文件名: {}", filename);
    let _ = writeln!(p, "规则识别的股票代码: {}", guess.stock_code.as_deref().unwrap_or(""));
    let _ = writeln!(p, "规则识别的公司简称: {}", guess.company_name.as_deref().unwrap_or(""));

    match &guess.top {
        Some(top) => {
            let _ = writeln!(
                p,
                "规则初判的最大风投机构: {}（{}）",
                top.institution_name,
                top.equity_percentage
                    .map(|v| format!("{}%", format_percentage(v)))
                    .unwrap_or_else(|| "持股比例未知".to_string())
            );
        }
        None => {
            let _ = writeln!(p, "规则初判的最大风投机构: （无）");
        }
    }

    let _ = writeln!(p);
    if guess.candidates.is_empty() {
        let _ = writeln!(p, "未在正文中识别到候选机构。");
    } else {
        let _ = writeln!(p, "候选机构及原文片段:");
        for (i, c) in guess.candidates.iter().take(MAX_PROMPT_CANDIDATES).enumerate() {
            let _ = writeln!(
                p,
                "{}. {} | 持股: {} | 董事:{} 监事:{} 高管:{}",
                i + 1,
                c.institution_name,
                c.equity_percentage
                    .map(|v| format!("{}%", format_percentage(v)))
                    .unwrap_or_default(),
                c.governs_director as u8,
                c.governs_supervisor as u8,
                c.governs_executive as u8,
            );
            let _ = writeln!(p, "   片段: {}", c.context.replace('\n', " "));
        }
        if guess.candidates.len() > MAX_PROMPT_CANDIDATES {
            let _ = writeln!(
                p,
                "（另有 {} 个候选未列出）",
                guess.candidates.len() - MAX_PROMPT_CANDIDATES
            );
        }
    }

    let _ = writeln!(p);
    let _ = write!(p, "请核对并纠正上述初判，按字段要求输出 JSON，键为: {}", FIELDNAMES.join("、"));
    p
}

/// User message for full-text mode: filename and the whole document.
pub fn full_text_prompt(filename: &str, text: &str) -> String {
    format!(
        "文件名: {}\n请阅读下方招股说明书全文，按字段要求输出 JSON。\n招股说明书全文:\n{}",
        filename, text
    )
}
