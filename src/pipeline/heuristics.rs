//! Heuristic rule engine: guess the largest VC holder and its board influence.
//!
//! Everything here is a pure function over the extracted text. The engine
//! is proximity-based, not semantic:
//!
//! 1. [`find_institutions`] locates institution names (generic
//!    `…创投 / …资本 / …投资有限公司` patterns, a lexicon of well-known VC
//!    brands, and English `… Capital / Ventures` names) with byte spans.
//! 2. Each mention gets a window of `window_chars` characters on either side,
//!    clipped at `。` and at mentions of other institutions.
//! 3. Inside the window: the nearest percentage (after the name first), and
//!    governance keywords (`董事`, `监事`, `高管`) co-occurring with an
//!    appointment verb (`委派`, `提名`, …).
//! 4. Mentions are folded per institution (max percentage, OR of flags) and
//!    the candidate with the highest percentage wins; ties go to the one
//!    mentioned first.
//!
//! Non-adjacent phrasing ("张三，现任公司董事……张三由A创投推荐") is missed on
//! purpose; the optional LLM pass exists for those.

use crate::output::{round2, AppointmentType, RuleGuess, VcCandidate};
use crate::pipeline::filename::FilenameCues;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::debug;

/// One institution name found in the text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstitutionMention {
    pub name: String,
    /// Byte offset of the first character of `name`.
    pub start: usize,
    /// Byte offset one past the last character of `name`.
    pub end: usize,
}

// ── Patterns ─────────────────────────────────────────────────────────────

// Name stem: anything but whitespace, digits, punctuation and a handful of
// function characters that commonly precede a name ("由A创投委派").
const STEM: &str = r"[^\s0-9%％，。；：、,.;:!?！？“”\x22'‘’《》（）()\[\]【】的及和与或由为即系是向将在对其等从该各经被已]";

static RE_GENERIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?P<stem>{STEM}{{1,16}}?)(?P<core>创业投资|风险投资|股权投资|创新投资|创投|资本|基金|投资)(?P<entity>(?:基金)?(?:管理)?(?:集团|控股)?(?:(?:股份)?有限(?:责任)?公司|合伙企业|中心|企业)?)(?P<lp>（有限合伙）|\(有限合伙\))?"
    ))
    .unwrap()
});

/// Well-known VC brands that do not always carry a generic suffix.
const LEXICON: &[&str] = &[
    "深圳市创新投资集团有限公司",
    "深创投",
    "达晨创投",
    "达晨",
    "红杉资本",
    "红杉中国",
    "红杉",
    "IDG资本",
    "IDG",
    "启明创投",
    "君联资本",
    "高瓴资本",
    "高瓴",
    "鼎晖投资",
    "鼎晖",
    "九鼎投资",
    "中科招商",
    "同创伟业",
    "东方富海",
    "松禾资本",
    "基石资本",
    "毅达资本",
    "元禾控股",
    "国投创新",
    "中金资本",
    "金沙江创投",
    "经纬中国",
    "北极光创投",
    "软银中国",
    "赛富投资",
    "弘毅投资",
];

static RE_LEXICON: Lazy<Regex> = Lazy::new(|| {
    let mut terms: Vec<&str> = LEXICON.to_vec();
    // Longest first so alternation prefers the fullest brand name.
    terms.sort_by_key(|t| std::cmp::Reverse(t.len()));
    let alternation = terms
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&alternation).unwrap()
});

static RE_ENGLISH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[A-Z][A-Za-z&.\-]*(?: [A-Z][A-Za-z&.\-]*)* (?:Ventures?|Capital|Investments?|Partners)(?: (?:Fund|Limited|Ltd\.?|L\.P\.|LP|Inc\.?))*",
    )
    .unwrap()
});

static RE_PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*[%％]").unwrap());

static RE_TEXT_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:股票代码|证券代码)\s*[:：]?\s*([0-9]{6})(?:[^0-9]|$)").unwrap()
});

static RE_TEXT_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:股票简称|证券简称|公司简称)\s*[:：]?\s*([\p{Han}A-Za-z0-9]{2,12})").unwrap()
});

/// Phrases that end a stem's lead-in; the name starts after the last one.
const LEAD_INS: &[&str] = &[
    "股东",
    "公司",
    "发行人",
    "其中",
    "包括",
    "合计",
    "分别",
    "以及",
    "持有",
    "通过",
    "受让",
    "认购",
    "增资",
    "签署日",
    "之日",
    "本次",
    "发行前",
    "发行后",
    "截至",
];

/// Matched names that are accounting or narrative terms, not institutions.
const NOISE_NAMES: &[&str] = &[
    "注册资本",
    "实收资本",
    "营运资本",
    "对外投资",
    "长期股权投资",
    "股权投资",
    "项目投资",
    "新增投资",
    "累计投资",
    "其他投资",
    "直接投资",
    "间接投资",
    "风险投资",
    "创业投资",
    "募集资金投资",
    "权益工具投资",
    "产业基金",
    "社保基金",
];

/// Text right after a match that shows the match was a common noun.
const NOISE_FOLLOWERS: &[&str] = &[
    "者", "收益", "活动", "项目", "款", "额", "比例", "损失", "公积", "市场", "性", "成本", "计划",
    "决策", "回报", "总额", "规模", "方向",
];

const APPOINT_VERBS: &[&str] = &["委派", "提名", "推荐", "派驻", "派出"];

const FINANCIAL_CUES: &[&str] = &[
    "投资", "金融", "财务", "会计", "证券", "银行", "基金", "经济", "资产管理", "CFA", "MBA",
];

const TECHNICAL_CUES: &[&str] = &["技术", "研发", "工程", "研究员", "科学家", "专利"];

// ── Mention discovery ────────────────────────────────────────────────────

/// Locate all institution mentions, in document order, without overlaps.
///
/// Overlapping matches keep the one that starts first, then the longer one.
pub fn find_institutions(text: &str) -> Vec<InstitutionMention> {
    let mut found = Vec::new();

    for caps in RE_GENERIC.captures_iter(text) {
        let (Some(whole), Some(stem), Some(core)) = (caps.get(0), caps.name("stem"), caps.name("core"))
        else {
            continue;
        };
        let has_suffix = caps.name("entity").is_some_and(|m| !m.as_str().is_empty())
            || caps.name("lp").is_some();
        if matches!(core.as_str(), "投资" | "基金") && !has_suffix {
            continue;
        }

        // A lead-in may start before the stem ("其中" when "其" blocks it).
        let ctx_start = back_chars(text, stem.start(), 2);
        let name_start = (ctx_start + lead_in_cut(&text[ctx_start..stem.end()])).max(stem.start());
        if name_start >= core.start() {
            continue;
        }
        let name = &text[name_start..whole.end()];
        if is_noise(name, &text[whole.end()..]) {
            continue;
        }
        found.push(InstitutionMention {
            name: name.to_string(),
            start: name_start,
            end: whole.end(),
        });
    }

    for m in RE_LEXICON.find_iter(text).chain(RE_ENGLISH.find_iter(text)) {
        found.push(InstitutionMention {
            name: m.as_str().trim().to_string(),
            start: m.start(),
            end: m.end(),
        });
    }

    found.sort_by_key(|m| (m.start, std::cmp::Reverse(m.end)));
    let mut mentions: Vec<InstitutionMention> = Vec::with_capacity(found.len());
    for m in found {
        match mentions.last() {
            Some(last) if m.start < last.end => {}
            _ => mentions.push(m),
        }
    }
    mentions
}

/// Byte offset inside `prefix` where the institution name actually begins.
fn lead_in_cut(prefix: &str) -> usize {
    LEAD_INS
        .iter()
        .filter_map(|p| prefix.rfind(p).map(|i| i + p.len()))
        .max()
        .unwrap_or(0)
}

fn is_noise(name: &str, following: &str) -> bool {
    NOISE_NAMES
        .iter()
        .any(|n| name == *n || (name.ends_with(n) && name.chars().count() <= n.chars().count() + 1))
        || NOISE_FOLLOWERS.iter().any(|f| following.starts_with(f))
        || name.chars().count() < 3 && !LEXICON.contains(&name)
}

// ── Window analysis ──────────────────────────────────────────────────────

/// What one mention's window says about its institution.
#[derive(Debug, Clone, Default, PartialEq)]
struct MentionEvidence {
    percentage: Option<f64>,
    director: bool,
    supervisor: bool,
    executive: bool,
    appointment_type: Option<AppointmentType>,
    context: String,
}

/// Byte range `[lo, hi)` searched for mention `idx`.
fn window_bounds(text: &str, mentions: &[InstitutionMention], idx: usize, radius: usize) -> (usize, usize) {
    let m = &mentions[idx];
    let mut lo = back_chars(text, m.start, radius);
    let mut hi = forward_chars(text, m.end, radius);

    if let Some(prev) = mentions[..idx].iter().rev().find(|p| p.name != m.name) {
        lo = lo.max(prev.end.min(m.start));
    }
    if let Some(next) = mentions[idx + 1..].iter().find(|n| n.name != m.name) {
        hi = hi.min(next.start.max(m.end));
    }
    if let Some(p) = text[lo..m.start].rfind('。') {
        lo += p + '。'.len_utf8();
    }
    if let Some(p) = text[m.end..hi].find('。') {
        hi = m.end + p;
    }
    (lo, hi)
}

fn back_chars(text: &str, from: usize, n: usize) -> usize {
    if n == 0 {
        return from;
    }
    text[..from]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn forward_chars(text: &str, from: usize, n: usize) -> usize {
    text[from..]
        .char_indices()
        .nth(n)
        .map(|(i, _)| from + i)
        .unwrap_or(text.len())
}

fn analyze_mention(text: &str, mentions: &[InstitutionMention], idx: usize, radius: usize) -> MentionEvidence {
    let m = &mentions[idx];
    let (lo, hi) = window_bounds(text, mentions, idx, radius);
    let before = &text[lo..m.start];
    let after = &text[m.end..hi];

    let percentage = nearest_percentage_after(after).or_else(|| nearest_percentage_before(before));

    // Board / supervisory-board bodies are not seats.
    let roles = format!("{before}{after}")
        .replace("董事会", "")
        .replace("监事会", "");
    let appointed = APPOINT_VERBS.iter().any(|v| roles.contains(v));
    let director = appointed && roles.contains("董事");
    let supervisor = appointed && roles.contains("监事");
    let executive = appointed && (roles.contains("高管") || roles.contains("高级管理人员"));

    let appointment_type = if director || supervisor || executive {
        AppointmentType::from_cues(
            FINANCIAL_CUES.iter().any(|c| roles.contains(c)),
            TECHNICAL_CUES.iter().any(|c| roles.contains(c)),
        )
    } else {
        None
    };

    MentionEvidence {
        percentage,
        director,
        supervisor,
        executive,
        appointment_type,
        context: text[lo..hi].trim().to_string(),
    }
}

fn parse_percent(raw: &str) -> Option<f64> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| (0.0..=100.0).contains(v))
        .map(round2)
}

fn nearest_percentage_after(after: &str) -> Option<f64> {
    RE_PERCENT
        .captures_iter(after)
        .find_map(|c| c.get(1).and_then(|m| parse_percent(m.as_str())))
}

/// Only the clause the name sits in; earlier clauses belong to whatever
/// they talk about.
fn nearest_percentage_before(before: &str) -> Option<f64> {
    let clause = before
        .rfind(['，', '；', ',', ';'])
        .map(|i| &before[i..])
        .unwrap_or(before);
    RE_PERCENT
        .captures_iter(clause)
        .filter_map(|c| c.get(1).and_then(|m| parse_percent(m.as_str())))
        .last()
}

/// Combine the types seen for one role across mentions.
fn merge_type(a: Option<AppointmentType>, b: Option<AppointmentType>) -> Option<AppointmentType> {
    match (a, b) {
        (None, x) | (x, None) => x,
        (Some(x), Some(y)) if x == y => Some(x),
        _ => Some(AppointmentType::Composite),
    }
}

// ── Aggregation & selection ──────────────────────────────────────────────

/// Fold mentions into one candidate per institution, in first-mention order.
pub fn collect_candidates(text: &str, window_chars: usize) -> Vec<VcCandidate> {
    let mentions = find_institutions(text);
    let mut candidates: Vec<VcCandidate> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (i, m) in mentions.iter().enumerate() {
        let ev = analyze_mention(text, &mentions, i, window_chars);
        let slot = *index.entry(m.name.clone()).or_insert_with(|| {
            candidates.push(VcCandidate {
                institution_name: m.name.clone(),
                equity_percentage: None,
                governs_director: false,
                governs_supervisor: false,
                governs_executive: false,
                director_type: None,
                supervisor_type: None,
                executive_type: None,
                first_offset: m.start,
                context: ev.context.clone(),
            });
            candidates.len() - 1
        });
        let c = &mut candidates[slot];

        if let Some(p) = ev.percentage {
            if c.equity_percentage.is_none_or(|cur| p > cur) {
                c.equity_percentage = Some(p);
                c.context = ev.context.clone();
            }
        }
        if ev.director {
            c.governs_director = true;
            c.director_type = merge_type(c.director_type, ev.appointment_type);
        }
        if ev.supervisor {
            c.governs_supervisor = true;
            c.supervisor_type = merge_type(c.supervisor_type, ev.appointment_type);
        }
        if ev.executive {
            c.governs_executive = true;
            c.executive_type = merge_type(c.executive_type, ev.appointment_type);
        }
    }
    candidates
}

/// Pick the largest holder: highest percentage, ties to the earliest mention.
///
/// A candidate with a percentage always beats one without. `candidates`
/// must be in first-mention order.
pub fn select_largest(candidates: &[VcCandidate]) -> Option<&VcCandidate> {
    let mut best: Option<&VcCandidate> = None;
    for c in candidates {
        let better = match best {
            None => true,
            Some(b) => match (c.equity_percentage, b.equity_percentage) {
                (Some(x), Some(y)) => x > y,
                (Some(_), None) => true,
                _ => false,
            },
        };
        if better {
            best = Some(c);
        }
    }
    best
}

/// Stock code and short name stated in the text itself.
pub fn infer_identity(text: &str) -> FilenameCues {
    FilenameCues {
        stock_code: RE_TEXT_CODE
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string()),
        company_name: RE_TEXT_NAME
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string()),
    }
}

/// Run the whole rule engine over one document's text.
///
/// Filename cues take precedence over identity found in the text.
pub fn analyze(text: &str, cues: &FilenameCues, window_chars: usize) -> RuleGuess {
    let candidates = collect_candidates(text, window_chars);
    let top = select_largest(&candidates).cloned();
    let from_text = infer_identity(text);

    debug!(
        "Rule engine: {} candidates, top = {:?}",
        candidates.len(),
        top.as_ref().map(|t| (&t.institution_name, t.equity_percentage))
    );

    RuleGuess {
        stock_code: cues.stock_code.clone().or(from_text.stock_code),
        company_name: cues.company_name.clone().or(from_text.company_name),
        candidates,
        top,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(text: &str) -> Vec<String> {
        find_institutions(text).into_iter().map(|m| m.name).collect()
    }

    #[test]
    fn scenario_director_and_percentage() {
        let guess = analyze("A创投 委派董事一名，持股12.5%", &FilenameCues::default(), 60);
        let top = guess.top.expect("candidate");
        assert_eq!(top.institution_name, "A创投");
        assert_eq!(top.equity_percentage, Some(12.5));
        assert!(top.governs_director);
        assert!(!top.governs_supervisor);
        assert!(!top.governs_executive);
        assert_eq!(top.director_type, None);
    }

    #[test]
    fn finds_generic_names_with_entity_suffix() {
        let text = "本次发行前，深圳市松禾创业投资有限公司持有发行人5.00%股份；\
                    苏州工业园区元禾重元股权投资基金管理中心（有限合伙）持股3%。";
        let found = names(text);
        assert!(found.contains(&"深圳市松禾创业投资有限公司".to_string()), "{found:?}");
        assert!(
            found.contains(&"苏州工业园区元禾重元股权投资基金管理中心（有限合伙）".to_string()),
            "{found:?}"
        );
    }

    #[test]
    fn lead_in_is_trimmed() {
        let found = names("公司股东深创投持有本公司8%股份");
        assert_eq!(found, vec!["深创投".to_string()]);
    }

    #[test]
    fn copula_is_not_part_of_the_name() {
        let found = names("发行人第一大股东为深圳市松禾创业投资有限公司，持股20%");
        assert_eq!(found, vec!["深圳市松禾创业投资有限公司".to_string()]);
    }

    #[test]
    fn qizhong_is_not_part_of_the_name() {
        assert_eq!(names("其中A创投持股5%"), vec!["A创投".to_string()]);
    }

    #[test]
    fn pre_offering_phrase_is_trimmed() {
        let found = names("本次发行前深圳市松禾创业投资有限公司持有本公司8%股份");
        assert_eq!(found, vec!["深圳市松禾创业投资有限公司".to_string()]);
    }

    #[test]
    fn phrasings_fold_into_one_candidate() {
        let text = "控股股东为A创投，持股30%。其中A创投委派董事一名。";
        let candidates = collect_candidates(text, 60);
        assert_eq!(candidates.len(), 1, "{candidates:?}");

        let top = analyze(text, &FilenameCues::default(), 60).top.unwrap();
        assert_eq!(top.institution_name, "A创投");
        assert_eq!(top.equity_percentage, Some(30.0));
        assert!(top.governs_director);
    }

    #[test]
    fn accounting_terms_are_not_institutions() {
        let text = "公司注册资本为5000万元，长期股权投资余额为0，投资者应注意风险。";
        assert!(names(text).is_empty(), "{:?}", names(text));
    }

    #[test]
    fn plain_touzi_needs_a_suffix() {
        assert!(names("公司拟对外投资建设新项目").is_empty());
        assert_eq!(names("华盖投资有限公司"), vec!["华盖投资有限公司".to_string()]);
    }

    #[test]
    fn lexicon_brand_without_suffix() {
        let found = names("红杉中国通过其关联方持股6.5%");
        assert_eq!(found, vec!["红杉中国".to_string()]);
    }

    #[test]
    fn english_names() {
        let found = names("股东 Sequoia Capital China 持有10%");
        assert_eq!(found, vec!["Sequoia Capital".to_string()]);
    }

    #[test]
    fn largest_holder_wins() {
        let text = "A创投持股5%。B资本持股12%。C创投持股7.25%。";
        let guess = analyze(text, &FilenameCues::default(), 60);
        assert_eq!(guess.candidates.len(), 3);
        let top = guess.top.unwrap();
        assert_eq!(top.institution_name, "B资本");
        for c in &guess.candidates {
            assert!(top.equity_percentage >= c.equity_percentage);
        }
    }

    #[test]
    fn tie_goes_to_first_mention() {
        let text = "甲创投持股10%。乙资本持股10%。";
        let top = analyze(text, &FilenameCues::default(), 60).top.unwrap();
        assert_eq!(top.institution_name, "甲创投");
    }

    #[test]
    fn percentage_does_not_leak_across_neighbours() {
        let text = "A创投持股10%，B资本委派监事一名";
        let guess = analyze(text, &FilenameCues::default(), 60);
        let a = &guess.candidates[0];
        let b = &guess.candidates[1];
        assert_eq!(a.institution_name, "A创投");
        assert_eq!(a.equity_percentage, Some(10.0));
        assert!(!a.governs_supervisor, "supervisor belongs to B");
        assert!(b.governs_supervisor);
        assert_eq!(b.equity_percentage, None);
    }

    #[test]
    fn window_stops_at_sentence_end() {
        let text = "A创投为财务投资者。公司委派董事张三";
        let a = &analyze(text, &FilenameCues::default(), 60).candidates[0];
        assert!(!a.governs_director);
    }

    #[test]
    fn keyword_without_verb_is_not_a_seat() {
        let text = "A创投持股9%，其合伙人任公司董事";
        let a = &analyze(text, &FilenameCues::default(), 60).candidates[0];
        assert!(!a.governs_director);
        assert_eq!(a.equity_percentage, Some(9.0));
    }

    #[test]
    fn board_body_is_not_a_seat() {
        let text = "A创投提名的议案经董事会审议通过";
        let a = &analyze(text, &FilenameCues::default(), 60).candidates[0];
        assert!(!a.governs_director);
    }

    #[test]
    fn appointment_types_from_background() {
        let text = "A创投委派董事李四，李四曾任职于证券公司，从事财务管理工作";
        let a = &analyze(text, &FilenameCues::default(), 60).candidates[0];
        assert!(a.governs_director);
        assert_eq!(a.director_type, Some(AppointmentType::Financial));

        let text = "B资本委派高级管理人员王五，王五负责研发及技术管理";
        let b = &analyze(text, &FilenameCues::default(), 60).candidates[0];
        assert!(b.governs_executive);
        assert_eq!(b.executive_type, Some(AppointmentType::Technical));
    }

    #[test]
    fn mentions_are_folded() {
        let text = "A创投持股3%。随后，A创投增持至6%，并委派监事一名。";
        let guess = analyze(text, &FilenameCues::default(), 60);
        assert_eq!(guess.candidates.len(), 1);
        let a = &guess.candidates[0];
        assert_eq!(a.equity_percentage, Some(6.0));
        assert!(a.governs_supervisor);
        assert_eq!(a.first_offset, 0);
    }

    #[test]
    fn out_of_range_percent_ignored() {
        let text = "A创投持股150%";
        let a = &analyze(text, &FilenameCues::default(), 60).candidates[0];
        assert_eq!(a.equity_percentage, None);
    }

    #[test]
    fn percentage_before_name_used_as_fallback() {
        let text = "持股比例为4.5%的股东A创投";
        let a = &analyze(text, &FilenameCues::default(), 60).candidates[0];
        assert_eq!(a.equity_percentage, Some(4.5));
    }

    #[test]
    fn identity_from_text_when_filename_silent() {
        let text = "股票简称：宁德时代 股票代码：300750";
        let guess = analyze(text, &FilenameCues::default(), 60);
        assert_eq!(guess.stock_code.as_deref(), Some("300750"));
        assert_eq!(guess.company_name.as_deref(), Some("宁德时代"));
    }

    #[test]
    fn filename_cues_take_precedence() {
        let cues = FilenameCues {
            stock_code: Some("000001".into()),
            company_name: Some("Acme控股".into()),
        };
        let guess = analyze("股票代码：300750", &cues, 60);
        assert_eq!(guess.stock_code.as_deref(), Some("000001"));
        assert_eq!(guess.company_name.as_deref(), Some("Acme控股"));
    }

    #[test]
    fn no_candidates_no_top() {
        let guess = analyze("本公司主要从事电池制造。", &FilenameCues::default(), 60);
        assert!(guess.candidates.is_empty());
        assert!(guess.top.is_none());
    }

    #[test]
    fn window_math_is_char_safe() {
        assert_eq!(back_chars("创投", "创投".len(), 1), "创".len());
        assert_eq!(back_chars("创投", 3, 5), 0);
        assert_eq!(forward_chars("创投ab", 0, 1), "创".len());
        assert_eq!(forward_chars("ab", 0, 9), 2);
    }
}
