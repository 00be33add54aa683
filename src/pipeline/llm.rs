//! LLM refinement: ask an OpenAI-compatible model to correct the rule guess.
//!
//! The pipeline is generic over [`Refiner`]. [`NoopRefiner`] is chosen when
//! no API key is configured and never touches the network; [`OpenAiRefiner`]
//! posts one chat completion per file and returns the model's JSON object as
//! a [`RefinedRow`]. Whether those fields are usable is decided later by
//! [`crate::pipeline::merge`]; this module only guarantees "one JSON object
//! came back".
//!
//! There is no retry. A failed call degrades that file to its rule guess.

use crate::config::{LlmSettings, RefineMode};
use crate::error::{RefinementError, VcExtractError};
use crate::output::RuleGuess;
use crate::progress::ProgressCallback;
use crate::prompts::{candidate_prompt, full_text_prompt, SYSTEM_PROMPT};
use crate::stream::{accumulate, delta_stream};
use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// The model's answer, keyed by the CSV header names.
///
/// Values stay untyped: the model may answer `"1"`, `1`, `true` or `"是"` for
/// a flag, and the merger decides what is well-formed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinedRow {
    #[serde(rename = "股票代码")]
    pub stock_code: Option<Value>,
    #[serde(rename = "公司简称")]
    pub company_name: Option<Value>,
    #[serde(rename = "最大风投机构名称")]
    pub vc_name: Option<Value>,
    #[serde(rename = "最大风投机构股权占比")]
    pub equity_percentage: Option<Value>,
    #[serde(rename = "风投机构是否委派董事")]
    pub governs_director: Option<Value>,
    #[serde(rename = "风投机构是否委派监事")]
    pub governs_supervisor: Option<Value>,
    #[serde(rename = "风投机构是否委派高管")]
    pub governs_executive: Option<Value>,
    #[serde(rename = "风投机构委派董事的类型")]
    pub director_type: Option<Value>,
    #[serde(rename = "风投机构委派监事的类型")]
    pub supervisor_type: Option<Value>,
    #[serde(rename = "风投机构委派高管的类型")]
    pub executive_type: Option<Value>,
}

/// Everything a refiner may look at for one file.
#[derive(Debug, Clone, Copy)]
pub struct RefineRequest<'a> {
    pub filename: &'a str,
    pub guess: &'a RuleGuess,
    /// Full extracted text, used in [`RefineMode::FullText`].
    pub text: &'a str,
}

/// Optional second opinion on a rule guess.
pub trait Refiner {
    /// `Ok(None)` means "no opinion": the rule guess stands as is.
    fn refine(
        &self,
        req: &RefineRequest<'_>,
    ) -> impl Future<Output = Result<Option<RefinedRow>, RefinementError>> + Send;

    /// Short label for logs and the run banner.
    fn describe(&self) -> String {
        "rules only".to_string()
    }
}

/// Rules-only mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRefiner;

impl Refiner for NoopRefiner {
    async fn refine(&self, _req: &RefineRequest<'_>) -> Result<Option<RefinedRow>, RefinementError> {
        Ok(None)
    }
}

// ── OpenAI-compatible client ─────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Refiner backed by `{base_url}/chat/completions`.
pub struct OpenAiRefiner {
    client: reqwest::Client,
    settings: LlmSettings,
    progress: Option<ProgressCallback>,
}

impl OpenAiRefiner {
    pub fn new(settings: LlmSettings, progress: Option<ProgressCallback>) -> Result<Self, VcExtractError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = settings.api_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| VcExtractError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            settings,
            progress,
        })
    }

    fn build_request(&self, req: &RefineRequest<'_>) -> ChatRequest<'_> {
        let user = match self.settings.mode {
            RefineMode::Candidates => candidate_prompt(req.filename, req.guess),
            RefineMode::FullText => full_text_prompt(req.filename, req.text),
        };
        ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            stream: self.settings.stream,
        }
    }
}

impl Refiner for OpenAiRefiner {
    async fn refine(&self, req: &RefineRequest<'_>) -> Result<Option<RefinedRow>, RefinementError> {
        let start = Instant::now();
        let body = self.build_request(req);
        if let Some(cb) = &self.progress {
            cb.on_refine_start(req.filename, &self.settings.model);
        }
        info!(
            "Calling model '{}' for {} ({})",
            self.settings.model,
            req.filename,
            if self.settings.stream { "streaming" } else { "single response" }
        );

        let response = self
            .client
            .post(self.settings.endpoint())
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RefinementError::from_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RefinementError::Http {
                status: status.as_u16(),
                body: snippet(&text, 300),
            });
        }

        let raw = if self.settings.stream {
            let bytes = response
                .bytes_stream()
                .map(|r| r.map_err(|e| RefinementError::from_transport(&e)));
            let progress = self.progress.as_ref();
            accumulate(delta_stream(bytes), |chunk| {
                if let Some(cb) = progress {
                    cb.on_refine_chunk(req.filename, chunk);
                }
            })
            .await?
        } else {
            let text = response
                .text()
                .await
                .map_err(|e| RefinementError::from_transport(&e))?;
            let parsed: ChatResponse =
                serde_json::from_str(&text).map_err(|e| RefinementError::Network {
                    detail: format!("unexpected response body ({}): {}", e, snippet(&text, 120)),
                })?;
            parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default()
        };

        let row = parse_json_response(&raw)?;
        debug!(
            "LLM answered for {} in {}ms: {:?}",
            req.filename,
            start.elapsed().as_millis(),
            row
        );
        Ok(Some(row))
    }

    fn describe(&self) -> String {
        format!("{} via {}", self.settings.model, self.settings.base_url)
    }
}

// ── Response parsing ─────────────────────────────────────────────────────

static RE_CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*(.*?)\s*```$").unwrap());

/// Strip an outer Markdown code fence, which models add despite the prompt.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    match RE_CODE_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => trimmed,
    }
}

/// Parse the model's full reply as exactly one JSON object.
pub fn parse_json_response(raw: &str) -> Result<RefinedRow, RefinementError> {
    let cleaned = strip_code_fence(raw);
    if cleaned.is_empty() {
        return Err(RefinementError::EmptyResponse);
    }

    let value: Value = match serde_json::from_str(cleaned) {
        Ok(v) => v,
        Err(e) if cleaned.starts_with('{') || cleaned.starts_with('[') => {
            return Err(RefinementError::MalformedJson {
                detail: e.to_string(),
            });
        }
        Err(_) => {
            return Err(RefinementError::NotJson {
                snippet: snippet(cleaned, 80),
            });
        }
    };

    if !value.is_object() {
        return Err(RefinementError::NotAnObject);
    }
    serde_json::from_value(value).map_err(|e| RefinementError::MalformedJson {
        detail: e.to_string(),
    })
}

fn snippet(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => format!("{}…", &s[..i]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ROW: &str = r#"{"股票代码":"000001","公司简称":"Acme控股","最大风投机构名称":"A创投",
        "最大风投机构股权占比":"12.50%","风投机构是否委派董事":"1","风投机构是否委派监事":0,
        "风投机构是否委派高管":false,"风投机构委派董事的类型":"财务型",
        "风投机构委派监事的类型":"","风投机构委派高管的类型":null}"#;

    #[test]
    fn parses_plain_object() {
        let row = parse_json_response(ROW).unwrap();
        assert_eq!(row.stock_code, Some(json!("000001")));
        assert_eq!(row.governs_supervisor, Some(json!(0)));
        assert_eq!(row.governs_executive, Some(json!(false)));
        assert_eq!(row.executive_type, None);
    }

    #[test]
    fn strips_code_fences() {
        let fenced = format!("```json\n{}\n```", ROW);
        assert_eq!(parse_json_response(&fenced).unwrap().vc_name, Some(json!("A创投")));
        let bare = format!("```\n{}\n```", ROW);
        assert!(parse_json_response(&bare).is_ok());
    }

    #[test]
    fn missing_keys_are_absent() {
        let row = parse_json_response(r#"{"最大风投机构名称":"B资本"}"#).unwrap();
        assert_eq!(row.vc_name, Some(json!("B资本")));
        assert_eq!(row.stock_code, None);
    }

    #[test]
    fn rejects_non_json() {
        let err = parse_json_response("抱歉，我无法确定。").unwrap_err();
        assert!(matches!(err, RefinementError::NotJson { .. }));
    }

    #[test]
    fn rejects_multiple_objects() {
        let err = parse_json_response(r#"{"a":1}{"b":2}"#).unwrap_err();
        assert!(matches!(err, RefinementError::MalformedJson { .. }));
    }

    #[test]
    fn rejects_truncated_object() {
        let err = parse_json_response(r#"{"股票代码":"0000"#).unwrap_err();
        assert!(matches!(err, RefinementError::MalformedJson { .. }));
    }

    #[test]
    fn rejects_arrays() {
        let err = parse_json_response(r#"[{"股票代码":"000001"}]"#).unwrap_err();
        assert!(matches!(err, RefinementError::NotAnObject));
    }

    #[test]
    fn empty_reply() {
        assert!(matches!(
            parse_json_response("  \n").unwrap_err(),
            RefinementError::EmptyResponse
        ));
    }

    #[tokio::test]
    async fn noop_has_no_opinion() {
        let guess = RuleGuess::default();
        let req = RefineRequest {
            filename: "a.pdf",
            guess: &guess,
            text: "",
        };
        assert_eq!(NoopRefiner.refine(&req).await.unwrap(), None);
        assert_eq!(NoopRefiner.describe(), "rules only");
    }

    #[test]
    fn request_body_shape() {
        let mut settings = LlmSettings::new("sk-test");
        settings.max_tokens = Some(512);
        let refiner = OpenAiRefiner::new(settings, None).unwrap();
        let guess = RuleGuess::default();
        let req = RefineRequest {
            filename: "000001_Acme控股.pdf",
            guess: &guess,
            text: "全文",
        };
        let body = serde_json::to_value(refiner.build_request(&req)).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["messages"][0]["role"], "system");
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("000001_Acme控股.pdf"));
        assert!(!user.contains("全文"), "candidate mode does not send the text");
    }

    #[test]
    fn full_text_mode_sends_text() {
        let mut settings = LlmSettings::new("sk-test");
        settings.mode = RefineMode::FullText;
        settings.stream = false;
        let refiner = OpenAiRefiner::new(settings, None).unwrap();
        let guess = RuleGuess::default();
        let req = RefineRequest {
            filename: "a.pdf",
            guess: &guess,
            text: "招股说明书正文",
        };
        let body = serde_json::to_value(refiner.build_request(&req)).unwrap();
        assert!(body.get("max_tokens").is_none());
        assert_eq!(body["stream"], false);
        assert!(body["messages"][1]["content"]
            .as_str()
            .unwrap()
            .contains("招股说明书正文"));
    }
}
