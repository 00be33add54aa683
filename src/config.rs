//! Configuration types for a prospectus extraction run.
//!
//! Run-wide behaviour is controlled through [`ExtractionConfig`], built via
//! its [`ExtractionConfigBuilder`]. The optional LLM pass has its own
//! [`LlmSettings`]; when no API key is configured there are no settings and
//! the run is rules-only.

use crate::error::VcExtractError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default OpenAI-compatible endpoint root. Must include the version path.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat model.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Configuration for one run over the input directory.
///
/// # Example
/// ```rust
/// use ipo_vc_extract::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .input_dir("input")
///     .output_csv("results.csv")
///     .window_chars(80)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Directory scanned for prospectus files. Default: `input`.
    pub input_dir: PathBuf,

    /// Results file, truncated at the start of every run. Default: `results.csv`.
    pub output_csv: PathBuf,

    /// Characters searched on each side of an institution mention for a
    /// percentage and governance keywords. Range: 10–1000. Default: 60.
    ///
    /// Windows are further clipped at `。` and at neighbouring mentions of
    /// other institutions, so raising this mostly helps long sentences.
    pub window_chars: usize,

    /// Optional per-run progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            output_csv: PathBuf::from("results.csv"),
            window_chars: 60,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("input_dir", &self.input_dir)
            .field("output_csv", &self.output_csv)
            .field("window_chars", &self.window_chars)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ExtractionProgressCallback>"),
            )
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn output_csv(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_csv = path.into();
        self
    }

    pub fn window_chars(mut self, n: usize) -> Self {
        self.config.window_chars = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, VcExtractError> {
        let c = &self.config;
        if !(10..=1000).contains(&c.window_chars) {
            return Err(VcExtractError::InvalidConfig(format!(
                "Window must be 10–1000 characters, got {}",
                c.window_chars
            )));
        }
        if c.output_csv.as_os_str().is_empty() {
            return Err(VcExtractError::InvalidConfig(
                "Output path must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── LLM settings ─────────────────────────────────────────────────────────

/// What the refinement prompt carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RefineMode {
    /// Candidate list, evidence snippets and the rule guess. (default)
    ///
    /// Small prompts; the model corrects what the rules found.
    #[default]
    Candidates,
    /// The entire extracted prospectus text.
    ///
    /// Lets the model find holders the rules missed, at a much higher
    /// token cost. Long prospectuses may exceed the model's context.
    FullText,
}

/// Settings for the OpenAI-compatible refinement client.
#[derive(Clone, PartialEq)]
pub struct LlmSettings {
    pub api_key: String,
    /// Endpoint root including the version path, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub model: String,
    /// Sampling temperature. Default: 0.0 (deterministic extraction).
    pub temperature: f32,
    /// Maximum completion tokens. Default: provider default.
    pub max_tokens: Option<usize>,
    pub mode: RefineMode,
    /// Stream tokens (SSE) instead of waiting for one response. Default: true.
    pub stream: bool,
    /// Per-call timeout. Default: none beyond the HTTP client's own.
    pub api_timeout_secs: Option<u64>,
}

impl LlmSettings {
    /// Settings for the given key with every other field at its default.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            max_tokens: None,
            mode: RefineMode::default(),
            stream: true,
            api_timeout_secs: None,
        }
    }

    /// Settings from the `OPENAI_API_KEY` / `OPENAI_BASE_URL` / `OPENAI_MODEL`
    /// values. A missing or blank key means rules-only mode (`None`).
    pub fn from_env_values(
        api_key: Option<String>,
        base_url: Option<String>,
        model: Option<String>,
    ) -> Option<Self> {
        let key = api_key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty())?;
        let mut settings = Self::new(key);
        if let Some(url) = base_url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) {
            settings.base_url = url;
        }
        if let Some(m) = model.map(|m| m.trim().to_string()).filter(|m| !m.is_empty()) {
            settings.model = m;
        }
        Some(settings)
    }

    /// Full chat-completions URL.
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("mode", &self.mode)
            .field("stream", &self.stream)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ExtractionConfig::default();
        assert_eq!(c.input_dir, PathBuf::from("input"));
        assert_eq!(c.output_csv, PathBuf::from("results.csv"));
        assert_eq!(c.window_chars, 60);
    }

    #[test]
    fn builder_rejects_tiny_window() {
        let err = ExtractionConfig::builder().window_chars(3).build().unwrap_err();
        assert!(err.to_string().contains("Window"));
    }

    #[test]
    fn missing_key_means_rules_only() {
        assert!(LlmSettings::from_env_values(None, None, None).is_none());
        assert!(LlmSettings::from_env_values(Some("  ".into()), None, None).is_none());
    }

    #[test]
    fn env_values_override_defaults() {
        let s = LlmSettings::from_env_values(
            Some("sk-test".into()),
            Some("https://llm.example.cn/v1/".into()),
            Some("qwen-plus".into()),
        )
        .unwrap();
        assert_eq!(s.model, "qwen-plus");
        assert_eq!(s.endpoint(), "https://llm.example.cn/v1/chat/completions");
        assert!(s.stream);
        assert_eq!(s.temperature, 0.0);
    }

    #[test]
    fn blank_base_url_keeps_default() {
        let s = LlmSettings::from_env_values(Some("k".into()), Some("".into()), None).unwrap();
        assert_eq!(s.endpoint(), "https://api.openai.com/v1/chat/completions");
        assert_eq!(s.model, DEFAULT_MODEL);
    }

    #[test]
    fn debug_redacts_key() {
        let s = LlmSettings::new("sk-secret");
        let dbg = format!("{s:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("redacted"));
    }
}
