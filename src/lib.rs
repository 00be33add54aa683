//! # ipo-vc-extract
//!
//! Extract venture-capital disclosure fields from Chinese IPO prospectus
//! PDFs into one CSV row per prospectus.
//!
//! ## Why this crate?
//!
//! Empirical finance work on VC-backed IPOs needs, for every listing, the
//! largest VC shareholder, its stake, and whether it placed directors,
//! supervisors or executives in the issuer. That information is buried in
//! 300–600 page prospectuses. This crate reads the text layer of each PDF,
//! applies cheap proximity heuristics, and optionally asks an
//! OpenAI-compatible model to correct the guess.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input/*.pdf
//!  │
//!  ├─ 1. Extract   page text via pdfium (lazy, one page at a time)
//!  ├─ 2. Cues      stock code + short name from the filename
//!  ├─ 3. Rules     institution mentions, nearest %, 委派 + 董事/监事/高管
//!  ├─ 4. Refine    optional chat completion (streamed), one JSON object
//!  ├─ 5. Merge     well-formed LLM fields override, invariants enforced
//!  └─ 6. Sink      one row appended and flushed to results.csv
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ipo_vc_extract::{run, ExtractionConfig, NoopRefiner, PdfiumSource};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = PdfiumSource::bind(None)?;
//!     let config = ExtractionConfig::default(); // input/ → results.csv
//!     let stats = run(&source, &NoopRefiner, &config).await?;
//!     eprintln!("{} rows, {} skipped", stats.rows_written, stats.files_skipped);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `vcextract` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! ipo-vc-extract = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod sink;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, LlmSettings, RefineMode};
pub use error::{ExtractionError, RefinementError, VcExtractError};
pub use output::{AppointmentType, OutputRow, ProspectusDocument, RuleGuess, RunStats, VcCandidate};
pub use pipeline::extract::{PageSource, PdfiumSource};
pub use pipeline::llm::{NoopRefiner, OpenAiRefiner, RefineRequest, RefinedRow, Refiner};
pub use process::{process_document, run, FileOutcome, RefinementOutcome};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
