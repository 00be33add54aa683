//! Pipeline stages for prospectus extraction.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and the orchestration in [`crate::process`] stays a straight line.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ filename ──▶ heuristics ──▶ llm ──▶ merge
//! (list)    (pdfium)    (cues)       (RuleGuess)    (JSON)  (OutputRow)
//! ```
//!
//! 1. [`input`]      — list the input directory, check `%PDF` magic bytes
//! 2. [`extract`]    — page text through the [`extract::PageSource`] trait
//! 3. [`filename`]   — stock code and short name from the file name
//! 4. [`heuristics`] — pure rule engine over the full text
//! 5. [`llm`]        — optional refinement; the only stage with network I/O
//! 6. [`merge`]      — well-formedness checks and row invariants

pub mod extract;
pub mod filename;
pub mod heuristics;
pub mod input;
pub mod llm;
pub mod merge;
