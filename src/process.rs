//! Run orchestration: input directory in, results file out.
//!
//! One file at a time, start to finish:
//!
//! ```text
//! validate → extract pages → filename cues → rule engine → refine? → merge → append row
//! ```
//!
//! A file whose text cannot be extracted is skipped with a warning and
//! produces no row. A failed LLM call only degrades that file to its rule
//! guess. Only sink and input-directory problems abort the run, and every
//! row appended before that point is already flushed.

use crate::config::ExtractionConfig;
use crate::error::{ExtractionError, RefinementError, VcExtractError};
use crate::output::{OutputRow, ProspectusDocument, RunStats};
use crate::pipeline::extract::{has_text, PageSource};
use crate::pipeline::filename::{parse_filename, FilenameCues};
use crate::pipeline::heuristics;
use crate::pipeline::input::{display_name, list_inputs, validate_pdf};
use crate::pipeline::llm::{RefineRequest, Refiner};
use crate::pipeline::merge::merge_row;
use crate::progress::ProgressCallback;
use crate::sink::CsvSink;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What happened to the LLM pass for one file.
#[derive(Debug, Clone)]
pub enum RefinementOutcome {
    /// The refiner had no opinion (rules-only mode).
    NotAttempted,
    /// The model answered with one JSON object.
    Refined,
    /// The call failed; the row is the rule guess.
    Failed(RefinementError),
}

/// The row produced for one document and how it was reached.
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub row: OutputRow,
    pub refinement: RefinementOutcome,
}

/// Process every file in `config.input_dir` and write `config.output_csv`.
///
/// The results file is truncated and given its header before the input
/// directory is even listed, so a run over a missing directory still
/// leaves a well-formed (empty) results file behind.
///
/// # Errors
/// Only fatal problems: results file locked or unwritable, input directory
/// missing or unreadable. Per-file problems are counted in [`RunStats`].
pub async fn run<S: PageSource, R: Refiner>(
    source: &S,
    refiner: &R,
    config: &ExtractionConfig,
) -> Result<RunStats, VcExtractError> {
    let start = Instant::now();
    info!(
        "Starting run: {} → {} ({})",
        config.input_dir.display(),
        config.output_csv.display(),
        refiner.describe()
    );

    // ── Step 1: Reset the results file ───────────────────────────────────
    let mut sink = CsvSink::create(&config.output_csv)?;

    // ── Step 2: List inputs ──────────────────────────────────────────────
    let files = list_inputs(&config.input_dir)?;
    let total = files.len();
    info!("Found {} files in {}", total, config.input_dir.display());

    let progress = config.progress_callback.as_ref();
    if let Some(cb) = progress {
        cb.on_run_start(total);
    }

    let mut stats = RunStats {
        files_found: total,
        ..Default::default()
    };

    // ── Step 3: One file at a time ───────────────────────────────────────
    for (i, path) in files.iter().enumerate() {
        let name = display_name(path);
        if let Some(cb) = progress {
            cb.on_file_start(&name, i + 1, total);
        }

        let doc = match load_document(source, path, progress) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Skipping {}: {}", name, e);
                stats.files_skipped += 1;
                if let Some(cb) = progress {
                    cb.on_file_skipped(&name, &e.to_string());
                }
                continue;
            }
        };

        let outcome = process_document(&doc, refiner, config.window_chars).await;
        match &outcome.refinement {
            RefinementOutcome::Refined => stats.refined += 1,
            RefinementOutcome::Failed(e) => {
                warn!("LLM pass failed for {}, using rule guess: {}", name, e);
                stats.refinement_failures += 1;
                if let Some(cb) = progress {
                    cb.on_refine_failed(&name, &e.to_string());
                }
            }
            RefinementOutcome::NotAttempted => {}
        }

        sink.append(&outcome.row)?;
        info!(
            "{}: {} / {} / {}",
            name,
            outcome.row.stock_code,
            outcome.row.company_name,
            if outcome.row.vc_name.is_empty() {
                "no VC found"
            } else {
                outcome.row.vc_name.as_str()
            }
        );
        if let Some(cb) = progress {
            cb.on_file_complete(&name, &outcome.row);
        }
    }

    // ── Step 4: Close ────────────────────────────────────────────────────
    stats.rows_written = sink.finish()?;
    stats.duration_ms = start.elapsed().as_millis() as u64;
    if let Some(cb) = progress {
        cb.on_run_complete(stats.rows_written, stats.files_skipped);
    }
    info!(
        "Run complete: {} rows, {} skipped, {} refined, {} LLM failures in {}ms",
        stats.rows_written,
        stats.files_skipped,
        stats.refined,
        stats.refinement_failures,
        stats.duration_ms
    );
    Ok(stats)
}

/// Validate, extract and label one file.
pub fn load_document<S: PageSource>(
    source: &S,
    path: &Path,
    progress: Option<&ProgressCallback>,
) -> Result<ProspectusDocument, ExtractionError> {
    let name = display_name(path);
    validate_pdf(path)?;

    let pages_iter = source.open(path)?;
    let total = pages_iter.len();
    let mut pages = Vec::with_capacity(total);
    for (i, page) in pages_iter.enumerate() {
        match page {
            Ok(text) => pages.push(text),
            Err(e) => {
                // Keep page order; the page just contributes no text.
                warn!("{}: {}", name, e);
                pages.push(String::new());
            }
        }
        if let Some(cb) = progress {
            cb.on_page_extracted(&name, i + 1, total);
        }
    }

    if !has_text(&pages) {
        return Err(ExtractionError::NoText {
            path: path.to_path_buf(),
            pages: total,
        });
    }
    debug!("{}: extracted {} pages", name, total);

    let FilenameCues {
        stock_code,
        company_name,
    } = parse_filename(&name);
    Ok(ProspectusDocument {
        path: path.to_path_buf(),
        filename: name,
        pages,
        stock_code,
        company_name,
    })
}

/// Rule engine, optional refinement and merge for one loaded document.
pub async fn process_document<R: Refiner>(
    doc: &ProspectusDocument,
    refiner: &R,
    window_chars: usize,
) -> FileOutcome {
    let text = doc.full_text();
    let cues = FilenameCues {
        stock_code: doc.stock_code.clone(),
        company_name: doc.company_name.clone(),
    };
    let guess = heuristics::analyze(&text, &cues, window_chars);

    let req = RefineRequest {
        filename: &doc.filename,
        guess: &guess,
        text: &text,
    };
    let (refined, refinement) = match refiner.refine(&req).await {
        Ok(Some(r)) => (Some(r), RefinementOutcome::Refined),
        Ok(None) => (None, RefinementOutcome::NotAttempted),
        Err(e) => (None, RefinementOutcome::Failed(e)),
    };

    FileOutcome {
        row: merge_row(doc, &guess, refined.as_ref()),
        refinement,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::{NoopRefiner, RefinedRow};
    use std::path::PathBuf;

    struct FailingRefiner;

    impl Refiner for FailingRefiner {
        async fn refine(&self, _req: &RefineRequest<'_>) -> Result<Option<RefinedRow>, RefinementError> {
            Err(RefinementError::Timeout)
        }
    }

    fn doc(text: &str) -> ProspectusDocument {
        ProspectusDocument {
            path: PathBuf::from("input/000001_Acme控股.pdf"),
            filename: "000001_Acme控股.pdf".into(),
            pages: vec![text.into()],
            stock_code: Some("000001".into()),
            company_name: Some("Acme控股".into()),
        }
    }

    #[tokio::test]
    async fn rules_only_document() {
        let out = process_document(&doc("A创投 委派董事一名，持股12.5%"), &NoopRefiner, 60).await;
        assert!(matches!(out.refinement, RefinementOutcome::NotAttempted));
        assert_eq!(out.row.vc_name, "A创投");
        assert_eq!(out.row.equity_percentage, Some(12.5));
    }

    #[tokio::test]
    async fn failed_refinement_keeps_rule_row() {
        let d = doc("A创投 委派董事一名，持股12.5%");
        let rules = process_document(&d, &NoopRefiner, 60).await;
        let failed = process_document(&d, &FailingRefiner, 60).await;
        assert!(matches!(
            failed.refinement,
            RefinementOutcome::Failed(RefinementError::Timeout)
        ));
        assert_eq!(failed.row, rules.row);
    }
}
