//! CLI binary for ipo-vc-extract.
//!
//! A thin shim over the library crate: maps CLI flags and the `OPENAI_*`
//! environment to `ExtractionConfig` / `LlmSettings`, picks the refiner once,
//! runs, and prints a summary. With no arguments it processes `input/` into
//! `results.csv`.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use ipo_vc_extract::output::format_percentage;
use ipo_vc_extract::{
    run, ExtractionConfig, ExtractionProgressCallback, LlmSettings, NoopRefiner, OpenAiRefiner,
    OutputRow, PdfiumSource, ProgressCallback, RefineMode, RunStats,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const LINE: &str = "────────────────────────────────────────────────────────────";

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one line per file, a page bar while extracting, and
/// the model's tokens echoed as they stream in.
struct CliProgressCallback {
    /// Page bar of the file currently being extracted.
    bar: Mutex<Option<ProgressBar>>,
    /// Whether tokens were echoed for the current file (needs a newline).
    streamed: AtomicBool,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bar: Mutex::new(None),
            streamed: AtomicBool::new(false),
        })
    }

    fn page_bar() -> ProgressBar {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "  {spinner:.cyan} [{bar:42.green/238}] {pos:>3}/{len} pages  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    }

    /// Remove the page bar so plain lines can be printed.
    fn clear_bar(&self) {
        if let Some(bar) = self.bar.lock().unwrap().take() {
            bar.finish_and_clear();
        }
    }

    /// End the echoed token line, if any.
    fn end_stream_line(&self) {
        if self.streamed.swap(false, Ordering::SeqCst) {
            eprintln!();
        }
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_files: usize) {
        eprintln!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_files} files…"))
        );
    }

    fn on_file_start(&self, file: &str, index: usize, total: usize) {
        self.clear_bar();
        eprintln!("{} {}", dim(&format!("[{index}/{total}]")), bold(file));
        *self.bar.lock().unwrap() = Some(Self::page_bar());
    }

    fn on_page_extracted(&self, _file: &str, page: usize, total_pages: usize) {
        if let Some(bar) = self.bar.lock().unwrap().as_ref() {
            bar.set_length(total_pages as u64);
            bar.set_position(page as u64);
        }
    }

    fn on_refine_start(&self, _file: &str, model: &str) {
        self.clear_bar();
        eprintln!("  {} asking {}…", cyan("◆"), model);
    }

    fn on_refine_chunk(&self, _file: &str, chunk: &str) {
        if !self.streamed.swap(true, Ordering::SeqCst) {
            eprint!("  ");
        }
        eprint!("{}", dim(chunk));
        io::stderr().flush().ok();
    }

    fn on_refine_failed(&self, _file: &str, error: &str) {
        self.end_stream_line();
        eprintln!("  {} LLM failed, using rule guess: {}", yellow("⚠"), error);
    }

    fn on_file_complete(&self, _file: &str, row: &OutputRow) {
        self.clear_bar();
        self.end_stream_line();
        eprintln!("  {} {}", green("✓"), describe_row(row));
    }

    fn on_file_skipped(&self, _file: &str, error: &str) {
        self.clear_bar();
        self.end_stream_line();
        eprintln!("  {} skipped: {}", red("✗"), red(error));
    }
}

/// One-line summary of a row for the console.
fn describe_row(row: &OutputRow) -> String {
    let vc = if row.vc_name.is_empty() {
        dim("no VC found")
    } else {
        match row.equity_percentage {
            Some(p) => format!("{} ({}%)", bold(&row.vc_name), format_percentage(p)),
            None => bold(&row.vc_name),
        }
    };
    let flag = |b: bool| if b { "1" } else { "0" };
    format!(
        "{} {} → {}  {}",
        if row.stock_code.is_empty() { "------" } else { row.stock_code.as_str() },
        row.company_name,
        vc,
        dim(&format!(
            "董事{} 监事{} 高管{}",
            flag(row.governs_director),
            flag(row.governs_supervisor),
            flag(row.governs_executive)
        )),
    )
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process input/*.pdf into results.csv, rules only
  vcextract

  # Same, with LLM refinement of the rule guess
  OPENAI_API_KEY=sk-... vcextract

  # Send the whole prospectus text to the model instead of the candidates
  vcextract --full-text --model gpt-4o

  # OpenAI-compatible endpoint, single (non-streamed) responses
  OPENAI_BASE_URL=https://dashscope.aliyuncs.com/compatible-mode/v1 \
    OPENAI_MODEL=qwen-plus vcextract --no-stream

OUTPUT COLUMNS (results.csv, UTF-8 with BOM):
  股票代码, 公司简称, 最大风投机构名称, 最大风投机构股权占比,
  风投机构是否委派董事, 风投机构是否委派监事, 风投机构是否委派高管,
  风投机构委派董事的类型, 风投机构委派监事的类型, 风投机构委派高管的类型

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY    Enables the LLM pass; absent or empty means rules only
  OPENAI_BASE_URL   Endpoint root incl. version path (default https://api.openai.com/v1)
  OPENAI_MODEL      Chat model (default gpt-4o)
  PDFIUM_LIB_PATH   libpdfium file or the directory holding it
  RUST_LOG          Log filter, overrides --verbose/--quiet

SETUP:
  1. Put the prospectus PDFs in ./input/
  2. Make libpdfium available (PDFIUM_LIB_PATH, ./, or system-wide)
  3. Run:  vcextract
"#;

/// Extract venture-capital disclosure fields from Chinese IPO prospectuses.
#[derive(Parser, Debug)]
#[command(
    name = "vcextract",
    version,
    about = "Extract VC disclosure fields from Chinese IPO prospectus PDFs into a CSV",
    long_about = "Reads every PDF in the input directory, locates venture-capital shareholders \
with proximity heuristics, optionally refines the guess with an OpenAI-compatible model, and \
writes one row per prospectus to the results CSV.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory containing the prospectus PDFs.
    #[arg(long, default_value = "input")]
    input_dir: PathBuf,

    /// Results file (truncated on every run).
    #[arg(short, long, default_value = "results.csv")]
    output: PathBuf,

    /// Send the whole extracted text to the model instead of the candidate list.
    #[arg(long)]
    full_text: bool,

    /// Ask for one complete response instead of streaming tokens.
    #[arg(long)]
    no_stream: bool,

    /// Characters searched on each side of an institution name (10–1000).
    #[arg(long, default_value_t = 60,
          value_parser = clap::value_parser!(u32).range(10..=1000))]
    window: u32,

    /// Per-call LLM timeout in seconds (default: none).
    #[arg(long)]
    api_timeout: Option<u64>,

    /// API key for the OpenAI-compatible endpoint.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Endpoint root including the version path.
    #[arg(long, env = "OPENAI_BASE_URL")]
    base_url: Option<String>,

    /// Chat model ID.
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o")]
    model: String,

    /// libpdfium file or the directory holding it.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Disable the progress display.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress display carries the per-file feedback; library INFO logs
    // would interleave with it.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let llm = LlmSettings::from_env_values(
        cli.api_key.clone(),
        cli.base_url.clone(),
        Some(cli.model.clone()),
    )
    .map(|mut s| {
        s.mode = if cli.full_text {
            RefineMode::FullText
        } else {
            RefineMode::Candidates
        };
        s.stream = !cli.no_stream;
        s.api_timeout_secs = cli.api_timeout;
        s
    });

    if !cli.quiet {
        print_banner(&cli, llm.as_ref());
    }

    // ── Text extraction backend ──────────────────────────────────────────
    let source = PdfiumSource::bind(cli.pdfium_lib.as_deref())
        .context("Text extraction is unavailable")?;

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let mut builder = ExtractionConfig::builder()
        .input_dir(&cli.input_dir)
        .output_csv(&cli.output)
        .window_chars(cli.window as usize);
    if let Some(cb) = progress_cb.clone() {
        builder = builder.progress_callback(cb);
    }
    let config = builder.build().context("Invalid configuration")?;

    // ── Run ──────────────────────────────────────────────────────────────
    let stats = match llm {
        Some(settings) => {
            let refiner = OpenAiRefiner::new(settings, progress_cb)
                .context("Failed to set up the LLM client")?;
            run(&source, &refiner, &config).await
        }
        None => run(&source, &NoopRefiner, &config).await,
    }
    .context("Run aborted")?;

    if !cli.quiet {
        print_summary(&stats, &cli.output);
    }
    Ok(())
}

fn print_banner(cli: &Cli, llm: Option<&LlmSettings>) {
    eprintln!("{}", dim(LINE));
    eprintln!("{}", bold("IPO prospectus VC extraction"));
    eprintln!("  input   {}", cli.input_dir.display());
    eprintln!("  output  {}", cli.output.display());
    match llm {
        Some(s) => eprintln!(
            "  LLM     {} via {}  {}",
            s.model,
            s.base_url,
            dim(&format!(
                "({}, {})",
                match s.mode {
                    RefineMode::Candidates => "candidates",
                    RefineMode::FullText => "full text",
                },
                if s.stream { "streaming" } else { "single response" }
            ))
        ),
        None => eprintln!("  LLM     {}", dim("off (OPENAI_API_KEY not set), rules only")),
    }
    eprintln!("{}", dim(LINE));
}

fn print_summary(stats: &RunStats, output: &std::path::Path) {
    eprintln!("{}", dim(LINE));
    let mark = if stats.files_skipped == 0 && stats.refinement_failures == 0 {
        green("✔")
    } else {
        yellow("⚠")
    };
    eprintln!(
        "{}  {}/{} files → {}  {}",
        mark,
        bold(&stats.rows_written.to_string()),
        stats.files_found,
        bold(&output.display().to_string()),
        dim(&format!("{}ms", stats.duration_ms)),
    );
    if stats.files_skipped > 0 {
        eprintln!("   {} skipped (no extractable text)", red(&stats.files_skipped.to_string()));
    }
    if stats.refined > 0 || stats.refinement_failures > 0 {
        eprintln!(
            "   {} refined by LLM  /  {} fell back to rules",
            stats.refined, stats.refinement_failures
        );
    }
}
