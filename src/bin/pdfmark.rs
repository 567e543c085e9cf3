//! CLI binary for pdfmarkup.
//!
//! A thin shim over the library crate that maps CLI flags to `MarkupConfig`,
//! renders progress, echoes model replies and parse warnings, and writes the
//! annotated PDF.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdfmarkup::{
    inspect, markup, BoundsPolicy, MarkupConfig, MarkupProgressCallback, PageSelection,
    ProgressCallback, DEFAULT_OUTPUT_NAME,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: renders a live progress bar, per-page log
/// lines, model-reply echoes, and parse warnings using [indicatif]. Designed
/// to work correctly when pages complete out-of-order (concurrent fan-out).
struct CliProgressCallback {
    /// The single progress bar anchored at the bottom of the terminal.
    bar: ProgressBar,
    /// Per-page wall-clock start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
    /// Count of unparseable reply lines.
    warnings: AtomicUsize,
    /// Echo each page's raw model reply above the bar.
    show_responses: bool,
}

impl CliProgressCallback {
    /// Create a callback whose progress-bar length is set dynamically
    /// by `on_run_start` (called before any pages are processed).
    fn new_dynamic(show_responses: bool) -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_run_start

        // Initial style: spinner only (no counter until we know the total).
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            warnings: AtomicUsize::new(0),
            show_responses,
        })
    }

    /// Switch to the full progress-bar style once we know `total`.
    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Marking up");
        self.bar.reset_eta();
    }
}

impl MarkupProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Analysing {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap()
            .insert(page_num, Instant::now());
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_response(&self, page_num: usize, response: &str) {
        if !self.show_responses {
            return;
        }
        self.bar
            .println(bold(&format!("── Page {page_num} suggestions ──")));
        for line in response.lines() {
            self.bar.println(format!("  {}", dim(line)));
        }
    }

    fn on_parse_warning(&self, page_num: usize, line: &str) {
        self.warnings.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} Page {page_num}: could not parse line: {}",
            yellow("⚠"),
            dim(line)
        ));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, candidates: usize) {
        let elapsed_ms = self
            .start_times
            .lock()
            .unwrap()
            .remove(&page_num)
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<14}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{candidates} annotations")),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_pages: usize, annotations: usize) {
        self.bar.finish_and_clear();

        let warnings = self.warnings.load(Ordering::SeqCst);
        eprintln!(
            "{} {} annotations across {} pages{}",
            green("✔"),
            bold(&annotations.to_string()),
            total_pages,
            if warnings > 0 {
                yellow(&format!("  ({warnings} lines skipped)"))
            } else {
                String::new()
            }
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Highlight everything matching an instruction
  pdfmark report.pdf -i "Highlight all temperatures above 300°C"

  # Write to a specific output file
  pdfmark report.pdf -i "Mark every missing signature" -o reviewed.pdf

  # Read the instruction from a file, specific pages only
  pdfmark --instruction-file prompt.txt --pages 1-5 contract.pdf

  # Use a specific model
  pdfmark --model gpt-4.1 --provider openai invoice.pdf -i "Flag totals over $1000"

  # Mark up a PDF straight from a URL
  pdfmark https://example.com/spec.pdf -i "Highlight undefined terms"

  # Echo each page's raw model reply while working
  pdfmark report.pdf -i "Highlight errors" --show-responses

  # Clamp model rectangles to the page instead of drawing off-page ink
  pdfmark report.pdf -i "Highlight errors" --bounds clamp

  # Inspect PDF metadata (no API key needed)
  pdfmark --inspect-only report.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium

SETUP:
  1. Set API key:     export OPENAI_API_KEY=sk-...
  2. Mark up:         pdfmark document.pdf -i "Highlight all errors"

The annotated copy is written next to you as marked_output.pdf unless -o is
given; the original file is never modified.
"#;

/// Annotate PDF documents from natural-language instructions using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdfmark",
    version,
    about = "Annotate PDF documents from natural-language instructions using Vision LLMs",
    long_about = "Annotate PDF documents (local files or URLs) by describing what to mark up in \
plain language. Each page is shown to a Vision Language Model; the model's suggested bounding \
boxes and comments are burned onto the PDF as highlight and text annotations. Supports OpenAI, \
Anthropic, Google Gemini, and any OpenAI-compatible endpoint (Ollama, vLLM, LiteLLM, etc.).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// What to mark up, e.g. "Highlight all temperatures above 300°C".
    #[arg(short, long, env = "PDFMARK_INSTRUCTION", conflicts_with = "instruction_file")]
    instruction: Option<String>,

    /// Read the instruction from a text file instead.
    #[arg(long, value_name = "FILE")]
    instruction_file: Option<PathBuf>,

    /// Write the annotated PDF to this file.
    #[arg(short, long, env = "PDFMARK_OUTPUT", default_value = DEFAULT_OUTPUT_NAME)]
    output: PathBuf,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDFMARK_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Number of concurrent VLM API calls.
    #[arg(short, long, env = "PDFMARK_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDFMARK_PAGES", default_value = "all")]
    pages: String,

    /// Off-page rectangle policy: pass (draw as-is) or clamp (trim to page).
    #[arg(long, env = "PDFMARK_BOUNDS", value_enum, default_value = "pass")]
    bounds: BoundsArg,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDFMARK_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom system directive.
    #[arg(long, env = "PDFMARK_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens per page.
    #[arg(long, env = "PDFMARK_MAX_TOKENS", default_value_t = 1000)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDFMARK_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per page on a transient LLM failure.
    #[arg(long, env = "PDFMARK_MAX_RETRIES", default_value_t = 1)]
    max_retries: u32,

    /// Echo each page's raw model reply while working.
    #[arg(long, env = "PDFMARK_SHOW_RESPONSES")]
    show_responses: bool,

    /// Print a structured JSON report of the run to stdout.
    #[arg(long, env = "PDFMARK_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, env = "PDFMARK_NO_PROGRESS")]
    no_progress: bool,

    /// Print PDF metadata only, no markup.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFMARK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFMARK_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDFMARK_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-page LLM call timeout in seconds.
    #[arg(long, env = "PDFMARK_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BoundsArg {
    Pass,
    Clamp,
}

impl From<BoundsArg> for BoundsPolicy {
    fn from(v: BoundsArg) -> Self {
        match v {
            BoundsArg::Pass => BoundsPolicy::PassThrough,
            BoundsArg::Clamp => BoundsPolicy::Clamp,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let meta = inspect(&cli.input).await.context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", cli.input);
            if let Some(ref t) = meta.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {}", a);
            }
            if let Some(ref s) = meta.subject {
                println!("Subject:      {}", s);
            }
            println!("Pages:        {}", meta.page_count);
            println!("PDF Version:  {}", meta.pdf_version);
            if let Some(ref p) = meta.producer {
                println!("Producer:     {}", p);
            }
            if let Some(ref c) = meta.creator {
                println!("Creator:      {}", c);
            }
        }
        return Ok(());
    }

    // ── Resolve the instruction ──────────────────────────────────────────
    let instruction = match (&cli.instruction, &cli.instruction_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read instruction from {:?}", path))?,
        (None, None) => anyhow::bail!(
            "No instruction given. Pass -i \"...\" or --instruction-file <FILE>."
        ),
    };

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic(cli.show_responses);
        Some(cb as Arc<dyn MarkupProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // ── Run markup ───────────────────────────────────────────────────────
    let output = markup(&cli.input, &instruction, &config)
        .await
        .context("Markup failed")?;

    tokio::fs::write(&cli.output, &output.pdf)
        .await
        .with_context(|| format!("Failed to write {:?}", cli.output))?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise report")?;
        println!("{json}");
    }

    // When the progress bar is off, echo responses/warnings were not shown
    // live; print a plain summary instead.
    if !cli.quiet {
        if !show_progress {
            for page in &output.pages {
                if cli.show_responses {
                    eprintln!("── Page {} suggestions ──", page.page_num);
                    eprintln!("{}", page.response);
                }
                for warning in &page.warnings {
                    eprintln!(
                        "warning: page {}: could not parse line: {}",
                        page.page_num, warning.line
                    );
                }
            }
        }
        eprintln!(
            "{}  {} annotations, {} warnings, {}ms  →  {}",
            if output.stats.warning_count == 0 {
                green("✔")
            } else {
                yellow("⚠")
            },
            output.stats.annotation_count,
            output.stats.warning_count,
            output.stats.total_duration_ms,
            bold(&cli.output.display().to_string()),
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&output.stats.total_input_tokens.to_string()),
            dim(&output.stats.total_output_tokens.to_string()),
        );
    }

    Ok(())
}

/// Map CLI args to `MarkupConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<MarkupConfig> {
    let system_prompt = if let Some(ref path) = cli.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let pages = parse_pages(&cli.pages)?;

    let mut builder = MarkupConfig::builder()
        .dpi(cli.dpi)
        .concurrency(cli.concurrency)
        .pages(pages)
        .bounds_policy(cli.bounds.into())
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    let mut config = builder.build().context("Invalid configuration")?;

    // Apply fields the builder doesn't have setters for (or that need special handling)
    config.model = cli.model.clone();
    config.provider_name = cli.provider.clone();
    config.password = cli.password.clone();
    config.system_prompt = system_prompt;

    Ok(config)
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }

        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .context(format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        for &p in &pages {
            if p < 1 {
                anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
            }
        }

        return Ok(PageSelection::Set(pages));
    }

    // Single page: "5"
    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }

    Ok(PageSelection::Single(page))
}
