//! CLI binary for foliomd.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig`, orders layout dumps offline (`--layout-only`),
//! and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use foliomd::{
    convert, convert_to_file, inspect, read_layout_dump, ClipMode, ColumnDirection,
    ConversionConfig, ConversionProgress, OrderConfig, PageSelection, PageSeparator,
    ProgressCallback, ReadingOrderEngine, ReassemblyMode, RejectedRegion,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::fmt::Display;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── Terminal colours ─────────────────────────────────────────────────────────

fn paint(code: &str, text: impl Display) -> String {
    format!("\x1b[{code}m{text}\x1b[0m")
}
fn green(text: impl Display) -> String {
    paint("32", text)
}
fn red(text: impl Display) -> String {
    paint("31", text)
}
fn dim(text: impl Display) -> String {
    paint("2", text)
}
fn bold(text: impl Display) -> String {
    paint("1", text)
}
fn cyan(text: impl Display) -> String {
    paint("36", text)
}

// ── Progress rendering ───────────────────────────────────────────────────────

/// Terminal progress callback: a live [indicatif] bar plus one log line per
/// finished page. Pages complete out of order under concurrency, so every
/// line names its page.
struct CliProgress {
    bar: ProgressBar,
    /// Wall-clock start per in-flight page.
    started: Mutex<HashMap<usize, Instant>>,
    failed: AtomicUsize,
}

impl CliProgress {
    /// Starts as a bare spinner; the page count is not known until the PDF
    /// has been opened, at which point `on_conversion_start` grows it into
    /// a real bar.
    fn spinner() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message("opening document\u{2026}");
        bar.enable_steady_tick(Duration::from_millis(90));

        Arc::new(Self {
            bar,
            started: Mutex::new(HashMap::new()),
            failed: AtomicUsize::new(0),
        })
    }

    fn grow_into_bar(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} converting [{bar:40.green/238}] \
                 {pos:>3}/{len} pages  {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▌ "),
        );
        self.bar.reset_eta();
    }

    /// Seconds since the page started, or zero if the start was never seen.
    fn took(&self, page_num: usize) -> f64 {
        let begun = self.started.lock().unwrap().remove(&page_num);
        begun.map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0)
    }
}

impl ConversionProgress for CliProgress {
    fn on_conversion_start(&self, total_pages: usize) {
        self.grow_into_bar(total_pages);
        let banner = format!(
            "{} {}",
            cyan("◆"),
            bold(format!("Converting {total_pages} pages\u{2026}"))
        );
        self.bar.println(banner);
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        self.started.lock().unwrap().insert(page_num, Instant::now());
        self.bar.set_message(format!("on page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, _total: usize, markdown_len: usize) {
        let line = format!(
            "  {} page {:>3}  {}  {}",
            green("✓"),
            page_num,
            dim(format!("{markdown_len:>6} chars")),
            dim(format!("{:>5.1}s", self.took(page_num))),
        );
        self.bar.println(line);
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, _total: usize, error: String) {
        let secs = self.took(page_num);
        self.failed.fetch_add(1, Ordering::SeqCst);

        // Long provider errors would wrap and shred the bar.
        let msg = match error.char_indices().nth(79) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error,
        };

        let line = format!(
            "  {} page {:>3}  {}  {}",
            red("✗"),
            page_num,
            red(msg),
            dim(format!("{secs:>5.1}s")),
        );
        self.bar.println(line);
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();

        let failed = self.failed.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!("{} converted {} pages", green("✔"), bold(success_count));
        } else {
            let mark = if success_count == 0 { red("✘") } else { cyan("⚠") };
            eprintln!(
                "{mark} converted {} of {} pages, {} failed",
                bold(success_count),
                total_pages,
                red(failed),
            );
        }
    }
}

const LONG_HELP: &str = r#"EXAMPLES:
  # Order a detector dump into reading order (no PDF, no network)
  foliomd layout.json --layout-only

  # Wider column-gap threshold, right-to-left column traversal
  foliomd layout.json --layout-only --min-gap-width 36 --column-direction rtl

  # Inspect PDF metadata (no detector or API key needed)
  foliomd --inspect-only document.pdf

  # Full conversion to a file (detector + OCR wired via the library API)
  foliomd document.pdf -o output.md

  # Heuristic reassembly: fully offline, deterministic output
  foliomd --heuristic document.pdf -o output.md

  # Specific pages from a URL, saving figure/table clips
  foliomd --pages 1-5 https://arxiv.org/pdf/1706.03762 --clips-dir assets/ -o attention.md

  # JSON output with per-page stats and YAML front matter
  foliomd --json --metadata document.pdf > output.json

LAYOUT DUMP FORMAT (--layout-only):
  A JSON array with one element per page:

    [{"page": 1, "width": 1240.0, "height": 1754.0,
      "regions": [{"bbox": [72.0, 96.0, 600.0, 140.0],
                   "kind": "title", "score": 0.98}]}]

  Region kinds: text, title, list, table, figure, caption, formula, header,
  footer — plus the label aliases common detectors emit ("figure caption",
  "equation", "reference", "image"). Output is one record per page: region
  ids in reading order, rejected regions with reasons, and the count of
  precedence edges dropped to break contradictions.

LLM REASSEMBLY:
  Reassembly requests carry ordered OCR text fragments, not images, so any
  chat model works; vision capability is not required. Providers: openai
  (default model gpt-4.1-nano), anthropic, gemini, azure, ollama, or any
  OpenAI-compatible endpoint. --heuristic skips the LLM entirely.

ENVIRONMENT:
  OPENAI_API_KEY          key for the OpenAI provider
  ANTHROPIC_API_KEY       key for the Anthropic provider
  GEMINI_API_KEY          key for the Google Gemini provider
  EDGEQUAKE_LLM_PROVIDER  provider fallback when --provider is not given
  EDGEQUAKE_MODEL         model fallback when --model is not given
  PDFIUM_LIB_PATH         path to an existing pdfium shared library

SETUP:
  1. Install pdfium:  grab a release from bblanchon/pdfium-binaries and point
                      PDFIUM_LIB_PATH at the extracted libpdfium (a
                      system-wide copy or one in the working directory also
                      works).
  2. Convert:         foliomd document.pdf -o output.md
  3. Or stay offline: foliomd layout.json --layout-only
"#;

/// Convert documents to Markdown with layout-aware reading order.
#[derive(Parser, Debug)]
#[command(
    name = "foliomd",
    version,
    about = "Convert documents to Markdown with layout-aware reading order",
    long_about = "Convert PDF documents (local files or URLs) to clean, well-structured Markdown. \
Detected layout regions are ranked into human reading order (columns, captions, full-width \
breaks) before OCR text is reassembled per page. Also runs standalone on detector output: \
--layout-only orders a JSON layout dump without touching a PDF or the network.",
    arg_required_else_help = true,
    after_long_help = LONG_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL. With --layout-only: a JSON
    /// layout dump.
    input: String,

    /// Write output to this file instead of stdout.
    #[arg(short, long, env = "FOLIOMD_OUTPUT")]
    output: Option<PathBuf>,

    /// Order a layout dump and print ranked JSON; no PDF or network needed.
    #[arg(long)]
    layout_only: bool,

    /// Minimum horizontal whitespace (px) that separates columns.
    #[arg(long, env = "FOLIOMD_MIN_GAP_WIDTH", default_value_t = 24.0)]
    min_gap_width: f32,

    /// Maximum vertical gap (px) between a figure/table and its caption.
    #[arg(long, env = "FOLIOMD_CAPTION_DISTANCE", default_value_t = 32.0)]
    caption_distance: f32,

    /// Column traversal order.
    #[arg(long, env = "FOLIOMD_COLUMN_DIRECTION", value_enum, default_value = "ltr")]
    column_direction: DirectionArg,

    /// Fraction of page width above which a region spans all columns.
    #[arg(long, env = "FOLIOMD_FULL_WIDTH_RATIO", default_value_t = 0.85)]
    full_width_ratio: f32,

    /// Drop detections below this confidence score.
    #[arg(long, env = "FOLIOMD_MIN_SCORE", default_value_t = 0.25)]
    min_score: f32,

    /// Reassemble pages with the deterministic heuristic instead of an LLM.
    #[arg(long, env = "FOLIOMD_HEURISTIC")]
    heuristic: bool,

    /// Keep page headers and footers in the output.
    #[arg(long, env = "FOLIOMD_KEEP_FURNITURE")]
    keep_furniture: bool,

    /// Save figure/table clips as PNGs in this directory and link them.
    #[arg(long, env = "FOLIOMD_CLIPS_DIR")]
    clips_dir: Option<PathBuf>,

    /// Reassembly model ID. Defaults to gpt-4.1-nano.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Provider: openai, anthropic, gemini, azure, ollama, or an
    /// OpenAI-compatible URL. Auto-detected from API key env vars if unset.
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// Raster resolution in DPI (72-400).
    #[arg(long, env = "FOLIOMD_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Pages processed concurrently.
    #[arg(short, long, env = "FOLIOMD_CONCURRENCY", default_value_t = 10)]
    concurrency: usize,

    /// Which pages to convert: all, 7, 3-15, or 1,3,5.
    #[arg(long, env = "FOLIOMD_PAGES", default_value = "all")]
    pages: String,

    /// Between-page separator: none, hr, comment, or a literal string.
    #[arg(long, env = "FOLIOMD_SEPARATOR", default_value = "none")]
    separator: String,

    /// User password for an encrypted PDF.
    #[arg(long, env = "FOLIOMD_PASSWORD")]
    password: Option<String>,

    /// Path to a text file with a custom reassembly system prompt.
    #[arg(long, env = "FOLIOMD_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Output token cap per reassembly call.
    #[arg(long, env = "FOLIOMD_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Sampling temperature for the reassembly model (0.0-2.0).
    #[arg(long, env = "FOLIOMD_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Attempts per page before recording a page error.
    #[arg(long, env = "FOLIOMD_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Prefix the output with a YAML front-matter block.
    #[arg(long, env = "FOLIOMD_METADATA")]
    metadata: bool,

    /// Emit the full conversion result as JSON rather than Markdown.
    #[arg(long, env = "FOLIOMD_JSON")]
    json: bool,

    /// Turn the progress bar off.
    #[arg(long, env = "FOLIOMD_NO_PROGRESS")]
    no_progress: bool,

    /// Show document metadata and exit without converting.
    #[arg(long)]
    inspect_only: bool,

    /// Verbose tracing output (DEBUG level).
    #[arg(short, long, env = "FOLIOMD_VERBOSE")]
    verbose: bool,

    /// Print nothing but errors.
    #[arg(short, long, env = "FOLIOMD_QUIET")]
    quiet: bool,

    /// Seconds to wait for a URL download.
    #[arg(long, env = "FOLIOMD_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Seconds to wait for each reassembly call.
    #[arg(long, env = "FOLIOMD_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum DirectionArg {
    /// Columns left to right (Latin scripts).
    Ltr,
    /// Columns right to left (Hebrew, Arabic).
    Rtl,
}

impl From<DirectionArg> for ColumnDirection {
    fn from(v: DirectionArg) -> Self {
        match v {
            DirectionArg::Ltr => ColumnDirection::LeftToRight,
            DirectionArg::Rtl => ColumnDirection::RightToLeft,
        }
    }
}

/// One page of `--layout-only` output.
#[derive(serde::Serialize)]
struct PageOrder {
    page: usize,
    /// Region ids in reading order.
    ranked: Vec<u32>,
    rejected: Vec<RejectedRegion>,
    dropped_edges: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // When the bar is active the library's INFO logs would fight it for the
    // terminal, so they are squelched unless -v asks for everything.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.layout_only;
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

    if cli.layout_only {
        return run_layout_only(&cli);
    }
    if cli.inspect_only {
        return run_inspect(&cli).await;
    }

    let progress_cb: Option<ProgressCallback> =
        show_progress.then(|| CliProgress::spinner() as Arc<dyn ConversionProgress>);
    let config = build_config(&cli, progress_cb).await?;

    match cli.output {
        Some(ref output_path) => {
            let stats = convert_to_file(&cli.input, output_path, &config)
                .await
                .context("document conversion failed")?;

            // The callback already logged per-page lines; add the totals.
            if !cli.quiet {
                let selected = stats.processed_pages + stats.failed_pages;
                let mark = if stats.failed_pages == 0 { green("✔") } else { cyan("⚠") };
                eprintln!(
                    "{mark}  {}/{selected} pages in {}ms  →  {}",
                    stats.processed_pages,
                    stats.total_duration_ms,
                    bold(output_path.display()),
                );
                eprintln!(
                    "   {} regions ordered, {} rejected, {} tokens in, {} tokens out",
                    dim(stats.regions_detected),
                    dim(stats.regions_rejected),
                    dim(stats.total_input_tokens),
                    dim(stats.total_output_tokens),
                );
            }
        }
        None => {
            let output = convert(&cli.input, &config)
                .await
                .context("document conversion failed")?;

            if cli.json {
                let json = serde_json::to_string_pretty(&output)
                    .context("could not serialise the conversion output")?;
                println!("{json}");
            } else {
                let mut out = io::stdout().lock();
                out.write_all(output.markdown.as_bytes())
                    .context("could not write to stdout")?;
                if !output.markdown.ends_with('\n') {
                    out.write_all(b"\n").ok();
                }
            }

            if !cli.quiet && !show_progress {
                let selected = output.stats.processed_pages + output.stats.failed_pages;
                eprintln!(
                    "Converted {}/{selected} pages in {}ms ({} regions ordered)",
                    output.stats.processed_pages,
                    output.stats.total_duration_ms,
                    output.stats.regions_detected,
                );
                if output.stats.failed_pages > 0 {
                    eprintln!("  {} pages failed to convert", output.stats.failed_pages);
                }
            } else if !cli.quiet && !cli.json {
                eprintln!(
                    "   {} tokens in, {} tokens out, {}ms total",
                    dim(output.stats.total_input_tokens),
                    dim(output.stats.total_output_tokens),
                    output.stats.total_duration_ms,
                );
            }
        }
    }

    Ok(())
}

/// Print document metadata and exit.
async fn run_inspect(cli: &Cli) -> Result<()> {
    let meta = inspect(&cli.input)
        .await
        .context("could not read document metadata")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&meta)
            .context("could not serialise the document metadata")?;
        println!("{json}");
        return Ok(());
    }

    let field = |label: &str, value: &str| println!("{label:<14}{value}");
    let opt = |label: &str, value: &Option<String>| {
        if let Some(v) = value {
            field(label, v);
        }
    };

    field("File:", &cli.input);
    opt("Title:", &meta.title);
    opt("Author:", &meta.author);
    opt("Subject:", &meta.subject);
    field("Pages:", &meta.page_count.to_string());
    opt("PDF version:", &meta.pdf_version);
    field("Encrypted:", if meta.is_encrypted { "yes" } else { "no" });
    opt("Producer:", &meta.producer);
    opt("Creator:", &meta.creator);
    Ok(())
}

/// Order a detector dump and print ranked JSON, one record per page.
fn run_layout_only(cli: &Cli) -> Result<()> {
    let dump_path = PathBuf::from(&cli.input);
    let dump = read_layout_dump(&dump_path).context("could not read the layout dump")?;

    let order_config = OrderConfig {
        min_gap_width: cli.min_gap_width,
        caption_distance_threshold: cli.caption_distance,
        column_direction: cli.column_direction.clone().into(),
        full_width_ratio: cli.full_width_ratio,
    };
    let engine =
        ReadingOrderEngine::new(order_config).context("ordering configuration rejected")?;

    let mut reports: Vec<PageOrder> = Vec::with_capacity(dump.len());
    for layout in &dump {
        let regions = layout.to_regions(cli.min_score);
        let order = engine.reconstruct(&regions, layout.extent());
        if !cli.quiet {
            eprintln!(
                "page {:>3}: {} regions ranked, {} rejected, {} edges dropped",
                layout.page,
                order.ranked.len(),
                order.rejected.len(),
                order.dropped_edges
            );
        }
        reports.push(PageOrder {
            page: layout.page,
            ranked: order.ranked,
            rejected: order.rejected,
            dropped_edges: order.dropped_edges,
        });
    }

    let json =
        serde_json::to_string_pretty(&reports).context("could not serialise the page orders")?;
    match cli.output {
        Some(ref path) => std::fs::write(path, &json)
            .with_context(|| format!("could not write {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let system_prompt = match cli.system_prompt.as_deref() {
        None => None,
        Some(path) => {
            let prompt = tokio::fs::read_to_string(path).await.with_context(|| {
                format!("could not read the system prompt at {}", path.display())
            })?;
            Some(prompt)
        }
    };

    let mut builder = ConversionConfig::builder()
        .dpi(cli.dpi)
        .concurrency(cli.concurrency)
        .min_gap_width(cli.min_gap_width)
        .caption_distance_threshold(cli.caption_distance)
        .column_direction(cli.column_direction.clone().into())
        .full_width_ratio(cli.full_width_ratio)
        .min_detection_score(cli.min_score)
        .keep_page_furniture(cli.keep_furniture)
        .pages(parse_pages(&cli.pages)?)
        .page_separator(parse_separator(&cli.separator))
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .include_metadata(cli.metadata)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if cli.heuristic {
        builder = builder.reassembly(ReassemblyMode::Heuristic);
    }
    if let Some(ref dir) = cli.clips_dir {
        builder = builder.clip_mode(ClipMode::Files { dir: dir.clone() });
    }
    if let Some(cb) = progress {
        builder = builder.progress(cb);
    }

    let mut config = builder.build().context("configuration rejected")?;

    // Plain fields without builder setters.
    config.model = cli.model.clone();
    config.provider_name = cli.provider.clone();
    config.password = cli.password.clone();
    config.system_prompt = system_prompt;

    Ok(config)
}

/// Parse `--pages` into a `PageSelection`.
fn parse_pages(spec: &str) -> Result<PageSelection> {
    let spec = spec.trim().to_lowercase();

    if spec == "all" {
        return Ok(PageSelection::All);
    }
    if let Some((a, b)) = spec.split_once('-') {
        let start = parse_page_number(a)?;
        let end = parse_page_number(b)?;
        if start > end {
            anyhow::bail!("page range {start}-{end} runs backwards");
        }
        return Ok(PageSelection::Range(start, end));
    }
    if spec.contains(',') {
        let pages = spec
            .split(',')
            .map(parse_page_number)
            .collect::<Result<Vec<_>>>()?;
        return Ok(PageSelection::Set(pages));
    }
    Ok(PageSelection::Single(parse_page_number(&spec)?))
}

fn parse_page_number(s: &str) -> Result<usize> {
    let n: usize = s
        .trim()
        .parse()
        .with_context(|| format!("invalid page number '{}'", s.trim()))?;
    if n == 0 {
        anyhow::bail!("pages are numbered from 1");
    }
    Ok(n)
}

/// Parse `--separator` into a `PageSeparator`. Keywords are matched
/// case-insensitively; anything else is a custom separator, kept as typed.
fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "none" => PageSeparator::None,
        "hr" | "rule" | "---" => PageSeparator::HorizontalRule,
        "comment" => PageSeparator::Comment,
        _ => PageSeparator::Custom(s.to_string()),
    }
}
