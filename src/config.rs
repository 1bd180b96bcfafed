//! Configuration types for document-to-Markdown conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Keeping every knob in one struct makes
//! it trivial to share configs across threads, serialise the printable parts
//! for logging, and diff two runs to understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A twenty-field constructor is unreadable and breaks on every new field.
//! The builder pattern lets callers set only what they care about and rely on
//! well-documented defaults for the rest. Setters store values as given;
//! range checking happens once, in [`ConversionConfigBuilder::build`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};

use crate::error::FoliomdError;
use crate::layout::{ColumnDirection, OrderConfig};
use crate::pipeline::detect::LayoutDetector;
use crate::pipeline::ocr::OcrEngine;
use crate::progress::ProgressCallback;

/// Configuration for a document-to-Markdown conversion.
///
/// Start from [`ConversionConfig::default()`], or use the
/// [`builder`](ConversionConfig::builder) when anything needs changing:
///
/// ```rust
/// use foliomd::{ConversionConfig, ReassemblyMode};
///
/// let cfg = ConversionConfig::builder()
///     .dpi(200)
///     .min_gap_width(32.0)
///     .reassembly(ReassemblyMode::Heuristic)
///     .build()?;
/// # Ok::<(), foliomd::FoliomdError>(())
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Rendering DPI used when rasterising each page. Range: 72–400. Default: 150.
    ///
    /// 150 DPI is the sweet spot: text is sharp enough for layout detection
    /// and OCR while bitmaps stay small enough to crop and encode cheaply.
    /// Increase to 200–300 for small-font documents; decrease to 96 when
    /// throughput matters more than recognition accuracy.
    pub dpi: u32,

    /// Cap on either dimension of a rendered page, in pixels. Default: 2000.
    ///
    /// Acts independently of `dpi`: a poster-sized page at 200 DPI would
    /// otherwise rasterise to tens of thousands of pixels a side. When the
    /// cap bites, the other dimension scales down proportionally, bounding
    /// what pdfium allocates per page.
    pub max_rendered_pixels: u32,

    /// Number of pages processed at once. Default: the machine's available
    /// parallelism.
    ///
    /// Detection and OCR dominate page cost and are CPU-bound, so the default
    /// follows the core count. In LLM mode the reassembly call is
    /// network-bound; raising this past the core count can still help there
    /// when the provider's rate limits allow it.
    pub concurrency: usize,

    /// Reading-order engine tuning. Default: [`OrderConfig::default()`].
    ///
    /// The engine thresholds are in rendered-page pixels, so they scale with
    /// `dpi`: the 24 px default gutter minimum assumes a 150-DPI render.
    pub order: OrderConfig,

    /// Minimum detector confidence for a region to enter ordering.
    /// Range 0–1. Default: 0.25.
    ///
    /// Layout models emit a long tail of low-confidence boxes overlapping
    /// real regions; ordering them duplicates content. 0.25 keeps
    /// faint-but-real regions while cutting that tail.
    pub min_detection_score: f32,

    /// Layout analysis backend. Required by the conversion entry points;
    /// ordering a pre-parsed layout dump does not need one.
    pub detector: Option<Arc<dyn LayoutDetector>>,

    /// Text recognition backend. Required by the conversion entry points.
    pub ocr: Option<Arc<dyn OcrEngine>>,

    /// How figure and table clips appear in the output. Default: [`ClipMode::Placeholder`].
    pub clip_mode: ClipMode,

    /// How ordered fragments become page Markdown. Default: [`ReassemblyMode::Llm`].
    pub reassembly: ReassemblyMode,

    /// Keep header and footer text in the output. Default: false.
    ///
    /// Running titles and page numbers are noise in a reflowed document, but
    /// legal and archival users sometimes need them verbatim.
    pub keep_page_furniture: bool,

    /// Model identifier for reassembly, e.g. "gpt-4.1-nano" or
    /// "claude-sonnet-4-20250514". `None` falls back to the provider's
    /// default model.
    pub model: Option<String>,

    /// Provider to instantiate by name ("openai", "anthropic", "ollama", …).
    /// When neither this nor `provider` is set, the factory scans the
    /// environment for API keys.
    pub provider_name: Option<String>,

    /// Ready-made provider instance; wins over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the reassembly completion. Range 0–2.
    /// Default: 0.1.
    ///
    /// Low temperature keeps the model faithful to the fragments it was
    /// given, which is exactly what reassembly wants. Higher values introduce
    /// creativity that manifests as invented text.
    pub temperature: f32,

    /// Token budget for the model's output per page. Default: 4096.
    ///
    /// Tables and code-heavy pages can run past 2000 output tokens, and a
    /// budget that is too small truncates the Markdown mid-sentence with no
    /// error.
    pub max_tokens: usize,

    /// Maximum retry attempts on a transient reassembly failure. Default: 3.
    ///
    /// Transient faults (overloaded backends, network blips) dominate
    /// reassembly failures, and three attempts absorb nearly all of them.
    /// When the budget runs out the page downgrades to the heuristic
    /// rendering instead of failing.
    pub max_retries: u32,

    /// First retry delay in milliseconds. Default: 500.
    ///
    /// Each further attempt doubles the wait (500 ms, 1 s, 2 s). Spreading
    /// retries out keeps N concurrent workers from hammering a recovering
    /// endpoint in lockstep.
    pub retry_backoff_ms: u64,

    /// User password for opening an encrypted document.
    pub password: Option<String>,

    /// Custom reassembly system prompt. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Which pages to convert. Default: all.
    pub pages: PageSelection,

    /// Separator inserted between assembled pages. Default: none.
    pub page_separator: PageSeparator,

    /// Emit a YAML front-matter block ahead of page one. Default: false.
    pub include_metadata: bool,

    /// Allowance for downloading URL inputs, in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-reassembly-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Progress event receiver. Default: none (no-op).
    pub progress: Option<ProgressCallback>,
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 2000,
            concurrency: default_concurrency(),
            order: OrderConfig::default(),
            min_detection_score: 0.25,
            detector: None,
            ocr: None,
            clip_mode: ClipMode::default(),
            reassembly: ReassemblyMode::default(),
            keep_page_furniture: false,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            password: None,
            system_prompt: None,
            pages: PageSelection::default(),
            page_separator: PageSeparator::default(),
            include_metadata: false,
            download_timeout_secs: 120,
            api_timeout_secs: 60,
            progress: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    // Trait objects have no Debug; name their types instead.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("order", &self.order)
            .field("min_detection_score", &self.min_detection_score)
            .field(
                "detector",
                &self.detector.as_ref().map(|_| "<dyn LayoutDetector>"),
            )
            .field("ocr", &self.ocr.as_ref().map(|_| "<dyn OcrEngine>"))
            .field("clip_mode", &self.clip_mode)
            .field("reassembly", &self.reassembly)
            .field("keep_page_furniture", &self.keep_page_furniture)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field(
                "provider",
                &self.provider.as_ref().map(|_| "<dyn LLMProvider>"),
            )
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("pages", &self.pages)
            .field("page_separator", &self.page_separator)
            .field(
                "progress",
                &self.progress.as_ref().map(|_| "<dyn ConversionProgress>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// A builder seeded with the defaults.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder { config: Self::default() }
    }
}

/// Chainable builder; finish with [`build`](ConversionConfigBuilder::build).
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, cap: u32) -> Self {
        self.config.max_rendered_pixels = cap;
        self
    }

    pub fn concurrency(mut self, workers: usize) -> Self {
        self.config.concurrency = workers;
        self
    }

    /// Replace the whole engine configuration at once.
    pub fn order(mut self, order: OrderConfig) -> Self {
        self.config.order = order;
        self
    }

    /// Minimum gutter width, in rendered pixels, for a column boundary.
    pub fn min_gap_width(mut self, px: f32) -> Self {
        self.config.order.min_gap_width = px;
        self
    }

    /// Maximum vertical gap, in rendered pixels, gluing a caption to the
    /// figure or table above it.
    pub fn caption_distance_threshold(mut self, px: f32) -> Self {
        self.config.order.caption_distance_threshold = px;
        self
    }

    /// Column traversal direction for the assembled reading order.
    pub fn column_direction(mut self, direction: ColumnDirection) -> Self {
        self.config.order.column_direction = direction;
        self
    }

    /// Fraction of the page width at which a region counts as full-width.
    pub fn full_width_ratio(mut self, ratio: f32) -> Self {
        self.config.order.full_width_ratio = ratio;
        self
    }

    pub fn min_detection_score(mut self, score: f32) -> Self {
        self.config.min_detection_score = score;
        self
    }

    pub fn detector(mut self, detector: Arc<dyn LayoutDetector>) -> Self {
        self.config.detector = Some(detector);
        self
    }

    pub fn ocr_engine(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.config.ocr = Some(ocr);
        self
    }

    pub fn clip_mode(mut self, mode: ClipMode) -> Self {
        self.config.clip_mode = mode;
        self
    }

    pub fn reassembly(mut self, mode: ReassemblyMode) -> Self {
        self.config.reassembly = mode;
        self
    }

    pub fn keep_page_furniture(mut self, v: bool) -> Self {
        self.config.keep_page_furniture = v;
        self
    }

    pub fn model(mut self, id: impl Into<String>) -> Self {
        self.config.model = Some(id.into());
        self
    }

    pub fn provider_name(mut self, label: impl Into<String>) -> Self {
        self.config.provider_name = Some(label.into());
        self
    }

    pub fn provider(mut self, instance: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(instance);
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.config.temperature = temp;
        self
    }

    pub fn max_tokens(mut self, budget: usize) -> Self {
        self.config.max_tokens = budget;
        self
    }

    pub fn max_retries(mut self, count: u32) -> Self {
        self.config.max_retries = count;
        self
    }

    pub fn retry_backoff_ms(mut self, millis: u64) -> Self {
        self.config.retry_backoff_ms = millis;
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = Some(password.into());
        self
    }

    pub fn system_prompt(mut self, text: impl Into<String>) -> Self {
        self.config.system_prompt = Some(text.into());
        self
    }

    pub fn pages(mut self, pages: PageSelection) -> Self {
        self.config.pages = pages;
        self
    }

    pub fn page_separator(mut self, separator: PageSeparator) -> Self {
        self.config.page_separator = separator;
        self
    }

    pub fn include_metadata(mut self, yes: bool) -> Self {
        self.config.include_metadata = yes;
        self
    }

    pub fn download_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.download_timeout_secs = seconds;
        self
    }

    pub fn api_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.api_timeout_secs = seconds;
        self
    }

    pub fn progress(mut self, callback: ProgressCallback) -> Self {
        self.config.progress = Some(callback);
        self
    }

    /// Validate and return the finished configuration.
    ///
    /// Out-of-range values are the one fatal configuration error in the
    /// crate, and they fail here, before any document is touched.
    pub fn build(self) -> Result<ConversionConfig, FoliomdError> {
        let cfg = &self.config;
        if !(72..=400).contains(&cfg.dpi) {
            return Err(FoliomdError::InvalidConfig(format!(
                "dpi must be between 72 and 400, got {}",
                cfg.dpi
            )));
        }
        if cfg.max_rendered_pixels < 100 {
            return Err(FoliomdError::InvalidConfig(format!(
                "max_rendered_pixels must be at least 100, got {}",
                cfg.max_rendered_pixels
            )));
        }
        if cfg.concurrency == 0 {
            return Err(FoliomdError::InvalidConfig(
                "concurrency must be at least 1".into(),
            ));
        }
        if !(cfg.min_detection_score >= 0.0 && cfg.min_detection_score <= 1.0) {
            return Err(FoliomdError::InvalidConfig(format!(
                "min_detection_score must be within [0, 1], got {}",
                cfg.min_detection_score
            )));
        }
        if !(cfg.temperature >= 0.0 && cfg.temperature <= 2.0) {
            return Err(FoliomdError::InvalidConfig(format!(
                "temperature must be within [0, 2], got {}",
                cfg.temperature
            )));
        }
        cfg.order.validate()?;
        Ok(self.config)
    }
}

// ── Mode and selection enums ─────────────────────────────────────────────

/// How figure and table clips appear in the assembled Markdown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipMode {
    /// Italic `*[figure]*` marker; no image data leaves the pipeline. (default)
    #[default]
    Placeholder,
    /// Crops saved as PNG files under `dir` and linked from the Markdown as
    /// `page-{p}-region-{id}.png`.
    Files { dir: PathBuf },
    /// Crops inlined as base64 `data:` URIs. Self-contained output, but large.
    DataUri,
}

/// How ordered fragments become page Markdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReassemblyMode {
    /// One chat completion per page polishes the fragments. (default)
    #[default]
    Llm,
    /// Deterministic per-kind rendering; no provider, no network.
    Heuristic,
}

/// Specifies which pages of the document to convert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSelection {
    /// Every page of the document (default).
    #[default]
    All,
    /// One page, 1-indexed.
    Single(usize),
    /// An inclusive 1-indexed range.
    Range(usize, usize),
    /// An explicit list of 1-indexed pages; duplicates collapse.
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand to sorted, deduplicated 0-indexed page indices. Requests
    /// outside `1..=total_pages` drop out silently; an empty result means
    /// the selection matched nothing.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut picked: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if (1..=total_pages).contains(p) {
                    vec![p - 1]
                } else {
                    Vec::new()
                }
            }
            PageSelection::Range(start, end) => {
                let lo = start.saturating_sub(1);
                let hi = (*end).min(total_pages);
                (lo..hi).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter_map(|&p| (1..=total_pages).contains(&p).then_some(p - 1))
                .collect(),
        };
        picked.sort_unstable();
        picked.dedup();
        picked
    }
}

/// What lands between consecutive pages in the assembled document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSeparator {
    /// Pages joined with a blank line only. (default)
    #[default]
    None,
    /// A thematic break between pages: "\n\n---\n\n"
    HorizontalRule,
    /// An HTML comment naming the incoming page: "<!-- page N -->"
    Comment,
    /// A caller-supplied string, padded with blank lines.
    Custom(String),
}

impl PageSeparator {
    /// The separator text preceding `page_num` (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::None => "\n\n".into(),
            PageSeparator::HorizontalRule => "\n\n---\n\n".into(),
            PageSeparator::Comment => format!("\n\n<!-- page {page_num} -->\n\n"),
            PageSeparator::Custom(s) => format!("\n\n{s}\n\n"),
        }
    }
}
