//! Eager (full-document) conversion entry points.
//!
//! ## Why eager vs. streaming?
//!
//! This module provides the simpler API: wait for all pages, then return.
//! It collects every [`PageResult`] into memory and assembles the final
//! Markdown document before returning. Use [`crate::stream::convert_stream`]
//! instead when you want pages progressively or need to limit peak memory
//! use on documents with hundreds of pages.
//!
//! The per-page worker ([`process_page`]) is shared with the streaming API:
//! detection, ordering, and recognition run on the blocking pool, reassembly
//! awaits the network, and every failure mode folds into the page's result
//! instead of aborting siblings.

use crate::config::{ConversionConfig, PageSelection, ReassemblyMode};
use crate::error::{FoliomdError, PageError};
use crate::layout::{PageExtent, ReadingOrderEngine, Region, RejectedRegion};
use crate::output::{ConversionOutput, ConversionStats, DocumentMetadata, PageResult};
use crate::pipeline::detect::LayoutDetector;
use crate::pipeline::ocr::OcrEngine;
use crate::pipeline::reassemble::PageFragment;
use crate::pipeline::{detect, input, ocr, postprocess, reassemble, render};
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Model used when neither the caller nor the environment names one.
const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Convert one document, given as a local path or an HTTP/HTTPS URL, to
/// Markdown.
///
/// The main library entry point. A page that fails is recorded in the
/// output (its [`PageResult`] carries the error) rather than aborting its
/// siblings; check `output.stats.failed_pages` afterwards.
///
/// # Errors
///
/// The call itself fails only when no output can be produced at all: the
/// input cannot be read or downloaded, the bytes are not a PDF, a detector
/// or OCR engine is missing from the configuration, or every selected page
/// failed.
pub async fn convert(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, FoliomdError> {
    let total_start = Instant::now();
    let input_str = input_str.as_ref();
    info!(input = %input_str, "starting conversion");

    // Bring the input local, then resolve the collaborators every page
    // worker shares. Both fail fast, before any rendering happens.
    let source = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let pdf_path = source.path().to_path_buf();
    let ctx = Arc::new(PageContext::from_config(config)?);

    // Metadata comes first: the page count drives selection and progress.
    let metadata = render::extract_metadata(&pdf_path, config.password.as_deref()).await?;
    let page_count = metadata.page_count;
    info!(pages = page_count, "document opened");

    let indices = config.pages.to_indices(page_count);
    if indices.is_empty() {
        return Err(page_out_of_range(&config.pages, page_count));
    }
    debug!(selected = indices.len(), "page selection resolved");

    // on_conversion_start reports how many pages will actually run, which
    // is the selection size, not the document page count.
    if let Some(ref cb) = config.progress {
        cb.on_conversion_start(indices.len());
    }

    let render_start = Instant::now();
    let rendered = render::render_pages(&pdf_path, config, &indices).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!(pages = rendered.len(), ms = render_duration_ms, "pages rasterised");

    // The rest of the run is shared with `convert_pages`.
    convert_rendered(
        ctx,
        rendered,
        indices.len(),
        metadata,
        render_duration_ms,
        total_start,
    )
    .await
}

/// Convert pre-rasterised page images to Markdown.
///
/// Skips input resolution and rasterisation entirely: the caller supplies
/// one image per page, in page order. Useful when pages come from another
/// rendering stack (or a scanner), and the way to exercise the pipeline
/// without a pdfium library on the machine.
///
/// Metadata in the output is empty apart from `page_count`, and
/// `stats.render_duration_ms` is zero. `config.pages` still applies, against
/// the supplied vector.
pub async fn convert_pages(
    images: Vec<DynamicImage>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, FoliomdError> {
    let total_start = Instant::now();
    info!(pages = images.len(), "starting conversion of pre-rendered pages");

    let ctx = Arc::new(PageContext::from_config(config)?);

    let page_count = images.len();
    let metadata = DocumentMetadata {
        page_count,
        ..DocumentMetadata::default()
    };

    let indices = config.pages.to_indices(page_count);
    if indices.is_empty() {
        return Err(page_out_of_range(&config.pages, page_count));
    }
    if let Some(ref cb) = config.progress {
        cb.on_conversion_start(indices.len());
    }

    // to_indices returns a sorted list, so membership is a binary search.
    let rendered: Vec<(usize, Result<DynamicImage, PageError>)> = images
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| indices.binary_search(idx).is_ok())
        .map(|(idx, image)| (idx, Ok(image)))
        .collect();

    convert_rendered(ctx, rendered, indices.len(), metadata, 0, total_start).await
}

/// Convert a document and write the Markdown to `output_path`.
///
/// The file appears atomically: content lands in a sibling `.md.tmp` first
/// and is renamed over the target, so a reader never observes a
/// half-written document.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionStats, FoliomdError> {
    let output = convert(input_str, config).await?;
    let path = output_path.as_ref();

    let write_err = |e: std::io::Error| FoliomdError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let staging = path.with_extension("md.tmp");
    tokio::fs::write(&staging, &output.markdown)
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&staging, path).await.map_err(write_err)?;

    Ok(output.stats)
}

/// Blocking wrapper around [`convert`] for callers without an async runtime.
pub fn convert_sync(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, FoliomdError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| FoliomdError::Internal(format!("could not start a tokio runtime: {e}")))?
        .block_on(convert(input_str, config))
}

/// Extract PDF metadata without converting content.
///
/// Does not require a detector, an OCR engine, or an LLM provider.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<DocumentMetadata, FoliomdError> {
    // 120s is the default download allowance; inspect has no config.
    let source = input::resolve_input(input_str.as_ref(), 120).await?;
    let pdf_path = source.path().to_path_buf();
    render::extract_metadata(&pdf_path, None).await
}

/// Convert an in-memory PDF to Markdown.
///
/// The bytes are spooled to a managed [`tempfile`] that is removed when the
/// call returns, even on panic. Reach for this when the document arrives
/// over the network or out of a database rather than as a file on disk.
///
/// ```rust,no_run
/// use foliomd::{convert_from_bytes, ConversionConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("document.pdf")?;
/// let output = convert_from_bytes(&bytes, &ConversionConfig::default()).await?;
/// print!("{}", output.markdown);
/// # Ok(())
/// # }
/// ```
pub async fn convert_from_bytes(
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<ConversionOutput, FoliomdError> {
    let mut spool = tempfile::NamedTempFile::new()
        .map_err(|e| FoliomdError::Internal(format!("temp file: {e}")))?;
    spool
        .write_all(bytes)
        .map_err(|e| FoliomdError::Internal(format!("temp file write: {e}")))?;
    let path = spool.path().to_string_lossy().to_string();
    // `spool` lives to the end of the call; the file is unlinked on drop.
    convert(&path, config).await
}

// ── Per-page worker ──────────────────────────────────────────────────────

/// Everything the per-page worker needs, resolved once per conversion.
pub(crate) struct PageContext {
    pub(crate) detector: Arc<dyn LayoutDetector>,
    pub(crate) ocr: Arc<dyn OcrEngine>,
    pub(crate) provider: Option<Arc<dyn LLMProvider>>,
    pub(crate) engine: ReadingOrderEngine,
    pub(crate) config: ConversionConfig,
}

impl PageContext {
    /// Gather the collaborators the worker needs, failing fast on the ones
    /// the configuration did not provide. The provider is resolved only in
    /// LLM mode; heuristic reassembly never touches the network.
    pub(crate) fn from_config(config: &ConversionConfig) -> Result<Self, FoliomdError> {
        let detector = config
            .detector
            .clone()
            .ok_or(FoliomdError::DetectorNotConfigured)?;
        let ocr = config.ocr.clone().ok_or(FoliomdError::OcrNotConfigured)?;
        let provider = match config.reassembly {
            ReassemblyMode::Llm => Some(resolve_provider(config)?),
            ReassemblyMode::Heuristic => None,
        };
        let engine = ReadingOrderEngine::new(config.order)?;
        Ok(Self {
            detector,
            ocr,
            provider,
            engine,
            config: config.clone(),
        })
    }
}

/// Run one rendered page through detection, ordering, recognition,
/// reassembly, and cleanup.
///
/// Never fails: each stage folds its error into the result and later stages
/// carry on with whatever the page salvaged, so `markdown` is always the
/// best effort available. Detection through recognition is CPU-bound and
/// runs via `spawn_blocking`; only reassembly awaits the network.
pub(crate) async fn process_page(
    ctx: &PageContext,
    page_num: usize,
    image: DynamicImage,
) -> PageResult {
    let start = Instant::now();
    let mut result = PageResult::new(page_num);

    let detector = Arc::clone(&ctx.detector);
    let ocr_engine = Arc::clone(&ctx.ocr);
    let engine = ctx.engine.clone();
    let config = ctx.config.clone();
    let gathered = tokio::task::spawn_blocking(move || {
        gather_page(
            detector.as_ref(),
            ocr_engine.as_ref(),
            &engine,
            page_num,
            &image,
            &config,
        )
    })
    .await;

    let gathered = match gathered {
        Ok(g) => g,
        Err(e) => {
            result.error = Some(PageError::DetectionFailed {
                page: page_num,
                detail: format!("page worker panicked: {e}"),
            });
            result.duration_ms = start.elapsed().as_millis() as u64;
            return result;
        }
    };

    result.regions_detected = gathered.regions_detected;
    result.rejected_regions = gathered.rejected;
    result.regions_recognized = gathered.recognized;
    result.dropped_edges = gathered.dropped_edges;

    let outcome = reassemble::reassemble_page(
        ctx.provider.as_ref(),
        page_num,
        &gathered.fragments,
        &ctx.config,
    )
    .await;
    result.markdown = postprocess::clean_markdown(&outcome.markdown);
    result.input_tokens = outcome.input_tokens;
    result.output_tokens = outcome.output_tokens;
    result.retries = outcome.retries;
    // The earliest failing stage names the page error.
    result.error = gathered.error.or(outcome.error);
    result.duration_ms = start.elapsed().as_millis() as u64;
    result
}

/// What the blocking stages produced for one page.
#[derive(Default)]
struct GatheredPage {
    fragments: Vec<PageFragment>,
    regions_detected: usize,
    rejected: Vec<RejectedRegion>,
    dropped_edges: usize,
    recognized: usize,
    error: Option<PageError>,
}

/// The blocking half of the worker: detect regions, rank them, crop and
/// recognise each in reading order.
fn gather_page(
    detector: &dyn LayoutDetector,
    ocr_engine: &dyn OcrEngine,
    engine: &ReadingOrderEngine,
    page_num: usize,
    image: &DynamicImage,
    config: &ConversionConfig,
) -> GatheredPage {
    let detections = match detect::detect_page(detector, page_num, image) {
        Ok(d) => d,
        Err(e) => {
            return GatheredPage {
                error: Some(e),
                ..GatheredPage::default()
            }
        }
    };

    let regions = detect::regions_from_detections(&detections, config.min_detection_score);
    let order = engine.reconstruct(&regions, PageExtent::of_image(image));
    // regions_from_detections assigns ids equal to vector positions, so a
    // ranked id indexes straight back into `regions`.
    let ordered: Vec<&Region> = order
        .ranked
        .iter()
        .map(|&id| &regions[id as usize])
        .collect();
    debug!(
        page = page_num,
        ranked = ordered.len(),
        rejected = order.rejected.len(),
        "page layout ordered"
    );

    let (fragments, recognized, error) =
        ocr::gather_fragments(ocr_engine, page_num, image, &ordered, config);
    GatheredPage {
        fragments,
        regions_detected: order.ranked.len(),
        rejected: order.rejected,
        dropped_edges: order.dropped_edges,
        recognized,
        error,
    }
}

// ── Shared internals ─────────────────────────────────────────────────────

/// Process rendered pages concurrently, then assemble the document and the
/// run statistics. Shared tail of [`convert`] and [`convert_pages`].
async fn convert_rendered(
    ctx: Arc<PageContext>,
    rendered: Vec<(usize, Result<DynamicImage, PageError>)>,
    selected: usize,
    metadata: DocumentMetadata,
    render_duration_ms: u64,
    total_start: Instant,
) -> Result<ConversionOutput, FoliomdError> {
    // Pages that never rendered become failed results straight away; only
    // the rest go to the workers.
    let mut pages: Vec<PageResult> = Vec::with_capacity(rendered.len());
    let mut renderable: Vec<(usize, DynamicImage)> = Vec::with_capacity(rendered.len());
    for (idx, outcome) in rendered {
        match outcome {
            Ok(image) => renderable.push((idx, image)),
            Err(e) => {
                if let Some(ref cb) = ctx.config.progress {
                    cb.on_page_start(idx + 1, selected);
                    cb.on_page_error(idx + 1, selected, e.to_string());
                }
                let mut failed = PageResult::new(idx + 1);
                failed.error = Some(e);
                pages.push(failed);
            }
        }
    }

    let concurrency = ctx.config.concurrency;
    let worked: Vec<PageResult> = stream::iter(renderable.into_iter().map(|(idx, image)| {
        let ctx = Arc::clone(&ctx);
        let page_num = idx + 1;
        async move {
            if let Some(ref cb) = ctx.config.progress {
                cb.on_page_start(page_num, selected);
            }
            let result = process_page(&ctx, page_num, image).await;
            if let Some(ref cb) = ctx.config.progress {
                match &result.error {
                    None => cb.on_page_complete(page_num, selected, result.markdown.len()),
                    Some(e) => cb.on_page_error(page_num, selected, e.to_string()),
                }
            }
            result
        }
    }))
    .buffer_unordered(concurrency)
    .collect()
    .await;
    pages.extend(worked);

    // buffer_unordered scrambles completion order.
    pages.sort_by_key(|p| p.page_num);

    let converted = pages.iter().filter(|p| p.error.is_none()).count();
    let failures = pages.len() - converted;
    if converted == 0 {
        let first_error = pages
            .iter()
            .find_map(|p| p.error.as_ref().map(|e| e.to_string()))
            .unwrap_or_else(|| "unknown error".to_string());

        return Err(FoliomdError::AllPagesFailed {
            total: pages.len(),
            retries: ctx.config.max_retries,
            first_error,
        });
    }

    let markdown = assemble_document(&pages, &ctx.config, &metadata);

    let stats = ConversionStats {
        total_pages: metadata.page_count,
        processed_pages: converted,
        failed_pages: failures,
        skipped_pages: metadata.page_count.saturating_sub(selected),
        regions_detected: pages.iter().map(|p| p.regions_detected).sum(),
        regions_rejected: pages.iter().map(|p| p.rejected_regions.len()).sum(),
        regions_recognized: pages.iter().map(|p| p.regions_recognized).sum(),
        dropped_edges: pages.iter().map(|p| p.dropped_edges).sum(),
        total_input_tokens: pages.iter().map(|p| p.input_tokens).sum(),
        total_output_tokens: pages.iter().map(|p| p.output_tokens).sum(),
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        render_duration_ms,
    };

    info!(
        converted,
        selected,
        ms = stats.total_duration_ms,
        "conversion complete"
    );

    // Report against the selected count, matching on_conversion_start.
    if let Some(ref cb) = ctx.config.progress {
        cb.on_conversion_complete(selected, converted);
    }

    Ok(ConversionOutput {
        markdown,
        pages,
        metadata,
        stats,
    })
}

/// The requested page to name when a selection matches nothing.
pub(crate) fn page_out_of_range(selection: &PageSelection, total: usize) -> FoliomdError {
    let page = match selection {
        PageSelection::All => 0,
        PageSelection::Single(p) => *p,
        PageSelection::Range(start, _) => *start,
        PageSelection::Set(pages) => pages.first().copied().unwrap_or(0),
    };
    FoliomdError::PageOutOfRange { page, total }
}

/// Instantiate the provider `name` with `model`, or the default model.
fn named_provider(
    name: &str,
    model: Option<&str>,
) -> Result<Arc<dyn LLMProvider>, FoliomdError> {
    let model = model.unwrap_or(DEFAULT_MODEL);
    ProviderFactory::create_llm_provider(name, model).map_err(|e| {
        FoliomdError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: e.to_string(),
        }
    })
}

/// Pick the LLM provider for reassembly, most specific source first.
///
/// 1. A pre-built `config.provider` is used as-is. The route for tests and
///    for callers who wrap a provider in their own middleware.
/// 2. A named `config.provider_name` (plus optional `config.model`) goes to
///    [`ProviderFactory::create_llm_provider`], which reads the matching API
///    key from the environment.
/// 3. The `EDGEQUAKE_LLM_PROVIDER` / `EDGEQUAKE_MODEL` pair is honoured when
///    both are set, so an environment-level choice survives the presence of
///    several API keys.
/// 4. Otherwise the factory scans the known API key variables and takes the
///    first hit, with OpenAI preferred when its key is present.
fn resolve_provider(config: &ConversionConfig) -> Result<Arc<dyn LLMProvider>, FoliomdError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        return named_provider(name, config.model.as_deref());
    }

    let env_provider = std::env::var("EDGEQUAKE_LLM_PROVIDER").unwrap_or_default();
    let env_model = std::env::var("EDGEQUAKE_MODEL").unwrap_or_default();
    if !env_provider.is_empty() && !env_model.is_empty() {
        return named_provider(&env_provider, Some(&env_model));
    }

    // With several keys in the environment the scan order below would pick
    // arbitrarily, so an OpenAI key short-circuits to OpenAI.
    if std::env::var("OPENAI_API_KEY").map_or(false, |k| !k.is_empty()) {
        return named_provider("openai", config.model.as_deref());
    }

    let (provider, _embedding) = ProviderFactory::from_env().map_err(|e| {
        FoliomdError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "no LLM provider could be detected from the environment; set \
                 OPENAI_API_KEY or ANTHROPIC_API_KEY, or configure one explicitly ({e})"
            ),
        }
    })?;
    Ok(provider)
}

/// Join page results into the final document.
///
/// Failed pages drop out; separators render only between kept pages. Pages
/// are trimmed at the seams, since each already ends with a newline and the
/// separator brings its own blank lines, and the document always ends with
/// exactly one newline.
fn assemble_document(
    pages: &[PageResult],
    config: &ConversionConfig,
    metadata: &DocumentMetadata,
) -> String {
    let mut doc = String::new();

    if config.include_metadata {
        doc.push_str(&format_yaml_front_matter(metadata));
    }

    let kept = pages.iter().filter(|p| p.error.is_none());
    for (i, page) in kept.enumerate() {
        if i > 0 {
            doc.push_str(&config.page_separator.render(page.page_num));
        }
        doc.push_str(page.markdown.trim_end());
    }

    while doc.ends_with('\n') {
        doc.pop();
    }
    doc.push('\n');
    doc
}

/// Document metadata as a YAML front-matter block.
fn format_yaml_front_matter(meta: &DocumentMetadata) -> String {
    let quoted: [(&str, &Option<String>); 5] = [
        ("title", &meta.title),
        ("author", &meta.author),
        ("subject", &meta.subject),
        ("creator", &meta.creator),
        ("producer", &meta.producer),
    ];

    let mut yaml = String::from("---\n");
    for (key, value) in quoted {
        if let Some(v) = value {
            yaml.push_str(&format!("{key}: \"{v}\"\n"));
        }
    }
    yaml.push_str(&format!("pages: {}\n", meta.page_count));
    if let Some(ref v) = meta.pdf_version {
        yaml.push_str(&format!("pdf_version: \"{v}\"\n"));
    }
    yaml.push_str("---\n\n");
    yaml
}
