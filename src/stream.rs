//! Streaming conversion API: emit pages as they complete.
//!
//! ## Why stream?
//!
//! Large documents take minutes. A streams-based API lets callers display
//! partial results immediately, wire up progress bars, or write pages to disk
//! incrementally instead of buffering the entire document in memory.
//!
//! Unlike the eager [`crate::convert::convert`] which returns only after all
//! pages finish, [`convert_stream`] yields a [`PageResult`] as each page
//! completes. Pages arrive in completion order, not page order (sort by
//! `page_num` if order matters). A failed page still yields its item: the
//! `error` field names the failing stage and `markdown` holds whatever the
//! page salvaged before it.

use crate::config::ConversionConfig;
use crate::convert::{page_out_of_range, process_page, PageContext};
use crate::error::FoliomdError;
use crate::output::PageResult;
use crate::pipeline::{input, render};
use futures::stream::{self, StreamExt};
use std::io::Write;
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// Boxed stream of [`PageResult`] items.
pub type PageStream = Pin<Box<dyn Stream<Item = PageResult> + Send>>;

/// Convert a PDF to Markdown, yielding each page as soon as it is ready.
///
/// Pages run through the same worker as the eager API, up to
/// `config.concurrency` at a time, and one page's failure never aborts its
/// siblings or the stream. Fatal problems (unreadable input, nothing wired
/// into the detector or OCR seams) surface as `Err` before any page is
/// yielded.
pub async fn convert_stream(
    input_str: impl AsRef<str>,
    config: &ConversionConfig,
) -> Result<PageStream, FoliomdError> {
    let input_str = input_str.as_ref();
    info!(input = %input_str, "starting streaming conversion");

    let source = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let pdf_path = source.path().to_path_buf();
    let ctx = Arc::new(PageContext::from_config(config)?);

    let metadata = render::extract_metadata(&pdf_path, config.password.as_deref()).await?;
    let page_count = metadata.page_count;
    let wanted = config.pages.to_indices(page_count);
    if wanted.is_empty() {
        return Err(page_out_of_range(&config.pages, page_count));
    }

    let rendered = render::render_pages(&pdf_path, config, &wanted).await?;

    // A page that never rendered resolves immediately; the rest go through
    // the full worker.
    let fanout = config.concurrency;
    let pages = stream::iter(rendered.into_iter().map(move |(idx, outcome)| {
        let ctx = Arc::clone(&ctx);
        async move {
            let page_num = idx + 1;
            match outcome {
                Ok(image) => process_page(&ctx, page_num, image).await,
                Err(e) => PageResult {
                    error: Some(e),
                    ..PageResult::new(page_num)
                },
            }
        }
    }))
    .buffer_unordered(fanout);

    Ok(Box::pin(pages))
}

/// Streaming equivalent of [`crate::convert::convert_from_bytes`].
///
/// The bytes are spooled to a managed temp file, which is safe to delete as
/// soon as this returns: the stream is fully materialised (every selected
/// page already rendered) before it is handed back.
///
/// # Example
/// ```rust,no_run
/// use foliomd::{convert_stream_from_bytes, ConversionConfig};
/// use futures::StreamExt;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let raw = std::fs::read("document.pdf")?;
/// let mut pages = convert_stream_from_bytes(&raw, &ConversionConfig::default()).await?;
/// while let Some(page) = pages.next().await {
///     match page.error {
///         None => println!("page {}: {} chars", page.page_num, page.markdown.len()),
///         Some(e) => eprintln!("page {} failed: {e}", page.page_num),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub async fn convert_stream_from_bytes(
    bytes: &[u8],
    config: &ConversionConfig,
) -> Result<PageStream, FoliomdError> {
    let mut spool = tempfile::NamedTempFile::new()
        .map_err(|e| FoliomdError::Internal(format!("temp file: {e}")))?;
    spool
        .write_all(bytes)
        .map_err(|e| FoliomdError::Internal(format!("temp file write: {e}")))?;
    let path = spool.path().to_string_lossy().to_string();

    let pages = convert_stream(&path, config).await?;
    drop(spool);
    Ok(pages)
}
