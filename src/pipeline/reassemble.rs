//! Page reassembly: ordered fragments in, page Markdown out.
//!
//! Two modes share this stage. With a provider, the page's fragments are sent
//! as one tagged listing in a single chat completion and the model does the
//! prose cleanup; the completion is retried with exponential backoff and a
//! per-call timeout. Without a provider, or when the model keeps failing, a
//! deterministic per-kind rendering produces the Markdown instead, so every
//! page ends up with best-effort output.

use std::sync::Arc;
use std::time::Duration;

use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use tracing::{debug, warn};

use crate::config::ConversionConfig;
use crate::error::PageError;
use crate::layout::RegionKind;
use crate::prompts;

/// One ordered fragment of a page.
#[derive(Debug, Clone)]
pub enum PageFragment {
    /// Recognised text from a text-bearing region.
    Text { kind: RegionKind, text: String },
    /// Pre-rendered Markdown for a figure or table clip.
    Illustration { kind: RegionKind, markdown: String },
}

impl PageFragment {
    pub fn kind(&self) -> RegionKind {
        match self {
            PageFragment::Text { kind, .. } | PageFragment::Illustration { kind, .. } => *kind,
        }
    }

    fn body(&self) -> &str {
        match self {
            PageFragment::Text { text, .. } => text,
            PageFragment::Illustration { markdown, .. } => markdown,
        }
    }
}

/// What reassembly produced for one page.
#[derive(Debug)]
pub(crate) struct ReassemblyOutcome {
    pub markdown: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub retries: u8,
    pub error: Option<PageError>,
}

impl ReassemblyOutcome {
    fn heuristic(markdown: String) -> Self {
        Self {
            markdown,
            input_tokens: 0,
            output_tokens: 0,
            retries: 0,
            error: None,
        }
    }
}

/// Reassembles one page's fragments into Markdown.
///
/// `provider` is `Some` only in LLM mode. The call never fails; an exhausted
/// retry budget downgrades to the heuristic rendering and records the reason
/// in the outcome's `error`.
pub(crate) async fn reassemble_page(
    provider: Option<&Arc<dyn LLMProvider>>,
    page_num: usize,
    fragments: &[PageFragment],
    config: &ConversionConfig,
) -> ReassemblyOutcome {
    let Some(provider) = provider else {
        return ReassemblyOutcome::heuristic(heuristic_markdown(
            fragments,
            config.keep_page_furniture,
        ));
    };
    if fragments.is_empty() {
        return ReassemblyOutcome::heuristic(String::new());
    }

    let system = config
        .system_prompt
        .as_deref()
        .unwrap_or(prompts::DEFAULT_SYSTEM_PROMPT);
    let request = prompts::page_request(&present_kinds(fragments), &fragment_digest(fragments));
    let messages = vec![ChatMessage::system(system), ChatMessage::user(&request)];
    let options = completion_options(config);
    let timeout = Duration::from_secs(config.api_timeout_secs);

    let mut last_error = String::new();
    let mut timed_out = false;
    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff_ms = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                page = page_num,
                attempt,
                backoff_ms,
                "reassembly failed ({last_error}), retrying"
            );
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        }
        match tokio::time::timeout(timeout, provider.chat(&messages, Some(&options))).await {
            Err(_) => {
                timed_out = true;
                last_error = format!("no response within {}s", config.api_timeout_secs);
            }
            Ok(Err(e)) => {
                timed_out = false;
                last_error = e.to_string();
            }
            Ok(Ok(response)) => {
                debug!(
                    page = page_num,
                    attempts = attempt + 1,
                    "page reassembled by model"
                );
                return ReassemblyOutcome {
                    markdown: response.content,
                    input_tokens: response.prompt_tokens as u64,
                    output_tokens: response.completion_tokens as u64,
                    retries: attempt as u8,
                    error: None,
                };
            }
        }
    }

    warn!(
        page = page_num,
        "reassembly exhausted retries, keeping heuristic rendering"
    );
    let error = if timed_out {
        PageError::Timeout {
            page: page_num,
            secs: config.api_timeout_secs,
        }
    } else {
        PageError::ReassemblyFailed {
            page: page_num,
            retries: config.max_retries as u8,
            detail: last_error,
        }
    };
    ReassemblyOutcome {
        markdown: heuristic_markdown(fragments, config.keep_page_furniture),
        input_tokens: 0,
        output_tokens: 0,
        retries: config.max_retries as u8,
        error: Some(error),
    }
}

/// Deterministic per-kind Markdown rendering.
///
/// Also the fallback when the model is unreachable, so its output must stand
/// on its own: headings for titles, display math for formulas, bullet lines
/// for lists, emphasis for captions, clips passed through verbatim.
pub(crate) fn heuristic_markdown(fragments: &[PageFragment], keep_furniture: bool) -> String {
    let mut blocks: Vec<String> = Vec::new();
    for frag in fragments {
        if frag.kind().is_furniture() && !keep_furniture {
            continue;
        }
        let block = match frag {
            PageFragment::Illustration { markdown, .. } => markdown.clone(),
            PageFragment::Text { kind, text } => {
                let text = text.trim();
                match kind {
                    RegionKind::Title => format!("## {}", collapse_whitespace(text)),
                    RegionKind::Formula => format!("$$\n{text}\n$$"),
                    RegionKind::List => bullet_lines(text),
                    RegionKind::Caption => format!("*{}*", collapse_whitespace(text)),
                    _ => text.to_string(),
                }
            }
        };
        if !block.is_empty() {
            blocks.push(block);
        }
    }
    blocks.join("\n\n")
}

/// Kinds present on the page, deduplicated in first-seen order.
fn present_kinds(fragments: &[PageFragment]) -> Vec<RegionKind> {
    let mut kinds = Vec::new();
    for frag in fragments {
        if !kinds.contains(&frag.kind()) {
            kinds.push(frag.kind());
        }
    }
    kinds
}

/// Tagged listing of the fragments, in reading order.
fn fragment_digest(fragments: &[PageFragment]) -> String {
    let mut digest = String::new();
    for frag in fragments {
        digest.push('[');
        digest.push_str(&frag.kind().label().to_uppercase());
        digest.push_str("]\n");
        digest.push_str(frag.body().trim_end());
        digest.push_str("\n\n");
    }
    digest
}

/// OCR output keeps source line breaks; headings and captions must not.
fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn bullet_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            if line.starts_with("- ") || line.starts_with("* ") {
                line.to_string()
            } else {
                format!("- {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn completion_options(config: &ConversionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
