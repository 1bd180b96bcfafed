//! Prompt templates for LLM page reassembly.
//!
//! The model never sees the page image. It receives the page's fragments as
//! text, already sorted into reading order and tagged with the layout kind
//! each fragment came from, and merges them into clean Markdown. Keeping the
//! ordering on our side is the point: the model polishes prose, it does not
//! decide what comes first.
//!
//! Centralising every prompt here keeps the default behaviour in one place
//! and lets unit tests inspect prompts without spinning up a provider.
//!
//! Callers can override the system prompt via
//! [`crate::config::ConversionConfig::system_prompt`]; the constants here are
//! used only when no override is provided.

use crate::layout::RegionKind;

/// Default system prompt for the reassembly call.
///
/// Used when `ConversionConfig::system_prompt` is `None`.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert document reassembly assistant. You receive the fragments of one page of a scanned document, already sorted into reading order and tagged with the layout kind of the region each fragment came from. Merge them into clean, well-structured Markdown.

Follow these rules precisely:

1. CONTENT FIDELITY
   - Keep every piece of content. Never summarise, never invent text.
   - Fragment text comes from OCR: repair hyphenation across line breaks and
     obvious character confusions, but only when the correction is certain.
   - Keep the fragments in the order given. The order already encodes columns
     and caption placement; do not re-sort anything.

2. STRUCTURE
   - Render TITLE fragments as headings. Use ## unless the fragment is
     clearly the document title, then use #.
   - Join the lines of a TEXT fragment into flowing paragraphs; keep
     paragraph breaks where the source clearly has them.
   - Render LIST fragments as Markdown lists, one item per line.

3. TABLES AND FIGURES
   - FIGURE and TABLE fragments arrive as ready Markdown (an image link or a
     placeholder). Copy them through verbatim and never alter the URL.
   - Render CAPTION fragments in italics directly below the figure or table
     they follow.

4. FORMULAS
   - Render FORMULA fragments as LaTeX: $...$ inline, $$...$$ on its own
     lines for display equations.

5. PAGE FURNITURE
   - Drop HEADER and FOOTER fragments (running titles, page numbers) unless
     they carry real content.

6. OUTPUT FORMAT
   - Output ONLY the Markdown content
   - Do NOT wrap the output in ```markdown fences
   - Do NOT add commentary or explanations
   - Start directly with the page content"#;

/// One-line handling instruction for a fragment kind.
///
/// Per-kind cleanup guidance; the request builder quotes the lines for the
/// kinds actually present on the page, so short pages get short prompts.
pub fn kind_guidance(kind: RegionKind) -> &'static str {
    match kind {
        RegionKind::Title => "TITLE: a heading; ## unless it is clearly the document title.",
        RegionKind::Text => {
            "TEXT: body prose; join OCR line breaks into paragraphs, repair hyphenation."
        }
        RegionKind::Figure => "FIGURE: ready Markdown; copy verbatim, never alter the URL.",
        RegionKind::Table => "TABLE: ready Markdown; copy verbatim, never alter the URL.",
        RegionKind::Caption => "CAPTION: italic line directly below the figure or table above it.",
        RegionKind::Formula => "FORMULA: LaTeX; $...$ inline, $$...$$ for display equations.",
        RegionKind::List => "LIST: a Markdown list, one `-` item per line.",
        RegionKind::Header => "HEADER: running head; drop unless it carries real content.",
        RegionKind::Footer => {
            "FOOTER: running foot or page number; drop unless it carries real content."
        }
    }
}

/// Builds the user message for one page.
///
/// `kinds` is the deduplicated list of kinds present on the page, `digest`
/// the tagged fragment listing produced by the reassembly stage.
pub(crate) fn page_request(kinds: &[RegionKind], digest: &str) -> String {
    let mut msg = String::from(
        "Reassemble these page fragments, listed in reading order, into the page's Markdown.\n",
    );
    if !kinds.is_empty() {
        msg.push_str("\nFragment handling:\n");
        for kind in kinds {
            msg.push_str("- ");
            msg.push_str(kind_guidance(*kind));
            msg.push('\n');
        }
    }
    msg.push_str("\n--- FRAGMENTS ---\n\n");
    msg.push_str(digest);
    msg
}
