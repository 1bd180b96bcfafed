//! Deterministic cleanup of reassembled page Markdown.
//!
//! Model output is usually close to valid Markdown and occasionally not:
//! pages come back wrapped in a ` ```markdown ` fence despite the prompt,
//! image links lose their URL, line endings arrive as CRLF, tables grow
//! separator rows in the middle of the body. The heuristic renderer is
//! better behaved but still leans on the spacing and final-newline passes,
//! so every page goes through here in both modes.
//!
//! Every rule is a pure `&str -> String` pass with no shared state, cheap
//! enough to run unconditionally. Order matters: the wrapping fence comes
//! off first so later rules see unfenced text, line endings are unified
//! before any line-based pass, and the final-newline rule runs last.

use once_cell::sync::Lazy;
use regex::Regex;

/// The cleanup passes, in application order:
///
/// 1. unwrap an outer ` ```markdown ` fence
/// 2. unify CRLF / bare CR to LF
/// 3. trim trailing whitespace off every line
/// 4. cap blank runs at one empty line pair
/// 5. put blank lines around each heading
/// 6. rejoin a table split apart by blank lines
/// 7. give a headerless table its separator row
/// 8. drop separator rows that sit inside a table body
/// 9. turn image links with an empty URL into plain emphasis
/// 10. strip invisible Unicode (zero-width, BOM, soft hyphen)
/// 11. end the page with exactly one newline
const RULES: [fn(&str) -> String; 11] = [
    strip_wrapping_fence,
    unify_newlines,
    trim_line_ends,
    limit_blank_runs,
    space_headings,
    join_split_tables,
    insert_missing_table_separator,
    drop_stray_table_separators,
    drop_hollow_image_links,
    strip_invisible,
    settle_final_newline,
];

/// Run one page's Markdown through every cleanup rule.
pub fn clean_markdown(page: &str) -> String {
    RULES.iter().fold(page.to_string(), |page, rule| rule(&page))
}

// Rule 1. Models wrap whole pages in a fence now and then, prompt or no
// prompt. Only a fence enclosing the entire page is removed; fences inside
// the text are content.
fn strip_wrapping_fence(page: &str) -> String {
    let trimmed = page.trim();
    let body = trimmed
        .strip_prefix("```markdown\n")
        .or_else(|| trimmed.strip_prefix("```\n"));
    if let Some(body) = body {
        if let Some(inner) = body.strip_suffix("\n```") {
            return inner.to_string();
        }
    }
    page.to_string()
}

// Rule 2.
fn unify_newlines(page: &str) -> String {
    if !page.contains('\r') {
        return page.to_string();
    }
    page.replace("\r\n", "\n").replace('\r', "\n")
}

// Rule 3.
fn trim_line_ends(page: &str) -> String {
    let mut out = String::with_capacity(page.len());
    for (i, line) in page.lines().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(line.trim_end());
    }
    out
}

// Rule 4. Three newlines (one empty line pair) is the widest gap that
// survives; anything longer collapses to it.
fn limit_blank_runs(page: &str) -> String {
    let mut out = String::with_capacity(page.len());
    let mut run = 0usize;
    for ch in page.chars() {
        if ch == '\n' {
            run += 1;
            if run <= 3 {
                out.push('\n');
            }
        } else {
            run = 0;
            out.push(ch);
        }
    }
    out
}

// Rule 5. A heading jammed against the paragraph above or below renders
// wrong in strict parsers. Headings at the very start of the page get no
// leading blank.
fn space_headings(page: &str) -> String {
    let mut out = String::with_capacity(page.len() + 32);
    let mut after_heading = false;
    for line in page.lines() {
        let is_heading = line.starts_with('#');
        if is_heading && !out.is_empty() {
            while out.ends_with('\n') {
                out.pop();
            }
            out.push_str("\n\n");
        } else if after_heading && !line.trim().is_empty() {
            out.push('\n');
        }
        out.push_str(line);
        out.push('\n');
        after_heading = is_heading;
    }
    out
}

// Rule 6. A blank line inside a table splits it in two in every renderer.
// Blank runs whose neighbours are both table rows are removed.
fn join_split_tables(page: &str) -> String {
    let lines: Vec<&str> = page.lines().collect();
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        if lines[i].trim().is_empty() {
            let prev = out.last().copied().unwrap_or("");
            let mut j = i;
            while j < lines.len() && lines[j].trim().is_empty() {
                j += 1;
            }
            let next = lines.get(j).copied().unwrap_or("");
            if looks_like_table_row(prev) && looks_like_table_row(next) {
                i = j;
                continue;
            }
        }
        out.push(lines[i]);
        i += 1;
    }
    out.join("\n")
}

// Rule 7. GFM needs a `| --- |` row right after the header; a table whose
// second row is plain data gets one synthesised from the header's column
// count.
fn insert_missing_table_separator(page: &str) -> String {
    let lines: Vec<&str> = page.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 4);
    let mut rows_in_block = 0usize;

    for (i, line) in lines.iter().enumerate() {
        if looks_like_table_row(line) {
            rows_in_block += 1;
            out.push((*line).to_string());
            let next = lines.get(i + 1).copied().unwrap_or("");
            if rows_in_block == 1
                && !looks_like_separator(line)
                && looks_like_table_row(next)
                && !looks_like_separator(next)
            {
                out.push(separator_for(line));
            }
        } else {
            rows_in_block = 0;
            out.push((*line).to_string());
        }
    }

    out.join("\n")
}

fn separator_for(header: &str) -> String {
    let cols = header.matches('|').count().saturating_sub(1).max(1);
    let mut sep = String::with_capacity(cols * 6 + 1);
    sep.push('|');
    for _ in 0..cols {
        sep.push_str(" --- |");
    }
    sep
}

// Rule 8. The converse failure: separator rows scattered through the table
// body. Only the one in second position is legitimate.
fn drop_stray_table_separators(page: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut rows_in_block = 0usize;

    for line in page.lines() {
        if looks_like_table_row(line) {
            rows_in_block += 1;
            if looks_like_separator(line) && rows_in_block != 2 {
                continue;
            }
        } else {
            rows_in_block = 0;
        }
        out.push(line);
    }

    out.join("\n")
}

fn looks_like_table_row(line: &str) -> bool {
    let t = line.trim();
    t.len() > 2 && t.starts_with('|') && t.ends_with('|')
}

fn looks_like_separator(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|') && t.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

// Rule 9. Legitimate image links all come from the clip stage (relative
// `page-N-region-M.png` paths, `data:` URIs), so a non-empty URL is trusted.
// `![alt]()` is a clip the model lost; the alt text survives as emphasis.
static IMAGE_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").unwrap());

fn drop_hollow_image_links(page: &str) -> String {
    IMAGE_LINK
        .replace_all(page, |caps: &regex::Captures<'_>| {
            if !caps[2].trim().is_empty() {
                return caps[0].to_string();
            }
            let alt = caps[1].trim();
            if alt.is_empty() {
                String::new()
            } else {
                format!("*{alt}*")
            }
        })
        .into_owned()
}

// Rule 10.
const INVISIBLE: [char; 6] = [
    '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
];

fn strip_invisible(page: &str) -> String {
    page.chars().filter(|c| !INVISIBLE.contains(c)).collect()
}

// Rule 11.
fn settle_final_newline(page: &str) -> String {
    let mut out = page.trim_end().to_string();
    out.push('\n');
    out
}
