// src/text/mod.rs
// Markup cleaning, sentence truncation, content hashing and embedding-text
// assembly for issues and comments.

use regex::Regex;
use std::sync::OnceLock;

use crate::model::RawIssue;

struct CleanupPatterns {
    code_block: Regex,
    panel: Regex,
    noformat: Regex,
    image: Regex,
    mention_named: Regex,
    mention_account_id: Regex,
    link: Regex,
    bare_url: Regex,
    macro_tag: Regex,
    bold: Regex,
    italic: Regex,
    underscore_italic: Regex,
    strikethrough: Regex,
    bullet: Regex,
    whitespace: Regex,
}

fn patterns() -> &'static CleanupPatterns {
    static PATTERNS: OnceLock<CleanupPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| CleanupPatterns {
        code_block: Regex::new(r"(?s)\{code[^}]*\}.*?\{code\}").unwrap(),
        panel: Regex::new(r"(?s)\{panel[^}]*\}(.*?)\{panel\}").unwrap(),
        noformat: Regex::new(r"(?s)\{noformat\}(.*?)\{noformat\}").unwrap(),
        image: Regex::new(r"!\S+?!").unwrap(),
        mention_named: Regex::new(r"\[~([^\]]+)\]").unwrap(),
        mention_account_id: Regex::new(r"\[~accountid:[^\]]+\]").unwrap(),
        link: Regex::new(r"\[([^\]|]+)\|[^\]]+\]").unwrap(),
        bare_url: Regex::new(r"https?://\S+").unwrap(),
        macro_tag: Regex::new(r"\{[a-z]+[^}]*\}").unwrap(),
        bold: Regex::new(r"\*\*([^*]+)\*\*").unwrap(),
        italic: Regex::new(r"\*([^*]+)\*").unwrap(),
        underscore_italic: Regex::new(r"_([^_]+)_").unwrap(),
        strikethrough: Regex::new(r"~~([^~]+)~~").unwrap(),
        bullet: Regex::new(r"(?m)^[ \t]*[-*#]+[ \t]*").unwrap(),
        whitespace: Regex::new(r"\s+").unwrap(),
    })
}

/// Strip Jira/ADF markup from issue or comment text, keeping semantic
/// content. Deterministic and idempotent: `clean(clean(x)) == clean(x)`.
pub fn clean(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let p = patterns();
    let mut out = p.code_block.replace_all(text, "[code snippet]").into_owned();
    out = p.panel.replace_all(&out, "$1").into_owned();
    out = p.noformat.replace_all(&out, "$1").into_owned();
    out = p.image.replace_all(&out, "").into_owned();
    out = p.mention_account_id.replace_all(&out, "").into_owned();
    out = p.mention_named.replace_all(&out, "$1").into_owned();
    out = p.link.replace_all(&out, "$1").into_owned();
    out = p.bare_url.replace_all(&out, "").into_owned();
    out = p.macro_tag.replace_all(&out, "").into_owned();
    out = p.bold.replace_all(&out, "$1").into_owned();
    out = p.italic.replace_all(&out, "$1").into_owned();
    out = p.underscore_italic.replace_all(&out, "$1").into_owned();
    out = p.strikethrough.replace_all(&out, "$1").into_owned();
    out = p.bullet.replace_all(&out, "").into_owned();
    p.whitespace.replace_all(&out, " ").trim().to_string()
}

const SENTENCE_ENDINGS: [&str; 6] = [". ", "! ", "? ", ".\n", "!\n", "?\n"];

/// Truncate `text` to at most `max_chars`, preferring to cut at a sentence
/// boundary, then a word boundary, then hard-cutting as a last resort.
pub fn truncate_at_sentence(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let truncated: String = text.chars().take(max_chars).collect();

    let mut best_end: Option<usize> = None;
    for ending in SENTENCE_ENDINGS {
        if let Some(pos) = truncated.rfind(ending) {
            let char_pos = truncated[..pos].chars().count() + 1;
            if char_pos > max_chars / 2 && best_end.map(|b| char_pos > b).unwrap_or(true) {
                best_end = Some(char_pos);
            }
        }
    }
    if let Some(char_pos) = best_end {
        return truncated.chars().take(char_pos).collect::<String>().trim().to_string();
    }

    if let Some(space_byte) = truncated.rfind(' ') {
        let char_pos = truncated[..space_byte].chars().count();
        if char_pos > max_chars / 2 {
            let head: String = truncated.chars().take(char_pos).collect();
            return format!("{}…", head.trim());
        }
    }

    format!("{}…", truncated.trim())
}

/// Compute a content hash over the fields that affect semantic meaning.
/// Labels are sorted first so label ordering never changes the hash.
pub fn compute_content_hash(summary: &str, description: Option<&str>, labels: &[String], status: &str) -> String {
    let mut sorted_labels = labels.to_vec();
    sorted_labels.sort();
    let content = format!(
        "{}|{}|{}|{}",
        summary,
        description.unwrap_or(""),
        sorted_labels.join(","),
        status
    );
    format!("{:x}", md5::compute(content.as_bytes()))
}

/// Content hash for a raw comment body.
pub fn compute_comment_content_hash(body: &str) -> String {
    format!("{:x}", md5::compute(body.as_bytes()))
}

/// Assemble the text passed to the embedding provider for an issue.
pub fn to_embed_text(issue: &RawIssue) -> String {
    let mut parts = Vec::new();
    parts.push(format!("Issue: {}", issue.summary));

    let project = issue.project_key();
    if !issue.issue_type.is_empty() && !project.is_empty() {
        parts.push(format!("Type: {} in {}", issue.issue_type, project));
    }

    if !issue.status.is_empty() {
        parts.push(format!("Status: {}", issue.status));
    }

    if !issue.labels.is_empty() {
        let shown: Vec<&str> = issue.labels.iter().take(10).map(String::as_str).collect();
        parts.push(format!("Labels: {}", shown.join(", ")));
    }

    if !issue.components.is_empty() {
        let shown: Vec<&str> = issue.components.iter().take(5).map(String::as_str).collect();
        parts.push(format!("Components: {}", shown.join(", ")));
    }

    if let Some(description) = issue.description.as_deref().filter(|d| !d.is_empty()) {
        let cleaned = clean(description);
        let truncated = truncate_at_sentence(&cleaned, 1000);
        parts.push(format!("Description: {truncated}"));
    }

    parts.join("\n")
}

/// Build the description preview stored on the issue record (≤500 chars).
pub fn description_preview(description: Option<&str>) -> String {
    match description {
        Some(d) if !d.is_empty() => truncate_at_sentence(&clean(d), 500),
        _ => String::new(),
    }
}

/// Assemble the text passed to the embedding provider for a comment.
pub fn to_comment_embed_text(issue_key: &str, issue_summary: &str, author: &str, body: &str) -> String {
    let cleaned = clean(body);
    let truncated = truncate_at_sentence(&cleaned, 500);
    format!("Comment on {issue_key}: {issue_summary}\nAuthor: {author}\nContent: {truncated}")
}

/// Build the comment preview stored on the comment record (≤300 chars).
pub fn comment_body_preview(body: &str) -> String {
    truncate_at_sentence(&clean(body), 300)
}
