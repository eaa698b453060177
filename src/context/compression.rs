//! Lossy text compression for stored items
//!
//! Strips comments, collapses whitespace and drops repeated lines. The
//! result replaces an item's content only if it is materially shorter.

use std::collections::HashSet;

use crate::config::CompressionConfig;

/// Compress a piece of text according to the configuration
///
/// Applying this to its own output returns the output unchanged.
pub fn compress_text(text: &str, config: &CompressionConfig) -> String {
    let stripped;
    let source = if config.strip_comments {
        stripped = strip_block_comments(text);
        stripped.as_str()
    } else {
        text
    };

    let mut seen = HashSet::new();
    let mut lines = Vec::new();
    for raw in source.lines() {
        let line = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            continue;
        }
        if config.strip_comments && line.starts_with("//") {
            continue;
        }
        if config.dedupe_lines && !seen.insert(line.clone()) {
            continue;
        }
        lines.push(line);
    }

    lines.join("\n")
}

/// Whether the compressed form is small enough to be worth keeping
pub fn is_material(original: &str, compressed: &str, threshold: f64) -> bool {
    let original_len = original.chars().count();
    if original_len == 0 {
        return false;
    }
    (compressed.chars().count() as f64) < threshold * original_len as f64
}

/// Remove `/* ... */` blocks; an unterminated opener is left as is
fn strip_block_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("/*") {
        match rest[start + 2..].find("*/") {
            Some(end) => {
                out.push_str(&rest[..start]);
                rest = &rest[start + 2 + end + 2..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}
