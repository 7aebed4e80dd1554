// src/utils/html_debug.rs
use crate::patterns::PatternRegistry;
use crate::utils::error::AppError;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const PALETTE: &[&str] = &["#FFFF00", "#90EE90", "#ADD8E6", "#FFA500", "#FFC0CB", "#D8BFD8", "#F0E68C"];

/// A byte span of the page to wrap in a highlight marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Highlight {
    pub start: usize,
    pub end: usize,
    pub kind: String,
}

/// Saves `html` with every highlight wrapped in a colored span. Overlapping
/// highlights after the first are dropped.
pub fn save_debug_html(html: &str, path: &Path, highlights: &[Highlight]) -> Result<usize, AppError> {
    let mut sorted = highlights.to_vec();
    sorted.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| b.end.cmp(&a.end)));

    let mut kinds: Vec<&str> = sorted.iter().map(|h| h.kind.as_str()).collect();
    kinds.sort_unstable();
    kinds.dedup();

    let mut debug_html = String::from("<!DOCTYPE html>\n<html>\n<head>\n<style>\n");
    for (i, kind) in kinds.iter().enumerate() {
        debug_html.push_str(&format!(
            ".highlight-{} {{ background-color: {}; }}\n",
            kind,
            PALETTE[i % PALETTE.len()]
        ));
    }
    debug_html.push_str("</style>\n</head>\n<body>\n");

    let mut last_pos = 0;
    let mut written = 0;
    for highlight in sorted {
        if highlight.start < last_pos || highlight.end > html.len() || highlight.start >= highlight.end {
            continue;
        }
        debug_html.push_str(&html[last_pos..highlight.start]);
        debug_html.push_str(&format!(
            "<span class=\"highlight-{}\" title=\"Position: {}-{}, Pattern: {}\">",
            highlight.kind, highlight.start, highlight.end, highlight.kind
        ));
        debug_html.push_str(&html[highlight.start..highlight.end]);
        debug_html.push_str("</span>");
        last_pos = highlight.end;
        written += 1;
    }
    debug_html.push_str(&html[last_pos..]);
    debug_html.push_str("\n</body>\n</html>");

    let mut file = File::create(path)?;
    file.write_all(debug_html.as_bytes())?;
    tracing::info!("Saved debug HTML to {} ({} highlights)", path.display(), written);
    Ok(written)
}

/// Whether `start..end` touches markup, e.g. an attribute value.
fn overlaps_tag(html: &str, start: usize, end: usize) -> bool {
    let before = &html[..start];
    let open_tag = match (before.rfind('<'), before.rfind('>')) {
        (Some(lt), Some(gt)) => lt > gt,
        (Some(_), None) => true,
        _ => false,
    };
    open_tag || html[start..end].contains(['<', '>'])
}

/// Annotates every validated match of the named registry patterns that lies
/// in text content.
pub fn create_debug_html(
    html: &str,
    path: &Path,
    registry: &PatternRegistry,
    pattern_names: &[&str],
) -> Result<usize, AppError> {
    let mut highlights = Vec::new();
    for name in pattern_names {
        for found in registry.extract_all(html, name)? {
            if overlaps_tag(html, found.start, found.end) {
                tracing::trace!("Skipping '{}' match inside markup at {}", name, found.start);
                continue;
            }
            highlights.push(Highlight { start: found.start, end: found.end, kind: name.to_string() });
        }
    }
    save_debug_html(html, path, &highlights)
}
