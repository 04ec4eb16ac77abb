//! Text normalization for extracted document content.
//!
//! Extraction output keeps paragraph boundaries (blank lines) while collapsing
//! whitespace within lines. PDF-specific cleanups (hyphenation repair,
//! repeated header/footer removal) live here so every extractor shares them.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

fn upper_heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z0-9][A-Z0-9 \-:]{2,}$").unwrap())
}

fn numbered_heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:[IVXLCDM]+\.|\d+(?:\.\d+)*\.|[A-Z]\.)\s+.+").unwrap())
}

fn page_footer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\s*page\s+\d+(\s+of\s+\d+)?\s*$").unwrap())
}

/// Normalize whitespace while preserving blank lines as paragraph boundaries.
///
/// Line endings become `\n`, runs of 3+ newlines collapse to exactly two,
/// and whitespace within each line collapses to single spaces.
pub fn normalize_whitespace(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");

    let mut lines: Vec<String> = Vec::new();
    for line in text.split('\n') {
        lines.push(line.split_whitespace().collect::<Vec<_>>().join(" "));
    }

    // Collapse runs of blank lines to a single paragraph break.
    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    let mut blank_run = 0usize;
    for line in &lines {
        if line.is_empty() {
            blank_run += 1;
            if blank_run == 1 {
                out.push("");
            }
        } else {
            blank_run = 0;
            out.push(line);
        }
    }

    out.join("\n").trim().to_string()
}

/// Repair PDF hyphenation (`exam-\nple` → `example`) and join single
/// newlines inside paragraphs into spaces. Double newlines survive.
pub fn fix_hyphenation(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");

    // Join words broken by a hyphen at end of line.
    static HYPHEN: OnceLock<Regex> = OnceLock::new();
    let hyphen = HYPHEN.get_or_init(|| Regex::new(r"-\n(?P<w>\w)").unwrap());
    let text = hyphen.replace_all(&text, "$w").to_string();

    // Drop lone hyphens stranded on their own line.
    let text = text.replace("\n-\n", "\n");

    // Single newline inside a paragraph becomes a space.
    static INNER: OnceLock<Regex> = OnceLock::new();
    let inner = INNER.get_or_init(|| Regex::new(r"([^\n])\n([^\n])").unwrap());
    inner.replace_all(&text, "$1 $2").to_string()
}

/// Insert blank lines around detected headings so chunk boundaries fall on
/// section edges. Headings are ALL-CAPS lines or numbered lines ("3.1 Title").
pub fn insert_heading_boundaries(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    for line in text.split('\n') {
        let trimmed = line.trim();
        if upper_heading_re().is_match(trimmed) || numbered_heading_re().is_match(trimmed) {
            if out.last().map(|l: &String| !l.is_empty()).unwrap_or(false) {
                out.push(String::new());
            }
            out.push(trimmed.to_string());
            out.push(String::new());
        } else {
            out.push(line.to_string());
        }
    }
    out.join("\n")
}

/// Remove lines that repeat across most pages (running headers/footers) and
/// generic "Page N of M" footers. Needs at least 3 pages to detect a pattern.
pub fn strip_repeating_lines(pages: &[String]) -> Vec<String> {
    if pages.len() < 3 {
        return pages
            .iter()
            .map(|p| drop_page_footers(p))
            .collect();
    }

    let mut first_counts: HashMap<&str, usize> = HashMap::new();
    let mut last_counts: HashMap<&str, usize> = HashMap::new();
    for page in pages {
        let non_empty: Vec<&str> = page.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        if let Some(first) = non_empty.first() {
            *first_counts.entry(first).or_insert(0) += 1;
        }
        if let Some(last) = non_empty.last() {
            *last_counts.entry(last).or_insert(0) += 1;
        }
    }

    let majority = pages.len() / 2 + 1;
    let common_first = first_counts
        .iter()
        .filter(|(_, &c)| c >= majority)
        .map(|(l, _)| l.to_string())
        .next();
    let common_last = last_counts
        .iter()
        .filter(|(_, &c)| c >= majority)
        .map(|(l, _)| l.to_string())
        .next();

    pages
        .iter()
        .map(|page| {
            let mut lines: Vec<&str> = page.lines().collect();
            if let Some(ref f) = common_first {
                if lines.first().map(|l| l.trim() == f).unwrap_or(false) {
                    lines.remove(0);
                }
            }
            if let Some(ref l) = common_last {
                if lines.last().map(|x| x.trim() == l).unwrap_or(false) {
                    lines.pop();
                }
            }
            drop_page_footers(&lines.join("\n"))
        })
        .collect()
}

fn drop_page_footers(page: &str) -> String {
    page.lines()
        .filter(|l| !page_footer_re().is_match(l))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_inner_whitespace() {
        let input = "a   b\t c\n\n\n\nnext  para";
        assert_eq!(normalize_whitespace(input), "a b c\n\nnext para");
    }

    #[test]
    fn preserves_single_paragraph_break() {
        let input = "one\n\ntwo";
        assert_eq!(normalize_whitespace(input), "one\n\ntwo");
    }

    #[test]
    fn normalizes_crlf() {
        assert_eq!(normalize_whitespace("a\r\nb"), "a\nb");
    }

    #[test]
    fn repairs_hyphenation() {
        assert_eq!(fix_hyphenation("exam-\nple"), "example");
    }

    #[test]
    fn joins_soft_wraps_keeps_paragraphs() {
        let out = fix_hyphenation("line one\nline two\n\nnew para");
        assert_eq!(out, "line one line two\n\nnew para");
    }

    #[test]
    fn detects_upper_headings() {
        let out = insert_heading_boundaries("intro\nOVERVIEW AND SCOPE\nbody");
        assert!(out.contains("intro\n\nOVERVIEW AND SCOPE\n\nbody"));
    }

    #[test]
    fn detects_numbered_headings() {
        let out = insert_heading_boundaries("text\n2.1. Retrieval Engine\nmore");
        assert!(out.contains("\n\n2.1. Retrieval Engine\n\n"));
    }

    #[test]
    fn strips_common_headers_and_footers() {
        let pages: Vec<String> = (1..=4)
            .map(|i| format!("ACME Corp Annual Report\ncontent {i}\nPage {i} of 4"))
            .collect();
        let cleaned = strip_repeating_lines(&pages);
        for page in &cleaned {
            assert!(!page.contains("ACME Corp"));
            assert!(!page.to_lowercase().contains("page"));
        }
        assert!(cleaned[1].contains("content 2"));
    }

    #[test]
    fn too_few_pages_left_alone() {
        let pages = vec!["Header\nbody".to_string(), "Header\nbody2".to_string()];
        let cleaned = strip_repeating_lines(&pages);
        assert!(cleaned[0].contains("Header"));
    }
}
