//! HTML extraction: DOM-to-text with block structure preserved.
//!
//! Navigation, boilerplate, and non-content elements (script/style/nav/
//! header/footer/aside/figure) are stripped before text extraction. Closing
//! block tags become paragraph boundaries so chunking falls on section edges.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value as JsonValue;

use spaces_core::textnorm::normalize_whitespace;
use spaces_core::{Error, Extraction, ExtractionAdapter, Result, SourceType};

const STRIPPED_ELEMENTS: [&str; 8] = [
    "script", "style", "noscript", "nav", "header", "footer", "aside", "figure",
];

fn strip_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let alternatives = STRIPPED_ELEMENTS.join("|");
        Regex::new(&format!(
            r"(?is)<(?:{alternatives})\b[^>]*>.*?</(?:{alternatives})\s*>"
        ))
        .unwrap()
    })
}

fn block_close_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)</(?:p|div|h[1-6]|li|tr|blockquote|pre|section|article)>|<br\s*/?>")
            .unwrap()
    })
}

/// Extract visible text from an HTML document.
pub fn html_to_text(html: &str) -> (String, Option<String>) {
    // Drop non-content subtrees first, then mark block boundaries so the
    // text-node join preserves paragraph structure.
    let cleaned = strip_re().replace_all(html, " ");
    let cleaned = block_close_re().replace_all(&cleaned, "$0\n\n");

    let document = Html::parse_document(&cleaned);

    let title = Selector::parse("title").ok().and_then(|sel| {
        document
            .select(&sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    });

    let body_sel = Selector::parse("body").unwrap();
    let text: String = match document.select(&body_sel).next() {
        Some(body) => body.text().collect::<Vec<_>>().join("\n"),
        None => document.root_element().text().collect::<Vec<_>>().join("\n"),
    };

    (normalize_whitespace(&text), title)
}

/// Adapter for HTML files.
pub struct HtmlAdapter;

#[async_trait]
impl ExtractionAdapter for HtmlAdapter {
    fn handles(&self, source_type: SourceType) -> bool {
        source_type == SourceType::Html
    }

    async fn extract(
        &self,
        data: &[u8],
        _file_name: &str,
        _source_type: SourceType,
        _config: &JsonValue,
    ) -> Result<Extraction> {
        let html = String::from_utf8_lossy(data).into_owned();
        // DOM parsing is CPU-bound; keep it off the I/O executor.
        let (text, title) = tokio::task::spawn_blocking(move || html_to_text(&html))
            .await
            .map_err(|e| Error::Internal(format!("html extraction task: {e}")))?;

        Ok(Extraction {
            text,
            image: None,
            metadata: match title {
                Some(t) => serde_json::json!({"title": t}),
                None => serde_json::json!({}),
            },
        })
    }

    fn name(&self) -> &str {
        "html"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scripts_and_nav() {
        let html = r#"
            <html><head><title>Doc</title><script>var x = 1;</script></head>
            <body>
              <nav><a href="/">Home</a><a href="/about">About</a></nav>
              <p>First paragraph.</p>
              <p>Second paragraph.</p>
              <footer>Copyright</footer>
            </body></html>
        "#;
        let (text, title) = html_to_text(html);
        assert_eq!(title.as_deref(), Some("Doc"));
        assert!(text.contains("First paragraph."));
        assert!(text.contains("Second paragraph."));
        assert!(!text.contains("var x"));
        assert!(!text.contains("Home"));
        assert!(!text.contains("Copyright"));
    }

    #[test]
    fn block_elements_become_paragraphs() {
        let html = "<body><p>one</p><p>two</p></body>";
        let (text, _) = html_to_text(html);
        assert_eq!(text, "one\n\ntwo");
    }

    #[test]
    fn aside_and_figure_are_stripped() {
        let html = "<body><p>keep</p><aside>nope</aside><figure><figcaption>cap</figcaption></figure></body>";
        let (text, _) = html_to_text(html);
        assert!(text.contains("keep"));
        assert!(!text.contains("nope"));
        assert!(!text.contains("cap"));
    }

    #[tokio::test]
    async fn adapter_reports_title_metadata() {
        let out = HtmlAdapter
            .extract(
                b"<html><head><title>T</title></head><body><p>x</p></body></html>",
                "a.html",
                SourceType::Html,
                &JsonValue::Null,
            )
            .await
            .unwrap();
        assert_eq!(out.metadata["title"], "T");
        assert_eq!(out.text, "x");
    }
}
