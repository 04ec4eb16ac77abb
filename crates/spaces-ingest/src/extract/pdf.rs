//! PDF extraction.
//!
//! Primary path shells out to `pdftotext`/`pdfinfo` (poppler) with a
//! per-command timeout; large documents are extracted in page batches to
//! bound memory. When the primary output is sparse (image-heavy or damaged
//! PDFs) an in-process `lopdf` pass runs and the longer result wins.
//! Page cleanup: repeated header/footer removal, hyphenation repair,
//! whitespace normalization, heading boundaries.

use std::io::Write;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, warn};

use spaces_core::defaults::{EXTRACTION_CMD_TIMEOUT_SECS, PDF_SPARSE_CHARS_PER_PAGE};
use spaces_core::textnorm::{
    fix_hyphenation, insert_heading_boundaries, normalize_whitespace, strip_repeating_lines,
};
use spaces_core::{Error, Extraction, ExtractionAdapter, Result, SourceType};

/// Page threshold above which extraction is batched.
const LARGE_PDF_PAGE_THRESHOLD: usize = 100;

/// Pages per `pdftotext` invocation for large documents.
const PDF_BATCH_PAGES: usize = 50;

/// Run a command with a timeout, returning stdout.
async fn run_cmd_with_timeout(cmd: &mut Command, timeout_secs: u64) -> Result<String> {
    let output = tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), cmd.output())
        .await
        .map_err(|_| {
            Error::DeadlineExceeded(format!("external command timed out after {timeout_secs}s"))
        })?
        .map_err(|e| Error::Transient(format!("failed to execute command: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Transient(format!(
            "command failed (exit {}): {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse `pdfinfo` output into a metadata object.
fn parse_pdfinfo(output: &str) -> JsonValue {
    let mut metadata = serde_json::Map::new();
    for line in output.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim().to_lowercase().replace(' ', "_");
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            if key == "pages" {
                if let Ok(pages) = value.parse::<u64>() {
                    metadata.insert(key, JsonValue::Number(pages.into()));
                    continue;
                }
            }
            metadata.insert(key, JsonValue::String(value.to_string()));
        }
    }
    JsonValue::Object(metadata)
}

fn page_count(metadata: &JsonValue) -> usize {
    metadata.get("pages").and_then(JsonValue::as_u64).unwrap_or(0) as usize
}

async fn pdftotext(path: &str, pages: usize) -> Result<String> {
    if pages > LARGE_PDF_PAGE_THRESHOLD {
        debug!(pages, "Large PDF; extracting in batches");
        let mut parts = Vec::new();
        let mut start = 1usize;
        while start <= pages {
            let end = (start + PDF_BATCH_PAGES - 1).min(pages);
            let part = run_cmd_with_timeout(
                Command::new("pdftotext")
                    .arg("-f")
                    .arg(start.to_string())
                    .arg("-l")
                    .arg(end.to_string())
                    .arg(path)
                    .arg("-"),
                EXTRACTION_CMD_TIMEOUT_SECS,
            )
            .await?;
            parts.push(part);
            start = end + 1;
        }
        Ok(parts.join("\u{c}"))
    } else {
        run_cmd_with_timeout(
            Command::new("pdftotext").arg(path).arg("-"),
            EXTRACTION_CMD_TIMEOUT_SECS,
        )
        .await
    }
}

/// In-process fallback parser for PDFs where poppler output is sparse.
fn lopdf_extract(data: &[u8]) -> Result<String> {
    let doc = lopdf::Document::load_mem(data)
        .map_err(|e| Error::Validation(format!("corrupt PDF: {e}")))?;
    let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
    let mut out = Vec::with_capacity(pages.len());
    for page in pages {
        match doc.extract_text(&[page]) {
            Ok(text) => out.push(text),
            Err(e) => {
                debug!(page, error = %e, "lopdf page extraction failed");
            }
        }
    }
    Ok(out.join("\u{c}"))
}

/// Shared post-processing: per-page cleanup, hyphenation, normalization.
fn clean_pages(raw: &str) -> String {
    let pages: Vec<String> = raw.split('\u{c}').map(str::to_string).collect();
    let cleaned = strip_repeating_lines(&pages);
    let joined = cleaned.join("\n\n");
    let text = fix_hyphenation(&joined);
    let text = normalize_whitespace(&text);
    insert_heading_boundaries(&text)
}

/// Adapter for PDF files.
pub struct PdfAdapter;

#[async_trait]
impl ExtractionAdapter for PdfAdapter {
    fn handles(&self, source_type: SourceType) -> bool {
        source_type == SourceType::Pdf
    }

    async fn extract(
        &self,
        data: &[u8],
        file_name: &str,
        _source_type: SourceType,
        _config: &JsonValue,
    ) -> Result<Extraction> {
        if data.len() < 4 || &data[0..4] != b"%PDF" {
            return Err(Error::Validation(format!(
                "'{file_name}' is not a valid PDF (missing %PDF header)"
            )));
        }

        // pdftotext reads from a path.
        let mut tmpfile =
            NamedTempFile::new().map_err(|e| Error::Internal(format!("temp file: {e}")))?;
        tmpfile
            .write_all(data)
            .map_err(|e| Error::Internal(format!("temp file write: {e}")))?;
        let tmp_path = tmpfile.path().to_string_lossy().to_string();

        let mut metadata = match run_cmd_with_timeout(
            Command::new("pdfinfo").arg(&tmp_path),
            EXTRACTION_CMD_TIMEOUT_SECS,
        )
        .await
        {
            Ok(output) => parse_pdfinfo(&output),
            Err(e) => {
                warn!(file_name, error = %e, "pdfinfo failed; continuing without metadata");
                json!({})
            }
        };
        let pages = page_count(&metadata);

        let primary = match pdftotext(&tmp_path, pages).await {
            Ok(text) => text,
            Err(e) => {
                warn!(file_name, error = %e, "pdftotext failed; using in-process parser");
                String::new()
            }
        };

        // Sparse output signals an image-heavy or column-mangled PDF; the
        // in-process parser sometimes recovers more.
        let sparse_floor = pages.max(1) * PDF_SPARSE_CHARS_PER_PAGE;
        let text = if primary.trim().len() < sparse_floor {
            let data = data.to_vec();
            let fallback = tokio::task::spawn_blocking(move || lopdf_extract(&data))
                .await
                .map_err(|e| Error::Internal(format!("pdf fallback task: {e}")))?
                .unwrap_or_default();
            if fallback.trim().len() > primary.trim().len() {
                metadata["parser"] = json!("lopdf");
                fallback
            } else {
                primary
            }
        } else {
            primary
        };

        if text.trim().is_empty() {
            metadata["needs_ocr"] = json!(true);
        }

        Ok(Extraction {
            text: clean_pages(&text),
            image: None,
            metadata,
        })
    }

    fn name(&self) -> &str {
        "pdf"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdfinfo_parsing() {
        let output = "Title:          Annual Report\nPages:          12\nEncrypted:      no\n";
        let meta = parse_pdfinfo(output);
        assert_eq!(meta["title"], "Annual Report");
        assert_eq!(meta["pages"], 12);
        assert_eq!(page_count(&meta), 12);
    }

    #[test]
    fn page_count_defaults_to_zero() {
        assert_eq!(page_count(&json!({})), 0);
    }

    #[test]
    fn clean_pages_repairs_and_normalizes() {
        let raw = "ACME Report\nintro exam-\nple text\n\u{c}ACME Report\nsecond page\n\u{c}ACME Report\nthird page\n";
        let out = clean_pages(raw);
        assert!(out.contains("example text"));
        assert!(!out.contains("ACME Report"));
    }

    #[tokio::test]
    async fn non_pdf_bytes_rejected() {
        let err = PdfAdapter
            .extract(b"hello", "a.pdf", SourceType::Pdf, &JsonValue::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
