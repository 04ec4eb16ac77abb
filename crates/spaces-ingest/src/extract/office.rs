//! Office document extraction (docx, pptx, xlsx) via in-process ZIP + XML.
//!
//! OOXML containers are ZIP archives of XML parts; text lives in `w:t`
//! (docx), `a:t` (pptx), and shared strings / cell values (xlsx). Table rows
//! are emitted one per line with tab-separated cells.

use std::io::{Cursor, Read};

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::Value as JsonValue;

use spaces_core::textnorm::normalize_whitespace;
use spaces_core::{Error, Extraction, ExtractionAdapter, Result, SourceType};

/// Maximum decompressed bytes read from a single ZIP entry (zip-bomb guard).
const MAX_XML_ENTRY_BYTES: u64 = 32 * 1024 * 1024;

fn open_archive(bytes: &[u8]) -> Result<zip::ZipArchive<Cursor<&[u8]>>> {
    zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::Validation(format!("not a valid OOXML container: {e}")))
}

fn read_entry(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<Vec<u8>>> {
    let Ok(entry) = archive.by_name(name) else {
        return Ok(None);
    };
    let mut buf = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut buf)
        .map_err(|e| Error::Validation(format!("zip entry {name}: {e}")))?;
    Ok(Some(buf))
}

/// Pull character data from elements with a given local name, inserting a
/// newline at each paragraph-end element.
fn collect_text(xml: &[u8], text_tag: &[u8], para_tag: &[u8]) -> String {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == text_tag => in_text = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == text_tag => in_text = false,
            Ok(Event::End(e)) if e.local_name().as_ref() == para_tag => out.push('\n'),
            Ok(Event::Text(t)) if in_text => {
                out.push_str(&t.unescape().unwrap_or_default());
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    out
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let Some(xml) = read_entry(&mut archive, "word/document.xml")? else {
        return Err(Error::Validation("docx missing word/document.xml".into()));
    };
    Ok(collect_text(&xml, b"t", b"p"))
}

fn extract_pptx(bytes: &[u8]) -> Result<(String, usize)> {
    let mut archive = open_archive(bytes)?;
    let mut slide_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("ppt/slides/slide") && n.ends_with(".xml"))
        .map(String::from)
        .collect();
    slide_names.sort_by_key(|n| slide_number(n));

    let mut slides = Vec::new();
    for name in &slide_names {
        if let Some(xml) = read_entry(&mut archive, name)? {
            let text = collect_text(&xml, b"t", b"p");
            if !text.trim().is_empty() {
                slides.push(text);
            }
        }
    }
    let count = slide_names.len();
    Ok((slides.join("\n\n"), count))
}

fn slide_number(name: &str) -> u32 {
    name.trim_start_matches("ppt/slides/slide")
        .trim_end_matches(".xml")
        .parse()
        .unwrap_or(u32::MAX)
}

fn extract_xlsx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;

    let shared = match read_entry(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml),
        None => Vec::new(),
    };

    let mut sheet_names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .map(String::from)
        .collect();
    sheet_names.sort();

    let mut parts = Vec::new();
    for name in &sheet_names {
        let Some(xml) = read_entry(&mut archive, name)? else {
            continue;
        };
        let label = name
            .trim_start_matches("xl/worksheets/")
            .trim_end_matches(".xml");
        parts.push(format!("# Sheet: {label}"));
        parts.push(parse_sheet(&xml, &shared));
    }
    Ok(parts.join("\n"))
}

/// Shared strings: one entry per `<si>`, concatenating its `<t>` runs.
fn parse_shared_strings(xml: &[u8]) -> Vec<String> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_t = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_t = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == b"t" => in_t = false,
            Ok(Event::Text(t)) if in_t => current.push_str(&t.unescape().unwrap_or_default()),
            Ok(Event::End(e)) if e.local_name().as_ref() == b"si" => {
                strings.push(std::mem::take(&mut current));
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    strings
}

/// Worksheet cells: `t="s"` cells hold shared-string indexes in `<v>`,
/// everything else is taken as a literal value. One output line per row.
fn parse_sheet(xml: &[u8], shared: &[String]) -> String {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut lines = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell_is_shared = false;
    let mut in_v = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"c" => {
                cell_is_shared = e
                    .try_get_attribute("t")
                    .ok()
                    .flatten()
                    .map(|a| a.value.as_ref() == b"s")
                    .unwrap_or(false);
            }
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"v" => in_v = true,
            Ok(Event::End(e)) if e.local_name().as_ref() == b"v" => in_v = false,
            Ok(Event::Text(t)) if in_v => {
                let raw = t.unescape().unwrap_or_default().into_owned();
                let value = if cell_is_shared {
                    raw.parse::<usize>()
                        .ok()
                        .and_then(|i| shared.get(i).cloned())
                        .unwrap_or(raw)
                } else {
                    raw
                };
                if !value.trim().is_empty() {
                    row.push(value.trim().to_string());
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"row" => {
                if !row.is_empty() {
                    lines.push(std::mem::take(&mut row).join(" \t "));
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    lines.join("\n")
}

/// Adapter for docx/pptx/xlsx containers.
pub struct OfficeAdapter;

#[async_trait]
impl ExtractionAdapter for OfficeAdapter {
    fn handles(&self, source_type: SourceType) -> bool {
        matches!(
            source_type,
            SourceType::Docx | SourceType::Pptx | SourceType::Xlsx
        )
    }

    async fn extract(
        &self,
        data: &[u8],
        _file_name: &str,
        source_type: SourceType,
        _config: &JsonValue,
    ) -> Result<Extraction> {
        let bytes = data.to_vec();
        // ZIP inflation + XML parsing is CPU-bound.
        let (raw, metadata) = tokio::task::spawn_blocking(move || -> Result<_> {
            match source_type {
                SourceType::Docx => {
                    let text = extract_docx(&bytes)?;
                    Ok((text, serde_json::json!({})))
                }
                SourceType::Pptx => {
                    let (text, slides) = extract_pptx(&bytes)?;
                    Ok((text, serde_json::json!({"slide_count": slides})))
                }
                SourceType::Xlsx => {
                    let text = extract_xlsx(&bytes)?;
                    Ok((text, serde_json::json!({})))
                }
                other => Err(Error::Unsupported(other.as_str().to_string())),
            }
        })
        .await
        .map_err(|e| Error::Internal(format!("office extraction task: {e}")))??;

        Ok(Extraction {
            text: normalize_whitespace(&raw),
            image: None,
            metadata,
        })
    }

    fn name(&self) -> &str {
        "office"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            for (name, content) in entries {
                writer
                    .start_file(name.to_string(), SimpleFileOptions::default())
                    .unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn docx_paragraphs_extract() {
        let doc = build_zip(&[(
            "word/document.xml",
            r#"<w:document xmlns:w="x"><w:body>
                <w:p><w:r><w:t>First para.</w:t></w:r></w:p>
                <w:p><w:r><w:t>Second</w:t></w:r><w:r><w:t> para.</w:t></w:r></w:p>
            </w:body></w:document>"#,
        )]);
        let text = extract_docx(&doc).unwrap();
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        assert_eq!(lines, vec!["First para.", "Second para."]);
    }

    #[test]
    fn pptx_slides_extract_in_order() {
        let doc = build_zip(&[
            (
                "ppt/slides/slide2.xml",
                r#"<p:sld xmlns:a="x"><a:p><a:r><a:t>second slide</a:t></a:r></a:p></p:sld>"#,
            ),
            (
                "ppt/slides/slide1.xml",
                r#"<p:sld xmlns:a="x"><a:p><a:r><a:t>first slide</a:t></a:r></a:p></p:sld>"#,
            ),
        ]);
        let (text, count) = extract_pptx(&doc).unwrap();
        assert_eq!(count, 2);
        let first = text.find("first slide").unwrap();
        let second = text.find("second slide").unwrap();
        assert!(first < second);
    }

    #[test]
    fn xlsx_shared_strings_resolve() {
        let doc = build_zip(&[
            (
                "xl/sharedStrings.xml",
                r#"<sst><si><t>name</t></si><si><t>Ada</t></si></sst>"#,
            ),
            (
                "xl/worksheets/sheet1.xml",
                r#"<worksheet><sheetData>
                    <row><c t="s"><v>0</v></c><c><v>1912</v></c></row>
                    <row><c t="s"><v>1</v></c></row>
                </sheetData></worksheet>"#,
            ),
        ]);
        let text = extract_xlsx(&doc).unwrap();
        assert!(text.contains("# Sheet: sheet1"));
        assert!(text.contains("name \t 1912"));
        assert!(text.contains("Ada"));
    }

    #[test]
    fn invalid_container_is_validation_error() {
        assert!(matches!(
            extract_docx(b"not a zip"),
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn adapter_normalizes_output() {
        let doc = build_zip(&[(
            "word/document.xml",
            r#"<w:document><w:body><w:p><w:t>a    b</w:t></w:p></w:body></w:document>"#,
        )]);
        let out = OfficeAdapter
            .extract(&doc, "d.docx", SourceType::Docx, &JsonValue::Null)
            .await
            .unwrap();
        assert_eq!(out.text, "a b");
    }
}
