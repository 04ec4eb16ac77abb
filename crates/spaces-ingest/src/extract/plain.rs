//! Plain text, Markdown, CSV, and JSON extraction.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use spaces_core::textnorm::normalize_whitespace;
use spaces_core::{Error, Extraction, ExtractionAdapter, Result, SourceType};

/// Adapter for pass-through text formats.
pub struct PlainAdapter;

/// Flatten a JSON value into `path: value` lines. Key paths act as
/// breadcrumbs so a chunk keeps enough context to be searchable on its own.
fn flatten_json(value: &JsonValue, path: &str, out: &mut Vec<String>) {
    match value {
        JsonValue::Object(map) => {
            for (key, v) in map {
                let next = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                flatten_json(v, &next, out);
            }
        }
        JsonValue::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten_json(v, &format!("{path}[{i}]"), out);
            }
        }
        JsonValue::Null => {}
        other => {
            let rendered = match other {
                JsonValue::String(s) => s.clone(),
                v => v.to_string(),
            };
            if rendered.is_empty() {
                return;
            }
            if path.is_empty() {
                out.push(rendered);
            } else {
                out.push(format!("{path}: {rendered}"));
            }
        }
    }
}

fn extract_json(data: &[u8]) -> String {
    match serde_json::from_slice::<JsonValue>(data) {
        Ok(value) => {
            let mut lines = Vec::new();
            flatten_json(&value, "", &mut lines);
            lines.join("\n")
        }
        // Not valid JSON after all; index whatever text it holds.
        Err(_) => String::from_utf8_lossy(data).into_owned(),
    }
}

fn extract_csv(data: &[u8]) -> Result<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(data);
    let mut lines = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Error::Validation(format!("csv parse: {e}")))?;
        let cells: Vec<&str> = record
            .iter()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();
        if !cells.is_empty() {
            lines.push(cells.join(" \t "));
        }
    }
    Ok(lines.join("\n"))
}

#[async_trait]
impl ExtractionAdapter for PlainAdapter {
    fn handles(&self, source_type: SourceType) -> bool {
        matches!(
            source_type,
            SourceType::Txt | SourceType::Md | SourceType::Json | SourceType::Csv
        )
    }

    async fn extract(
        &self,
        data: &[u8],
        _file_name: &str,
        source_type: SourceType,
        _config: &JsonValue,
    ) -> Result<Extraction> {
        let raw = match source_type {
            SourceType::Json => extract_json(data),
            SourceType::Csv => extract_csv(data)?,
            _ => String::from_utf8_lossy(data).into_owned(),
        };

        Ok(Extraction {
            text: normalize_whitespace(&raw),
            image: None,
            metadata: serde_json::json!({
                "char_count": raw.len(),
                "line_count": raw.lines().count(),
            }),
        })
    }

    fn name(&self) -> &str {
        "plain"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn text_is_normalized() {
        let out = PlainAdapter
            .extract(b"a   b\n\n\n\nc", "x.txt", SourceType::Txt, &JsonValue::Null)
            .await
            .unwrap();
        assert_eq!(out.text, "a b\n\nc");
    }

    #[tokio::test]
    async fn json_flattens_with_breadcrumbs() {
        let data = br#"{"user": {"name": "Ada", "langs": ["rust", "ml"]}, "count": 2}"#;
        let out = PlainAdapter
            .extract(data, "x.json", SourceType::Json, &JsonValue::Null)
            .await
            .unwrap();
        assert!(out.text.contains("user.name: Ada"));
        assert!(out.text.contains("user.langs[0]: rust"));
        assert!(out.text.contains("count: 2"));
    }

    #[tokio::test]
    async fn invalid_json_falls_back_to_raw() {
        let out = PlainAdapter
            .extract(b"{not json", "x.json", SourceType::Json, &JsonValue::Null)
            .await
            .unwrap();
        assert!(out.text.contains("not json"));
    }

    #[tokio::test]
    async fn csv_rows_become_tab_joined_lines() {
        let data = b"name,city\nAda,London\nAlan,Wilmslow";
        let out = PlainAdapter
            .extract(data, "x.csv", SourceType::Csv, &JsonValue::Null)
            .await
            .unwrap();
        let lines: Vec<&str> = out.text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("Ada \t London"));
    }
}
