//! Content extraction.
//!
//! Each adapter handles one family of file types and produces normalized
//! text (paragraph boundaries preserved) plus type-specific metadata.
//! Unsupported types (audio/video in this core) are rejected up front.

pub mod html;
pub mod image;
pub mod office;
pub mod pdf;
pub mod plain;

use serde_json::Value as JsonValue;
use tracing::debug;

use spaces_core::{Error, Extraction, ExtractionAdapter, Result, SourceType};

pub use html::HtmlAdapter;
pub use image::ImageAdapter;
pub use office::OfficeAdapter;
pub use pdf::PdfAdapter;
pub use plain::PlainAdapter;

/// Registry dispatching extraction by detected [`SourceType`].
pub struct ExtractionRegistry {
    adapters: Vec<Box<dyn ExtractionAdapter>>,
}

impl ExtractionRegistry {
    pub fn new(adapters: Vec<Box<dyn ExtractionAdapter>>) -> Self {
        Self { adapters }
    }

    /// The standard adapter set. The image adapter is built separately
    /// because it carries captioning/thumbnail state.
    pub fn standard(image_adapter: ImageAdapter) -> Self {
        Self::new(vec![
            Box::new(PdfAdapter),
            Box::new(HtmlAdapter),
            Box::new(OfficeAdapter),
            Box::new(PlainAdapter),
            Box::new(image_adapter),
        ])
    }

    /// Extract content for a file, dispatching on its detected type.
    pub async fn extract(&self, data: &[u8], file_name: &str) -> Result<(Extraction, SourceType)> {
        let source_type = SourceType::from_file_name(file_name)
            .ok_or_else(|| Error::Unsupported(format!("unrecognized file type: {file_name}")))?;

        if !source_type.is_supported() {
            return Err(Error::Unsupported(format!(
                "{} files are not ingestible",
                source_type.as_str()
            )));
        }

        let adapter = self
            .adapters
            .iter()
            .find(|a| a.handles(source_type))
            .ok_or_else(|| {
                Error::Unsupported(format!("no adapter for {}", source_type.as_str()))
            })?;

        debug!(
            subsystem = "ingest",
            component = "extract",
            op = "dispatch",
            file_name,
            source_type = source_type.as_str(),
            adapter = adapter.name(),
            "Extracting content"
        );

        let extraction = adapter
            .extract(data, file_name, source_type, &JsonValue::Null)
            .await?;
        Ok((extraction, source_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ExtractionRegistry {
        ExtractionRegistry::standard(ImageAdapter::disabled("/tmp"))
    }

    #[tokio::test]
    async fn rejects_audio_and_video() {
        let reg = registry();
        let err = reg.extract(b"RIFF", "song.mp3").await.unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
        let err = reg.extract(b"xxxx", "clip.mp4").await.unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[tokio::test]
    async fn rejects_unknown_extension() {
        let reg = registry();
        let err = reg.extract(b"data", "blob.xyz").await.unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }

    #[tokio::test]
    async fn dispatches_plain_text() {
        let reg = registry();
        let (extraction, source_type) = reg
            .extract(b"hello   world\n\nsecond para", "note.txt")
            .await
            .unwrap();
        assert_eq!(source_type, SourceType::Txt);
        assert_eq!(extraction.text, "hello world\n\nsecond para");
    }
}
