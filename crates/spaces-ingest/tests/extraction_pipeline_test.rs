//! Extraction → chunking pipeline behavior without external services.

use serde_json::Value as JsonValue;

use spaces_core::{ChunkParams, RecursiveChunker, SourceType};
use spaces_ingest::extract::{ExtractionRegistry, ImageAdapter};

fn registry() -> ExtractionRegistry {
    let dir = std::env::temp_dir().join("spacesai-pipeline-test");
    ExtractionRegistry::standard(ImageAdapter::disabled(dir))
}

#[tokio::test]
async fn text_extraction_chunks_are_contiguous_and_bounded() {
    let body = "Cross-border transfers of personal data require adequate safeguards. "
        .repeat(120);
    let (extraction, source_type) = registry().extract(body.as_bytes(), "privacy.txt").await.unwrap();
    assert_eq!(source_type, SourceType::Txt);

    let chunker = RecursiveChunker::new(ChunkParams::new(600, 60));
    let chunks = chunker.chunk(&extraction.text);

    assert!(chunks.len() > 1);
    // chunk_index forms 0..n-1 with no gaps by construction; verify the
    // ordering and the size bound the MetaStore write relies on.
    for (i, pair) in chunks.windows(2).enumerate() {
        assert!(pair[0].start < pair[1].start, "chunk {i} out of order");
    }
    for chunk in &chunks {
        assert!(chunk.text.len() <= 600);
        assert!(!chunk.text.is_empty());
    }
}

#[tokio::test]
async fn exact_substring_survives_extraction_and_chunking() {
    // The lexical round-trip property depends on chunk text carrying exact
    // substrings of the normalized source.
    let needle = "the quarterly revenue grew by eleven percent";
    let body = format!(
        "Preamble paragraph.\n\n{}\n\nTrailing paragraph with other content.",
        needle
    );
    let (extraction, _) = registry().extract(body.as_bytes(), "report.md").await.unwrap();

    let chunks = RecursiveChunker::new(ChunkParams::new(2500, 250)).chunk(&extraction.text);
    assert!(chunks.iter().any(|c| c.text.contains(needle)));
}

#[tokio::test]
async fn html_and_json_dispatch_by_extension() {
    let reg = registry();

    let (html, st) = reg
        .extract(
            b"<html><body><p>alpha</p><p>beta</p></body></html>",
            "page.html",
        )
        .await
        .unwrap();
    assert_eq!(st, SourceType::Html);
    assert_eq!(html.text, "alpha\n\nbeta");

    let (json, st) = reg
        .extract(br#"{"section": {"title": "Scope"}}"#, "doc.json")
        .await
        .unwrap();
    assert_eq!(st, SourceType::Json);
    assert!(json.text.contains("section.title: Scope"));
}

#[tokio::test]
async fn unsupported_media_is_rejected_not_mangled() {
    let reg = registry();
    for name in ["song.mp3", "talk.wav", "clip.mov", "video.webm"] {
        let err = reg.extract(b"0000", name).await.unwrap_err();
        assert!(
            matches!(err, spaces_core::Error::Unsupported(_)),
            "{name} should be rejected"
        );
    }
}

#[tokio::test]
async fn extraction_metadata_is_open_map() {
    let (extraction, _) = registry()
        .extract(
            b"<html><head><title>Kept</title></head><body><p>x</p></body></html>",
            "t.html",
        )
        .await
        .unwrap();
    // Known keys are set; the map shape is plain JSON so unknown keys can be
    // preserved end to end.
    assert_eq!(extraction.metadata["title"], JsonValue::from("Kept"));
}
