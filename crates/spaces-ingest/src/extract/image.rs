//! Image extraction: OCR, thumbnail, visual tags, captioning.
//!
//! OCR shells out to `tesseract` with a timeout; a missing binary degrades
//! to empty OCR text rather than failing the upload. Captioning goes through
//! the primary/fallback [`Captioner`] and records which model answered.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use image::GenericImageView;
use serde_json::{json, Value as JsonValue};
use tempfile::Builder as TempBuilder;
use tokio::process::Command;
use tracing::{debug, warn};

use spaces_core::defaults::{EXTRACTION_CMD_TIMEOUT_SECS, THUMBNAIL_EDGE};
use spaces_core::textnorm::normalize_whitespace;
use spaces_core::{
    Error, Extraction, ExtractionAdapter, ImageExtraction, Result, SourceType,
};
use spaces_inference::Captioner;

const COLOR_PALETTE: [(&str, [f64; 3]); 9] = [
    ("red", [200.0, 60.0, 60.0]),
    ("orange", [230.0, 140.0, 60.0]),
    ("yellow", [220.0, 220.0, 80.0]),
    ("green", [80.0, 170.0, 110.0]),
    ("blue", [80.0, 120.0, 200.0]),
    ("purple", [140.0, 80.0, 180.0]),
    ("pink", [220.0, 120.0, 190.0]),
    ("brown", [150.0, 100.0, 70.0]),
    ("gray", [140.0, 140.0, 140.0]),
];

/// Nearest palette name for a mean RGB.
fn dominant_color_name(mean: [f64; 3]) -> &'static str {
    COLOR_PALETTE
        .iter()
        .min_by(|(_, a), (_, b)| {
            let da: f64 = (0..3).map(|i| (mean[i] - a[i]).powi(2)).sum();
            let db: f64 = (0..3).map(|i| (mean[i] - b[i]).powi(2)).sum();
            da.total_cmp(&db)
        })
        .map(|(name, _)| *name)
        .unwrap_or("neutral")
}

fn orientation(width: u32, height: u32) -> &'static str {
    let (w, h) = (width as f64, height as f64);
    if w > h * 1.15 {
        "landscape"
    } else if h > w * 1.15 {
        "portrait"
    } else {
        "square"
    }
}

/// Lowercase alphanumeric tokens from a file name, capped at 8.
fn filename_tokens(name: &str) -> Vec<String> {
    let stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    stem.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .take(8)
        .map(String::from)
        .collect()
}

/// OCR tokens worth tagging: alphabetic, length > 2, numeric noise dropped.
fn ocr_tokens(ocr: &str) -> Vec<String> {
    ocr.to_lowercase()
        .split_whitespace()
        .filter(|t| t.len() > 2 && t.chars().all(|c| c.is_ascii_alphabetic()))
        .take(6)
        .map(String::from)
        .collect()
}

struct DecodedImage {
    width: u32,
    height: u32,
    mean_rgb: [f64; 3],
    thumbnail_path: Option<String>,
}

/// Decode, measure, and thumbnail an image (CPU-bound; run blocking).
fn decode_and_thumbnail(
    data: &[u8],
    file_name: &str,
    thumbnail_dir: &Path,
) -> Result<DecodedImage> {
    let img = image::load_from_memory(data)
        .map_err(|e| Error::Validation(format!("undecodable image: {e}")))?;
    let (width, height) = img.dimensions();

    let thumb = img.thumbnail(THUMBNAIL_EDGE, THUMBNAIL_EDGE).to_rgb8();
    let (mut r, mut g, mut b) = (0u64, 0u64, 0u64);
    for pixel in thumb.pixels() {
        r += pixel.0[0] as u64;
        g += pixel.0[1] as u64;
        b += pixel.0[2] as u64;
    }
    let n = (thumb.width() as u64 * thumb.height() as u64).max(1);
    let mean_rgb = [
        r as f64 / n as f64,
        g as f64 / n as f64,
        b as f64 / n as f64,
    ];

    let thumbnail_path = {
        let stem = Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string());
        let mut hasher = DefaultHasher::new();
        data.hash(&mut hasher);
        let target = thumbnail_dir.join(format!("{stem}_{:08x}_thumb.jpg", hasher.finish() as u32));
        match std::fs::create_dir_all(thumbnail_dir)
            .and_then(|_| {
                thumb
                    .save_with_format(&target, image::ImageFormat::Jpeg)
                    .map_err(std::io::Error::other)
            }) {
            Ok(()) => Some(target.to_string_lossy().to_string()),
            Err(e) => {
                warn!(file_name, error = %e, "Thumbnail write failed");
                None
            }
        }
    };

    Ok(DecodedImage {
        width,
        height,
        mean_rgb,
        thumbnail_path,
    })
}

/// Run tesseract OCR over image bytes. Missing binary or failure → empty.
async fn run_ocr(data: &[u8], file_name: &str) -> String {
    let ext = Path::new(file_name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_else(|| ".png".to_string());

    let tmpfile = match TempBuilder::new().suffix(&ext).tempfile() {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, "OCR temp file failed");
            return String::new();
        }
    };
    if let Err(e) = std::fs::write(tmpfile.path(), data) {
        warn!(error = %e, "OCR temp write failed");
        return String::new();
    }

    let output = tokio::time::timeout(
        std::time::Duration::from_secs(EXTRACTION_CMD_TIMEOUT_SECS),
        Command::new("tesseract")
            .arg(tmpfile.path())
            .arg("stdout")
            .output(),
    )
    .await;

    match output {
        Ok(Ok(out)) if out.status.success() => {
            String::from_utf8_lossy(&out.stdout).into_owned()
        }
        Ok(Ok(out)) => {
            debug!(
                status = %out.status,
                "tesseract exited non-zero; continuing without OCR"
            );
            String::new()
        }
        Ok(Err(e)) => {
            debug!(error = %e, "tesseract unavailable; continuing without OCR");
            String::new()
        }
        Err(_) => {
            warn!(file_name, "OCR timed out");
            String::new()
        }
    }
}

/// Adapter for image files.
pub struct ImageAdapter {
    thumbnail_dir: PathBuf,
    captioner: Option<Arc<Captioner>>,
}

impl ImageAdapter {
    pub fn new(upload_dir: impl Into<PathBuf>, captioner: Option<Arc<Captioner>>) -> Self {
        Self {
            thumbnail_dir: upload_dir.into().join("thumbnails"),
            captioner,
        }
    }

    /// Adapter with captioning disabled (tests, caption-less deployments).
    pub fn disabled(upload_dir: impl Into<PathBuf>) -> Self {
        Self::new(upload_dir, None)
    }
}

#[async_trait]
impl ExtractionAdapter for ImageAdapter {
    fn handles(&self, source_type: SourceType) -> bool {
        source_type == SourceType::Image
    }

    async fn extract(
        &self,
        data: &[u8],
        file_name: &str,
        _source_type: SourceType,
        _config: &JsonValue,
    ) -> Result<Extraction> {
        let bytes = data.to_vec();
        let name = file_name.to_string();
        let thumb_dir = self.thumbnail_dir.clone();
        let decoded =
            tokio::task::spawn_blocking(move || decode_and_thumbnail(&bytes, &name, &thumb_dir))
                .await
                .map_err(|e| Error::Internal(format!("image decode task: {e}")))??;

        let ocr_raw = run_ocr(data, file_name).await;
        let ocr_text = normalize_whitespace(&ocr_raw);

        let caption_outcome = match &self.captioner {
            Some(captioner) => captioner.caption(data).await,
            None => None,
        };

        let color = dominant_color_name(decoded.mean_rgb);
        let orient = orientation(decoded.width, decoded.height);

        let mut tags: Vec<String> = vec![orient.to_string()];
        if let Some(ext) = Path::new(file_name).extension() {
            tags.push(ext.to_string_lossy().to_lowercase());
        }
        tags.extend(filename_tokens(file_name));
        tags.extend(ocr_tokens(&ocr_text));
        tags.push(color.to_string());
        tags.dedup_by(|a, b| a == b);
        let mut seen = std::collections::HashSet::new();
        tags.retain(|t| seen.insert(t.clone()));

        // A heuristic caption stands in when no model answered.
        let (caption, caption_source) = match caption_outcome {
            Some(out) => (Some(out.caption), Some(out.source)),
            None => (
                Some(format!(
                    "{} image in {} tones, {}x{}px",
                    capitalize(orient),
                    color,
                    decoded.width,
                    decoded.height
                )),
                Some(spaces_core::CaptionSource::Fallback),
            ),
        };

        let text = if ocr_text.is_empty() {
            caption.clone().unwrap_or_default()
        } else {
            ocr_text.clone()
        };

        Ok(Extraction {
            text,
            image: Some(ImageExtraction {
                ocr_text,
                caption,
                caption_source,
                tags,
                width: decoded.width,
                height: decoded.height,
                thumbnail_path: decoded.thumbnail_path,
            }),
            metadata: json!({
                "width": decoded.width,
                "height": decoded.height,
                "dominant_color": color,
            }),
        })
    }

    fn name(&self) -> &str {
        "image"
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dominant_color_picks_nearest() {
        assert_eq!(dominant_color_name([210.0, 50.0, 50.0]), "red");
        assert_eq!(dominant_color_name([75.0, 115.0, 205.0]), "blue");
        assert_eq!(dominant_color_name([139.0, 140.0, 141.0]), "gray");
    }

    #[test]
    fn orientation_thresholds() {
        assert_eq!(orientation(200, 100), "landscape");
        assert_eq!(orientation(100, 200), "portrait");
        assert_eq!(orientation(100, 110), "square");
    }

    #[test]
    fn filename_tokens_capped_and_cleaned() {
        let tokens = filename_tokens("Quarterly_Report-2026_final-v2.png");
        assert!(tokens.contains(&"quarterly".to_string()));
        assert!(tokens.contains(&"report".to_string()));
        assert!(tokens.len() <= 8);
    }

    #[test]
    fn ocr_tokens_filter_numeric_noise() {
        let tokens = ocr_tokens("Invoice 12345 total 99.50 payable immediately 3a");
        assert_eq!(
            tokens,
            vec!["invoice".to_string(), "total".to_string(), "payable".to_string(), "immediately".to_string()]
        );
    }

    #[tokio::test]
    async fn undecodable_image_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = ImageAdapter::disabled(dir.path());
        let err = adapter
            .extract(b"not an image", "x.png", SourceType::Image, &JsonValue::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn tiny_png_extracts_dimensions_and_tags() {
        // 3x2 solid-red PNG produced via the image crate itself.
        let mut buf = std::io::Cursor::new(Vec::new());
        let img = image::RgbImage::from_pixel(3, 2, image::Rgb([200, 60, 60]));
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let adapter = ImageAdapter::disabled(dir.path());
        let out = adapter
            .extract(&buf.into_inner(), "red_dot.png", SourceType::Image, &JsonValue::Null)
            .await
            .unwrap();

        let image = out.image.unwrap();
        assert_eq!((image.width, image.height), (3, 2));
        assert!(image.tags.contains(&"landscape".to_string()));
        assert!(image.tags.contains(&"red".to_string()));
        assert!(image.tags.contains(&"dot".to_string()));
        // No caption model configured → heuristic fallback caption.
        assert_eq!(
            image.caption_source,
            Some(spaces_core::CaptionSource::Fallback)
        );
        assert!(image.caption.unwrap().contains("red tones"));
    }
}
