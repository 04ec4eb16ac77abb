//! Filesystem blob store.
//!
//! Stores original binaries under dated, per-tenant paths:
//! `{sanitized_email}/YYYY/MM/DD/HHMMSS/{file}`. Small payloads are written
//! in one shot; larger ones stream through a fixed buffer so ingestion stays
//! memory-bounded.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use spaces_core::defaults::UPLOAD_SPOOL_THRESHOLD_BYTES;
use spaces_core::{BlobStore, Error, Result};

const STREAM_BUF_BYTES: usize = 64 * 1024;

/// Lowercase an email and replace path-hostile characters so it can serve as
/// a directory segment. Empty input maps to "public".
pub fn sanitize_email(email: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"[^a-z0-9._\-]").unwrap());

    let lowered = email.trim().to_lowercase().replace('@', "_at_");
    let cleaned = re.replace_all(&lowered, "_").to_string();
    if cleaned.is_empty() {
        "public".to_string()
    } else {
        cleaned
    }
}

/// Build the dated blob key for an upload.
pub fn blob_key(email: &str, file_name: &str) -> String {
    let now = Utc::now();
    // Strip any path components a client sneaks into the file name.
    let base = Path::new(file_name)
        .file_name()
        .map(|n| n.to_string_lossy().replace("..", "."))
        .unwrap_or_else(|| "upload".to_string());
    format!(
        "{}/{}/{}",
        sanitize_email(email),
        now.format("%Y/%m/%d/%H%M%S"),
        base
    )
}

/// Blob store writing to a local directory tree.
#[derive(Debug, Clone)]
pub struct FilesystemBlobStore {
    root: PathBuf,
}

impl FilesystemBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        // Reject traversal in keys; keys are service-generated but the check
        // is cheap and the invariant matters.
        if key.split('/').any(|seg| seg == "..") {
            return Err(Error::Validation(format!("invalid blob key: {key}")));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<String> {
        let target = self.path_for(key)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if data.len() <= UPLOAD_SPOOL_THRESHOLD_BYTES {
            tokio::fs::write(&target, data).await?;
        } else {
            let file = tokio::fs::File::create(&target).await?;
            let mut writer = tokio::io::BufWriter::with_capacity(STREAM_BUF_BYTES, file);
            for window in data.chunks(STREAM_BUF_BYTES) {
                writer.write_all(window).await?;
            }
            writer.flush().await?;
        }

        debug!(
            subsystem = "ingest",
            component = "blob",
            op = "put",
            key,
            bytes = data.len(),
            "Blob stored"
        );
        self.get_url(key).await
    }

    async fn get_url(&self, key: &str) -> Result<String> {
        let path = self.path_for(key)?;
        Ok(format!("file://{}", path.display()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_email_for_paths() {
        assert_eq!(sanitize_email("Jo.Doe@Example.COM"), "jo.doe_at_example.com");
        assert_eq!(sanitize_email("a b/c"), "a_b_c");
        assert_eq!(sanitize_email(""), "public");
    }

    #[test]
    fn blob_key_shape() {
        let key = blob_key("u@example.com", "report.pdf");
        let parts: Vec<&str> = key.split('/').collect();
        // email / YYYY / MM / DD / HHMMSS / file
        assert_eq!(parts.len(), 6);
        assert_eq!(parts[0], "u_at_example.com");
        assert_eq!(parts[5], "report.pdf");
    }

    #[test]
    fn blob_key_strips_directories() {
        let key = blob_key("u@example.com", "../../etc/passwd");
        assert!(key.ends_with("/passwd"));
        assert!(!key.contains(".."));
    }

    #[tokio::test]
    async fn put_get_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemBlobStore::new(dir.path());

        let url = store.put("u/2026/08/01/120000/a.txt", b"hello").await.unwrap();
        assert!(url.starts_with("file://"));

        let stored = dir.path().join("u/2026/08/01/120000/a.txt");
        assert_eq!(std::fs::read(&stored).unwrap(), b"hello");

        store.delete("u/2026/08/01/120000/a.txt").await.unwrap();
        assert!(!stored.exists());
        // Deleting again is not an error.
        store.delete("u/2026/08/01/120000/a.txt").await.unwrap();
    }

    #[tokio::test]
    async fn large_payloads_stream() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemBlobStore::new(dir.path());
        let big = vec![7u8; UPLOAD_SPOOL_THRESHOLD_BYTES + 1];
        store.put("u/big.bin", &big).await.unwrap();
        assert_eq!(
            std::fs::metadata(dir.path().join("u/big.bin")).unwrap().len(),
            big.len() as u64
        );
    }

    #[tokio::test]
    async fn traversal_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemBlobStore::new(dir.path());
        assert!(store.put("../outside", b"x").await.is_err());
    }
}
