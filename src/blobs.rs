//! Attachment storage. The chat core only needs "put bytes at a path, get a
//! durable URL back".

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::fs;

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("Invalid blob path: {0}")]
    InvalidPath(String),

    #[error("Empty attachment")]
    Empty,

    #[error("Attachment too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Blob storage error: {0}")]
    Io(#[from] std::io::Error),
}

/// An attachment as received from a client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `path` and return the URL it can be fetched from.
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<String, BlobError>;
}

/// Reduce a client-supplied file name to a single safe path segment.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "attachment".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Resolve `relative` below `base`, refusing anything that would escape it.
fn resolve_within(base: &Path, relative: &str) -> Result<PathBuf, BlobError> {
    let mut resolved = base.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::CurDir => {}
            _ => return Err(BlobError::InvalidPath(relative.to_string())),
        }
    }
    if resolved == base {
        return Err(BlobError::InvalidPath(relative.to_string()));
    }
    Ok(resolved)
}

/// Files on local disk, served back under `public_base_url`.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    base_path: PathBuf,
    public_base_url: String,
    max_size: usize,
}

impl LocalBlobStore {
    pub async fn new(
        base_path: PathBuf,
        public_base_url: impl Into<String>,
        max_size: usize,
    ) -> Result<Self, BlobError> {
        fs::create_dir_all(&base_path).await?;
        tracing::info!(path = %base_path.display(), "Blob store initialized");
        Ok(Self {
            base_path,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            max_size,
        })
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BlobError> {
        if bytes.is_empty() {
            return Err(BlobError::Empty);
        }
        if bytes.len() > self.max_size {
            return Err(BlobError::TooLarge {
                size: bytes.len(),
                max: self.max_size,
            });
        }

        let target = resolve_within(&self.base_path, path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, &bytes).await?;

        tracing::debug!(path, size = bytes.len(), content_type, "Stored attachment");
        Ok(format!("{}/files/{}", self.public_base_url, path))
    }
}

/// Keeps uploads in memory. For tests and embedding without a disk.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, (String, Vec<u8>)>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs.get(path).map(|entry| entry.1.clone())
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BlobError> {
        if bytes.is_empty() {
            return Err(BlobError::Empty);
        }
        self.blobs
            .insert(path.to_string(), (content_type.to_string(), bytes));
        Ok(format!("memory://{}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("photo.png", "photo.png")]
    #[case("../../etc/passwd", "passwd")]
    #[case("C:\\Users\\me\\voice note.m4a", "voice_note.m4a")]
    #[case("..", "attachment")]
    #[case("", "attachment")]
    fn file_names_are_reduced_to_one_segment(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(sanitize_file_name(raw), expected);
    }

    #[tokio::test]
    async fn local_store_writes_below_base_and_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().to_path_buf(), "http://localhost:3000/", 1024)
            .await
            .unwrap();

        let url = store
            .upload("chat-attachments/c1/42_a.png", b"png".to_vec(), "image/png")
            .await
            .unwrap();

        assert_eq!(url, "http://localhost:3000/files/chat-attachments/c1/42_a.png");
        let written = std::fs::read(dir.path().join("chat-attachments/c1/42_a.png")).unwrap();
        assert_eq!(written, b"png");
    }

    #[tokio::test]
    async fn local_store_refuses_traversal_and_oversize() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().to_path_buf(), "http://x", 4)
            .await
            .unwrap();

        let escaped = store.upload("../outside", b"a".to_vec(), "image/png").await;
        assert!(matches!(escaped, Err(BlobError::InvalidPath(_))));

        let big = store.upload("a/b", b"12345".to_vec(), "image/png").await;
        assert!(matches!(big, Err(BlobError::TooLarge { size: 5, max: 4 })));

        let empty = store.upload("a/b", Vec::new(), "image/png").await;
        assert!(matches!(empty, Err(BlobError::Empty)));
    }
}
