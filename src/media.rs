//! Uploaded media
//!
//! Refund and review evidence is validated as a whole before anything is
//! written, then handed to a `BlobStore` which returns public paths.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

pub const PUBLIC_PREFIX: &str = "/uploads";

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Unsupported media type: {0}")]
    UnsupportedType(String),

    #[error("File exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("At most {max} {field} allowed")]
    TooMany { field: &'static str, max: usize },

    #[error("Unexpected file field '{0}'")]
    UnexpectedField(String),

    #[error("Invalid media path: {0}")]
    InvalidPath(String),

    #[error("Media not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind { Image, Video }

impl MediaKind {
    /// Multipart field names accepted for evidence.
    pub fn from_field(name: &str) -> Result<Self, MediaError> {
        match name {
            "images" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            other => Err(MediaError::UnexpectedField(other.to_string())),
        }
    }

    fn accepts(&self, content_type: &str) -> bool {
        let prefix = match self {
            Self::Image => "image/",
            Self::Video => "video/",
        };
        content_type.to_ascii_lowercase().starts_with(prefix)
    }
}

#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub kind: MediaKind,
    pub content_type: String,
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

impl MediaUpload {
    /// Extension from the client file name, else from the media subtype.
    pub fn extension(&self) -> String {
        let from_name = self
            .file_name
            .as_deref()
            .and_then(|n| Path::new(n).extension())
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()));
        if let Some(ext) = from_name {
            return ext.to_ascii_lowercase();
        }
        match self.content_type.to_ascii_lowercase().split('/').nth(1).unwrap_or("") {
            "jpeg" | "pjpeg" => "jpg".into(),
            "quicktime" => "mov".into(),
            sub if !sub.is_empty() && sub.chars().all(|c| c.is_ascii_alphanumeric()) => sub.into(),
            _ => "bin".into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MediaLimits {
    pub max_images: usize,
    pub max_videos: usize,
    pub max_file_bytes: usize,
}

impl Default for MediaLimits {
    fn default() -> Self {
        Self { max_images: 4, max_videos: 1, max_file_bytes: 20 * 1024 * 1024 }
    }
}

/// Evidence files of one request.
#[derive(Debug, Clone, Default)]
pub struct MediaBundle {
    pub images: Vec<MediaUpload>,
    pub video: Vec<MediaUpload>,
}

impl MediaBundle {
    pub fn push(&mut self, upload: MediaUpload) {
        match upload.kind {
            MediaKind::Image => self.images.push(upload),
            MediaKind::Video => self.video.push(upload),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty() && self.video.is_empty()
    }

    pub fn validate(&self, limits: &MediaLimits) -> Result<(), MediaError> {
        if self.images.len() > limits.max_images {
            return Err(MediaError::TooMany { field: "images", max: limits.max_images });
        }
        if self.video.len() > limits.max_videos {
            return Err(MediaError::TooMany { field: "video", max: limits.max_videos });
        }
        for upload in self.images.iter().chain(&self.video) {
            if !upload.kind.accepts(&upload.content_type) {
                return Err(MediaError::UnsupportedType(upload.content_type.clone()));
            }
            if upload.bytes.len() > limits.max_file_bytes {
                return Err(MediaError::TooLarge { limit: limits.max_file_bytes });
            }
        }
        Ok(())
    }
}

/// Public paths of a stored bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredMedia {
    pub images: Vec<String>,
    pub video: Option<String>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Returns the public path of the stored file.
    async fn store(&self, namespace: &str, ext: &str, bytes: &[u8]) -> Result<String, MediaError>;

    async fn resolve(&self, path: &str) -> Result<Vec<u8>, MediaError>;
}

/// Writes a validated bundle. Call only after every other check passed.
pub async fn store_bundle(store: &dyn BlobStore, namespace: &str, bundle: &MediaBundle) -> Result<StoredMedia, MediaError> {
    let mut stored = StoredMedia::default();
    for upload in &bundle.images {
        stored.images.push(store.store(namespace, &upload.extension(), &upload.bytes).await?);
    }
    if let Some(upload) = bundle.video.first() {
        stored.video = Some(store.store(namespace, &upload.extension(), &upload.bytes).await?);
    }
    Ok(stored)
}

fn file_name(ext: &str) -> String {
    format!("{}-{}.{}", Utc::now().timestamp_millis(), rand::random::<u32>(), ext)
}

fn check_segment(segment: &str) -> Result<(), MediaError> {
    if segment.is_empty() || !segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(MediaError::InvalidPath(segment.to_string()));
    }
    Ok(())
}

/// `/uploads/<namespace>/<name>` to a relative path with only normal components.
fn relative_path(path: &str) -> Result<PathBuf, MediaError> {
    let rest = path
        .strip_prefix(PUBLIC_PREFIX)
        .and_then(|r| r.strip_prefix('/'))
        .ok_or_else(|| MediaError::InvalidPath(path.to_string()))?;
    let rel = PathBuf::from(rest);
    let normal = rel.components().all(|c| matches!(c, Component::Normal(_)));
    if rest.is_empty() || !normal || rest.contains('\\') {
        return Err(MediaError::InvalidPath(path.to_string()));
    }
    Ok(rel)
}

/// Files under a root directory, served by the router at `/uploads`.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn store(&self, namespace: &str, ext: &str, bytes: &[u8]) -> Result<String, MediaError> {
        check_segment(namespace)?;
        check_segment(ext)?;
        let dir = self.root.join(namespace);
        tokio::fs::create_dir_all(&dir).await?;
        let name = file_name(ext);
        tokio::fs::write(dir.join(&name), bytes).await?;
        debug!(namespace, name = %name, "Stored media");
        Ok(format!("{PUBLIC_PREFIX}/{namespace}/{name}"))
    }

    async fn resolve(&self, path: &str) -> Result<Vec<u8>, MediaError> {
        let full = self.root.join(relative_path(path)?);
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(MediaError::NotFound(path.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn store(&self, namespace: &str, ext: &str, bytes: &[u8]) -> Result<String, MediaError> {
        check_segment(namespace)?;
        check_segment(ext)?;
        let path = format!("{PUBLIC_PREFIX}/{namespace}/{}", file_name(ext));
        self.files.write().await.insert(path.clone(), bytes.to_vec());
        Ok(path)
    }

    async fn resolve(&self, path: &str) -> Result<Vec<u8>, MediaError> {
        relative_path(path)?;
        self.files.read().await.get(path).cloned().ok_or_else(|| MediaError::NotFound(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(kind: MediaKind, content_type: &str, size: usize) -> MediaUpload {
        MediaUpload { kind, content_type: content_type.into(), file_name: None, bytes: vec![0; size] }
    }

    #[test]
    fn test_bundle_limits() {
        let limits = MediaLimits { max_file_bytes: 10, ..Default::default() };
        let mut bundle = MediaBundle::default();
        for _ in 0..4 {
            bundle.push(upload(MediaKind::Image, "image/png", 5));
        }
        assert!(bundle.validate(&limits).is_ok());

        bundle.push(upload(MediaKind::Image, "image/png", 5));
        assert!(matches!(bundle.validate(&limits), Err(MediaError::TooMany { field: "images", max: 4 })));

        let mut bundle = MediaBundle::default();
        bundle.push(upload(MediaKind::Video, "application/pdf", 5));
        assert!(matches!(bundle.validate(&limits), Err(MediaError::UnsupportedType(_))));

        let mut bundle = MediaBundle::default();
        bundle.push(upload(MediaKind::Video, "video/mp4", 11));
        assert!(matches!(bundle.validate(&limits), Err(MediaError::TooLarge { limit: 10 })));

        assert!(matches!(MediaKind::from_field("avatar"), Err(MediaError::UnexpectedField(_))));
    }

    #[test]
    fn test_extension() {
        let mut u = upload(MediaKind::Image, "image/jpeg", 1);
        assert_eq!(u.extension(), "jpg");
        u.file_name = Some("Photo.PNG".into());
        assert_eq!(u.extension(), "png");
        u.file_name = Some("../../etc".into());
        assert_eq!(u.extension(), "jpg");
        assert_eq!(upload(MediaKind::Video, "video/quicktime", 1).extension(), "mov");
    }

    #[tokio::test]
    async fn test_local_store_round_trip_and_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        let path = store.store("refunds", "png", b"img").await.unwrap();
        assert!(path.starts_with("/uploads/refunds/"));
        assert!(path.ends_with(".png"));
        assert_eq!(store.resolve(&path).await.unwrap(), b"img");

        assert!(matches!(store.resolve("/uploads/../secret").await, Err(MediaError::InvalidPath(_))));
        assert!(matches!(store.resolve("/etc/passwd").await, Err(MediaError::InvalidPath(_))));
        assert!(matches!(store.resolve("/uploads/refunds/missing.png").await, Err(MediaError::NotFound(_))));
        assert!(store.store("../x", "png", b"").await.is_err());
    }
}
