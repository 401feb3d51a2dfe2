use async_trait::async_trait;
use log::{info, warn};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Folder for post images.
pub const IMAGES: &str = "images";
/// Folder for profile pictures.
pub const AVATARS: &str = "avatars";

#[derive(Debug, Error)]
pub enum MediaStoreError {
    #[error("not_found")]
    NotFound,
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Blob storage for uploaded files, addressed by relative keys like
/// `images/1700000000_0_cat.png`.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn save(&self, key: &str, bytes: &[u8]) -> Result<(), MediaStoreError>;
    /// Bytes plus a sniffed MIME type.
    async fn load(&self, key: &str) -> Result<(Vec<u8>, String), MediaStoreError>;
    async fn delete(&self, key: &str) -> Result<(), MediaStoreError>;
}

/// Public URL a stored key is served under.
pub fn public_url(key: &str) -> String {
    format!("/uploads/{key}")
}

/// Inverse of [`public_url`]; `None` for URLs this store did not hand out.
pub fn key_from_url(url: &str) -> Option<&str> {
    url.strip_prefix("/uploads/").filter(|k| !k.is_empty())
}

pub fn sniff_mime(bytes: &[u8]) -> String {
    infer::get(bytes)
        .map(|t| t.mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".into())
}

/// Keep ascii alphanumerics, `.`, `-` and `_`; everything else becomes `_`.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() { "upload".to_string() } else { cleaned.to_string() }
}

static UPLOAD_SEQ: AtomicU64 = AtomicU64::new(0);

/// `{folder}/{unix_nanos}_{seq}_{sanitized}`; the sequence keeps keys unique
/// when two uploads land in the same nanosecond.
pub fn upload_key(folder: &str, filename: &str) -> String {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or_default();
    let seq = UPLOAD_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{folder}/{nanos}_{seq}_{}", sanitize_filename(filename))
}

fn checked_relative(key: &str) -> Result<&Path, MediaStoreError> {
    let path = Path::new(key);
    if key.is_empty() || !path.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(MediaStoreError::InvalidKey(key.to_string()));
    }
    Ok(path)
}

// ---------------- Filesystem implementation ----------------
pub struct FsMediaStore {
    root: PathBuf,
}

impl FsMediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, MediaStoreError> {
        Ok(self.root.join(checked_relative(key)?))
    }
}

#[async_trait]
impl MediaStore for FsMediaStore {
    async fn save(&self, key: &str, bytes: &[u8]) -> Result<(), MediaStoreError> {
        let path = self.path_for(key)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        info!("stored upload key={key} size={}", bytes.len());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<(Vec<u8>, String), MediaStoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let mime = sniff_mime(&bytes);
                Ok((bytes, mime))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(MediaStoreError::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), MediaStoreError> {
        let path = self.path_for(key)?;
        // Best-effort delete: treat not found as success
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!("delete failed key={key}: {e}");
                Err(e.into())
            }
        }
    }
}
