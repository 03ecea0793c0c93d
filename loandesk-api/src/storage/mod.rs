//! Local object storage.
//!
//! Uploaded document bytes live on disk under the root folder's `objects/`
//! directory, addressed by slash-separated keys. Reads go through presigned
//! URLs built by [`presign::UrlSigner`].

pub mod presign;

pub use presign::{extract_object_key, UrlSigner};

use std::path::{Path, PathBuf};

use loandesk_common::{Error, Result};

/// Filesystem-backed object store
#[derive(Debug, Clone)]
pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store bytes under `key`, creating parent directories as needed.
    ///
    /// Writing an existing key overwrites it.
    pub async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    /// Read an object's bytes; `None` when the key does not exist
    pub async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

/// Reject keys that would escape or alias paths under the store root
fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidInput("Object key is empty".to_string()));
    }
    if key.starts_with('/') {
        return Err(Error::InvalidInput(format!(
            "Object key must be relative: {}",
            key
        )));
    }
    if key
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(Error::InvalidInput(format!("Invalid object key: {}", key)));
    }
    Ok(())
}

/// Build the storage key for an uploaded file.
///
/// With a path hint the original filename is kept under that prefix. Without
/// one, a millisecond timestamp prefix keeps repeated uploads of the same
/// filename from colliding, and whitespace runs in the name collapse to
/// underscores.
pub fn make_key(path_hint: Option<&str>, filename: &str, now_millis: i64) -> String {
    let hint = path_hint.map(|h| h.trim_matches('/')).unwrap_or_default();
    if hint.is_empty() {
        format!("{}-{}", now_millis, sanitize_filename(filename))
    } else {
        format!("{}/{}", hint, filename)
    }
}

/// Collapse whitespace runs to single underscores
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_whitespace = false;
    for ch in name.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                out.push('_');
                in_whitespace = true;
            }
        } else {
            out.push(ch);
            in_whitespace = false;
        }
    }
    out
}
