// src/storage.rs
//
// Persistence seam for encoded outputs. The engine only ever talks to the
// `Storage` trait; `DiskStorage` is the bundled implementation and writes
// atomically via a temp file in the destination directory.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{ConvertError, Result};

/// Where a stored object ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Stable address of the object (a URL or a path, backend-dependent).
    pub url: String,
    pub size_bytes: u64,
}

/// Sink for encoded image bytes. Implementations must be safe to call from
/// multiple worker threads at once.
pub trait Storage: Send + Sync {
    fn store(&self, bytes: &[u8], name: &str) -> Result<StoredObject>;
}

/// Local-filesystem storage. Writes go through a `NamedTempFile` in the
/// output directory and are persisted with a rename, so readers never see
/// a partial file.
#[derive(Debug, Clone)]
pub struct DiskStorage {
    output_dir: PathBuf,
    url_prefix: String,
}

impl DiskStorage {
    /// Creates the output directory if it does not exist yet.
    pub fn new(output_dir: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)
            .map_err(|e| ConvertError::store_failed(output_dir.display().to_string(), e))?;
        let mut url_prefix = url_prefix.into();
        while url_prefix.ends_with('/') {
            url_prefix.pop();
        }
        Ok(Self { output_dir, url_prefix })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl Storage for DiskStorage {
    fn store(&self, bytes: &[u8], name: &str) -> Result<StoredObject> {
        let store_err = |e: std::io::Error| ConvertError::store_failed(name.to_string(), e);

        let mut tmp = NamedTempFile::new_in(&self.output_dir).map_err(store_err)?;
        tmp.write_all(bytes).map_err(store_err)?;
        tmp.as_file().sync_all().map_err(store_err)?;

        let dest = self.output_dir.join(name);
        tmp.persist(&dest).map_err(|e| store_err(e.error))?;

        Ok(StoredObject {
            url: format!("{}/{}", self.url_prefix, name),
            size_bytes: bytes.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_writes_file_and_reports_size() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path(), "/converted").unwrap();

        let object = storage.store(b"not really a png", "out.png").unwrap();
        assert_eq!(object.url, "/converted/out.png");
        assert_eq!(object.size_bytes, 16);

        let on_disk = fs::read(dir.path().join("out.png")).unwrap();
        assert_eq!(on_disk, b"not really a png");
    }

    #[test]
    fn trailing_slashes_in_prefix_are_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path(), "/converted///").unwrap();
        let object = storage.store(b"x", "a.webp").unwrap();
        assert_eq!(object.url, "/converted/a.webp");
    }

    #[test]
    fn overwrite_replaces_existing_object() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path(), "/c").unwrap();
        storage.store(b"first", "same.jpg").unwrap();
        storage.store(b"second", "same.jpg").unwrap();
        let on_disk = fs::read(dir.path().join("same.jpg")).unwrap();
        assert_eq!(on_disk, b"second");
    }

    #[test]
    fn missing_parent_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let storage = DiskStorage::new(&nested, "/c").unwrap();
        storage.store(b"x", "f.png").unwrap();
        assert!(nested.join("f.png").exists());
    }
}
