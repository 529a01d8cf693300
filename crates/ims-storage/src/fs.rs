use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use ims_core::{ContentStore, Error, ImageId, Result};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

/// Filesystem-backed [`ContentStore`].
pub struct FsContentStore {
    base_dir: PathBuf,
}

impl FsContentStore {
    /// Create a store rooted at `base_dir`. The directory is created lazily on
    /// first write.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path where the blob for `id` lives.
    pub fn blob_path(&self, id: &ImageId) -> PathBuf {
        self.base_dir.join(id.shard()).join(id.to_string())
    }

    /// Ids of every blob on disk, for out-of-band reconciliation.
    ///
    /// Temporary files and anything that does not parse as an id are skipped.
    pub fn blob_ids(&self) -> Result<Vec<ImageId>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in WalkDir::new(&self.base_dir).min_depth(2).max_depth(2) {
            let entry = entry.map_err(|e| Error::content(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<ImageId>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl ContentStore for FsContentStore {
    fn put(&self, id: &ImageId, data: &[u8]) -> Result<u64> {
        let path = self.blob_path(id);
        if path.exists() {
            return Err(Error::Conflict(format!("blob {id} already exists")));
        }

        let dir = path
            .parent()
            .ok_or_else(|| Error::Internal(format!("blob path for {id} has no parent")))?;
        std::fs::create_dir_all(dir).map_err(Error::content)?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(Error::content)?;
        tmp.write_all(data).map_err(Error::content)?;
        tmp.as_file().sync_all().map_err(Error::content)?;

        tmp.persist_noclobber(&path).map_err(|e| {
            if e.error.kind() == ErrorKind::AlreadyExists {
                Error::Conflict(format!("blob {id} already exists"))
            } else {
                Error::content(e.error)
            }
        })?;
        sync_dir(dir);

        tracing::debug!(%id, bytes = data.len(), "Stored blob");
        Ok(data.len() as u64)
    }

    fn get(&self, id: &ImageId) -> Result<Bytes> {
        match std::fs::read(self.blob_path(id)) {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::not_found("blob", id)),
            Err(e) => Err(Error::content(e)),
        }
    }

    fn delete(&self, id: &ImageId) -> Result<()> {
        let path = self.blob_path(id);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                if let Some(dir) = path.parent() {
                    sync_dir(dir);
                }
                tracing::debug!(%id, "Deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::not_found("blob", id)),
            Err(e) => Err(Error::content(e)),
        }
    }
}

/// Flush a directory entry change to disk. Best effort.
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = std::fs::File::open(dir).and_then(|f| f.sync_all()) {
        tracing::debug!("Failed to sync directory {}: {e}", dir.display());
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
