//! In-memory store implementations.
//!
//! These satisfy the same contracts as the durable backends and are used as
//! substitutes in tests and for ephemeral deployments.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::ids::ImageId;
use crate::page::{Page, PageRequest};
use crate::record::ImageRecord;
use crate::store::{ContentStore, MetadataStore, Removal};

/// Blob storage backed by a hash map.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    blobs: RwLock<HashMap<ImageId, Bytes>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    pub fn contains(&self, id: &ImageId) -> bool {
        self.blobs.read().contains_key(id)
    }
}

impl ContentStore for MemoryContentStore {
    fn put(&self, id: &ImageId, data: &[u8]) -> Result<u64> {
        let mut blobs = self.blobs.write();
        if blobs.contains_key(id) {
            return Err(Error::Conflict(format!("blob {id} already exists")));
        }
        blobs.insert(*id, Bytes::copy_from_slice(data));
        Ok(data.len() as u64)
    }

    fn get(&self, id: &ImageId) -> Result<Bytes> {
        self.blobs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("blob", id))
    }

    fn delete(&self, id: &ImageId) -> Result<()> {
        self.blobs
            .write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("blob", id))
    }
}

#[derive(Debug, Default)]
struct Records {
    live: HashMap<ImageId, ImageRecord>,
    tombstones: HashSet<ImageId>,
}

/// Record storage backed by a hash map plus a tombstone set.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    inner: RwLock<Records>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryMetadataStore {
    fn insert(&self, record: &ImageRecord) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.live.contains_key(&record.id) || inner.tombstones.contains(&record.id) {
            return Err(Error::Conflict(format!("image {} already exists", record.id)));
        }
        inner.live.insert(record.id, record.clone());
        Ok(())
    }

    fn get(&self, id: &ImageId) -> Result<ImageRecord> {
        self.inner
            .read()
            .live
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("image", id))
    }

    fn delete(&self, id: &ImageId) -> Result<Removal> {
        let mut inner = self.inner.write();
        if inner.live.remove(id).is_some() {
            inner.tombstones.insert(*id);
            Ok(Removal::Removed)
        } else if inner.tombstones.contains(id) {
            Ok(Removal::AlreadyRemoved)
        } else {
            Err(Error::not_found("image", id))
        }
    }

    fn list(&self, request: &PageRequest) -> Result<Page> {
        let cursor = request.cursor()?;
        let limit = request.limit();

        let mut rows: Vec<ImageRecord> = {
            let inner = self.inner.read();
            inner
                .live
                .values()
                .filter(|r| match &cursor {
                    Some(c) => (r.created_at_text(), r.id) > (c.created_at.clone(), c.id),
                    None => true,
                })
                .cloned()
                .collect()
        };
        rows.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        rows.truncate(limit as usize + 1);

        Ok(Page::from_overfetch(rows, limit))
    }
}
