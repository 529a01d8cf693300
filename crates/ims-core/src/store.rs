//! Storage contracts shared by the image handler and its backends.
//!
//! Both traits are synchronous: every call touches the durable medium and
//! returns only after the mutation is committed. Async callers run them on a
//! blocking worker.

use bytes::Bytes;

use crate::error::Result;
use crate::ids::ImageId;
use crate::page::{Page, PageRequest};
use crate::record::ImageRecord;

/// Durable, id-keyed byte storage with create-once semantics.
pub trait ContentStore: Send + Sync {
    /// Store `data` under `id`.
    ///
    /// Fails with [`Error::Conflict`](crate::Error::Conflict) if bytes already
    /// exist for `id`. Returns the number of bytes written.
    fn put(&self, id: &ImageId, data: &[u8]) -> Result<u64>;

    /// Return the exact bytes previously stored, or `NotFound`.
    fn get(&self, id: &ImageId) -> Result<Bytes>;

    /// Remove the bytes for `id`, or `NotFound` if there are none.
    fn delete(&self, id: &ImageId) -> Result<()>;
}

/// Result of a successful metadata delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The row existed and is now gone.
    Removed,
    /// The id was deleted by an earlier call.
    AlreadyRemoved,
}

/// Durable record storage with an identifier index.
pub trait MetadataStore: Send + Sync {
    /// Insert a new record. `Conflict` if the id is present or was ever deleted.
    fn insert(&self, record: &ImageRecord) -> Result<()>;

    /// Look up a record, or `NotFound`.
    fn get(&self, id: &ImageId) -> Result<ImageRecord>;

    /// Delete a record and tombstone its id.
    ///
    /// Returns `NotFound` only for ids that never existed.
    fn delete(&self, id: &ImageId) -> Result<Removal>;

    /// One page of records ordered by `(created_at, id)`.
    fn list(&self, request: &PageRequest) -> Result<Page>;
}
