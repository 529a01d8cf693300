//! ims-storage: filesystem content store.
//!
//! Blobs live under `{base_dir}/{shard}/{id}` where `shard` is the first two
//! characters of the id. Writes go through a temporary file in the same
//! directory and are linked into place without clobbering, so a blob is
//! either complete or absent.

mod fs;

pub use fs::FsContentStore;
