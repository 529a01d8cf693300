//! Out-of-band consistency report between the two stores.
//!
//! A failed create can leave a blob with no metadata row when compensation
//! also fails. Those blobs are unreachable through the API; this module finds
//! them so an operator can inspect or remove them.

use ims_core::config::Config;
use ims_core::{Error, ImageId, MetadataStore, Result};
use ims_db::SqliteMetadataStore;
use ims_storage::FsContentStore;

/// Blob ids on disk that have no live metadata record.
///
/// A create that has written its blob but not yet inserted metadata also
/// shows up here. Run against a stopped server, or re-check an id before
/// removing its blob.
pub fn find_orphans(content: &FsContentStore, metadata: &dyn MetadataStore) -> Result<Vec<ImageId>> {
    let mut orphans = Vec::new();
    for id in content.blob_ids()? {
        match metadata.get(&id) {
            Ok(_) => {}
            Err(Error::NotFound { .. }) => orphans.push(id),
            Err(e) => return Err(e),
        }
    }

    tracing::debug!(count = orphans.len(), "Orphan scan finished");
    Ok(orphans)
}

/// Open the configured stores and report orphans.
///
/// Unlike server startup, nothing is created: a missing database is an error.
pub fn scan(config: &Config) -> Result<Vec<ImageId>> {
    let db_path = &config.storage.db_path;
    if !db_path.exists() {
        return Err(Error::not_found("database", db_path.display()));
    }
    let pool = ims_db::pool::init_pool(&db_path.to_string_lossy(), 1)?;
    let metadata = SqliteMetadataStore::new(pool);
    let content = FsContentStore::new(&config.storage.images_dir);
    find_orphans(&content, &metadata)
}
