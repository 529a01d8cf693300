//! [`MetadataStore`] backed by a pooled SQLite database.

use ims_core::{Error, ImageId, ImageRecord, MetadataStore, Page, PageRequest, Removal, Result};

use crate::pool::{get_conn, DbPool};
use crate::queries::images;

/// Durable metadata store. Cloning shares the underlying pool.
#[derive(Clone)]
pub struct SqliteMetadataStore {
    pool: DbPool,
}

impl SqliteMetadataStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl MetadataStore for SqliteMetadataStore {
    fn insert(&self, record: &ImageRecord) -> Result<()> {
        let conn = get_conn(&self.pool)?;
        images::insert_image(&conn, record)
    }

    fn get(&self, id: &ImageId) -> Result<ImageRecord> {
        let conn = get_conn(&self.pool)?;
        images::get_image(&conn, *id)?.ok_or_else(|| Error::not_found("image", id))
    }

    fn delete(&self, id: &ImageId) -> Result<Removal> {
        let conn = get_conn(&self.pool)?;
        images::delete_image(&conn, *id)
    }

    fn list(&self, request: &PageRequest) -> Result<Page> {
        let conn = get_conn(&self.pool)?;
        images::list_images(&conn, request)
    }
}
