//! Image record CRUD and keyset listing.

use chrono::Utc;
use ims_core::record::format_timestamp;
use ims_core::{Error, ImageId, ImageRecord, Page, PageRequest, Removal, Result};
use rusqlite::{Connection, ErrorCode};

use crate::models::{image_from_row, IMAGE_COLS};

/// Insert a new image record.
///
/// The insert is a single statement guarded against tombstoned ids, so a
/// concurrent delete cannot slip a reused id in between check and write.
pub fn insert_image(conn: &Connection, record: &ImageRecord) -> Result<()> {
    let size = i64::try_from(record.size_bytes)
        .map_err(|_| Error::Validation(format!("size {} out of range", record.size_bytes)))?;

    let inserted = conn
        .execute(
            "INSERT INTO images (id, content_type, size_bytes, created_at)
             SELECT ?1, ?2, ?3, ?4
             WHERE NOT EXISTS (SELECT 1 FROM image_tombstones WHERE id = ?1)",
            rusqlite::params![
                record.id.to_string(),
                record.content_type,
                size,
                record.created_at_text(),
            ],
        )
        .map_err(|e| match e.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => {
                Error::Conflict(format!("image {} already exists", record.id))
            }
            _ => Error::metadata(e),
        })?;

    if inserted == 0 {
        return Err(Error::Conflict(format!(
            "image {} was deleted and cannot be reused",
            record.id
        )));
    }
    Ok(())
}

/// Get an image record by ID.
pub fn get_image(conn: &Connection, id: ImageId) -> Result<Option<ImageRecord>> {
    let q = format!("SELECT {IMAGE_COLS} FROM images WHERE id = ?1");
    match conn.query_row(&q, [id.to_string()], image_from_row) {
        Ok(r) => Ok(Some(r)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::metadata(e)),
    }
}

/// Delete an image record and tombstone its id in one transaction.
pub fn delete_image(conn: &Connection, id: ImageId) -> Result<Removal> {
    let id_str = id.to_string();
    let tx = conn.unchecked_transaction().map_err(Error::metadata)?;

    let n = tx
        .execute("DELETE FROM images WHERE id = ?1", [&id_str])
        .map_err(Error::metadata)?;

    let outcome = if n > 0 {
        tx.execute(
            "INSERT OR IGNORE INTO image_tombstones (id, deleted_at) VALUES (?1, ?2)",
            [&id_str, &format_timestamp(&Utc::now())],
        )
        .map_err(Error::metadata)?;
        Removal::Removed
    } else {
        let tombstoned: bool = tx
            .query_row(
                "SELECT COUNT(*) > 0 FROM image_tombstones WHERE id = ?1",
                [&id_str],
                |row| row.get(0),
            )
            .map_err(Error::metadata)?;
        if !tombstoned {
            return Err(Error::not_found("image", id));
        }
        Removal::AlreadyRemoved
    };

    tx.commit().map_err(Error::metadata)?;
    Ok(outcome)
}

/// List image records ordered by `(created_at, id)`, one page at a time.
pub fn list_images(conn: &Connection, request: &PageRequest) -> Result<Page> {
    let limit = request.limit();
    let fetch = i64::from(limit) + 1;

    let rows = match request.cursor()? {
        Some(cursor) => {
            let q = format!(
                "SELECT {IMAGE_COLS} FROM images
                 WHERE created_at > ?1 OR (created_at = ?1 AND id > ?2)
                 ORDER BY created_at, id LIMIT ?3"
            );
            let mut stmt = conn.prepare(&q).map_err(Error::metadata)?;
            let rows = stmt
                .query_map(
                    rusqlite::params![cursor.created_at, cursor.id.to_string(), fetch],
                    image_from_row,
                )
                .map_err(Error::metadata)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::metadata)?;
            rows
        }
        None => {
            let q = format!("SELECT {IMAGE_COLS} FROM images ORDER BY created_at, id LIMIT ?1");
            let mut stmt = conn.prepare(&q).map_err(Error::metadata)?;
            let rows = stmt
                .query_map([fetch], image_from_row)
                .map_err(Error::metadata)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(Error::metadata)?;
            rows
        }
    };

    Ok(Page::from_overfetch(rows, limit))
}

/// Number of live image records.
pub fn count_images(conn: &Connection) -> Result<u64> {
    let n: i64 = conn
        .query_row("SELECT COUNT(*) FROM images", [], |row| row.get(0))
        .map_err(Error::metadata)?;
    Ok(n.max(0) as u64)
}
