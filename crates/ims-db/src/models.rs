//! Row mapping between the `images` table and [`ImageRecord`].

use ims_core::record::parse_timestamp;
use ims_core::{ImageId, ImageRecord};
use rusqlite::types::Type;
use uuid::Uuid;

/// Columns selected by every image query, in `image_from_row` order.
pub const IMAGE_COLS: &str = "id, content_type, size_bytes, created_at";

/// Parse a UUID-based ID from a text column.
fn parse_id(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<ImageId> {
    let s: String = row.get(idx)?;
    let uuid = Uuid::parse_str(&s)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))?;
    Ok(ImageId::from(uuid))
}

/// Build an [`ImageRecord`] from a row selected with [`IMAGE_COLS`].
pub fn image_from_row(row: &rusqlite::Row) -> rusqlite::Result<ImageRecord> {
    let size: i64 = row.get(2)?;
    let size_bytes = u64::try_from(size)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Integer, Box::new(e)))?;

    let created: String = row.get(3)?;
    let created_at = parse_timestamp(&created).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("invalid timestamp '{created}'").into(),
        )
    })?;

    Ok(ImageRecord {
        id: parse_id(row, 0)?,
        content_type: row.get(1)?,
        size_bytes,
        created_at,
    })
}
