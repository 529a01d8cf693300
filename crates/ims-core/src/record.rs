//! The image record persisted by the metadata store.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ImageId;

/// Durable metadata for one stored image.
///
/// The externally-resolvable URL is derived at read time and deliberately not
/// part of this struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: ImageId,
    pub content_type: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

impl ImageRecord {
    /// Build a record for freshly stored content, stamped with the current time.
    pub fn new(id: ImageId, content_type: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            id,
            content_type: content_type.into(),
            size_bytes,
            // Truncate to the persisted precision so a round trip through the
            // store compares equal.
            created_at: truncate_micros(Utc::now()),
        }
    }

    /// `created_at` in the sortable text form used for persistence and page
    /// tokens.
    pub fn created_at_text(&self) -> String {
        format_timestamp(&self.created_at)
    }
}

/// Render a timestamp as RFC 3339 with fixed microsecond precision and a `Z`
/// suffix, so lexical order equals chronological order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp produced by [`format_timestamp`].
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn truncate_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
}
