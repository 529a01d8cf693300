//! Unified error type for imagestore.
//!
//! All crates funnel their failures into [`Error`], which carries enough context
//! for the network surfaces to derive a status via [`Error::http_status`] and a
//! stable machine-readable code via [`Error::code`].

use std::fmt;

/// Which durable store a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Blob bytes on the filesystem.
    Content,
    /// Record rows in the database.
    Metadata,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Content => f.write_str("content"),
            StoreKind::Metadata => f.write_str("metadata"),
        }
    }
}

/// Unified error type covering all failure modes in imagestore.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "image", "blob").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// The identifier already exists (or existed once and was deleted).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The durable medium behind a store failed to read or write.
    #[error("{store} store unavailable: {source}")]
    StoreUnavailable {
        /// Which store failed.
        store: StoreKind,
        /// The underlying failure.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Bytes were stored but the metadata insert failed.
    ///
    /// `compensated` records whether the orphaned blob was removed again.
    #[error("Partial write for image {id}: {cause}")]
    PartialWrite {
        /// The identifier that was being created.
        id: String,
        /// The metadata failure reported to the caller.
        #[source]
        cause: Box<Error>,
        /// Whether the compensating blob delete succeeded.
        compensated: bool,
    },

    /// Metadata was removed but the blob delete failed. Retrying the delete
    /// finishes the job.
    #[error("Partial delete for image {id}: {cause}")]
    PartialDelete {
        /// The identifier being deleted.
        id: String,
        /// The content store failure.
        #[source]
        cause: Box<Error>,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Conflict(_) => 409,
            Error::Validation(_) => 400,
            Error::StoreUnavailable { .. } => 503,
            Error::PartialWrite { cause, .. } => cause.http_status(),
            Error::PartialDelete { cause, .. } => cause.http_status(),
            Error::Internal(_) => 500,
        }
    }

    /// Stable status code string used on the RPC surface.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::Conflict(_) => "already_exists",
            Error::Validation(_) => "invalid_argument",
            Error::StoreUnavailable { .. } => "unavailable",
            Error::PartialWrite { cause, .. } => cause.code(),
            Error::PartialDelete { cause, .. } => cause.code(),
            Error::Internal(_) => "internal",
        }
    }

    /// Message that is safe to send across a network boundary.
    ///
    /// Client errors describe what was wrong with the request. Server errors
    /// collapse to a fixed phrase so storage paths and driver messages stay in
    /// the logs.
    pub fn public_message(&self) -> String {
        match self {
            Error::NotFound { .. } | Error::Conflict(_) | Error::Validation(_) => self.to_string(),
            Error::StoreUnavailable { .. } => "storage temporarily unavailable".to_string(),
            Error::PartialWrite { cause, .. } | Error::PartialDelete { cause, .. } => {
                cause.public_message()
            }
            Error::Internal(_) => "internal error".to_string(),
        }
    }

    /// Whether this is a [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for a metadata [`Error::StoreUnavailable`].
    pub fn metadata(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::StoreUnavailable {
            store: StoreKind::Metadata,
            source: source.into(),
        }
    }

    /// Convenience constructor for a content [`Error::StoreUnavailable`].
    pub fn content(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::StoreUnavailable {
            store: StoreKind::Content,
            source: source.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
