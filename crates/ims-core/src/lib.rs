//! ims-core: shared types, IDs, errors, configuration, and store contracts.
//!
//! This crate is the foundational dependency for the other ims-* crates. It
//! defines the image record, the typed identifier, a unified error type, the
//! [`ContentStore`] and [`MetadataStore`] traits together with in-memory
//! implementations, and application configuration.

pub mod config;
pub mod error;
pub mod ids;
pub mod memory;
pub mod page;
pub mod record;
pub mod store;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::ImageId;
pub use page::{ImagePages, Page, PageRequest, PageToken};
pub use record::ImageRecord;
pub use store::{ContentStore, MetadataStore, Removal};
