//! ims-db: SQLite metadata store.
//!
//! This crate provides connection pooling, embedded migrations, row mapping,
//! image queries, and [`SqliteMetadataStore`], the durable implementation of
//! [`ims_core::MetadataStore`].

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
pub mod store;

pub use store::SqliteMetadataStore;
