//! Route handlers for the plain HTTP surface.

pub mod health;
pub mod images;
