//! HTTP middleware shared by both surfaces.

pub mod request_id;
