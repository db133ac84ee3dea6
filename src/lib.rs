//! Product-image resolution for ASIN catalogs.
//!
//! Images are served from a persistent local cache while fresh, resolved in
//! rate-limited batches when they are not, and polled for when the backend
//! is still producing them. See [`images::ImageResolver`] for the entry points.

pub mod app;
pub mod cache;
pub mod config;
pub mod images;
pub mod logging;
pub mod query;
