pub mod api_types;
pub mod backend;
pub mod batch;
pub mod client;
pub mod poller;
pub mod resolver;
#[cfg(test)]
pub mod testing;
pub mod types;

pub use backend::ImageBackend;
pub use client::ImageClient;
pub use resolver::{ImageResolver, ImageSlot};
pub use types::{ImageMap, ImageState, ResolverSettings};
