//! Image loading and caching.
//!
//! Requests go through [`ImageLoader`]. Identical requests that overlap in
//! time share one network fetch, finished fetches are delivered to their
//! listeners in batches, and decoded images are kept in a
//! [`SizedImageCache`] bounded by an approximate byte cost.

mod cache;
mod coordinator;
pub mod decode;
mod fetch;
mod loader;
mod request;

pub use cache::{CacheRegistry, CostFn, SizedImageCache};
pub use coordinator::{DEFAULT_BATCH_DELAY, FetchCoordinator};
pub use fetch::{Cancellable, Completion, FetchRequest, FetchService, HttpFetchService};
pub use loader::ImageLoader;
pub use request::{ImageListener, ImageResponse, RequestHandle};
