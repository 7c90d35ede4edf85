//! # gifloader
//!
//! Loads remote still and animated images, sharing one download between
//! identical requests and keeping decoded results in a byte-budgeted cache.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        ImageLoader                          │
//! │     is_cached / get / cancel, owned by one LocalSet         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │ SizedImageCache │ │ FetchCoordinator│ │  FetchService   │
//! │                 │ │                 │ │                 │
//! │ • LRU by bytes  │ │ • Coalescing    │ │ • HTTP (reqwest)│
//! │ • Thread safe   │ │ • Cancellation  │ │ • Decode (image)│
//! │ • Per capacity  │ │ • Batching      │ │ • Abortable     │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`images`] — Loader, coordinator, cache, fetching and decoding
//! - [`models`] — Resource descriptors, cache keys, decoded images
//! - [`config`] — Configuration management
//! - [`sizer`] — Cache budget from available memory
//! - [`error`] — Load errors delivered to listeners
//!
//! ## Example
//!
//! ```no_run
//! use gifloader::{
//!     CacheRegistry, Config, ImageListener, ImageLoader, ImageResponse, LoadError,
//!     ResourceDescriptor,
//! };
//!
//! struct Show;
//!
//! impl ImageListener for Show {
//!     fn on_response(&mut self, response: &ImageResponse, is_immediate: bool) {
//!         println!("loaded={} immediate={is_immediate}", response.is_loaded());
//!     }
//!
//!     fn on_error(&mut self, error: &LoadError) {
//!         eprintln!("{error}");
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = CacheRegistry::new();
//!     tokio::task::LocalSet::new()
//!         .run_until(async {
//!             let loader = ImageLoader::from_config(&Config::default(), &registry);
//!             let gif = ResourceDescriptor::animated("https://example.com/cat.gif");
//!             let _handle = loader.get(gif, Box::new(Show), 100, 100);
//!             tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!         })
//!         .await;
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::should_implement_trait)]
#![allow(clippy::return_self_not_must_use)]

pub mod config;
pub mod error;
pub mod images;
pub mod models;
pub mod sizer;

// Re-export main types for convenience
pub use config::Config;
pub use error::LoadError;
pub use images::{
    CacheRegistry, Cancellable, Completion, FetchRequest, FetchService, HttpFetchService,
    ImageListener, ImageLoader, ImageResponse, RequestHandle, SizedImageCache,
};
pub use models::{CacheKey, Image, ImageKind, Movie, MovieFrame, ResourceDescriptor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
