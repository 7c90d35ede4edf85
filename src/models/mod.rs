//! Data models for gifloader

mod decoded;
mod resource;

pub use decoded::{Image, Movie, MovieFrame};
pub use resource::{CacheKey, ImageKind, ResourceDescriptor};
