//! Listeners and the handles returned for each image request.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::LoadError;
use crate::models::{CacheKey, Image, ResourceDescriptor};

/// What a listener is told about a request
#[derive(Debug, Clone)]
pub struct ImageResponse {
    /// The resource that was requested
    pub descriptor: ResourceDescriptor,
    /// The loaded image, `None` while it's still being fetched
    pub image: Option<Arc<Image>>,
}

impl ImageResponse {
    /// Whether this response carries an image or is a placeholder
    pub const fn is_loaded(&self) -> bool {
        self.image.is_some()
    }
}

/// Receives the results of one image request.
///
/// The call flow is:
/// 1. While the request is being made, `on_response(_, true)` is called
///    once, with the cached image or with no image when a fetch is needed.
/// 2. If a fetch was needed, exactly one of `on_response(_, false)` or
///    `on_error` follows, unless the request is cancelled first.
pub trait ImageListener {
    /// The image (or the placeholder) for this request is available.
    fn on_response(&mut self, response: &ImageResponse, is_immediate: bool);

    /// The fetch this request was waiting on failed.
    fn on_error(&mut self, error: &LoadError);
}

pub(crate) struct RequestState {
    pub descriptor: ResourceDescriptor,
    pub cache_key: Option<CacheKey>,
    /// `Some` while the request still expects a delivery
    pub listener: RefCell<Option<Box<dyn ImageListener>>>,
    pub image: RefCell<Option<Arc<Image>>>,
}

/// Handle for a single image request.
///
/// Cancel it through the loader once the result is no longer wanted.
#[derive(Clone)]
pub struct RequestHandle(pub(crate) Rc<RequestState>);

impl RequestHandle {
    /// Handle for a request that was answered on the spot and has nothing pending.
    pub(crate) fn settled(descriptor: ResourceDescriptor, image: Option<Arc<Image>>) -> Self {
        Self(Rc::new(RequestState {
            descriptor,
            cache_key: None,
            listener: RefCell::new(None),
            image: RefCell::new(image),
        }))
    }

    /// Handle for a request waiting on a fetch.
    pub(crate) fn pending(
        descriptor: ResourceDescriptor,
        cache_key: CacheKey,
        listener: Box<dyn ImageListener>,
    ) -> Self {
        Self(Rc::new(RequestState {
            descriptor,
            cache_key: Some(cache_key),
            listener: RefCell::new(Some(listener)),
            image: RefCell::new(None),
        }))
    }

    /// The requested resource
    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.0.descriptor
    }

    /// Key of the fetch this request waits on, `None` if it was answered from cache
    pub fn cache_key(&self) -> Option<&CacheKey> {
        self.0.cache_key.as_ref()
    }

    /// The image delivered so far, if any
    pub fn image(&self) -> Option<Arc<Image>> {
        self.0.image.borrow().clone()
    }

    /// Whether a delivery is still expected
    pub fn is_pending(&self) -> bool {
        self.0.listener.borrow().is_some()
    }

    pub(crate) fn response(&self) -> ImageResponse {
        ImageResponse {
            descriptor: self.0.descriptor.clone(),
            image: self.image(),
        }
    }

    pub(crate) fn same_request(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandle")
            .field("descriptor", &self.0.descriptor)
            .field("cache_key", &self.0.cache_key)
            .field("pending", &self.is_pending())
            .finish_non_exhaustive()
    }
}
