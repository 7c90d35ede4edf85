//! Coalescing and batched delivery of image fetches.
//!
//! Every cache key moves through `in_flight` → `batched` → gone. Requests
//! for a key that is already in flight join its interest list instead of
//! issuing another fetch. Completed fetches wait in `batched` until a
//! single deferred pass hands all of them to their listeners. Each fetch
//! keeps its own result there, so a request only ever hears the outcome
//! of the fetch it joined.
//!
//! All of this state lives on one thread. The coordinator is `!Send` and
//! schedules its delivery pass with `spawn_local`, so it must be created
//! and used inside a [`tokio::task::LocalSet`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::cache::SizedImageCache;
use super::fetch::{Cancellable, Completion, FetchOutcome, FetchRequest, FetchService};
use super::request::{ImageListener, ImageResponse, RequestHandle};
use crate::error::LoadError;
use crate::models::{CacheKey, Image, ResourceDescriptor};

/// Delay between the first completion and delivery of the whole batch
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(100);

type FetchResult = Result<Arc<Image>, LoadError>;

/// One outstanding (or completed but undelivered) fetch
struct InFlightFetch {
    fetch_id: u64,
    handle: Box<dyn Cancellable>,
    /// Interested requests in arrival order
    requests: Vec<RequestHandle>,
    /// Set once the fetch has completed
    result: Option<FetchResult>,
}

impl InFlightFetch {
    /// Drop `request` from the interest list, returning whether it was there.
    fn remove(&mut self, request: &RequestHandle) -> bool {
        let before = self.requests.len();
        self.requests.retain(|r| !r.same_request(request));
        self.requests.len() != before
    }
}

struct State {
    in_flight: HashMap<CacheKey, InFlightFetch>,
    /// Completed fetches per key, in completion order
    batched: HashMap<CacheKey, Vec<InFlightFetch>>,
    delivery_scheduled: bool,
    batch_delay: Duration,
    next_fetch_id: u64,
}

/// Tracks in-flight fetches and delivers their results in batches.
pub struct FetchCoordinator<S> {
    this: Weak<Self>,
    cache: Arc<SizedImageCache>,
    fetcher: S,
    outcomes: mpsc::UnboundedSender<FetchOutcome>,
    state: RefCell<State>,
}

impl<S: FetchService + 'static> FetchCoordinator<S> {
    /// Create a coordinator.
    ///
    /// Fetch results arrive on the returned receiver; each must be passed
    /// to [`FetchCoordinator::on_fetch_completed`] on this same thread.
    pub(crate) fn new(
        cache: Arc<SizedImageCache>,
        fetcher: S,
        batch_delay: Duration,
    ) -> (Rc<Self>, mpsc::UnboundedReceiver<FetchOutcome>) {
        let (outcomes, rx) = mpsc::unbounded_channel();
        let coordinator = Rc::new_cyclic(|this| Self {
            this: this.clone(),
            cache,
            fetcher,
            outcomes,
            state: RefCell::new(State {
                in_flight: HashMap::new(),
                batched: HashMap::new(),
                delivery_scheduled: false,
                batch_delay,
                next_fetch_id: 0,
            }),
        });
        (coordinator, rx)
    }

    /// The cache this coordinator reads from and fills
    pub fn cache(&self) -> &Arc<SizedImageCache> {
        &self.cache
    }

    /// Change how long completed fetches wait before delivery. Zero delivers
    /// at the next opportunity.
    pub fn set_batch_delay(&self, delay: Duration) {
        self.state.borrow_mut().batch_delay = delay;
    }

    /// Request an image.
    ///
    /// `listener` is told synchronously about the cached image, or that
    /// there is none yet. In the latter case the request joins the fetch
    /// already running for the same key, or starts one.
    pub fn request(
        &self,
        descriptor: ResourceDescriptor,
        max_width: u32,
        max_height: u32,
        mut listener: Box<dyn ImageListener>,
    ) -> RequestHandle {
        let Some(key) = descriptor.cache_key(max_width, max_height) else {
            // Nothing to display
            let handle = RequestHandle::settled(descriptor, None);
            listener.on_response(&handle.response(), true);
            return handle;
        };

        if let Some(image) = self.cache.get(&key) {
            let handle = RequestHandle::settled(descriptor, Some(image));
            listener.on_response(&handle.response(), true);
            return handle;
        }

        listener.on_response(
            &ImageResponse {
                descriptor: descriptor.clone(),
                image: None,
            },
            true,
        );

        let handle = RequestHandle::pending(descriptor.clone(), key.clone(), listener);
        let mut state = self.state.borrow_mut();

        if let Some(fetch) = state.in_flight.get_mut(&key) {
            fetch.requests.push(handle.clone());
            tracing::debug!(
                "Coalesced request for {key} ({} waiting)",
                fetch.requests.len()
            );
            return handle;
        }

        state.next_fetch_id += 1;
        let fetch_id = state.next_fetch_id;
        let completion = Completion::new(key.clone(), fetch_id, self.outcomes.clone());
        let request = FetchRequest {
            descriptor,
            max_width,
            max_height,
        };
        tracing::debug!("Issuing fetch #{fetch_id} for {key}");
        let fetch_handle = self.fetcher.issue(request, completion);

        state.in_flight.insert(
            key,
            InFlightFetch {
                fetch_id,
                handle: fetch_handle,
                requests: vec![handle.clone()],
                result: None,
            },
        );
        handle
    }

    /// Withdraw interest in a request. Safe to call more than once.
    ///
    /// The listener is never called after this returns. When the last
    /// request waiting on a fetch is cancelled, the fetch is cancelled too.
    pub fn cancel(&self, handle: &RequestHandle) {
        // Already delivered, already cancelled, or never pending
        let Some(listener) = handle.0.listener.borrow_mut().take() else {
            return;
        };
        drop(listener);

        let Some(key) = handle.cache_key() else {
            return;
        };
        let mut state = self.state.borrow_mut();

        if let Some(fetch) = state.in_flight.get_mut(key)
            && fetch.remove(handle)
        {
            if fetch.requests.is_empty() {
                fetch.handle.cancel();
                state.in_flight.remove(key);
                tracing::debug!("Cancelled fetch for {key}, nobody is waiting");
            }
            return;
        }

        // Completed, waiting for the delivery pass
        if let Some(fetches) = state.batched.get_mut(key)
            && fetches.iter_mut().any(|f| f.remove(handle))
        {
            fetches.retain(|f| !f.requests.is_empty());
            if fetches.is_empty() {
                state.batched.remove(key);
            }
        }
    }

    /// Route a result received from the fetch service.
    pub(crate) fn on_fetch_completed(&self, outcome: FetchOutcome) {
        match outcome.result {
            Ok(image) => self.on_fetch_succeeded(&outcome.key, outcome.fetch_id, image),
            Err(error) => self.on_fetch_failed(&outcome.key, outcome.fetch_id, error),
        }
    }

    /// Cache the image and queue it for delivery.
    ///
    /// The image is cached even when nobody is waiting for it anymore.
    pub fn on_fetch_succeeded(&self, key: &CacheKey, fetch_id: u64, image: Image) {
        let image = Arc::new(image);
        self.cache.put(key.clone(), Arc::clone(&image));
        self.batch_result(key, fetch_id, Ok(image));
    }

    /// Queue a failure for delivery.
    pub fn on_fetch_failed(&self, key: &CacheKey, fetch_id: u64, error: LoadError) {
        self.batch_result(key, fetch_id, Err(error));
    }

    /// Move a tracked fetch to the batch with its result.
    ///
    /// An earlier fetch for the same key may still be waiting there (it
    /// failed, and a later request started a new fetch). Both stay queued,
    /// and each delivers its own result to its own requests.
    fn batch_result(&self, key: &CacheKey, fetch_id: u64, result: FetchResult) {
        let mut state = self.state.borrow_mut();

        // Cancelled, or replaced by a newer fetch for the same key
        if state.in_flight.get(key).is_none_or(|f| f.fetch_id != fetch_id) {
            tracing::debug!("Discarding result of untracked fetch #{fetch_id} for {key}");
            return;
        }
        let Some(mut fetch) = state.in_flight.remove(key) else {
            return;
        };
        fetch.result = Some(result);

        state.batched.entry(key.clone()).or_default().push(fetch);

        if !state.delivery_scheduled {
            state.delivery_scheduled = true;
            let delay = state.batch_delay;
            drop(state);
            self.schedule_delivery(delay);
        }
    }

    fn schedule_delivery(&self, delay: Duration) {
        let this = self.this.clone();
        tokio::task::spawn_local(async move {
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
            if let Some(coordinator) = this.upgrade() {
                coordinator.deliver_batched();
            }
        });
    }

    /// Hand every batched result to the requests still waiting on it.
    pub fn deliver_batched(&self) {
        // Taken up front so listeners may call back into the coordinator
        let batch = {
            let mut state = self.state.borrow_mut();
            state.delivery_scheduled = false;
            std::mem::take(&mut state.batched)
        };
        if batch.is_empty() {
            return;
        }
        tracing::debug!("Delivering batched fetches for {} keys", batch.len());

        for fetch in batch.into_values().flatten() {
            let Some(result) = fetch.result else {
                continue;
            };
            for request in fetch.requests {
                // Cancelled after the fetch completed
                let Some(mut listener) = request.0.listener.borrow_mut().take() else {
                    continue;
                };
                match &result {
                    Ok(image) => {
                        *request.0.image.borrow_mut() = Some(Arc::clone(image));
                        listener.on_response(&request.response(), false);
                    }
                    Err(error) => listener.on_error(error),
                }
            }
        }
    }

    /// Whether a fetch for `key` is currently outstanding
    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.state.borrow().in_flight.contains_key(key)
    }

    /// Number of outstanding fetches
    pub fn in_flight_count(&self) -> usize {
        self.state.borrow().in_flight.len()
    }

    /// Number of completed fetches waiting for delivery
    pub fn batched_count(&self) -> usize {
        self.state.borrow().batched.values().map(Vec::len).sum()
    }
}
