//! Network side of image loading.
//!
//! The coordinator only knows how to hand a [`FetchRequest`] to a
//! [`FetchService`] and how to cancel what it gets back. Results travel
//! back over a channel through [`Completion`], so they are always handled
//! on the coordinator's own thread no matter where the fetch ran.

use std::time::Duration;

use tokio::sync::mpsc;

use super::decode;
use crate::config::Config;
use crate::error::{LoadError, Result};
use crate::models::{CacheKey, Image, ResourceDescriptor};

/// What to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Remote resource
    pub descriptor: ResourceDescriptor,
    /// Upper bound on decoded width, 0 for none
    pub max_width: u32,
    /// Upper bound on decoded height, 0 for none
    pub max_height: u32,
}

/// Handle to an issued fetch.
///
/// `cancel` may be called any number of times, including after the fetch
/// has finished.
pub trait Cancellable {
    /// Abort the fetch if it's still running
    fn cancel(&self);
}

impl Cancellable for tokio::task::AbortHandle {
    fn cancel(&self) {
        self.abort();
    }
}

/// Something that can download and decode images.
pub trait FetchService {
    /// Start fetching. Exactly one of [`Completion::succeed`] or
    /// [`Completion::fail`] must eventually be called, unless cancelled.
    fn issue(&self, request: FetchRequest, completion: Completion) -> Box<dyn Cancellable>;
}

/// Result of a fetch, tagged with what it was for
#[derive(Debug)]
pub(crate) struct FetchOutcome {
    pub key: CacheKey,
    pub fetch_id: u64,
    pub result: Result<Image>,
}

/// One-shot reply slot for a fetch.
#[derive(Debug)]
pub struct Completion {
    key: CacheKey,
    fetch_id: u64,
    tx: mpsc::UnboundedSender<FetchOutcome>,
}

impl Completion {
    pub(crate) const fn new(
        key: CacheKey,
        fetch_id: u64,
        tx: mpsc::UnboundedSender<FetchOutcome>,
    ) -> Self {
        Self { key, fetch_id, tx }
    }

    /// Cache key the fetch was issued for
    pub const fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Report a decoded image
    pub fn succeed(self, image: Image) {
        self.finish(Ok(image));
    }

    /// Report a failure
    pub fn fail(self, error: LoadError) {
        self.finish(Err(error));
    }

    /// Report either outcome
    pub fn finish(self, result: Result<Image>) {
        let outcome = FetchOutcome {
            key: self.key,
            fetch_id: self.fetch_id,
            result,
        };
        // Loader already dropped; nobody is waiting
        let _ = self.tx.send(outcome);
    }
}

/// Fetches over HTTP with reqwest and decodes on the blocking pool.
#[derive(Clone)]
pub struct HttpFetchService {
    client: reqwest::Client,
}

impl HttpFetchService {
    /// Create a client using the configured timeout and user agent.
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl FetchService for HttpFetchService {
    fn issue(&self, request: FetchRequest, completion: Completion) -> Box<dyn Cancellable> {
        let client = self.client.clone();
        let task = tokio::spawn(async move {
            let result = download_and_decode(&client, request).await;
            if let Err(e) = &result {
                tracing::warn!("Failed to load image {}: {e}", completion.key());
            }
            completion.finish(result);
        });
        Box::new(task.abort_handle())
    }
}

/// Download an image from a URL and decode it.
async fn download_and_decode(client: &reqwest::Client, request: FetchRequest) -> Result<Image> {
    let url = request.descriptor.url();
    let kind = request.descriptor.kind();
    tracing::debug!("Downloading {kind} image: {url}");

    let response = client.get(url).send().await?.error_for_status()?;
    let bytes = response.bytes().await?;

    tokio::task::spawn_blocking(move || {
        decode::decode(&bytes, kind, request.max_width, request.max_height)
    })
    .await
    .map_err(|e| LoadError::Decode(e.to_string()))?
}
