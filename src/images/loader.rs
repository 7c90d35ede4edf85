//! Public entry point for requesting images.

use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::cache::{CacheRegistry, SizedImageCache};
use super::coordinator::{DEFAULT_BATCH_DELAY, FetchCoordinator};
use super::fetch::{FetchOutcome, FetchService, HttpFetchService};
use super::request::{ImageListener, RequestHandle};
use crate::config::Config;
use crate::models::ResourceDescriptor;

/// Loads images through a shared cache, coalescing identical requests.
///
/// The loader belongs to the thread that created it: it is `!Send`, and it
/// must be created inside a [`tokio::task::LocalSet`], where it spawns the
/// task that receives fetch results. Creating it anywhere else panics.
///
/// ```no_run
/// use gifloader::{CacheRegistry, Config, ImageLoader};
///
/// # async fn demo() {
/// let registry = CacheRegistry::new();
/// let local = tokio::task::LocalSet::new();
/// local
///     .run_until(async {
///         let loader = ImageLoader::from_config(&Config::default(), &registry);
///         // loader.get(...)
///     })
///     .await;
/// # }
/// ```
pub struct ImageLoader<S: FetchService + 'static = HttpFetchService> {
    coordinator: Rc<FetchCoordinator<S>>,
}

impl ImageLoader<HttpFetchService> {
    /// Create an HTTP-backed loader from configuration.
    ///
    /// The cache comes from `registry`, sized by `cache_size_bytes` or
    /// else by the memory available to this machine.
    pub fn from_config(config: &Config, registry: &CacheRegistry) -> Self {
        let cache = registry.cache(config.cache_capacity());
        let loader = Self::new(HttpFetchService::new(config), cache);
        loader.set_batch_delay(config.batch_delay_ms);
        loader
    }
}

impl<S: FetchService + 'static> ImageLoader<S> {
    /// Create a loader using `fetcher` for network access.
    pub fn new(fetcher: S, cache: Arc<SizedImageCache>) -> Self {
        let (coordinator, outcomes) = FetchCoordinator::new(cache, fetcher, DEFAULT_BATCH_DELAY);
        tokio::task::spawn_local(completion_task(outcomes, Rc::downgrade(&coordinator)));
        Self { coordinator }
    }

    /// Check whether the image for these bounds is already cached.
    pub fn is_cached(
        &self,
        descriptor: &ResourceDescriptor,
        max_width: u32,
        max_height: u32,
    ) -> bool {
        descriptor
            .cache_key(max_width, max_height)
            .is_some_and(|key| self.coordinator.cache().contains(&key))
    }

    /// Request an image scaled to fit `max_width` x `max_height` (0 = no bound).
    ///
    /// `listener` is called before this returns with the cached image, or
    /// with no image if it has to be fetched. See [`ImageListener`].
    pub fn get(
        &self,
        descriptor: ResourceDescriptor,
        listener: Box<dyn ImageListener>,
        max_width: u32,
        max_height: u32,
    ) -> RequestHandle {
        self.coordinator.request(descriptor, max_width, max_height, listener)
    }

    /// Request an image at its natural size.
    pub fn get_unbounded(
        &self,
        descriptor: ResourceDescriptor,
        listener: Box<dyn ImageListener>,
    ) -> RequestHandle {
        self.get(descriptor, listener, 0, 0)
    }

    /// Release interest in a request, cancelling its fetch if nobody else wants it.
    pub fn cancel(&self, handle: &RequestHandle) {
        self.coordinator.cancel(handle);
    }

    /// Set how long to wait after the first result arrives before delivering
    /// all results. 0 disables batching.
    pub fn set_batch_delay(&self, delay_ms: u64) {
        self.coordinator.set_batch_delay(Duration::from_millis(delay_ms));
    }

    /// The cache backing this loader
    pub fn cache(&self) -> &Arc<SizedImageCache> {
        self.coordinator.cache()
    }

    /// Number of fetches currently running
    pub fn in_flight_count(&self) -> usize {
        self.coordinator.in_flight_count()
    }
}

/// Receives fetch results and hands them to the coordinator on its own thread.
async fn completion_task<S: FetchService + 'static>(
    mut rx: mpsc::UnboundedReceiver<FetchOutcome>,
    coordinator: Weak<FetchCoordinator<S>>,
) {
    while let Some(outcome) = rx.recv().await {
        let Some(coordinator) = coordinator.upgrade() else {
            break;
        };
        coordinator.on_fetch_completed(outcome);
    }
    tracing::debug!("Image loader shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use image::{DynamicImage, ImageFormat};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::LocalSet;

    use crate::error::LoadError;
    use crate::images::coordinator::tests::{Event, Recorder, ScriptedFetcher, bitmap};
    use crate::images::request::ImageResponse;

    fn scripted() -> (ImageLoader<ScriptedFetcher>, ScriptedFetcher) {
        let fetcher = ScriptedFetcher::default();
        let loader = ImageLoader::new(fetcher.clone(), Arc::new(SizedImageCache::new(1 << 20)));
        (loader, fetcher)
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_requests_then_cache_hit() {
        LocalSet::new()
            .run_until(async {
                let (loader, fetcher) = scripted();
                let gif = ResourceDescriptor::animated("http://x/img.gif");
                let (a, b, c) = (Recorder::default(), Recorder::default(), Recorder::default());

                assert!(!loader.is_cached(&gif, 100, 100));
                let ha = loader.get(gif.clone(), a.listener(), 100, 100);
                let hb = loader.get(gif.clone(), b.listener(), 100, 100);
                assert_eq!(fetcher.issued(), 1);

                fetcher.succeed(0, bitmap());
                tokio::time::sleep(Duration::from_millis(150)).await;

                let expected = vec![Event::Immediate { loaded: false }, Event::Delivered];
                assert_eq!(a.events(), expected);
                assert_eq!(b.events(), expected);
                assert!(Arc::ptr_eq(&ha.image().unwrap(), &hb.image().unwrap()));

                assert!(loader.is_cached(&gif, 100, 100));
                assert!(!loader.is_cached(&gif, 50, 50));
                loader.get(gif, c.listener(), 100, 100);
                assert_eq!(c.events(), vec![Event::Immediate { loaded: true }]);
                assert_eq!(fetcher.issued(), 1);
                assert_eq!(loader.in_flight_count(), 0);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_through_loader() {
        LocalSet::new()
            .run_until(async {
                let (loader, fetcher) = scripted();
                let a = Recorder::default();
                let png = ResourceDescriptor::still("http://x/a.png");
                let handle = loader.get_unbounded(png, a.listener());
                assert!(handle.is_pending());

                loader.cancel(&handle);
                loader.cancel(&handle);
                assert!(fetcher.cancelled(0));
                assert_eq!(loader.in_flight_count(), 0);

                fetcher.fail(0, LoadError::Network("aborted".into()));
                tokio::time::sleep(Duration::from_millis(150)).await;
                assert_eq!(a.events().len(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_delay_setting() {
        LocalSet::new()
            .run_until(async {
                let (loader, fetcher) = scripted();
                loader.set_batch_delay(500);
                let a = Recorder::default();
                loader.get_unbounded(ResourceDescriptor::still("http://x/a.png"), a.listener());
                fetcher.succeed(0, bitmap());

                tokio::time::sleep(Duration::from_millis(300)).await;
                assert_eq!(a.events().len(), 1);
                tokio::time::sleep(Duration::from_millis(300)).await;
                assert_eq!(a.events().len(), 2);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_loader_shares_registry_cache() {
        LocalSet::new()
            .run_until(async {
                let registry = CacheRegistry::new();
                let config = Config {
                    cache_size_bytes: Some(4096),
                    ..Config::default()
                };
                let loader = ImageLoader::from_config(&config, &registry);
                assert_eq!(loader.cache().capacity(), 4096);
                assert!(Arc::ptr_eq(loader.cache(), &registry.cache(4096)));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_sized_loaders_share_cache() {
        LocalSet::new()
            .run_until(async {
                let registry = CacheRegistry::new();
                let first = ImageLoader::from_config(&Config::default(), &registry);
                let second = ImageLoader::from_config(&Config::default(), &registry);
                assert!(Arc::ptr_eq(first.cache(), second.cache()));
            })
            .await;
    }

    /// Serve `body` to every connection, counting them.
    async fn serve(body: Vec<u8>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let body = body.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = socket.read(&mut buf).await;
                    let head = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = socket.write_all(head.as_bytes()).await;
                    let _ = socket.write_all(&body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        (format!("http://{addr}/pic.png"), hits)
    }

    struct Collect(Rc<RefCell<Vec<Option<(u32, u32)>>>>);

    impl ImageListener for Collect {
        fn on_response(&mut self, response: &ImageResponse, is_immediate: bool) {
            if !is_immediate {
                let size = response.image.as_ref().map(|i| (i.width(), i.height()));
                self.0.borrow_mut().push(size);
            }
        }

        fn on_error(&mut self, _: &LoadError) {
            self.0.borrow_mut().push(None);
        }
    }

    #[tokio::test]
    async fn test_http_fetch_is_coalesced_and_scaled() {
        let mut png = Vec::new();
        DynamicImage::new_rgba8(64, 32)
            .write_to(&mut std::io::Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        let (url, hits) = serve(png).await;

        LocalSet::new()
            .run_until(async move {
                let config = Config {
                    batch_delay_ms: 0,
                    cache_size_bytes: Some(1 << 20),
                    ..Config::default()
                };
                let loader = ImageLoader::from_config(&config, &CacheRegistry::new());
                let seen = Rc::new(RefCell::new(Vec::new()));
                for _ in 0..3 {
                    loader.get(
                        ResourceDescriptor::still(url.clone()),
                        Box::new(Collect(Rc::clone(&seen))),
                        32,
                        32,
                    );
                }

                for _ in 0..500 {
                    if seen.borrow().len() == 3 {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
                assert_eq!(*seen.borrow(), vec![Some((32, 16)); 3]);
                assert_eq!(hits.load(Ordering::SeqCst), 1);
            })
            .await;
    }
}
