//! gifloader - fetch remote images through the coalescing loader
#![allow(clippy::uninlined_format_args)]

use std::cell::Cell;
use std::rc::Rc;

use anyhow::Result;
use tokio::sync::Notify;
use tokio::task::LocalSet;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use gifloader::{
    CacheRegistry, Config, Image, ImageKind, ImageListener, ImageLoader, ImageResponse, LoadError,
    ResourceDescriptor,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (RUST_LOG=debug for verbose output)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Parse CLI arguments
    match parse_args()? {
        Command::Fetch {
            urls,
            kind,
            width,
            height,
        } => LocalSet::new().run_until(fetch_cli(urls, kind, width, height)).await,
        Command::Config => show_config(),
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::Version => {
            print_version();
            Ok(())
        }
    }
}

/// CLI commands
enum Command {
    Fetch {
        urls: Vec<String>,
        kind: ImageKind,
        width: u32,
        height: u32,
    },
    Config,
    Help,
    Version,
}

fn parse_args() -> Result<Command> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() == 1 {
        return Ok(Command::Help);
    }

    match args[1].as_str() {
        "-h" | "--help" | "help" => Ok(Command::Help),
        "-v" | "--version" | "version" => Ok(Command::Version),
        "config" => Ok(Command::Config),

        "fetch" => {
            let mut urls = Vec::new();
            let mut kind = ImageKind::Static;
            let (mut width, mut height) = (0, 0);
            let mut i = 2;
            while i < args.len() {
                match args[i].as_str() {
                    "--animated" | "-a" => kind = ImageKind::Animated,
                    "--kind" | "-k" => {
                        let name = args
                            .get(i + 1)
                            .ok_or_else(|| anyhow::anyhow!("Missing value for --kind"))?;
                        kind = ImageKind::from_str(name).ok_or_else(|| {
                            anyhow::anyhow!("Unknown kind: {name} (expected static or animated)")
                        })?;
                        i += 1;
                    }
                    "--size" | "-s" => {
                        let size = args
                            .get(i + 1)
                            .ok_or_else(|| anyhow::anyhow!("Missing value for --size"))?;
                        (width, height) = parse_size(size)?;
                        i += 1;
                    }
                    url => urls.push(url.to_string()),
                }
                i += 1;
            }

            if urls.is_empty() {
                return Err(anyhow::anyhow!("Missing image URL"));
            }

            Ok(Command::Fetch {
                urls,
                kind,
                width,
                height,
            })
        }

        other => Err(anyhow::anyhow!(
            "Unknown command: {other}\nRun 'gifloader --help' for usage"
        )),
    }
}

fn parse_size(size: &str) -> Result<(u32, u32)> {
    let (w, h) = size
        .split_once('x')
        .ok_or_else(|| anyhow::anyhow!("Size must look like WIDTHxHEIGHT, got {size}"))?;
    Ok((w.parse()?, h.parse()?))
}

fn print_help() {
    let config_path = Config::default_path()
        .map_or_else(|_| "Unknown".to_string(), |p| p.display().to_string());

    println!(
        r#"gifloader - request-coalescing image loader

USAGE:
    gifloader fetch <url>... [OPTIONS]    Load images (duplicate urls share one download)
      Options:
        -a, --animated                   Decode as animated GIF (same as --kind animated)
        -k, --kind <static|animated>     Decode as this kind (default: static)
        -s, --size <WxH>                 Scale still images to fit (default: 0x0, natural size)
      Examples:
        gifloader fetch https://example.com/cat.png --size 200x200
        gifloader fetch https://example.com/a.gif https://example.com/a.gif --animated

    gifloader config                     Show effective configuration

OPTIONS:
    -h, --help                           Show this help message
    -v, --version                        Show version information

CONFIG:
    {}
"#,
        config_path
    );
}

fn print_version() {
    println!("gifloader {}", gifloader::VERSION);
}

fn show_config() -> Result<()> {
    let config = Config::load()?;
    println!("path:            {}", Config::default_path()?.display());
    println!("cache capacity:  {} bytes", config.cache_capacity());
    println!("batch delay:     {} ms", config.batch_delay_ms);
    println!("request timeout: {} s", config.request_timeout_secs);
    println!("user agent:      {}", config.user_agent);
    Ok(())
}

/// Prints each response and counts asynchronous deliveries
struct PrintListener {
    url: String,
    delivered: Rc<Cell<usize>>,
    failed: Rc<Cell<usize>>,
    done: Rc<Notify>,
}

impl PrintListener {
    fn finish(&self) {
        self.delivered.set(self.delivered.get() + 1);
        self.done.notify_one();
    }
}

impl ImageListener for PrintListener {
    fn on_response(&mut self, response: &ImageResponse, is_immediate: bool) {
        match (&response.image, is_immediate) {
            (None, _) => println!("{}: loading", self.url),
            (Some(image), true) => println!("{}: cached {}", self.url, describe(image)),
            (Some(image), false) => {
                println!("{}: loaded {}", self.url, describe(image));
                self.finish();
            }
        }
    }

    fn on_error(&mut self, error: &LoadError) {
        eprintln!("{}: {error}", self.url);
        self.failed.set(self.failed.get() + 1);
        self.finish();
    }
}

fn describe(image: &Image) -> String {
    match image {
        Image::Static(bitmap) => format!("still {}x{}", bitmap.width(), bitmap.height()),
        Image::Animated(movie) => format!(
            "movie {}x{}, {} frames, {} ms",
            movie.width(),
            movie.height(),
            movie.frames().len(),
            movie.duration_ms()
        ),
    }
}

async fn fetch_cli(urls: Vec<String>, kind: ImageKind, width: u32, height: u32) -> Result<()> {
    let config = Config::load()?;
    let registry = CacheRegistry::new();
    let loader = ImageLoader::from_config(&config, &registry);
    tracing::info!(
        "Loading {} image(s), cache capacity {} bytes",
        urls.len(),
        loader.cache().capacity()
    );

    let delivered = Rc::new(Cell::new(0));
    let failed = Rc::new(Cell::new(0));
    let done = Rc::new(Notify::new());

    let handles: Vec<_> = urls
        .iter()
        .map(|url| {
            let listener = PrintListener {
                url: url.clone(),
                delivered: Rc::clone(&delivered),
                failed: Rc::clone(&failed),
                done: Rc::clone(&done),
            };
            let descriptor = ResourceDescriptor::new(url.clone(), kind);
            loader.get(descriptor, Box::new(listener), width, height)
        })
        .collect();

    let pending = handles.iter().filter(|h| h.is_pending()).count();
    tracing::info!("{} request(s) pending, {} fetch(es) issued", pending, loader.in_flight_count());

    while delivered.get() < pending {
        done.notified().await;
    }

    println!(
        "{} loaded, {} failed, {} bytes cached",
        pending - failed.get(),
        failed.get(),
        loader.cache().size()
    );

    if failed.get() > 0 {
        return Err(anyhow::anyhow!("{} image(s) failed to load", failed.get()));
    }
    Ok(())
}
