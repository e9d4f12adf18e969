//! hifadhi: offline cache engine CLI
//!
//! Drives one worker generation from the command line: install and activate
//! it, push requests through it, inspect its stores, and manage the
//! deferred-write queue.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hifadhi::{
    CacheStorage, Config, FetchEvent, FetchOutcome, OfflineWorker, OfflineWorkerBuilder, Request,
    Store, SyncEvent,
};
use reqwest::Method;
use reqwest::header::{HeaderName, HeaderValue};

/// Hifadhi CLI
#[derive(Parser)]
#[command(name = "hifadhi")]
#[command(version = hifadhi::PKG_VERSION)]
#[command(about = "Offline-first request cache")]
struct Args {
    /// Config file (default: ~/.hifadhi/config.toml, then /etc/hifadhi/config.toml)
    #[arg(short, long, env = "HIFADHI_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch the asset manifest into the current generation's stores
    Install,

    /// Activate the installed generation and delete stale stores
    Activate,

    /// Send a GET through the active worker and print the response
    Fetch {
        /// Absolute URL, or a path resolved against the configured origin
        url: String,
        /// Treat the request as a page navigation
        #[arg(long)]
        navigate: bool,
        /// Print headers only
        #[arg(long)]
        head: bool,
    },

    /// List stores and their entry counts
    Stores,

    /// Manage the deferred-write queue
    Queue {
        #[command(subcommand)]
        command: QueueCommand,
    },

    /// Print version information
    Version,
}

#[derive(Subcommand)]
enum QueueCommand {
    /// List queued writes
    List,

    /// Queue a write for later delivery
    Add {
        /// Absolute URL, or a path resolved against the configured origin
        url: String,
        /// HTTP method
        #[arg(short = 'X', long, default_value = "POST")]
        method: String,
        /// Request body
        #[arg(short, long)]
        data: Option<String>,
        /// Header as "name: value" (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },

    /// Replay the queue now
    Replay,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config_path = args.config.as_deref();

    match args.command {
        Command::Version => {
            println!("hifadhi {}", hifadhi::version_string());
        }

        Command::Install => {
            let (config, worker) = load(config_path).await?;
            let report = worker.install(&config.install.manifest).await?;
            println!(
                "installed {}: {} assets cached, {} API endpoints warmed",
                worker.stores().static_store,
                report.cached.len(),
                report.warmed.len()
            );
            for failure in &report.failures {
                println!("  failed {}: {}", failure.path, failure.error);
            }
            for error in &report.store_errors {
                println!("  {error}");
            }
            println!("run `hifadhi activate` to make this generation current");
        }

        Command::Activate => {
            let (_, worker) = load(config_path).await?;
            worker.resume().await.map_err(|e| {
                format!("{e} (has `hifadhi install` run for this generation?)")
            })?;
            let report = worker.activate().await?;
            if report.deleted.is_empty() {
                println!("active; no stale stores");
            } else {
                println!("active; deleted {}", report.deleted.join(", "));
            }
        }

        Command::Fetch {
            url,
            navigate,
            head,
        } => {
            let (_, worker) = load(config_path).await?;
            resume(&worker).await?;
            let url = worker.origin().join(&url)?;
            let request = if navigate {
                Request::navigate(url.as_str())?
            } else {
                Request::get(url.as_str())?
            };
            let event = FetchEvent::new(request);
            match worker.handle_fetch(&event).await {
                FetchOutcome::PassThrough => println!("not intercepted (pass-through)"),
                FetchOutcome::Respond(response) => {
                    println!(
                        "{} ({})",
                        response.status(),
                        response.source().as_str()
                    );
                    for (name, value) in response.headers() {
                        println!("{name}: {}", value.to_str().unwrap_or("<binary>"));
                    }
                    if !head {
                        println!();
                        println!("{}", response.text().await?);
                    }
                }
            }
            event.settled().await;
        }

        Command::Stores => {
            let (_, worker) = load(config_path).await?;
            let storage = worker.storage();
            let mut names = storage.names().await?;
            names.sort();
            if names.is_empty() {
                println!("no stores");
            }
            for name in names {
                let Some(store) = storage.open_existing(&name).await? else {
                    continue;
                };
                let entries = store.keys().await?.len();
                let marker = if worker.stores().is_live(&name) {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {name:<32} {entries:>6} entries");
            }
        }

        Command::Queue { command } => {
            let (config, worker) = load(config_path).await?;
            run_queue(command, &config, &worker).await?;
        }
    }

    Ok(())
}

async fn run_queue(
    command: QueueCommand,
    config: &Config,
    worker: &OfflineWorker,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        QueueCommand::List => {
            let records = worker.queue().list().await;
            if records.is_empty() {
                println!("queue is empty");
            }
            for record in records {
                println!(
                    "{:>4}  {} {}  queued {}  retries {}",
                    record.id,
                    record.request.method,
                    record.request.url,
                    record.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
                    record.retry_count
                );
            }
        }
        QueueCommand::Add {
            url,
            method,
            data,
            headers,
        } => {
            let url = worker.origin().join(&url)?;
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())?;
            let mut request = Request::parse(method, url.as_str())?;
            for header in &headers {
                let (name, value) = header
                    .split_once(':')
                    .ok_or_else(|| format!("invalid header '{header}', expected 'name: value'"))?;
                request = request.header(
                    HeaderName::from_bytes(name.trim().as_bytes())?,
                    HeaderValue::from_str(value.trim())?,
                );
            }
            if let Some(data) = data {
                request = request.body(data);
            }
            let id = worker.enqueue_write(&request).await?;
            println!("queued write {id}");
        }
        QueueCommand::Replay => {
            let tag = config.worker.sync_tag.clone();
            let report = worker
                .handle_sync(&SyncEvent::new(tag))
                .await?
                .unwrap_or_default();
            println!(
                "delivered {}, discarded {}, remaining {}",
                report.delivered.len(),
                report.discarded.len(),
                report.remaining
            );
            if let Some(failure) = report.failure {
                println!("stopped at {}: {}", failure.id, failure.error);
            }
        }
    }
    Ok(())
}

/// Load configuration and build the worker it describes.
async fn load(
    config_path: Option<&std::path::Path>,
) -> Result<(Config, OfflineWorker), Box<dyn std::error::Error>> {
    let config = Config::load(config_path)?;
    let worker = OfflineWorkerBuilder::from_config(&config).await?.build()?;
    Ok((config, worker))
}

/// Resume the installed generation, with a hint when there is none.
async fn resume(worker: &OfflineWorker) -> Result<(), Box<dyn std::error::Error>> {
    worker
        .resume()
        .await
        .map_err(|e| format!("{e} (run `hifadhi install` and `hifadhi activate` first)").into())
}
