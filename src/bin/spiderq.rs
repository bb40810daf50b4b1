//! spiderq CLI: operator interface to a spider's request queue.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use opentelemetry::KeyValue;
use secrecy::ExposeSecret;
use spiderq::config::Config;
use spiderq::store::{RedisStore, RedisStoreConfig};
use spiderq::telemetry::{TelemetryConfig, init_telemetry, metrics, queue as queue_span};
use spiderq::{QueueKind, Request, RequestQueue, SpiderRef, open_queue};
use tracing::Instrument as _;

#[derive(Parser)]
#[command(name = "spiderq", about = "Inspect and feed per-spider request queues")]
struct Cli {
    /// Spider whose queue to operate on
    #[arg(long)]
    spider: String,
    /// Queue kind: fifo, lifo or priority (overrides configuration)
    #[arg(long)]
    kind: Option<String>,
    /// Read configuration from this TOML file instead of the environment
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the number of queued requests
    Len,
    /// Enqueue one request
    Push {
        /// Absolute request URL
        url: String,
        /// HTTP method
        #[arg(long, default_value = "GET")]
        method: String,
        /// Priority (higher = more urgent)
        #[arg(long, default_value_t = 0)]
        priority: i32,
        /// Header as `name:value`; repeatable
        #[arg(long = "header")]
        headers: Vec<String>,
        /// Request body
        #[arg(long)]
        body: Option<String>,
        /// Spider callback name
        #[arg(long)]
        callback: Option<String>,
    },
    /// Dequeue requests and print them as JSON records
    Pop {
        /// Maximum requests to take
        #[arg(long, default_value_t = 1)]
        count: u64,
    },
    /// Delete the queue
    Clear,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Len => "len",
            Command::Push { .. } => "push",
            Command::Pop { .. } => "pop",
            Command::Clear => "clear",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "spiderq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let kind: QueueKind = match cli.kind {
        Some(ref kind) => kind.parse()?,
        None => config.queue_kind,
    };

    let store =
        RedisStore::connect(RedisStoreConfig::with_url(config.store_url.expose_secret())).await?;
    let spider = Arc::new(SpiderRef::new(&cli.spider));
    let queue = open_queue(kind, Arc::new(store), spider.clone(), &config.queue_options());

    let operation = cli.command.name();
    let span = queue_span::start_queue_span(kind.as_str(), &cli.spider, operation);
    let started = Instant::now();

    let items = run_command(cli.command, queue.as_ref(), &spider)
        .instrument(span.clone())
        .await?;

    queue_span::record_items(&span, items);
    metrics::operation_duration_ms().record(
        started.elapsed().as_secs_f64() * 1000.0,
        &[KeyValue::new("operation", operation)],
    );
    Ok(())
}

async fn run_command(
    command: Command,
    queue: &dyn RequestQueue,
    spider: &SpiderRef,
) -> anyhow::Result<u64> {
    match command {
        Command::Len => cmd_len(queue).await,
        Command::Push {
            url,
            method,
            priority,
            headers,
            body,
            callback,
        } => cmd_push(queue, url, method, priority, headers, body, callback).await,
        Command::Pop { count } => cmd_pop(queue, spider, count).await,
        Command::Clear => cmd_clear(queue).await,
    }
}

async fn cmd_len(queue: &dyn RequestQueue) -> anyhow::Result<u64> {
    let len = queue.len().await?;
    println!("{len}");
    Ok(len)
}

async fn cmd_push(
    queue: &dyn RequestQueue,
    url: String,
    method: String,
    priority: i32,
    headers: Vec<String>,
    body: Option<String>,
    callback: Option<String>,
) -> anyhow::Result<u64> {
    let mut request = Request::new(url).method(method).priority(priority);

    for header in &headers {
        let Some((name, value)) = header.split_once(':') else {
            anyhow::bail!("header must look like name:value, got '{header}'");
        };
        request = request.header(name.trim(), value.trim());
    }
    if let Some(body) = body {
        request = request.body(body);
    }
    if let Some(callback) = callback {
        request = request.callback(callback);
    }

    queue.push(&request).await?;
    println!("Pushed to {} ({} queued)", queue.key(), queue.len().await?);
    Ok(1)
}

async fn cmd_pop(queue: &dyn RequestQueue, spider: &SpiderRef, count: u64) -> anyhow::Result<u64> {
    let mut taken = 0;
    while taken < count {
        let Some(request) = queue.pop(Duration::ZERO).await? else {
            break;
        };
        println!("{}", serde_json::to_string(&request.to_record(spider)?)?);
        taken += 1;
    }

    if taken == 0 {
        eprintln!("Queue {} is empty.", queue.key());
    }
    Ok(taken)
}

async fn cmd_clear(queue: &dyn RequestQueue) -> anyhow::Result<u64> {
    let len = queue.len().await?;
    queue.clear().await?;
    println!("Cleared {} ({len} removed)", queue.key());
    Ok(len)
}
