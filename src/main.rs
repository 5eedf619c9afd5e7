//! CLI entry point for the GTFS feed archive.
//!
//! Lists archived feed versions from the manifest, builds their SQLite stores
//! locally, and mirrors built stores to and from S3.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use gtfs_feed_archive::{
    archive::{ArchiveIndex, FeedDescriptor},
    codec::parse_date,
    config::ArchiveConfig,
    fetch::{BasicClient, HttpClient},
    infra::{manifest::ManifestClient, s3::S3BlobStore},
    lifecycle::{FeedController, Rebuild, batch::download_or_build_all, state::FeedState},
    services::blob_store::BlobStore,
};
use serde::Serialize;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "gtfs_feed_archive")]
#[command(about = "Build and mirror SQLite stores of archived GTFS feeds", long_about = None)]
struct Cli {
    /// Directory holding one subdirectory per feed (overrides GTFS_FEEDS_ROOT)
    #[arg(long, global = true)]
    feeds_root: Option<PathBuf>,

    /// Manifest URL or local path (overrides GTFS_MANIFEST_URL)
    #[arg(long, global = true)]
    manifest: Option<String>,

    /// S3 bucket mirroring built feeds (overrides GTFS_S3_BUCKET)
    #[arg(long, global = true)]
    s3_bucket: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Which feed a command acts on.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct Selector {
    /// Feed key (its start date, YYYYMMDD)
    #[arg(long)]
    key: Option<String>,

    /// The feed in effect on this date (YYYYMMDD)
    #[arg(long, value_parser = date_arg)]
    date: Option<NaiveDate>,

    /// The most recent feed
    #[arg(long)]
    latest: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List feeds from the manifest that overlap a date range
    ListFeeds {
        #[arg(long, value_parser = date_arg)]
        start: Option<NaiveDate>,

        #[arg(long, value_parser = date_arg)]
        end: Option<NaiveDate>,

        /// Print JSON instead of one line per feed
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show a feed's build state locally and remotely
    Status {
        #[command(flatten)]
        selector: Selector,
    },
    /// Make a feed's stores available locally, building them if needed
    Build {
        #[command(flatten)]
        selector: Selector,

        /// Rebuild the primary store even if it exists
        #[arg(long, default_value_t = false)]
        rebuild_db: bool,

        /// Rebuild the compact store even if it exists
        #[arg(long, default_value_t = false)]
        rebuild_compact: bool,

        /// Keep only the compact store (overrides GTFS_COMPACT_ONLY)
        #[arg(long, default_value_t = false)]
        compact_only: bool,
    },
    /// Download or build every feed in the manifest
    BuildAll {
        /// Skip feeds starting before this date (YYYYMMDD)
        #[arg(long, value_parser = date_arg)]
        since: Option<NaiveDate>,
    },
    /// Upload a locally built feed to S3
    Upload {
        #[command(flatten)]
        selector: Selector,
    },
    /// Download a built feed from S3
    Download {
        #[command(flatten)]
        selector: Selector,
    },
    /// Delete a feed's local stores
    Delete {
        #[command(flatten)]
        selector: Selector,

        /// Also delete the downloaded archive and extracted tables
        #[arg(long, default_value_t = false)]
        purge: bool,
    },
    /// Print the shape of a route's typical pattern
    RouteShape {
        #[command(flatten)]
        selector: Selector,

        route_id: String,
    },
}

fn date_arg(text: &str) -> std::result::Result<NaiveDate, String> {
    parse_date(text).map_err(|e| e.to_string())
}

#[derive(Serialize)]
struct StatusReport<'a> {
    feed: &'a FeedDescriptor,
    state: FeedState,
    exists_locally: bool,
    exists_remotely: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/gtfs_feed_archive.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("gtfs_feed_archive.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let mut config = ArchiveConfig::from_env()?;
    if let Some(root) = cli.feeds_root {
        config.feeds_root = root;
    }
    if let Some(manifest) = cli.manifest {
        config.manifest_url = manifest;
    }
    if cli.s3_bucket.is_some() {
        config.s3_bucket = cli.s3_bucket;
    }

    let mut app = App::new(config).await?;

    match cli.command {
        Commands::ListFeeds { start, end, json } => {
            let index = app.index(None).await?;
            let feeds = index.feeds_in_range(start, end);
            if json {
                println!("{}", serde_json::to_string_pretty(&feeds)?);
            } else {
                for feed in &feeds {
                    println!("{feed}");
                }
            }
            info!(total = index.len(), matched = feeds.len(), "Feed list fetched");
        }
        Commands::Status { selector } => {
            let controller = app.controller(&selector).await?;
            let report = StatusReport {
                feed: controller.feed(),
                state: controller.state(),
                exists_locally: controller.exists_locally(),
                exists_remotely: controller.exists_remotely().await?,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Build {
            selector,
            rebuild_db,
            rebuild_compact,
            compact_only,
        } => {
            if compact_only {
                app.config.compact_only = true;
            }
            let mut controller = app.controller(&selector).await?;
            if rebuild_db || rebuild_compact {
                controller
                    .build_locally(Rebuild {
                        db: rebuild_db,
                        compact: rebuild_compact,
                    })
                    .await?;
            } else {
                controller.download_or_build().await?;
            }
            info!(feed_key = %controller.key(), state = %controller.state(), "Feed ready");
        }
        Commands::BuildAll { since } => {
            let index = app.index(since).await?;
            let mut controllers: Vec<FeedController> = index
                .all_feeds()
                .into_iter()
                .map(|feed| app.make_controller(feed.clone()))
                .collect();
            let outcomes = download_or_build_all(&mut controllers).await;
            let failed: Vec<&str> = outcomes
                .iter()
                .filter(|o| !o.succeeded())
                .map(|o| o.feed_key.as_str())
                .collect();
            if !failed.is_empty() {
                anyhow::bail!("{} of {} feeds failed: {}", failed.len(), outcomes.len(), failed.join(", "));
            }
        }
        Commands::Upload { selector } => {
            app.controller(&selector).await?.upload().await?;
        }
        Commands::Download { selector } => {
            app.controller(&selector).await?.download().await?;
        }
        Commands::Delete { selector, purge } => {
            let mut controller = app.controller(&selector).await?;
            if purge {
                controller.purge_locally()?;
            } else {
                controller.delete_locally()?;
            }
            info!(feed_key = %controller.key(), "Deleted local feed files");
        }
        Commands::RouteShape { selector, route_id } => {
            let controller = app.controller(&selector).await?;
            let store = controller.open_primary_store()?;
            let points = store.shape_for_route(&route_id)?;
            if points.is_empty() {
                warn!(route_id = %route_id, "No typical shape found for route");
            }
            for point in &points {
                println!("{}\t{}\t{}", point.sequence, point.lat, point.lon);
            }
        }
    }

    Ok(())
}

/// Clients and settings shared by the subcommands.
struct App {
    config: ArchiveConfig,
    http: Arc<dyn HttpClient>,
    remote: Option<Arc<dyn BlobStore>>,
    manifest: ManifestClient,
}

impl App {
    async fn new(config: ArchiveConfig) -> Result<Self> {
        let remote: Option<Arc<dyn BlobStore>> = match &config.s3_bucket {
            Some(bucket) => {
                info!(bucket = %bucket, "S3 mirror enabled");
                let aws = aws_config::load_from_env().await;
                Some(Arc::new(S3BlobStore::new(&aws, bucket.as_str())))
            }
            None => None,
        };
        Ok(Self {
            http: Arc::new(BasicClient::for_downloads()?),
            manifest: ManifestClient::new(config.manifest_url.as_str())?,
            remote,
            config,
        })
    }

    async fn index(&self, since: Option<NaiveDate>) -> Result<ArchiveIndex> {
        ArchiveIndex::load(&self.manifest, since)
            .await
            .with_context(|| format!("loading manifest from {}", self.config.manifest_url))
    }

    fn make_controller(&self, feed: FeedDescriptor) -> FeedController {
        let controller = FeedController::new(
            feed,
            &self.config.feeds_root,
            self.config.controller_options(),
            self.http.clone(),
        );
        match &self.remote {
            Some(remote) => controller.with_remote(remote.clone()),
            None => controller,
        }
    }

    async fn controller(&self, selector: &Selector) -> Result<FeedController> {
        let index = self.index(None).await?;
        let feed = if let Some(key) = &selector.key {
            index.feed_by_key(key)
        } else if let Some(date) = selector.date {
            index.feed_covering_date(date)
        } else {
            index.latest_feed()
        };
        let feed = feed.cloned().with_context(|| "no feed in the manifest matches the selector")?;
        Ok(self.make_controller(feed))
    }
}
