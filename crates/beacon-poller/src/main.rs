//! `beacon` — upstream status tracker.
//!
//! Reads `beacon.toml` (or the path given with `--config`), then either polls
//! the upstream feed once, polls on a schedule, serves the published documents
//! over HTTP, or prints the latest report.
//!
//! # Usage
//!
//! ```text
//! beacon poll
//! beacon watch --interval-secs 60
//! beacon --config /etc/beacon.toml serve
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context as _, bail};
use beacon_core::{
  normalize::Normalizer, reconcile::Reconciler, store::StateStore,
};
use beacon_poller::{
  PollOutcome, PollerConfig, Poller, fetch::HttpSource, lock::RunLock,
  publish::Publisher,
};
use beacon_store_sqlite::SqliteStore;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Upstream status tracker")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "beacon.toml")]
  config: PathBuf,

  /// Override the upstream `summary.json` URL.
  #[arg(long, value_name = "URL")]
  source_url: Option<String>,

  /// Override the SQLite store path.
  #[arg(long, value_name = "FILE")]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Run a single poll cycle and exit.
  Poll,
  /// Poll on a fixed schedule until interrupted.
  Watch {
    /// Seconds between polls; overrides `interval_secs`.
    #[arg(long)]
    interval_secs: Option<u64>,
  },
  /// Serve the published documents over HTTP.
  Serve,
  /// Print the latest stored report.
  Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let mut cfg = PollerConfig::load(&cli.config)?;
  if let Some(url) = cli.source_url {
    cfg.source_url = url;
  }
  if let Some(store) = cli.store {
    cfg.store_path = store;
  }

  // Held for the rest of the process by polling commands.
  let _lock = match cli.command {
    Command::Poll | Command::Watch { .. } => Some(acquire_lock(&cfg)?),
    Command::Serve | Command::Show => None,
  };

  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;

  match cli.command {
    Command::Poll => {
      let poller = build_poller(&cfg, store)?;
      match poller.poll_once(Utc::now()).await? {
        PollOutcome::Reconciled { status, changed } => {
          tracing::info!(%status, changed, "status recorded");
        }
        PollOutcome::Failed { reason } => {
          tracing::warn!(%reason, "published error report");
        }
      }
    }
    Command::Watch { interval_secs } => {
      if let Some(secs) = interval_secs {
        cfg.interval_secs = secs;
      }
      let poller = build_poller(&cfg, store)?;
      tracing::info!(
        source = %cfg.source_url,
        interval_secs = cfg.interval().as_secs(),
        "watching"
      );
      poller.watch(cfg.interval()).await?;
    }
    Command::Serve => {
      let app = beacon_api::api_router(Arc::new(store), &cfg.badge_label);
      let address = format!("{}:{}", cfg.api.host, cfg.api.port);

      tracing::info!("Listening on http://{address}");
      let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
      axum::serve(listener, app).await.context("server error")?;
    }
    Command::Show => match store.latest_report().await? {
      Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
      None => println!("no report has been produced yet"),
    },
  }

  Ok(())
}

fn acquire_lock(cfg: &PollerConfig) -> anyhow::Result<RunLock> {
  let path = cfg.lock_path();
  match RunLock::try_acquire(&path)? {
    Some(lock) => Ok(lock),
    None => bail!(
      "another beacon run holds {}; refusing to run concurrently",
      path.display()
    ),
  }
}

fn build_poller(
  cfg: &PollerConfig,
  store: SqliteStore,
) -> anyhow::Result<Poller<SqliteStore, HttpSource>> {
  let normalizer = Normalizer::with_aliases(
    cfg
      .normalizer
      .aliases
      .iter()
      .map(|(token, state)| (token.as_str(), *state)),
  );
  Ok(Poller {
    store,
    source: HttpSource::new(cfg.source_url.clone(), cfg.fetch_timeout())?,
    reconciler: Reconciler::new(normalizer, cfg.retention),
    publisher: Publisher::new(
      cfg.public_dir.clone(),
      cfg.badge_label.clone(),
      cfg.always_publish,
      cfg.backup.clone(),
    ),
  })
}
