//! Poller configuration, deserialised from `beacon.toml` and `BEACON_*`
//! environment variables.

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use beacon_core::{ledger::Retention, normalize::CanonicalState};
use serde::Deserialize;

pub const DEFAULT_SOURCE_URL: &str =
  "https://status.epicgames.com/api/v2/summary.json";

// ─── Sections ────────────────────────────────────────────────────────────────

/// Timestamped copies of published files.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
  /// Where copies go; backups are disabled when unset.
  pub dir:          Option<PathBuf>,
  pub max_per_file: usize,
}

impl Default for BackupConfig {
  fn default() -> Self {
    Self {
      dir:          None,
      max_per_file: 30,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
  /// Extra upstream tokens, merged over the built-in vocabulary.
  pub aliases: HashMap<String, CanonicalState>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub host: String,
  pub port: u16,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      host: "127.0.0.1".into(),
      port: 8080,
    }
  }
}

// ─── PollerConfig ────────────────────────────────────────────────────────────

/// Runtime configuration for every `beacon` subcommand.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
  pub source_url:         String,
  pub fetch_timeout_secs: u64,
  pub store_path:         PathBuf,
  /// Defaults to `<store_path>.lock`.
  pub lock_path:          Option<PathBuf>,
  pub public_dir:         PathBuf,
  pub badge_label:        String,
  /// Publish `status.json` on every run, not only when something changed.
  pub always_publish:     bool,
  pub interval_secs:      u64,
  pub retention:          Retention,
  pub backup:             BackupConfig,
  pub normalizer:         NormalizerConfig,
  pub api:                ApiConfig,
}

impl Default for PollerConfig {
  fn default() -> Self {
    Self {
      source_url:         DEFAULT_SOURCE_URL.into(),
      fetch_timeout_secs: 15,
      store_path:         PathBuf::from("beacon.sqlite3"),
      lock_path:          None,
      public_dir:         PathBuf::from("public"),
      badge_label:        "Status".into(),
      always_publish:     false,
      interval_secs:      60,
      retention:          Retention::default(),
      backup:             BackupConfig::default(),
      normalizer:         NormalizerConfig::default(),
      api:                ApiConfig::default(),
    }
  }
}

impl PollerConfig {
  /// Layer an optional TOML file under `BEACON_*` environment variables.
  /// Nested keys use `__`, e.g. `BEACON_RETENTION__GLOBAL_MAX_ENTRIES`.
  pub fn load(path: &Path) -> anyhow::Result<Self> { Self::load_with(path, environment()) }

  fn load_with(path: &Path, env: config::Environment) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(env)
      .build()
      .context("failed to read config file")?;

    let mut cfg: Self = settings
      .try_deserialize()
      .context("failed to deserialise PollerConfig")?;
    cfg.expand_paths();
    Ok(cfg)
  }

  fn expand_paths(&mut self) {
    self.store_path = expand_tilde(&self.store_path);
    self.public_dir = expand_tilde(&self.public_dir);
    self.lock_path = self.lock_path.as_deref().map(expand_tilde);
    self.backup.dir = self.backup.dir.as_deref().map(expand_tilde);
  }

  pub fn lock_path(&self) -> PathBuf {
    self.lock_path.clone().unwrap_or_else(|| {
      let mut path = self.store_path.clone().into_os_string();
      path.push(".lock");
      PathBuf::from(path)
    })
  }

  pub fn fetch_timeout(&self) -> Duration {
    Duration::from_secs(self.fetch_timeout_secs.max(1))
  }

  pub fn interval(&self) -> Duration { Duration::from_secs(self.interval_secs.max(1)) }
}

fn environment() -> config::Environment {
  config::Environment::with_prefix("BEACON")
    .prefix_separator("_")
    .separator("__")
    .try_parsing(true)
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
