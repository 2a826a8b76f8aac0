//! Publishing: atomically writes the JSON documents dashboards read, and keeps
//! a bounded set of timestamped backups.

use std::{
  fs,
  io::{BufWriter, Write as _},
  path::{Path, PathBuf},
};

use anyhow::Context as _;
use beacon_core::{badge::Badge, report::{HistoryDocument, Report}};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::BackupConfig;

pub const STATUS_FILE: &str = "status.json";
pub const HISTORY_FILE: &str = "history.json";
pub const BADGE_FILE: &str = "status-badge.json";

/// Writes published documents into one directory.
#[derive(Debug, Clone)]
pub struct Publisher {
  public_dir:     PathBuf,
  badge_label:    String,
  always_publish: bool,
  backup:         BackupConfig,
}

impl Publisher {
  pub fn new(
    public_dir: impl Into<PathBuf>,
    badge_label: impl Into<String>,
    always_publish: bool,
    backup: BackupConfig,
  ) -> Self {
    Self {
      public_dir: public_dir.into(),
      badge_label: badge_label.into(),
      always_publish,
      backup,
    }
  }

  pub fn path(&self, file: &str) -> PathBuf { self.public_dir.join(file) }

  /// Write `status.json` and the badge when `changed`, when they were never
  /// written, or when configured to always publish. Error reports are always
  /// written. Returns whether anything was written.
  pub fn publish_report(&self, report: &Report, changed: bool) -> anyhow::Result<bool> {
    let status_path = self.path(STATUS_FILE);
    let due = changed
      || report.is_error()
      || self.always_publish
      || !status_path.exists();
    if !due {
      debug!("status unchanged; skipping status.json");
      return Ok(false);
    }

    write_json_atomic(&status_path, report)?;
    write_json_atomic(
      &self.path(BADGE_FILE),
      &Badge::for_report(&self.badge_label, report),
    )?;
    info!(path = %status_path.display(), "published status");
    Ok(true)
  }

  pub fn publish_history(&self, history: &HistoryDocument) -> anyhow::Result<()> {
    write_json_atomic(&self.path(HISTORY_FILE), history)
  }

  /// Copy each published file to `<stem>_<YYYYmmdd_HHMMSS>.json` in the
  /// backup directory, then prune each file's backups to the newest
  /// `max_per_file`. Does nothing when no backup directory is configured.
  pub fn backup(&self, now: DateTime<Utc>) -> anyhow::Result<()> {
    let Some(dir) = &self.backup.dir else {
      return Ok(());
    };
    fs::create_dir_all(dir)
      .with_context(|| format!("failed to create backup dir {}", dir.display()))?;

    let stamp = now.format("%Y%m%d_%H%M%S");
    for file in [STATUS_FILE, HISTORY_FILE, BADGE_FILE] {
      let src = self.path(file);
      if !src.exists() {
        debug!(path = %src.display(), "not published yet; skipping backup");
        continue;
      }
      let stem = file.trim_end_matches(".json");
      let dst = dir.join(format!("{stem}_{stamp}.json"));
      fs::copy(&src, &dst).with_context(|| {
        format!("failed to back up {} to {}", src.display(), dst.display())
      })?;
      prune_backups(dir, stem, self.backup.max_per_file)?;
    }
    Ok(())
  }
}

/// Serialise `value` to a temp file beside `path` and rename it into place.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
  let dir = match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent,
    _ => Path::new("."),
  };
  fs::create_dir_all(dir)
    .with_context(|| format!("failed to create {}", dir.display()))?;

  let mut tmp = NamedTempFile::new_in(dir)
    .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
  {
    let mut writer = BufWriter::new(tmp.as_file_mut());
    serde_json::to_writer_pretty(&mut writer, value)
      .with_context(|| format!("failed to serialise {}", path.display()))?;
    writer.write_all(b"\n")?;
    writer.flush()?;
  }
  tmp
    .persist(path)
    .with_context(|| format!("failed to write {}", path.display()))?;
  Ok(())
}

/// Delete the oldest `<stem>_*.json` backups beyond `keep`. Timestamped names
/// sort chronologically.
fn prune_backups(dir: &Path, stem: &str, keep: usize) -> anyhow::Result<()> {
  let prefix = format!("{stem}_");
  let mut backups: Vec<PathBuf> = fs::read_dir(dir)
    .with_context(|| format!("failed to list {}", dir.display()))?
    .filter_map(|entry| entry.ok().map(|e| e.path()))
    .filter(|path| {
      path
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.strip_prefix(&prefix))
        .is_some_and(|rest| {
          rest.ends_with(".json")
            && rest.trim_end_matches(".json").chars().all(|c| c.is_ascii_digit() || c == '_')
        })
    })
    .collect();

  if backups.len() <= keep {
    return Ok(());
  }
  backups.sort();
  let excess = backups.len() - keep;
  for old in backups.drain(..excess) {
    fs::remove_file(&old)
      .with_context(|| format!("failed to remove old backup {}", old.display()))?;
    debug!(path = %old.display(), "removed old backup");
  }
  Ok(())
}
