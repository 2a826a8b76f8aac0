//! One poll cycle, and the scheduled loop around it.

use std::time::Duration;

use anyhow::Context as _;
use beacon_core::{
  entity::EntityId,
  normalize::CanonicalState,
  reconcile::Reconciler,
  report::{ErrorReport, HistoryDocument, Report},
  store::StateStore,
};
use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::{fetch::SnapshotSource, publish::Publisher};

/// What a single poll did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
  Reconciled {
    status:  CanonicalState,
    changed: bool,
  },
  /// The fetch failed or returned garbage; an `ERROR` report was published
  /// and stored state was left alone.
  Failed { reason: String },
}

/// Ties a snapshot source, a state store, the reconciler, and a publisher
/// together.
pub struct Poller<S, F> {
  pub store:      S,
  pub source:     F,
  pub reconciler: Reconciler,
  pub publisher:  Publisher,
}

impl<S, F> Poller<S, F>
where
  S: StateStore,
  F: SnapshotSource,
{
  /// Run one cycle observed at `now`.
  ///
  /// Fetch and snapshot failures are recovered here; only storage or publish
  /// failures are returned as errors.
  pub async fn poll_once(&self, now: DateTime<Utc>) -> anyhow::Result<PollOutcome> {
    let loaded = self.store.load().await.context("failed to load stored state")?;
    let previous = self.reconciler.restore(loaded);

    let snapshot = match self
      .source
      .fetch()
      .await
      .and_then(|upstream| self.reconciler.normalize(&upstream))
    {
      Ok(snapshot) => snapshot,
      Err(e) if e.is_poll_failure() => {
        let reason = e.to_string();
        warn!(source = self.source.describe(), %reason, "poll failed; state left untouched");

        let last_changed = previous
          .entities
          .get(&EntityId::Global)
          .and_then(|global| global.last_changed);
        let mut report = Report::from(ErrorReport::new(reason.clone(), now, last_changed));
        report.set_source(self.source.describe());

        self
          .store
          .save_report(&report)
          .await
          .context("failed to save error report")?;
        self.publisher.publish_report(&report, true)?;
        self.publisher.backup(now)?;
        return Ok(PollOutcome::Failed { reason });
      }
      Err(e) => return Err(e).context("failed to prepare snapshot"),
    };

    let result = self.reconciler.reconcile(previous, &snapshot, now);
    let status = result.report.status;
    let changed = result.changed;

    let mut report = Report::from(result.report);
    report.set_source(self.source.describe());

    self
      .store
      .save(&result.state, &report)
      .await
      .context("failed to save tracker state")?;

    let published = self.publisher.publish_report(&report, changed)?;
    self
      .publisher
      .publish_history(&HistoryDocument::from_ledger(&result.state.ledger, now))?;
    if published {
      self.publisher.backup(now)?;
    }

    info!(
      %status,
      changed,
      components = snapshot.components.len(),
      "poll complete"
    );
    Ok(PollOutcome::Reconciled { status, changed })
  }

  /// Poll once per `interval` until Ctrl-C. Ticks are never queued up, so
  /// runs cannot overlap.
  pub async fn watch(&self, interval: Duration) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
      tokio::select! {
        _ = ticker.tick() => {
          if let Err(e) = self.poll_once(Utc::now()).await {
            error!(error = ?e, "poll aborted");
            return Err(e);
          }
        }
        _ = tokio::signal::ctrl_c() => {
          info!("interrupted; stopping");
          return Ok(());
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::{collections::VecDeque, fs, sync::Mutex};

  use beacon_core::{
    Error,
    ledger::Retention,
    normalize::Normalizer,
    snapshot::UpstreamSnapshot,
    store::Loaded,
  };
  use beacon_store_sqlite::SqliteStore;
  use chrono::TimeZone;
  use tempfile::TempDir;

  use super::*;
  use crate::{
    config::BackupConfig,
    publish::{HISTORY_FILE, STATUS_FILE},
  };

  /// Hands out queued results, one per fetch.
  struct Canned(Mutex<VecDeque<beacon_core::Result<UpstreamSnapshot>>>);

  impl Canned {
    fn new(results: Vec<beacon_core::Result<UpstreamSnapshot>>) -> Self {
      Self(Mutex::new(results.into()))
    }
  }

  impl SnapshotSource for Canned {
    async fn fetch(&self) -> beacon_core::Result<UpstreamSnapshot> {
      self
        .0
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(Error::FetchFailure("no more canned results".into())))
    }

    fn describe(&self) -> &str { "canned" }
  }

  fn summary(indicator: &str, login: &str) -> beacon_core::Result<UpstreamSnapshot> {
    let body = format!(
      r#"{{"status": {{"indicator": "{indicator}"}},
          "components": [{{"id": "1", "name": "Login", "status": "{login}"}}]}}"#
    );
    UpstreamSnapshot::from_slice(body.as_bytes())
  }

  fn at(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

  async fn poller(
    results: Vec<beacon_core::Result<UpstreamSnapshot>>,
  ) -> (Poller<SqliteStore, Canned>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let poller = Poller {
      store:      SqliteStore::open_in_memory().await.unwrap(),
      source:     Canned::new(results),
      reconciler: Reconciler::new(Normalizer::default(), Retention::default()),
      publisher:  Publisher::new(dir.path(), "Fortnite", false, BackupConfig::default()),
    };
    (poller, dir)
  }

  fn read_json(path: &std::path::Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
  }

  #[tokio::test]
  async fn fetch_failure_leaves_state_untouched() {
    let (poller, _dir) = poller(vec![
      summary("minor", "degraded_performance"),
      Err(Error::FetchFailure("HTTP 503".into())),
    ])
    .await;

    let first = poller.poll_once(at(0)).await.unwrap();
    assert_eq!(first, PollOutcome::Reconciled {
      status:  CanonicalState::Degraded,
      changed: true,
    });
    let before = poller.store.load().await.unwrap();
    let history_before = fs::read_to_string(poller.publisher.path(HISTORY_FILE)).unwrap();

    let second = poller.poll_once(at(60)).await.unwrap();
    assert!(matches!(second, PollOutcome::Failed { .. }));
    assert_eq!(poller.store.load().await.unwrap(), before);
    assert_eq!(
      fs::read_to_string(poller.publisher.path(HISTORY_FILE)).unwrap(),
      history_before
    );

    let status = read_json(&poller.publisher.path(STATUS_FILE));
    assert_eq!(status["status"], "ERROR");
    assert_eq!(status["error"], "fetch failure: HTTP 503");
    assert_eq!(status["lastChanged"], "1970-01-01T00:00:00Z");
    assert_eq!(status["source"], "canned");
  }

  #[tokio::test]
  async fn malformed_snapshot_is_treated_like_a_fetch_failure() {
    let (poller, _dir) = poller(vec![
      UpstreamSnapshot::from_slice(br#"{"components": []}"#),
    ])
    .await;

    let outcome = poller.poll_once(at(0)).await.unwrap();
    assert!(matches!(outcome, PollOutcome::Failed { .. }));
    assert_eq!(poller.store.load().await.unwrap(), Loaded::Absent);
    assert!(poller.store.latest_report().await.unwrap().unwrap().is_error());
  }

  #[tokio::test]
  async fn unchanged_status_is_not_republished() {
    let (poller, _dir) = poller(vec![
      summary("none", "operational"),
      summary("none", "operational"),
      summary("none", "partial_outage"),
    ])
    .await;

    poller.poll_once(at(0)).await.unwrap();
    let second = poller.poll_once(at(60)).await.unwrap();
    assert_eq!(second, PollOutcome::Reconciled {
      status:  CanonicalState::Operational,
      changed: false,
    });

    // status.json still carries the first run; the store has the fresh one.
    let status = read_json(&poller.publisher.path(STATUS_FILE));
    assert_eq!(status["lastChecked"], "1970-01-01T00:00:00Z");
    let latest = poller.store.latest_report().await.unwrap().unwrap();
    assert_eq!(latest.last_checked(), at(60));

    // A component going down republishes even though the global is fine.
    let third = poller.poll_once(at(120)).await.unwrap();
    assert_eq!(third, PollOutcome::Reconciled {
      status:  CanonicalState::Operational,
      changed: true,
    });
    let status = read_json(&poller.publisher.path(STATUS_FILE));
    assert_eq!(status["components"][0]["status"], "PARTIAL_OUTAGE");

    let history = read_json(&poller.publisher.path(HISTORY_FILE));
    assert_eq!(history["components"][0]["intervals"].as_array().unwrap().len(), 2);
  }
}
