//! Rendered reports handed to publishers.
//!
//! Field names are camelCase because the dashboards consuming these documents
//! are JavaScript.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  entity::EntityId,
  ledger::{EntityHistory, HistoryInterval, HistoryLedger},
  normalize::CanonicalState,
};

// ─── Status report ───────────────────────────────────────────────────────────

/// Per-component line of a [`StatusReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentReport {
  pub name:             String,
  pub status:           CanonicalState,
  pub message:          String,
  pub last_changed:     Option<DateTime<Utc>>,
  pub down_since:       Option<DateTime<Utc>>,
  pub downtime_seconds: i64,
}

/// Summary of a successful poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
  pub status:           CanonicalState,
  pub message:          String,
  /// Upstream's own free-text description of the aggregate status.
  pub description:      Option<String>,
  /// Where the snapshot came from; filled in by the caller.
  pub source:           Option<String>,
  pub last_checked:     DateTime<Utc>,
  pub last_changed:     Option<DateTime<Utc>>,
  pub down_since:       Option<DateTime<Utc>>,
  pub downtime_seconds: i64,
  /// Whether anything a reader would notice changed since the previous run.
  pub changed:          bool,
  pub components:       Vec<ComponentReport>,
}

// ─── Error report ────────────────────────────────────────────────────────────

/// The literal `"ERROR"` status marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorStatus {
  #[default]
  #[serde(rename = "ERROR")]
  Error,
}

/// Emitted instead of a [`StatusReport`] when the poll itself failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
  pub status:       ErrorStatus,
  pub message:      String,
  /// The failure reason.
  pub error:        String,
  pub source:       Option<String>,
  pub last_checked: DateTime<Utc>,
  /// The global entity's last known change, untouched by the failure.
  pub last_changed: Option<DateTime<Utc>>,
}

impl ErrorReport {
  pub fn new(
    reason: impl Into<String>,
    last_checked: DateTime<Utc>,
    last_changed: Option<DateTime<Utc>>,
  ) -> Self {
    Self {
      status: ErrorStatus::Error,
      message: "Unable to fetch upstream status".to_owned(),
      error: reason.into(),
      source: None,
      last_checked,
      last_changed,
    }
  }
}

// ─── Report ──────────────────────────────────────────────────────────────────

/// Whatever the last run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Report {
  Status(StatusReport),
  Error(ErrorReport),
}

impl Report {
  pub fn is_error(&self) -> bool { matches!(self, Self::Error(_)) }

  pub fn last_checked(&self) -> DateTime<Utc> {
    match self {
      Self::Status(r) => r.last_checked,
      Self::Error(r) => r.last_checked,
    }
  }

  pub fn set_source(&mut self, source: impl Into<String>) {
    let source = Some(source.into());
    match self {
      Self::Status(r) => r.source = source,
      Self::Error(r) => r.source = source,
    }
  }
}

impl From<StatusReport> for Report {
  fn from(report: StatusReport) -> Self { Self::Status(report) }
}

impl From<ErrorReport> for Report {
  fn from(report: ErrorReport) -> Self { Self::Error(report) }
}

// ─── History document ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentHistory {
  pub name:      String,
  pub intervals: Vec<HistoryInterval>,
}

/// Public rendering of a [`HistoryLedger`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryDocument {
  pub generated_at: DateTime<Utc>,
  pub global:       Vec<HistoryInterval>,
  pub components:   Vec<ComponentHistory>,
}

impl HistoryDocument {
  pub fn from_ledger(ledger: &HistoryLedger, generated_at: DateTime<Utc>) -> Self {
    Self::from_histories(ledger.histories(), generated_at)
  }

  pub fn from_histories(
    histories: &[EntityHistory],
    generated_at: DateTime<Utc>,
  ) -> Self {
    let mut global = Vec::new();
    let mut components = Vec::new();
    for history in histories {
      match &history.entity {
        EntityId::Global => global = history.intervals.clone(),
        EntityId::Component(name) => components.push(ComponentHistory {
          name:      name.clone(),
          intervals: history.intervals.clone(),
        }),
      }
    }

    Self {
      generated_at,
      global,
      components,
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use serde_json::json;

  use super::*;
  use crate::ledger::Retention;

  fn at(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

  #[test]
  fn error_report_shape() {
    let report = Report::from(ErrorReport::new("HTTP 503", at(0), Some(at(-60))));
    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["status"], "ERROR");
    assert_eq!(value["error"], "HTTP 503");
    assert_eq!(value["lastChecked"], "1970-01-01T00:00:00Z");
    assert!(value["lastChanged"].is_string());
  }

  #[test]
  fn untagged_report_distinguishes_error_from_status() {
    let error = json!({
      "status": "ERROR",
      "message": "Unable to fetch upstream status",
      "error": "timeout",
      "source": null,
      "lastChecked": "2024-01-01T00:00:00Z",
      "lastChanged": null
    });
    let parsed: Report = serde_json::from_value(error).unwrap();
    assert!(parsed.is_error());

    let status = json!({
      "status": "DEGRADED",
      "message": "Degraded performance",
      "description": null,
      "source": null,
      "lastChecked": "2024-01-01T00:00:00Z",
      "lastChanged": "2024-01-01T00:00:00Z",
      "downSince": "2024-01-01T00:00:00Z",
      "downtimeSeconds": 0,
      "changed": true,
      "components": []
    });
    let parsed: Report = serde_json::from_value(status).unwrap();
    assert!(!parsed.is_error());
  }

  #[test]
  fn history_document_splits_global_and_components() {
    let mut ledger = HistoryLedger::new(Retention::default());
    ledger.record_observation(&EntityId::Global, CanonicalState::Operational, at(0));
    ledger.record_observation(
      &EntityId::component("Login"),
      CanonicalState::Degraded,
      at(0),
    );

    let doc = HistoryDocument::from_ledger(&ledger, at(5));
    assert_eq!(doc.global.len(), 1);
    assert_eq!(doc.components.len(), 1);
    assert_eq!(doc.components[0].name, "Login");
  }
}
