//! Upstream snapshot wire types and their normalised form.
//!
//! The wire types mirror a Statuspage `summary.json` document. Only the fields
//! the tracker needs are modelled; everything else is ignored.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Error, Result, normalize::{CanonicalState, Normalizer}};

// ─── Wire types ──────────────────────────────────────────────────────────────

/// One fetched upstream document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamSnapshot {
  #[serde(default)]
  pub page:       Option<UpstreamPage>,
  /// The aggregate indicator. Required; its absence makes the snapshot
  /// malformed.
  #[serde(default)]
  pub status:     Option<UpstreamStatus>,
  #[serde(default)]
  pub components: Vec<UpstreamComponent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamPage {
  pub id:         Option<String>,
  pub name:       Option<String>,
  pub url:        Option<String>,
  pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamStatus {
  pub indicator:   Option<String>,
  pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpstreamComponent {
  pub id:         Option<String>,
  pub name:       Option<String>,
  pub status:     Option<String>,
  pub updated_at: Option<DateTime<Utc>>,
  /// Statuspage marks component groups with `group: true`.
  #[serde(default)]
  pub group:      bool,
}

impl UpstreamSnapshot {
  /// Parse a raw response body. Any decoding failure is a
  /// [`Error::MalformedSnapshot`].
  pub fn from_slice(body: &[u8]) -> Result<Self> {
    serde_json::from_slice(body).map_err(|e| Error::MalformedSnapshot(e.to_string()))
  }
}

// ─── Normalised form ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedComponent {
  pub name:       String,
  pub id:         Option<String>,
  pub state:      CanonicalState,
  pub updated_at: Option<DateTime<Utc>>,
}

/// A snapshot with every status token mapped to a [`CanonicalState`].
///
/// Components keep upstream order; names are unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedSnapshot {
  pub indicator:   CanonicalState,
  pub description: Option<String>,
  pub components:  Vec<NormalizedComponent>,
}

impl NormalizedSnapshot {
  /// Normalise `upstream` with `normalizer`.
  ///
  /// Fails with [`Error::MalformedSnapshot`] when the aggregate status is
  /// missing or a component has neither a name nor an id. Duplicate component
  /// names keep their first occurrence.
  pub fn from_upstream(
    upstream: &UpstreamSnapshot,
    normalizer: &Normalizer,
  ) -> Result<Self> {
    let status = upstream
      .status
      .as_ref()
      .ok_or_else(|| Error::MalformedSnapshot("missing `status` object".into()))?;

    let mut seen = HashSet::new();
    let mut components = Vec::with_capacity(upstream.components.len());
    for (index, component) in upstream.components.iter().enumerate() {
      let name = component
        .name
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .or(component.id.as_deref().filter(|id| !id.is_empty()))
        .ok_or_else(|| {
          Error::MalformedSnapshot(format!("component #{index} has no name or id"))
        })?;

      if !seen.insert(name.to_owned()) {
        warn!(component = name, "duplicate component name; keeping first");
        continue;
      }

      components.push(NormalizedComponent {
        name:       name.to_owned(),
        id:         component.id.clone(),
        state:      normalizer.normalize(component.status.as_deref()),
        updated_at: component.updated_at,
      });
    }

    Ok(Self {
      indicator: normalizer.normalize(status.indicator.as_deref()),
      description: status.description.clone(),
      components,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SUMMARY: &str = r#"{
    "page": {
      "id": "ft29x9wbsy3n",
      "name": "Epic Games",
      "url": "https://status.epicgames.com",
      "updated_at": "2024-03-01T12:00:00.000Z"
    },
    "status": { "indicator": "minor", "description": "Minor Service Outage" },
    "components": [
      {
        "id": "a1",
        "name": "Fortnite",
        "status": "degraded_performance",
        "updated_at": "2024-03-01T11:59:00.000Z",
        "group": true
      },
      { "id": "b2", "name": "Login", "status": "operational" },
      { "id": "c3", "name": "Login", "status": "major_outage" },
      { "id": "d4", "name": "Parties", "status": "something_new" }
    ],
    "incidents": []
  }"#;

  #[test]
  fn parses_and_normalises_summary() {
    let upstream = UpstreamSnapshot::from_slice(SUMMARY.as_bytes()).unwrap();
    let snapshot =
      NormalizedSnapshot::from_upstream(&upstream, &Normalizer::default()).unwrap();

    assert_eq!(snapshot.indicator, CanonicalState::Degraded);
    assert_eq!(snapshot.description.as_deref(), Some("Minor Service Outage"));

    let names: Vec<_> = snapshot.components.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["Fortnite", "Login", "Parties"]);
    assert_eq!(snapshot.components[0].state, CanonicalState::Degraded);
    assert!(snapshot.components[0].updated_at.is_some());
    // First occurrence wins.
    assert_eq!(snapshot.components[1].state, CanonicalState::Operational);
    assert_eq!(snapshot.components[2].state, CanonicalState::Unknown);
  }

  #[test]
  fn invalid_json_is_malformed() {
    let err = UpstreamSnapshot::from_slice(b"<html>502</html>").unwrap_err();
    assert!(matches!(err, Error::MalformedSnapshot(_)));
    assert!(err.is_poll_failure());
  }

  #[test]
  fn missing_status_is_malformed() {
    let upstream = UpstreamSnapshot::from_slice(br#"{"components": []}"#).unwrap();
    let err =
      NormalizedSnapshot::from_upstream(&upstream, &Normalizer::default()).unwrap_err();
    assert!(matches!(err, Error::MalformedSnapshot(_)));
  }

  #[test]
  fn nameless_component_falls_back_to_id() {
    let upstream = UpstreamSnapshot::from_slice(
      br#"{"status": {"indicator": "none"},
           "components": [{"id": "xyz", "name": "", "status": "operational"}]}"#,
    )
    .unwrap();
    let snapshot =
      NormalizedSnapshot::from_upstream(&upstream, &Normalizer::default()).unwrap();
    assert_eq!(snapshot.components[0].name, "xyz");
  }

  #[test]
  fn anonymous_component_is_malformed() {
    let upstream = UpstreamSnapshot::from_slice(
      br#"{"status": {"indicator": "none"}, "components": [{"status": "operational"}]}"#,
    )
    .unwrap();
    let err =
      NormalizedSnapshot::from_upstream(&upstream, &Normalizer::default()).unwrap_err();
    assert!(matches!(err, Error::MalformedSnapshot(_)));
  }
}
