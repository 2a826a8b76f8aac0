//! Shields.io endpoint badge derived from a report.

use serde::{Deserialize, Serialize};

use crate::{normalize::CanonicalState, report::Report};

/// A shields.io "endpoint" badge document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
  pub schema_version: u8,
  pub label:          String,
  pub message:        String,
  pub color:          String,
}

impl Badge {
  fn new(label: &str, message: &str, color: &str) -> Self {
    Self {
      schema_version: 1,
      label:          label.to_owned(),
      message:        message.to_owned(),
      color:          color.to_owned(),
    }
  }

  pub fn for_state(label: &str, state: CanonicalState) -> Self {
    let (message, color) = match state {
      CanonicalState::Operational => ("ONLINE", "brightgreen"),
      CanonicalState::Degraded | CanonicalState::PartialOutage => {
        ("DEGRADED", "yellow")
      }
      CanonicalState::Maintenance => ("MAINTENANCE", "blue"),
      CanonicalState::MajorOutage => ("OFFLINE", "red"),
      CanonicalState::Unknown => ("UNKNOWN", "lightgrey"),
    };
    Self::new(label, message, color)
  }

  pub fn for_report(label: &str, report: &Report) -> Self {
    match report {
      Report::Status(status) => Self::for_state(label, status.status),
      Report::Error(_) => Self::new(label, "ERROR", "lightgrey"),
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};

  use super::*;
  use crate::report::ErrorReport;

  #[test]
  fn colours_follow_state() {
    let badge = Badge::for_state("Fortnite", CanonicalState::Operational);
    assert_eq!(badge.message, "ONLINE");
    assert_eq!(badge.color, "brightgreen");
    assert_eq!(
      Badge::for_state("Fortnite", CanonicalState::PartialOutage).color,
      "yellow"
    );
    assert_eq!(
      Badge::for_state("Fortnite", CanonicalState::MajorOutage).message,
      "OFFLINE"
    );
  }

  #[test]
  fn error_reports_get_a_grey_badge() {
    let report =
      Report::from(ErrorReport::new("boom", Utc.timestamp_opt(0, 0).unwrap(), None));
    let badge = Badge::for_report("Fortnite", &report);
    assert_eq!(badge.message, "ERROR");
    assert_eq!(badge.color, "lightgrey");

    let json = serde_json::to_value(&badge).unwrap();
    assert_eq!(json["schemaVersion"], 1);
    assert_eq!(json["label"], "Fortnite");
  }
}
