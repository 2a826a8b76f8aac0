//! Canonical states and the upstream-token normaliser.
//!
//! Upstream feeds speak their own vocabulary (`none`, `minor`,
//! `degraded_performance`, ...). Everything past this module only ever sees a
//! [`CanonicalState`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

// ─── CanonicalState ──────────────────────────────────────────────────────────

/// The fixed set of normalised states.
///
/// No severity order is implied; transition detection uses equality only.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CanonicalState {
  Operational,
  Degraded,
  PartialOutage,
  #[serde(alias = "OUTAGE")]
  #[strum(to_string = "MAJOR_OUTAGE", serialize = "OUTAGE")]
  MajorOutage,
  Maintenance,
  #[default]
  Unknown,
}

impl CanonicalState {
  pub fn is_operational(self) -> bool { matches!(self, Self::Operational) }

  /// Human-readable message shown next to the state on dashboards.
  pub fn message(self) -> &'static str {
    match self {
      Self::Operational => "All systems operational",
      Self::Degraded => "Degraded performance",
      Self::PartialOutage => "Partial outage",
      Self::MajorOutage => "Major outage",
      Self::Maintenance => "Under maintenance",
      Self::Unknown => "Status unknown",
    }
  }
}

// ─── Normalizer ──────────────────────────────────────────────────────────────

/// Upstream vocabulary understood out of the box. Keys are lowercase.
pub const DEFAULT_MAPPING: &[(&str, CanonicalState)] = &[
  ("none", CanonicalState::Operational),
  ("operational", CanonicalState::Operational),
  ("minor", CanonicalState::Degraded),
  ("degraded_performance", CanonicalState::Degraded),
  ("partial_outage", CanonicalState::PartialOutage),
  ("major", CanonicalState::MajorOutage),
  ("critical", CanonicalState::MajorOutage),
  ("major_outage", CanonicalState::MajorOutage),
  ("under_maintenance", CanonicalState::Maintenance),
];

/// Maps raw upstream tokens to canonical states through a lookup table.
///
/// Matching is case-insensitive and exact. Absent, empty, or unrecognised
/// tokens map to [`CanonicalState::Unknown`]; normalisation never fails.
#[derive(Debug, Clone)]
pub struct Normalizer {
  table: HashMap<String, CanonicalState>,
}

impl Default for Normalizer {
  fn default() -> Self {
    Self {
      table: DEFAULT_MAPPING
        .iter()
        .map(|(token, state)| ((*token).to_owned(), *state))
        .collect(),
    }
  }
}

impl Normalizer {
  /// The default table extended (or overridden) by `aliases`.
  pub fn with_aliases<I, K>(aliases: I) -> Self
  where
    I: IntoIterator<Item = (K, CanonicalState)>,
    K: AsRef<str>,
  {
    let mut normalizer = Self::default();
    for (token, state) in aliases {
      normalizer
        .table
        .insert(token.as_ref().to_ascii_lowercase(), state);
    }
    normalizer
  }

  pub fn normalize(&self, raw: Option<&str>) -> CanonicalState {
    match raw {
      Some(token) if !token.is_empty() => self
        .table
        .get(&token.to_ascii_lowercase())
        .copied()
        .unwrap_or(CanonicalState::Unknown),
      _ => CanonicalState::Unknown,
    }
  }
}

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use strum::IntoEnumIterator;

  use super::*;

  #[test]
  fn maps_upstream_vocabulary() {
    use crate::normalize::CanonicalState::*;
    let cases = [
      ("none", Operational),
      ("operational", Operational),
      ("minor", Degraded),
      ("degraded_performance", Degraded),
      ("partial_outage", PartialOutage),
      ("major", MajorOutage),
      ("critical", MajorOutage),
      ("major_outage", MajorOutage),
      ("under_maintenance", Maintenance),
    ];
    let normalizer = Normalizer::default();
    for (token, expected) in cases {
      assert_eq!(normalizer.normalize(Some(token)), expected, "token {token}");
    }
  }

  #[test]
  fn matching_ignores_case() {
    let normalizer = Normalizer::default();
    assert_eq!(normalizer.normalize(Some("MINOR")), CanonicalState::Degraded);
    assert_eq!(
      normalizer.normalize(Some("Major_Outage")),
      CanonicalState::MajorOutage
    );
  }

  #[test]
  fn absent_empty_and_unrecognised_are_unknown() {
    let normalizer = Normalizer::default();
    for raw in [None, Some(""), Some("on fire"), Some(" none ")] {
      assert_eq!(normalizer.normalize(raw), CanonicalState::Unknown);
    }
  }

  #[test]
  fn aliases_extend_and_override_defaults() {
    let normalizer = Normalizer::with_aliases([
      ("Investigating", CanonicalState::Degraded),
      ("minor", CanonicalState::PartialOutage),
    ]);
    assert_eq!(
      normalizer.normalize(Some("investigating")),
      CanonicalState::Degraded
    );
    assert_eq!(
      normalizer.normalize(Some("minor")),
      CanonicalState::PartialOutage
    );
    assert_eq!(normalizer.normalize(Some("none")), CanonicalState::Operational);
  }

  #[test]
  fn outage_is_an_alias_for_major_outage() {
    assert_eq!(
      CanonicalState::from_str("OUTAGE").unwrap(),
      CanonicalState::MajorOutage
    );
    let parsed: CanonicalState = serde_json::from_str("\"OUTAGE\"").unwrap();
    assert_eq!(parsed, CanonicalState::MajorOutage);
    assert_eq!(CanonicalState::MajorOutage.to_string(), "MAJOR_OUTAGE");
  }

  #[test]
  fn display_and_serde_agree() {
    for state in CanonicalState::iter() {
      let json = serde_json::to_string(&state).unwrap();
      assert_eq!(json, format!("\"{state}\""));
      assert_eq!(CanonicalState::from_str(state.as_ref()).unwrap(), state);
    }
  }
}
