//! Encoding and decoding helpers between Beacon domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Canonical states use their
//! SCREAMING_SNAKE_CASE names.

use beacon_core::{
  entity::{EntityId, EntityState},
  ledger::{EntityHistory, HistoryInterval},
  normalize::CanonicalState,
};
use chrono::{DateTime, Utc};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

// ─── CanonicalState ──────────────────────────────────────────────────────────

pub fn encode_state(state: CanonicalState) -> String { state.to_string() }

pub fn decode_state(s: &str) -> Result<CanonicalState> {
  s.parse()
    .map_err(|_| Error::Corrupt(format!("unknown canonical state: {s:?}")))
}

// ─── EntityId ────────────────────────────────────────────────────────────────

pub fn encode_entity_id(id: &EntityId) -> (String, String) {
  match id {
    EntityId::Global => ("global".to_owned(), String::new()),
    EntityId::Component(name) => ("component".to_owned(), name.clone()),
  }
}

pub fn decode_entity_id(kind: &str, name: &str) -> Result<EntityId> {
  match kind {
    "global" => Ok(EntityId::Global),
    "component" if !name.is_empty() => Ok(EntityId::Component(name.to_owned())),
    other => Err(Error::Corrupt(format!(
      "unknown entity {other:?} / {name:?}"
    ))),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from an `entities` row.
pub struct RawEntity {
  pub entity_kind:  String,
  pub entity_name:  String,
  pub state:        String,
  pub last_changed: Option<String>,
  pub down_since:   Option<String>,
}

impl RawEntity {
  pub fn encode(id: &EntityId, entity: &EntityState) -> Self {
    let (entity_kind, entity_name) = encode_entity_id(id);
    Self {
      entity_kind,
      entity_name,
      state: encode_state(entity.state),
      last_changed: entity.last_changed.map(encode_dt),
      down_since: entity.down_since.map(encode_dt),
    }
  }

  pub fn into_entity(self) -> Result<(EntityId, EntityState)> {
    let id = decode_entity_id(&self.entity_kind, &self.entity_name)?;
    let entity = EntityState {
      state:        decode_state(&self.state)?,
      last_changed: decode_opt_dt(self.last_changed.as_deref())?,
      down_since:   decode_opt_dt(self.down_since.as_deref())?,
    };
    if !entity.is_consistent() {
      return Err(Error::Corrupt(format!(
        "{id} is operational but has down_since set"
      )));
    }
    Ok((id, entity))
  }
}

/// Raw strings read directly from an `intervals` row.
pub struct RawInterval {
  pub entity_kind:      String,
  pub entity_name:      String,
  pub entity_position:  i64,
  pub position:         i64,
  pub status:           String,
  pub started_at:       String,
  pub ended_at:         Option<String>,
  pub duration_seconds: Option<i64>,
}

impl RawInterval {
  /// Flatten a ledger into rows.
  pub fn encode_all(histories: &[EntityHistory]) -> Vec<Self> {
    histories
      .iter()
      .enumerate()
      .flat_map(|(entity_position, history)| {
        let (entity_kind, entity_name) = encode_entity_id(&history.entity);
        history
          .intervals
          .iter()
          .enumerate()
          .map(move |(position, interval)| Self {
            entity_kind:      entity_kind.clone(),
            entity_name:      entity_name.clone(),
            entity_position:  entity_position as i64,
            position:         position as i64,
            status:           encode_state(interval.status),
            started_at:       encode_dt(interval.started_at),
            ended_at:         interval.ended_at.map(encode_dt),
            duration_seconds: interval.duration_seconds,
          })
      })
      .collect()
  }

  fn into_interval(self) -> Result<(EntityId, HistoryInterval)> {
    let id = decode_entity_id(&self.entity_kind, &self.entity_name)?;
    let interval = HistoryInterval {
      status:           decode_state(&self.status)?,
      started_at:       decode_dt(&self.started_at)?,
      ended_at:         decode_opt_dt(self.ended_at.as_deref())?,
      duration_seconds: self.duration_seconds,
    };
    Ok((id, interval))
  }

  /// Regroup rows ordered by `(entity_position, position)` into histories.
  pub fn decode_all(rows: Vec<Self>) -> Result<Vec<EntityHistory>> {
    let mut histories: Vec<EntityHistory> = Vec::new();
    for row in rows {
      let (id, interval) = row.into_interval()?;
      if let Some(history) = histories.last_mut().filter(|h| h.entity == id) {
        history.intervals.push(interval);
        continue;
      }
      if histories.iter().any(|history| history.entity == id) {
        return Err(Error::Corrupt(format!("history for {id} is split")));
      }
      histories.push(EntityHistory {
        entity:    id,
        intervals: vec![interval],
      });
    }

    if let Some(bad) = histories.iter().find(|history| !history.is_consistent()) {
      return Err(Error::Corrupt(format!(
        "history for {} has a misplaced open interval",
        bad.entity
      )));
    }
    Ok(histories)
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn entity_id_round_trips_through_columns() {
    for id in [EntityId::Global, EntityId::component("global")] {
      let (kind, name) = encode_entity_id(&id);
      assert_eq!(decode_entity_id(&kind, &name).unwrap(), id);
    }
  }

  #[test]
  fn rejects_operational_entity_with_down_since() {
    let raw = RawEntity {
      entity_kind:  "global".into(),
      entity_name:  String::new(),
      state:        "OPERATIONAL".into(),
      last_changed: None,
      down_since:   Some(encode_dt(Utc.timestamp_opt(0, 0).unwrap())),
    };
    assert!(matches!(raw.into_entity(), Err(Error::Corrupt(_))));
  }

  #[test]
  fn rejects_unknown_state_names() {
    assert!(matches!(decode_state("ON_FIRE"), Err(Error::Corrupt(_))));
    assert_eq!(decode_state("OUTAGE").unwrap(), CanonicalState::MajorOutage);
  }
}
