//! Tracked entities and their current state.
//!
//! An entity is either the global aggregate or one named upstream component.
//! Entities are created on first observation and never deleted; a component
//! that disappears from the feed keeps its last known state.

use std::{
  collections::{BTreeMap, BTreeSet},
  fmt,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::normalize::CanonicalState;

// ─── EntityId ────────────────────────────────────────────────────────────────

/// Identity of a tracked entity.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum EntityId {
  Global,
  Component(String),
}

impl EntityId {
  pub fn component(name: impl Into<String>) -> Self {
    Self::Component(name.into())
  }

  /// The component name, or `None` for the global entity.
  pub fn component_name(&self) -> Option<&str> {
    match self {
      Self::Global => None,
      Self::Component(name) => Some(name),
    }
  }
}

impl fmt::Display for EntityId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Global => f.write_str("global"),
      Self::Component(name) => write!(f, "component:{name}"),
    }
  }
}

// ─── EntityState ─────────────────────────────────────────────────────────────

/// Current normalised state of one entity.
///
/// Invariant: `down_since.is_some()` implies `state` is not operational.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityState {
  pub state:        CanonicalState,
  /// When `state` last differed from its predecessor.
  pub last_changed: Option<DateTime<Utc>>,
  /// Start of the current uninterrupted non-operational stretch.
  pub down_since:   Option<DateTime<Utc>>,
}

/// Outcome of applying one observation to an [`EntityState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
  pub from:          CanonicalState,
  pub to:            CanonicalState,
  /// Downtime accrued as of the observation, zero when operational.
  pub downtime_secs: i64,
}

impl Transition {
  pub fn changed(&self) -> bool { self.from != self.to }
}

impl EntityState {
  /// Apply a freshly normalised state observed at `now`.
  ///
  /// `last_changed` only moves when the state differs, and never moves
  /// backwards even if `now` does. `down_since` is recomputed on every call.
  pub fn observe(&mut self, next: CanonicalState, now: DateTime<Utc>) -> Transition {
    let from = self.state;
    if next != from {
      self.state = next;
      self.last_changed = Some(match self.last_changed {
        Some(prev) if prev > now => prev,
        _ => now,
      });
    }

    if next.is_operational() {
      self.down_since = None;
    } else if self.down_since.is_none() {
      self.down_since = Some(now);
    }

    Transition {
      from,
      to: next,
      downtime_secs: self.downtime_secs(now),
    }
  }

  /// Seconds since the entity became non-operational, or zero.
  pub fn downtime_secs(&self, now: DateTime<Utc>) -> i64 {
    self
      .down_since
      .map(|since| (now - since).num_seconds().max(0))
      .unwrap_or(0)
  }

  /// Checks the `down_since` invariant.
  pub fn is_consistent(&self) -> bool {
    !(self.down_since.is_some() && self.state.is_operational())
  }
}

// ─── EntityStore ─────────────────────────────────────────────────────────────

/// In-memory map of entity states, loaded once per run and saved once at the
/// end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityStore {
  entities: BTreeMap<EntityId, EntityState>,
}

impl EntityStore {
  pub fn new() -> Self { Self::default() }

  pub fn get(&self, id: &EntityId) -> Option<&EntityState> {
    self.entities.get(id)
  }

  pub fn put(&mut self, id: EntityId, state: EntityState) {
    self.entities.insert(id, state);
  }

  /// The global entity's state, `UNKNOWN` if never observed.
  pub fn global(&self) -> EntityState {
    self.get(&EntityId::Global).cloned().unwrap_or_default()
  }

  pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &EntityState)> {
    self.entities.iter()
  }

  pub fn len(&self) -> usize { self.entities.len() }

  pub fn is_empty(&self) -> bool { self.entities.is_empty() }

  /// `(name, state)` for every component currently not operational.
  pub fn non_operational_components(&self) -> BTreeSet<(String, CanonicalState)> {
    self
      .entities
      .iter()
      .filter_map(|(id, entity)| {
        let name = id.component_name()?;
        (!entity.state.is_operational()).then(|| (name.to_owned(), entity.state))
      })
      .collect()
  }
}

impl FromIterator<(EntityId, EntityState)> for EntityStore {
  fn from_iter<T: IntoIterator<Item = (EntityId, EntityState)>>(iter: T) -> Self {
    Self {
      entities: iter.into_iter().collect(),
    }
  }
}
