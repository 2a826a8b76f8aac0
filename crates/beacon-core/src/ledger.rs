//! Bounded, most-recent-first history of state intervals per entity.
//!
//! Each entity's history is a list of [`HistoryInterval`]s. The head is the
//! current episode and is the only interval allowed to be open. When a new
//! state is observed the head is closed and a fresh open interval is pushed in
//! front of it; the oldest intervals fall off the tail once the list exceeds
//! the configured [`Retention`] bound.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{entity::EntityId, normalize::CanonicalState};

// ─── Retention ───────────────────────────────────────────────────────────────

/// Maximum history length per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Retention {
  pub global_max_entries:    usize,
  pub component_max_entries: usize,
}

impl Default for Retention {
  fn default() -> Self {
    Self {
      global_max_entries:    50,
      component_max_entries: 20,
    }
  }
}

impl Retention {
  /// The bound that applies to `entity`. Never less than one so the open head
  /// interval always survives eviction.
  pub fn max_entries(&self, entity: &EntityId) -> usize {
    let bound = match entity {
      EntityId::Global => self.global_max_entries,
      EntityId::Component(_) => self.component_max_entries,
    };
    bound.max(1)
  }
}

// ─── Intervals ───────────────────────────────────────────────────────────────

/// A span of time during which an entity held one state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryInterval {
  pub status:           CanonicalState,
  pub started_at:       DateTime<Utc>,
  /// `None` while the interval is still the current episode.
  pub ended_at:         Option<DateTime<Utc>>,
  /// Set together with `ended_at`.
  pub duration_seconds: Option<i64>,
}

impl HistoryInterval {
  pub fn open(status: CanonicalState, started_at: DateTime<Utc>) -> Self {
    Self {
      status,
      started_at,
      ended_at: None,
      duration_seconds: None,
    }
  }

  pub fn is_open(&self) -> bool { self.ended_at.is_none() }

  fn close(&mut self, at: DateTime<Utc>) {
    let ended_at = at.max(self.started_at);
    self.ended_at = Some(ended_at);
    self.duration_seconds = Some((ended_at - self.started_at).num_seconds());
  }
}

/// The history of a single entity, most recent first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityHistory {
  pub entity:    EntityId,
  pub intervals: Vec<HistoryInterval>,
}

impl EntityHistory {
  /// At most one open interval, and only at the head.
  pub fn is_consistent(&self) -> bool {
    self
      .intervals
      .iter()
      .skip(1)
      .all(|interval| !interval.is_open())
      && self.intervals.iter().all(|interval| {
        interval.is_open() == interval.duration_seconds.is_none()
      })
  }
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

/// Histories for every tracked entity.
///
/// Entities are listed in first-observation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryLedger {
  retention: Retention,
  histories: Vec<EntityHistory>,
}

impl HistoryLedger {
  pub fn new(retention: Retention) -> Self {
    Self {
      retention,
      histories: Vec::new(),
    }
  }

  /// Rebuild a ledger from persisted histories, trimming each to the current
  /// retention bound.
  pub fn restore(retention: Retention, histories: Vec<EntityHistory>) -> Self {
    let mut ledger = Self {
      retention,
      histories,
    };
    for history in &mut ledger.histories {
      let max = retention.max_entries(&history.entity);
      history.intervals.truncate(max);
    }
    ledger
  }

  pub fn retention(&self) -> Retention { self.retention }

  pub fn histories(&self) -> &[EntityHistory] { &self.histories }

  pub fn into_histories(self) -> Vec<EntityHistory> { self.histories }

  /// The intervals for `entity`, most recent first.
  pub fn history(&self, entity: &EntityId) -> &[HistoryInterval] {
    self
      .histories
      .iter()
      .find(|history| &history.entity == entity)
      .map(|history| history.intervals.as_slice())
      .unwrap_or(&[])
  }

  pub fn head(&self, entity: &EntityId) -> Option<&HistoryInterval> {
    self.history(entity).first()
  }

  /// Record that `entity` was observed in `state` at `now`.
  ///
  /// Re-observing the head's state is a no-op. Otherwise the open head (if
  /// any) is closed at `now`, a new open interval is pushed to the front and
  /// the tail is evicted down to the retention bound. Returns `true` when a
  /// new interval was opened.
  pub fn record_observation(
    &mut self,
    entity: &EntityId,
    state: CanonicalState,
    now: DateTime<Utc>,
  ) -> bool {
    let max = self.retention.max_entries(entity);
    let history = self.history_mut(entity);

    if let Some(head) = history.intervals.first_mut() {
      if head.status == state {
        trace!(%entity, %state, "episode continues");
        return false;
      }
      if head.is_open() {
        head.close(now);
        debug!(
          %entity,
          from = %head.status,
          to = %state,
          duration_secs = head.duration_seconds,
          "closed history interval"
        );
      }
    }

    history.intervals.insert(0, HistoryInterval::open(state, now));

    if history.intervals.len() > max {
      let evicted = history.intervals.len() - max;
      history.intervals.truncate(max);
      debug!(%entity, evicted, "evicted oldest history intervals");
    }
    true
  }

  fn history_mut(&mut self, entity: &EntityId) -> &mut EntityHistory {
    let index = match self
      .histories
      .iter()
      .position(|history| &history.entity == entity)
    {
      Some(index) => index,
      None => {
        self.histories.push(EntityHistory {
          entity:    entity.clone(),
          intervals: Vec::new(),
        });
        self.histories.len() - 1
      }
    };
    &mut self.histories[index]
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;
  use crate::normalize::CanonicalState::*;

  fn at(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

  fn ledger() -> HistoryLedger { HistoryLedger::new(Retention::default()) }

  #[test]
  fn first_observation_opens_an_interval() {
    let mut ledger = ledger();
    assert!(ledger.record_observation(&EntityId::Global, Operational, at(0)));

    let history = ledger.history(&EntityId::Global);
    assert_eq!(history, &[HistoryInterval::open(Operational, at(0))]);
  }

  #[test]
  fn same_state_is_a_no_op() {
    let mut ledger = ledger();
    ledger.record_observation(&EntityId::Global, Degraded, at(0));
    assert!(!ledger.record_observation(&EntityId::Global, Degraded, at(60)));
    assert!(!ledger.record_observation(&EntityId::Global, Degraded, at(120)));

    let history = ledger.history(&EntityId::Global);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].started_at, at(0));
    assert!(history[0].is_open());
  }

  #[test]
  fn transitions_close_the_previous_interval() {
    let mut ledger = ledger();
    let id = EntityId::Global;
    ledger.record_observation(&id, Operational, at(0));
    ledger.record_observation(&id, Degraded, at(100));
    ledger.record_observation(&id, Operational, at(250));

    let history = ledger.history(&id);
    assert_eq!(history.len(), 3);

    assert_eq!(history[0].status, Operational);
    assert!(history[0].is_open());

    assert_eq!(history[1].status, Degraded);
    assert_eq!(history[1].ended_at, Some(at(250)));
    assert_eq!(history[1].duration_seconds, Some(150));

    assert_eq!(history[2].status, Operational);
    assert_eq!(history[2].ended_at, Some(at(100)));
    assert_eq!(history[2].duration_seconds, Some(100));

    assert!(ledger.histories().iter().all(EntityHistory::is_consistent));
  }

  #[test]
  fn retention_keeps_the_most_recent_intervals() {
    let retention = Retention {
      global_max_entries:    4,
      component_max_entries: 2,
    };
    let mut ledger = HistoryLedger::new(retention);
    let global = EntityId::Global;
    let login = EntityId::component("Login");

    let states = [Operational, Degraded];
    for i in 0..7 {
      let state = states[i % 2];
      ledger.record_observation(&global, state, at(i as i64 * 10));
      ledger.record_observation(&login, state, at(i as i64 * 10));
    }

    let history = ledger.history(&global);
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].started_at, at(60));
    assert_eq!(history[3].started_at, at(30));
    assert!(history[0].is_open());

    assert_eq!(ledger.history(&login).len(), 2);
    assert_eq!(ledger.head(&login).unwrap().started_at, at(60));
  }

  #[test]
  fn zero_bound_still_keeps_the_head() {
    let retention = Retention {
      global_max_entries:    0,
      component_max_entries: 0,
    };
    let mut ledger = HistoryLedger::new(retention);
    ledger.record_observation(&EntityId::Global, Operational, at(0));
    ledger.record_observation(&EntityId::Global, Degraded, at(5));
    assert_eq!(ledger.history(&EntityId::Global).len(), 1);
    assert_eq!(ledger.head(&EntityId::Global).unwrap().status, Degraded);
  }

  #[test]
  fn restore_trims_to_a_smaller_bound() {
    let mut big = HistoryLedger::new(Retention::default());
    for i in 0..10 {
      let state = if i % 2 == 0 { Operational } else { Degraded };
      big.record_observation(&EntityId::Global, state, at(i));
    }

    let restored = HistoryLedger::restore(
      Retention {
        global_max_entries:    3,
        component_max_entries: 3,
      },
      big.into_histories(),
    );
    let history = restored.history(&EntityId::Global);
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].started_at, at(9));
  }

  #[test]
  fn closing_never_yields_negative_durations() {
    let mut ledger = ledger();
    ledger.record_observation(&EntityId::Global, Degraded, at(100));
    ledger.record_observation(&EntityId::Global, Operational, at(40));
    let closed = &ledger.history(&EntityId::Global)[1];
    assert_eq!(closed.duration_seconds, Some(0));
    assert_eq!(closed.ended_at, Some(at(100)));
  }

  #[test]
  fn entities_are_listed_in_first_observation_order() {
    let mut ledger = ledger();
    ledger.record_observation(&EntityId::Global, Operational, at(0));
    ledger.record_observation(&EntityId::component("Store"), Operational, at(0));
    ledger.record_observation(&EntityId::component("Login"), Operational, at(0));

    let order: Vec<_> = ledger
      .histories()
      .iter()
      .map(|history| history.entity.to_string())
      .collect();
    assert_eq!(order, ["global", "component:Store", "component:Login"]);
  }
}
