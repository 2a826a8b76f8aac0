//! Snapshot reconciliation: merge one normalised snapshot into the persisted
//! state, producing updated state, histories, and a report.
//!
//! The reconciler is the only writer of [`EntityState`] and ledger intervals.
//! It runs once per poll; the ledger is updated on every run, while the
//! `changed` flag only tells publishers whether rewriting their output is
//! worthwhile.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::{
  Result,
  entity::{EntityId, EntityState, EntityStore, Transition},
  ledger::{HistoryLedger, Retention},
  normalize::{CanonicalState, Normalizer},
  report::{ComponentReport, StatusReport},
  snapshot::{NormalizedSnapshot, UpstreamSnapshot},
  store::{Loaded, PersistedState},
};

// ─── TrackerState ────────────────────────────────────────────────────────────

/// Everything carried from one run to the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerState {
  pub entities: EntityStore,
  pub ledger:   HistoryLedger,
}

impl TrackerState {
  /// Empty state: every entity is implicitly `UNKNOWN` with no history.
  pub fn fresh(retention: Retention) -> Self {
    Self {
      entities: EntityStore::new(),
      ledger:   HistoryLedger::new(retention),
    }
  }

  pub fn restore(persisted: PersistedState, retention: Retention) -> Self {
    Self {
      entities: persisted.entities,
      ledger:   HistoryLedger::restore(retention, persisted.histories),
    }
  }

  /// Build the starting state for a run from whatever storage returned.
  /// Corrupt storage is logged and replaced with fresh state.
  pub fn from_loaded(loaded: Loaded, retention: Retention) -> Self {
    match loaded {
      Loaded::Absent => Self::fresh(retention),
      Loaded::Present(persisted) => Self::restore(persisted, retention),
      Loaded::Corrupt(error) => {
        warn!(%error, "stored state is unreadable; rebuilding from scratch");
        Self::fresh(retention)
      }
    }
  }
}

// ─── Result ──────────────────────────────────────────────────────────────────

/// Output of [`Reconciler::reconcile`].
#[derive(Debug, Clone)]
pub struct ReconcileResult {
  pub state:   TrackerState,
  /// Whether the global state or the set of non-operational components
  /// differs from the previous run.
  pub changed: bool,
  pub report:  StatusReport,
}

// ─── Reconciler ──────────────────────────────────────────────────────────────

/// A normaliser and retention policy bundled together.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
  normalizer: Normalizer,
  retention:  Retention,
}

impl Reconciler {
  pub fn new(normalizer: Normalizer, retention: Retention) -> Self {
    Self {
      normalizer,
      retention,
    }
  }

  pub fn retention(&self) -> Retention { self.retention }

  pub fn normalize(&self, upstream: &UpstreamSnapshot) -> Result<NormalizedSnapshot> {
    NormalizedSnapshot::from_upstream(upstream, &self.normalizer)
  }

  /// Starting state for a run, using this reconciler's retention bounds.
  pub fn restore(&self, loaded: Loaded) -> TrackerState {
    TrackerState::from_loaded(loaded, self.retention)
  }

  /// Merge `snapshot`, observed at `now`, into `previous`.
  ///
  /// The global entity is processed first, then each component in snapshot
  /// order. Components missing from the snapshot keep their last known state.
  pub fn reconcile(
    &self,
    previous: TrackerState,
    snapshot: &NormalizedSnapshot,
    now: DateTime<Utc>,
  ) -> ReconcileResult {
    let TrackerState {
      mut entities,
      mut ledger,
    } = previous;
    if ledger.retention() != self.retention {
      ledger = HistoryLedger::restore(self.retention, ledger.into_histories());
    }

    let previously_down = entities.non_operational_components();

    let mut global = entities.global();
    let global_transition = observe(
      &mut ledger,
      &EntityId::Global,
      &mut global,
      snapshot.indicator,
      now,
    );
    entities.put(EntityId::Global, global.clone());

    let mut components = Vec::with_capacity(snapshot.components.len());
    for component in &snapshot.components {
      let id = EntityId::component(&component.name);
      let mut entity = entities.get(&id).cloned().unwrap_or_default();
      let transition = observe(&mut ledger, &id, &mut entity, component.state, now);

      components.push(ComponentReport {
        name:             component.name.clone(),
        status:           entity.state,
        message:          entity.state.message().to_owned(),
        last_changed:     entity.last_changed,
        down_since:       entity.down_since,
        downtime_seconds: transition.downtime_secs,
      });
      entities.put(id, entity);
    }

    let changed = global_transition.changed()
      || previously_down != entities.non_operational_components();

    let report = StatusReport {
      status: global.state,
      message: global.state.message().to_owned(),
      description: snapshot.description.clone(),
      source: None,
      last_checked: now,
      last_changed: global.last_changed,
      down_since: global.down_since,
      downtime_seconds: global_transition.downtime_secs,
      changed,
      components,
    };

    ReconcileResult {
      state: TrackerState { entities, ledger },
      changed,
      report,
    }
  }
}

/// Apply one observation to an entity and its ledger.
fn observe(
  ledger: &mut HistoryLedger,
  id: &EntityId,
  entity: &mut EntityState,
  next: CanonicalState,
  now: DateTime<Utc>,
) -> Transition {
  let transition = entity.observe(next, now);
  if transition.changed() {
    debug!(
      entity = %id,
      from = %transition.from,
      to = %transition.to,
      "state transition"
    );
  }
  ledger.record_observation(id, next, now);
  transition
}
