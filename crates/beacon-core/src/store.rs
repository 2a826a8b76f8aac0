//! The `StateStore` trait: durable storage for tracker state between runs.
//!
//! Implemented by storage backends (e.g. `beacon-store-sqlite`). The poller
//! and the HTTP surface depend on this abstraction, not on any concrete
//! backend.

use std::future::Future;

use crate::{
  Error, entity::EntityStore, ledger::EntityHistory, reconcile::TrackerState,
  report::Report,
};

/// Entity states and histories exactly as they were last saved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedState {
  pub entities:  EntityStore,
  pub histories: Vec<EntityHistory>,
}

/// Result of reading persisted state at the start of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Loaded {
  /// Nothing saved yet; this is the first run.
  Absent,
  Present(PersistedState),
  /// Something was saved but could not be read back. Always carries
  /// [`Error::StorageCorrupt`]; callers rebuild from scratch rather than fail
  /// the run.
  Corrupt(Error),
}

impl Loaded {
  pub fn corrupt(reason: impl Into<String>) -> Self {
    Self::Corrupt(Error::StorageCorrupt(reason.into()))
  }
}

/// Abstraction over a Beacon state backend.
///
/// A run calls [`load`](Self::load) once at the start and then exactly one of
/// [`save`](Self::save) (successful poll) or
/// [`save_report`](Self::save_report) (failed poll) at the end. Saves are
/// atomic: either everything is written or nothing is.
pub trait StateStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Read the persisted entity states and histories.
  fn load(&self) -> impl Future<Output = Result<Loaded, Self::Error>> + Send + '_;

  /// Replace the persisted state and the latest report in one transaction.
  fn save<'a>(
    &'a self,
    state: &'a TrackerState,
    report: &'a Report,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Replace only the latest report, leaving entity state and histories
  /// untouched.
  fn save_report<'a>(
    &'a self,
    report: &'a Report,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// The report written by the most recent run, if any.
  fn latest_report(
    &self,
  ) -> impl Future<Output = Result<Option<Report>, Self::Error>> + Send + '_;
}
