//! Error types for `beacon-core`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
  /// The upstream feed could not be fetched (network, HTTP status, timeout).
  #[error("fetch failure: {0}")]
  FetchFailure(String),

  /// The upstream payload was missing fields or could not be parsed.
  #[error("malformed snapshot: {0}")]
  MalformedSnapshot(String),

  /// The persisted state could not be read back. Never fatal: the run
  /// starts from fresh state instead.
  #[error("storage corrupt: {0}")]
  StorageCorrupt(String),
}

impl Error {
  /// Whether this error is recovered at the run boundary by publishing an
  /// `ERROR` report instead of reconciling.
  pub fn is_poll_failure(&self) -> bool {
    matches!(self, Self::FetchFailure(_) | Self::MalformedSnapshot(_))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
