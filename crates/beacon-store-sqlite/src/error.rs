//! Error type for `beacon-store-sqlite`.

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored row decoded but violates a tracker invariant.
  #[error("corrupt row: {0}")]
  Corrupt(String),
}

impl Error {
  /// Whether this error means the stored bytes are unreadable, as opposed to
  /// the database being unreachable. Unreadable storage is recovered by
  /// starting fresh.
  pub fn is_corruption(&self) -> bool {
    match self {
      Self::Database(tokio_rusqlite::Error::Rusqlite(e)) => match e {
        rusqlite::Error::InvalidColumnType(..)
        | rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::IntegralValueOutOfRange(..) => true,
        rusqlite::Error::SqliteFailure(failure, _) => matches!(
          failure.code,
          ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt
        ),
        _ => false,
      },
      Self::DateParse(_) | Self::Corrupt(_) => true,
      _ => false,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
