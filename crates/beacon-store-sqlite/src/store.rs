//! [`SqliteStore`] — the SQLite implementation of [`StateStore`].

use std::{
  fs,
  path::{Path, PathBuf},
};

use beacon_core::{
  entity::EntityStore,
  reconcile::TrackerState,
  report::Report,
  store::{Loaded, PersistedState, StateStore},
};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use tracing::{debug, warn};

use crate::{
  Error, Result,
  encode::{RawEntity, RawInterval, encode_dt},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Beacon state backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

/// Everything read by a single `load`, still in column form.
struct RawState {
  entities:  Vec<RawEntity>,
  intervals: Vec<RawInterval>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  ///
  /// A file that SQLite cannot read as a database is moved aside to
  /// `<path>.corrupt-<timestamp>` and a fresh store is created in its place.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    match Self::open_at(path).await {
      Err(e) if e.is_corruption() => {
        let aside = quarantine_path(path, Utc::now());
        warn!(
          path = %path.display(),
          moved_to = %aside.display(),
          error = %e,
          "store file is unreadable; starting fresh"
        );
        fs::rename(path, &aside)?;
        for suffix in ["-wal", "-shm"] {
          let sidecar = with_suffix(path, suffix);
          if sidecar.exists() {
            fs::rename(&sidecar, with_suffix(&aside, suffix))?;
          }
        }
        Self::open_at(path).await
      }
      other => other,
    }
  }

  async fn open_at(path: &Path) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Read all state rows in one read transaction. `None` if nothing has ever
  /// been saved.
  async fn read_raw(&self) -> Result<Option<RawState>> {
    let raw = self
      .conn
      .call(|conn| {
        let tx = conn.transaction()?;

        let saved: Option<String> = tx
          .query_row("SELECT saved_at FROM state_meta WHERE id = 1", [], |row| {
            row.get(0)
          })
          .optional()?;
        if saved.is_none() {
          return Ok(None);
        }

        let entities = {
          let mut stmt = tx.prepare(
            "SELECT entity_kind, entity_name, state, last_changed, down_since
             FROM entities",
          )?;
          stmt
            .query_map([], |row| {
              Ok(RawEntity {
                entity_kind:  row.get(0)?,
                entity_name:  row.get(1)?,
                state:        row.get(2)?,
                last_changed: row.get(3)?,
                down_since:   row.get(4)?,
              })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let intervals = {
          let mut stmt = tx.prepare(
            "SELECT entity_kind, entity_name, entity_position, position,
                    status, started_at, ended_at, duration_seconds
             FROM intervals
             ORDER BY entity_position, position",
          )?;
          stmt
            .query_map([], |row| {
              Ok(RawInterval {
                entity_kind:      row.get(0)?,
                entity_name:      row.get(1)?,
                entity_position:  row.get(2)?,
                position:         row.get(3)?,
                status:           row.get(4)?,
                started_at:       row.get(5)?,
                ended_at:         row.get(6)?,
                duration_seconds: row.get(7)?,
              })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        tx.commit()?;
        Ok(Some(RawState {
          entities,
          intervals,
        }))
      })
      .await?;
    Ok(raw)
  }

  async fn write_report(&self, report: &Report) -> Result<()> {
    let body = serde_json::to_string(report)?;
    let checked_at = encode_dt(report.last_checked());
    let is_error = report.is_error();

    self
      .conn
      .call(move |conn| {
        upsert_report(conn, &checked_at, is_error, &body)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

fn upsert_report(
  conn: &rusqlite::Connection,
  checked_at: &str,
  is_error: bool,
  body: &str,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO latest_report (id, checked_at, is_error, body)
     VALUES (1, ?1, ?2, ?3)
     ON CONFLICT (id) DO UPDATE SET
       checked_at = excluded.checked_at,
       is_error   = excluded.is_error,
       body       = excluded.body",
    rusqlite::params![checked_at, is_error, body],
  )?;
  Ok(())
}

/// `<path>.corrupt-<YYYYmmddTHHMMSS>`, next to the original.
fn quarantine_path(path: &Path, now: DateTime<Utc>) -> PathBuf {
  with_suffix(path, &format!(".corrupt-{}", now.format("%Y%m%dT%H%M%S")))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
  let mut name = path.as_os_str().to_os_string();
  name.push(suffix);
  PathBuf::from(name)
}

fn decode_persisted(raw: RawState) -> Result<PersistedState> {
  let entities = raw
    .entities
    .into_iter()
    .map(RawEntity::into_entity)
    .collect::<Result<EntityStore>>()?;
  let histories = RawInterval::decode_all(raw.intervals)?;
  Ok(PersistedState {
    entities,
    histories,
  })
}

// ─── StateStore impl ─────────────────────────────────────────────────────────

impl StateStore for SqliteStore {
  type Error = Error;

  async fn load(&self) -> Result<Loaded> {
    let decoded = match self.read_raw().await {
      Ok(None) => {
        debug!("no saved state");
        return Ok(Loaded::Absent);
      }
      Ok(Some(raw)) => decode_persisted(raw),
      Err(e) => Err(e),
    };

    match decoded {
      Ok(persisted) => Ok(Loaded::Present(persisted)),
      Err(e) if e.is_corruption() => {
        warn!(error = %e, "failed to read saved state");
        Ok(Loaded::corrupt(e.to_string()))
      }
      Err(e) => Err(e),
    }
  }

  async fn save(&self, state: &TrackerState, report: &Report) -> Result<()> {
    let entities: Vec<RawEntity> = state
      .entities
      .iter()
      .map(|(id, entity)| RawEntity::encode(id, entity))
      .collect();
    let intervals = RawInterval::encode_all(state.ledger.histories());
    let body = serde_json::to_string(report)?;
    let checked_at = encode_dt(report.last_checked());
    let is_error = report.is_error();
    let saved_at = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM intervals", [])?;
        tx.execute("DELETE FROM entities", [])?;

        {
          let mut insert_entity = tx.prepare(
            "INSERT INTO entities
               (entity_kind, entity_name, state, last_changed, down_since)
             VALUES (?1, ?2, ?3, ?4, ?5)",
          )?;
          for e in &entities {
            insert_entity.execute(rusqlite::params![
              e.entity_kind,
              e.entity_name,
              e.state,
              e.last_changed,
              e.down_since,
            ])?;
          }

          let mut insert_interval = tx.prepare(
            "INSERT INTO intervals
               (entity_kind, entity_name, entity_position, position,
                status, started_at, ended_at, duration_seconds)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          )?;
          for i in &intervals {
            insert_interval.execute(rusqlite::params![
              i.entity_kind,
              i.entity_name,
              i.entity_position,
              i.position,
              i.status,
              i.started_at,
              i.ended_at,
              i.duration_seconds,
            ])?;
          }
        }

        tx.execute(
          "INSERT INTO state_meta (id, saved_at) VALUES (1, ?1)
           ON CONFLICT (id) DO UPDATE SET saved_at = excluded.saved_at",
          rusqlite::params![saved_at],
        )?;
        upsert_report(&tx, &checked_at, is_error, &body)?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    debug!(
      entities = state.entities.len(),
      "saved tracker state"
    );
    Ok(())
  }

  async fn save_report(&self, report: &Report) -> Result<()> {
    self.write_report(report).await
  }

  async fn latest_report(&self) -> Result<Option<Report>> {
    let body: Option<String> = self
      .conn
      .call(|conn| {
        Ok(
          conn
            .query_row("SELECT body FROM latest_report WHERE id = 1", [], |row| {
              row.get(0)
            })
            .optional()?,
        )
      })
      .await?;

    body
      .map(|body| serde_json::from_str(&body).map_err(Error::from))
      .transpose()
  }
}
