//! SQL schema for the Beacon SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Single row, present once any state has been saved.
CREATE TABLE IF NOT EXISTS state_meta (
    id        INTEGER PRIMARY KEY CHECK (id = 1),
    saved_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS entities (
    entity_kind   TEXT NOT NULL,   -- 'global' | 'component'
    entity_name   TEXT NOT NULL,   -- '' for the global entity
    state         TEXT NOT NULL,   -- CanonicalState, SCREAMING_SNAKE_CASE
    last_changed  TEXT,            -- RFC 3339 UTC
    down_since    TEXT,            -- RFC 3339 UTC
    PRIMARY KEY (entity_kind, entity_name)
);

-- Ledger intervals. `position` 0 is the most recent interval of an entity;
-- `entity_position` preserves ledger listing order across entities.
CREATE TABLE IF NOT EXISTS intervals (
    entity_kind       TEXT    NOT NULL,
    entity_name       TEXT    NOT NULL,
    entity_position   INTEGER NOT NULL,
    position          INTEGER NOT NULL,
    status            TEXT    NOT NULL,
    started_at        TEXT    NOT NULL,
    ended_at          TEXT,
    duration_seconds  INTEGER,
    PRIMARY KEY (entity_kind, entity_name, position)
);

-- The report produced by the most recent run, success or failure.
CREATE TABLE IF NOT EXISTS latest_report (
    id          INTEGER PRIMARY KEY CHECK (id = 1),
    checked_at  TEXT    NOT NULL,
    is_error    INTEGER NOT NULL,
    body        TEXT    NOT NULL   -- JSON
);

PRAGMA user_version = 1;
";
