//! Core types and logic for the Beacon status tracker.
//!
//! Takes one fetched snapshot of an upstream status feed, normalises it,
//! detects transitions for the global aggregate and each named component, and
//! keeps bounded per-entity histories plus downtime accounting.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! Persistence goes through [`store::StateStore`]; fetching is the caller's
//! job.

pub mod badge;
pub mod entity;
pub mod error;
pub mod ledger;
pub mod normalize;
pub mod reconcile;
pub mod report;
pub mod snapshot;
pub mod store;

pub use error::{Error, Result};
