//! Read-only JSON HTTP surface for Beacon.
//!
//! Exposes an axum [`Router`] backed by any [`StateStore`], serving the same
//! documents the poller publishes to disk so dashboards can read them live.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = beacon_api::api_router(Arc::new(store), "Fortnite");
//! axum::serve(listener, app).await?;
//! ```

pub mod error;
pub mod etag;
pub mod history;
pub mod reports;

use std::sync::Arc;

use axum::{Router, routing::get};
use beacon_core::store::StateStore;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Shared state threaded through all handlers.
pub struct ApiState<S> {
  pub store:       Arc<S>,
  pub badge_label: Arc<str>,
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self {
      store:       Arc::clone(&self.store),
      badge_label: Arc::clone(&self.badge_label),
    }
  }
}

/// Build the API router for `store`.
///
/// | Method | Path | Notes |
/// |--------|------|-------|
/// | `GET`  | `/status.json` | Latest report; 404 before the first run |
/// | `GET`  | `/status-badge.json` | Shields.io endpoint badge |
/// | `GET`  | `/history.json` | Ledger for every entity |
/// | `GET`  | `/healthz` | Liveness |
pub fn api_router<S>(store: Arc<S>, badge_label: &str) -> Router<()>
where
  S: StateStore + 'static,
{
  let state = ApiState {
    store,
    badge_label: Arc::from(badge_label),
  };

  Router::new()
    .route("/status.json", get(reports::status::<S>))
    .route("/status-badge.json", get(reports::badge::<S>))
    .route("/history.json", get(history::handler::<S>))
    .route("/healthz", get(|| async { "ok" }))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
