//! Handlers for the latest report and its badge.

use axum::{extract::State, http::HeaderMap, response::Response};
use beacon_core::{badge::Badge, report::Report, store::StateStore};

use crate::{ApiState, error::ApiError, etag::json_with_etag};

async fn latest<S: StateStore>(state: &ApiState<S>) -> Result<Report, ApiError> {
  state
    .store
    .latest_report()
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound("no report has been produced yet".into()))
}

/// `GET /status.json`
pub async fn status<S: StateStore>(
  State(state): State<ApiState<S>>,
  headers: HeaderMap,
) -> Result<Response, ApiError> {
  let report = latest(&state).await?;
  json_with_etag(&headers, &report)
}

/// `GET /status-badge.json`
pub async fn badge<S: StateStore>(
  State(state): State<ApiState<S>>,
  headers: HeaderMap,
) -> Result<Response, ApiError> {
  let report = latest(&state).await?;
  json_with_etag(&headers, &Badge::for_report(&state.badge_label, &report))
}
