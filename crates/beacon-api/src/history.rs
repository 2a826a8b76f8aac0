//! Handler for `/history.json`.

use axum::{extract::State, http::HeaderMap, response::Response};
use beacon_core::{
  report::HistoryDocument,
  store::{Loaded, StateStore},
};
use chrono::Utc;

use crate::{ApiState, error::ApiError, etag::json_with_etag};

/// `GET /history.json`
///
/// `generatedAt` is the time of the latest run, so the ETag only changes
/// when a run actually happened.
pub async fn handler<S: StateStore>(
  State(state): State<ApiState<S>>,
  headers: HeaderMap,
) -> Result<Response, ApiError> {
  let loaded = state
    .store
    .load()
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;

  let persisted = match loaded {
    Loaded::Present(persisted) => persisted,
    Loaded::Absent => {
      return Err(ApiError::NotFound("no history has been recorded yet".into()));
    }
    Loaded::Corrupt(error) => return Err(ApiError::Unavailable(error.to_string())),
  };

  let generated_at = state
    .store
    .latest_report()
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .map(|report| report.last_checked())
    .unwrap_or_else(Utc::now);

  let document = HistoryDocument::from_histories(&persisted.histories, generated_at);
  json_with_etag(&headers, &document)
}
