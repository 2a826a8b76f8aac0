//! ETag computation and conditional JSON responses.
//!
//! ETags are SHA-256 hashes over the serialised response body, so a document
//! that did not change between polls keeps its ETag.

use axum::{
  body::Body,
  http::{HeaderMap, HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::ApiError;

/// Compute a quoted strong ETag for `body`.
pub fn compute_etag(body: &[u8]) -> String {
  let hash = Sha256::digest(body);
  format!("\"{}\"", hex::encode(hash))
}

/// Whether an `If-None-Match` header already names `etag`.
fn matches_if_none_match(headers: &HeaderMap, etag: &str) -> bool {
  headers
    .get_all(header::IF_NONE_MATCH)
    .iter()
    .filter_map(|value| value.to_str().ok())
    .flat_map(|value| value.split(','))
    .map(str::trim)
    .any(|candidate| candidate == "*" || candidate == etag)
}

/// Serialise `value` as pretty JSON with an ETag, answering `304 Not
/// Modified` when the client already has it.
pub fn json_with_etag<T: Serialize>(
  request_headers: &HeaderMap,
  value: &T,
) -> Result<Response, ApiError> {
  let body = serde_json::to_vec_pretty(value)?;
  let etag = compute_etag(&body);

  let status = if matches_if_none_match(request_headers, &etag) {
    StatusCode::NOT_MODIFIED
  } else {
    StatusCode::OK
  };

  let mut response = if status == StatusCode::NOT_MODIFIED {
    status.into_response()
  } else {
    let mut response = Response::new(Body::from(body));
    response.headers_mut().insert(
      header::CONTENT_TYPE,
      HeaderValue::from_static("application/json"),
    );
    response
  };

  let headers = response.headers_mut();
  headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
  if let Ok(value) = HeaderValue::from_str(&etag) {
    headers.insert(header::ETAG, value);
  }
  Ok(response)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn identical_bodies_share_an_etag() {
    assert_eq!(compute_etag(b"{}"), compute_etag(b"{}"));
    assert_ne!(compute_etag(b"{}"), compute_etag(b"[]"));
    assert!(compute_etag(b"{}").starts_with('"'));
  }

  #[test]
  fn if_none_match_accepts_lists_and_wildcards() {
    let etag = compute_etag(b"x");
    let mut headers = HeaderMap::new();
    headers.insert(
      header::IF_NONE_MATCH,
      HeaderValue::from_str(&format!("\"other\", {etag}")).unwrap(),
    );
    assert!(matches_if_none_match(&headers, &etag));

    headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("*"));
    assert!(matches_if_none_match(&headers, &etag));

    assert!(!matches_if_none_match(&HeaderMap::new(), &etag));
  }
}
