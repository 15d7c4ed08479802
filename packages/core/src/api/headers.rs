//! Conditional-request helpers shared by the fare endpoints.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};

/// Freshness hints for a cacheable response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub max_age: u32,
    pub stale_while_revalidate: u32,
}

impl CachePolicy {
    pub const fn new(max_age: u32, stale_while_revalidate: u32) -> Self {
        Self {
            max_age,
            stale_while_revalidate,
        }
    }

    pub fn header_value(&self) -> HeaderValue {
        HeaderValue::from_str(&format!(
            "max-age={}, stale-while-revalidate={}",
            self.max_age, self.stale_while_revalidate
        ))
        .unwrap_or_else(|_| HeaderValue::from_static("no-cache"))
    }
}

/// Compute a weakly-stable quoted ETag from response bytes.
pub fn compute_etag(body: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("\"{:x}\"", hasher.finish())
}

/// RFC 7231 HTTP-date for `Last-Modified`.
pub fn http_date(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Returns true when `If-None-Match` contains `*` or the exact current ETag.
pub fn if_none_match_matches(headers: &HeaderMap, current_etag: &str) -> bool {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .map(|raw| {
            raw.split(',')
                .map(|tag| tag.trim())
                .any(|tag| tag == "*" || tag == current_etag)
        })
        .unwrap_or(false)
}

/// Serve `body` as JSON with validators, or 304 when the client's copy is current.
pub fn conditional_json(
    request_headers: &HeaderMap,
    body: Vec<u8>,
    modified_at: DateTime<Utc>,
    policy: CachePolicy,
) -> Response {
    let etag = compute_etag(&body);

    let mut headers = HeaderMap::new();
    headers.insert(header::CACHE_CONTROL, policy.header_value());
    if let Ok(value) = HeaderValue::from_str(&etag) {
        headers.insert(header::ETAG, value);
    }
    if let Ok(value) = HeaderValue::from_str(&http_date(modified_at)) {
        headers.insert(header::LAST_MODIFIED, value);
    }

    if if_none_match_matches(request_headers, &etag) {
        return (StatusCode::NOT_MODIFIED, headers).into_response();
    }

    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    (StatusCode::OK, headers, Body::from(body)).into_response()
}
