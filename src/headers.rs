//! header normalization shared by the stream and playlist handlers.
//!
//! `http::HeaderMap` is the header bag throughout: lookups are
//! case-insensitive and `insert` replaces every previous value, so a later
//! set never leaves a duplicate behind.

use actix_web::{HttpResponse, HttpResponseBuilder};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use std::time::Duration;

pub const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
pub const CACHE_STATUS_HEADER: &str = "x-streamgate-cache";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// origin headers that are safe to relay. hop-by-hop headers belong to the
/// origin connection, and content-length is recomputed for the new body.
pub fn forwardable(origin: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(origin.len());
    for (name, value) in origin.iter() {
        if is_hop_by_hop(name) || name == header::CONTENT_LENGTH {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    headers
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

pub fn cache_control(max_age: Duration) -> HeaderValue {
    HeaderValue::from_str(&format!("public, max-age={}", max_age.as_secs()))
        .unwrap_or_else(|_| HeaderValue::from_static("public"))
}

pub fn allow_any_origin(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
}

pub fn default_content_type(headers: &mut HeaderMap) {
    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(DEFAULT_CONTENT_TYPE),
        );
    }
}

/// announced body length, if the origin sent a usable one
pub fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// starts a client response carrying `headers` plus the cache status marker
pub fn respond(status: StatusCode, headers: &HeaderMap, cache: CacheStatus) -> HttpResponseBuilder {
    let mut builder = HttpResponse::build(status);
    for (name, value) in headers.iter() {
        builder.append_header((name.clone(), value.clone()));
    }
    builder.insert_header((CACHE_STATUS_HEADER, cache.as_str()));
    builder
}
