use crate::cache::CachedResponse;
use crate::fetcher::read_limited;
use crate::headers::{self, CacheStatus, PLAYLIST_CONTENT_TYPE};
use crate::rewriter;
use crate::server::AppState;
use crate::util::{ProxyError, Resource, Result};
use actix_web::{HttpRequest, HttpResponse};
use bytes::Bytes;
use http::header::{CACHE_CONTROL, CONTENT_ENCODING, CONTENT_TYPE};
use http::{HeaderValue, StatusCode};
use log::{debug, warn};
use std::sync::Arc;
use url::Url;

pub async fn serve(req: &HttpRequest, state: &AppState, target: &Url) -> Result<HttpResponse> {
    let key = state.cache_key(req);
    let (entry, cache_status) = load(req, state, target, key).await?;

    // re-assert on every path; a cached header set may say otherwise.
    // the stored status is the origin's, the client always gets 200
    let mut headers = entry.headers.clone();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(PLAYLIST_CONTENT_TYPE));
    headers::allow_any_origin(&mut headers);

    Ok(headers::respond(StatusCode::OK, &headers, cache_status).body(entry.body.clone()))
}

/// the rewritten playlist under `key`, fetched and cached on a miss
pub async fn load(
    req: &HttpRequest,
    state: &AppState,
    target: &Url,
    key: String,
) -> Result<(Arc<CachedResponse>, CacheStatus)> {
    if let Some(hit) = state.cache.lookup(&key).await {
        debug!("cache hit for: {}", key);
        return Ok((hit, CacheStatus::Hit));
    }
    debug!("cache miss for: {}", key);

    let origin = state
        .fetcher
        .get(target)
        .await
        .map_err(|e| e.proxying(Resource::Playlist))?;

    let status = origin.status();
    if !status.is_success() {
        warn!("origin answered {} for playlist {}", status, target);
        return Err(ProxyError::OriginStatus {
            resource: Resource::Playlist,
            status,
        });
    }

    let (parts, body) = origin.into_parts();
    let raw = read_limited(body, state.policy.cache_object_max_bytes)
        .await
        .map_err(|e| e.proxying(Resource::Playlist))?;

    let text = String::from_utf8_lossy(&raw);
    let rewritten = rewriter::rewrite(&text, &state.proxy_origin(req));

    let mut headers = headers::forwardable(&parts.headers);
    // the body is new text, whatever the origin encoded
    headers.remove(CONTENT_ENCODING);
    headers.insert(CACHE_CONTROL, headers::cache_control(state.policy.playlist_ttl));

    let entry = Arc::new(CachedResponse {
        status,
        headers,
        body: Bytes::from(rewritten),
    });
    state
        .cache
        .store(key, entry.clone(), state.policy.playlist_ttl);

    Ok((entry, CacheStatus::Miss))
}
