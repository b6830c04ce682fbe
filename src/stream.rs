//! stream proxy: relays one binary resource (segment, mp4, live ts) from
//! its origin, admitting complete bodies to the cache on the way through.

use crate::cache::{CachedResponse, ResponseCache};
use crate::headers::{self, CacheStatus};
use crate::server::AppState;
use crate::util::{ProxyError, Resource, Result};
use actix_web::{HttpRequest, HttpResponse};
use bytes::{Bytes, BytesMut};
use futures_util::stream;
use http::header::CACHE_CONTROL;
use http::{HeaderMap, StatusCode};
use hyper::body::HttpBody;
use hyper::Body;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

/// chunks in flight between the origin and a slow client
const RELAY_DEPTH: usize = 16;

pub async fn serve(req: &HttpRequest, state: &AppState, target: &Url) -> Result<HttpResponse> {
    let key = state.cache_key(req);

    if let Some(hit) = state.cache.lookup(&key).await {
        debug!("cache hit for: {}", key);
        let mut headers = hit.headers.clone();
        headers::allow_any_origin(&mut headers);
        return Ok(headers::respond(StatusCode::OK, &headers, CacheStatus::Hit).body(hit.body.clone()));
    }
    debug!("cache miss for: {}", key);

    let origin = state
        .fetcher
        .get(target)
        .await
        .map_err(|e| e.proxying(Resource::Stream))?;

    let status = origin.status();
    if !status.is_success() {
        warn!("origin answered {} for stream {}", status, target);
        return Err(ProxyError::OriginStatus {
            resource: Resource::Stream,
            status,
        });
    }

    let (parts, body) = origin.into_parts();
    let mut headers = headers::forwardable(&parts.headers);
    headers::default_content_type(&mut headers);
    headers.insert(CACHE_CONTROL, headers::cache_control(state.policy.stream_ttl));

    let limit = state.policy.cache_object_max_bytes;
    let pending = match headers::content_length(&parts.headers) {
        Some(len) if len > limit as u64 => {
            debug!("not caching {}: announced {} bytes", key, len);
            None
        }
        _ => Some(PendingEntry {
            key,
            status,
            headers: headers.clone(),
            ttl: state.policy.stream_ttl,
            spool: Spool::new(limit),
        }),
    };

    headers::allow_any_origin(&mut headers);

    let (tx, rx) = mpsc::channel(RELAY_DEPTH);
    state
        .cache
        .spawn(relay(body, tx, pending, state.cache.clone()));

    let client_body = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });

    Ok(headers::respond(status, &headers, CacheStatus::Miss).streaming(client_body))
}

/// bounded copy of a body being relayed, kept only while it fits
struct Spool {
    buf: BytesMut,
    limit: usize,
}

impl Spool {
    fn new(limit: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            limit,
        }
    }

    /// false once the body no longer fits
    fn push(&mut self, chunk: &Bytes) -> bool {
        if self.buf.len() + chunk.len() > self.limit {
            return false;
        }
        self.buf.extend_from_slice(chunk);
        true
    }
}

struct PendingEntry {
    key: String,
    status: StatusCode,
    headers: HeaderMap,
    ttl: Duration,
    spool: Spool,
}

/// pumps the origin body to the client as chunks arrive. the cache entry is
/// written only after the origin body ended cleanly, so it is never partial.
/// a disconnected client stops the pump unless the cache copy still needs it.
async fn relay(
    mut body: Body,
    tx: mpsc::Sender<Result<Bytes>>,
    mut pending: Option<PendingEntry>,
    cache: ResponseCache,
) {
    let mut client_open = true;

    while let Some(chunk) = body.data().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("origin stream failed: {}", e);
                if client_open {
                    let _ = tx.send(Err(ProxyError::Hyper(e))).await;
                }
                return;
            }
        };

        if let Some(entry) = pending.as_mut() {
            if !entry.spool.push(&chunk) {
                debug!("not caching {}: body exceeds {} bytes", entry.key, entry.spool.limit);
                pending = None;
            }
        }

        if client_open && tx.send(Ok(chunk)).await.is_err() {
            debug!("client went away mid-stream");
            client_open = false;
        }

        if !client_open && pending.is_none() {
            return;
        }
    }

    // end the client body before touching the cache
    drop(tx);

    if let Some(entry) = pending {
        let response = Arc::new(CachedResponse {
            status: entry.status,
            headers: entry.headers,
            body: entry.spool.buf.freeze(),
        });
        cache.put(entry.key, response, entry.ttl).await;
    }
}
