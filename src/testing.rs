//! test doubles for the origin and the cache, and helpers that drive
//! requests through the dispatcher.

use crate::cache::{CacheStore, CachedResponse, ResponseCache};
use crate::fetcher::{Fetch, OriginResponse};
use crate::home::HomePage;
use crate::server::{dispatch, AppState, ProxyPolicy};
use crate::util::{ProxyError, Result};
use actix_web::test::TestRequest;
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use http::{Response, StatusCode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// body an origin route produces, rebuilt on every call
#[derive(Clone)]
pub enum FakeBody {
    Chunks(Vec<Bytes>),
    /// sends the bytes, then fails
    BreaksAfter(Bytes),
    /// repeats the chunk forever, like a live feed
    Endless(Bytes),
}

impl FakeBody {
    fn build(&self) -> hyper::Body {
        match self {
            FakeBody::Chunks(chunks) => {
                let chunks: Vec<std::io::Result<Bytes>> = chunks.iter().cloned().map(Ok).collect();
                hyper::Body::wrap_stream(futures_util::stream::iter(chunks))
            }
            FakeBody::BreaksAfter(prefix) => {
                let chunks: Vec<std::io::Result<Bytes>> = vec![
                    Ok(prefix.clone()),
                    Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "origin reset")),
                ];
                hyper::Body::wrap_stream(futures_util::stream::iter(chunks))
            }
            FakeBody::Endless(chunk) => {
                let chunks = futures_util::stream::repeat(chunk.clone()).map(Ok::<_, std::io::Error>);
                hyper::Body::wrap_stream(chunks)
            }
        }
    }
}

pub fn bytes_body(chunks: &[&str]) -> FakeBody {
    FakeBody::Chunks(
        chunks
            .iter()
            .map(|c| Bytes::copy_from_slice(c.as_bytes()))
            .collect(),
    )
}

pub fn failing_body(prefix: &str) -> FakeBody {
    FakeBody::BreaksAfter(Bytes::copy_from_slice(prefix.as_bytes()))
}

pub fn endless_body(chunk: &str) -> FakeBody {
    FakeBody::Endless(Bytes::copy_from_slice(chunk.as_bytes()))
}

#[derive(Clone)]
enum Route {
    Respond {
        status: StatusCode,
        headers: Vec<(String, String)>,
        body: FakeBody,
    },
    Unreachable,
}

/// scripted origin that counts every fetch
#[derive(Default)]
pub struct FakeOrigin {
    routes: HashMap<String, Route>,
    calls: AtomicUsize,
}

impl FakeOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, url: &str, status: StatusCode, headers: &[(&str, &str)], body: FakeBody) -> Self {
        let headers = headers
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        self.routes
            .insert(url.to_string(), Route::Respond { status, headers, body });
        self
    }

    pub fn unreachable(mut self, url: &str) -> Self {
        self.routes.insert(url.to_string(), Route::Unreachable);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetch for FakeOrigin {
    async fn get(&self, url: &Url) -> Result<OriginResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.routes.get(url.as_str()) {
            Some(Route::Respond { status, headers, body }) => {
                let mut builder = Response::builder().status(*status);
                for (name, value) in headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                Ok(builder.body(body.build())?)
            }
            Some(Route::Unreachable) => Err(ProxyError::Timeout(Duration::from_secs(1))),
            None => Ok(Response::builder()
                .status(StatusCode::NOT_FOUND)
                .body(hyper::Body::empty())?),
        }
    }
}

/// in-memory cache that never expires and counts writes
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Arc<CachedResponse>>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn only_entry(&self) -> Arc<CachedResponse> {
        let entries = self.entries.lock().unwrap();
        assert_eq!(entries.len(), 1, "expected exactly one cached entry");
        entries.values().next().cloned().unwrap()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn lookup(&self, key: &str) -> Option<Arc<CachedResponse>> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    async fn store(&self, key: String, response: Arc<CachedResponse>, _ttl: Duration) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().unwrap().insert(key, response);
    }

    fn entry_count(&self) -> u64 {
        self.entries.lock().unwrap().len() as u64
    }
}

pub fn test_policy() -> ProxyPolicy {
    ProxyPolicy {
        stream_ttl: Duration::from_secs(3600),
        playlist_ttl: Duration::from_secs(300),
        cache_object_max_bytes: 1024 * 1024,
        public_origin: None,
    }
}

pub struct TestApp {
    pub state: web::Data<AppState>,
    pub origin: Arc<FakeOrigin>,
    pub store: Arc<MemoryStore>,
}

impl TestApp {
    /// GETs `uri` on the test host and renders errors the way actix would
    pub async fn call(&self, uri: &str) -> HttpResponse {
        self.request(get(uri).to_http_request()).await
    }

    pub async fn request(&self, req: HttpRequest) -> HttpResponse {
        match dispatch(req, self.state.clone()).await {
            Ok(resp) => resp,
            Err(e) => e.error_response(),
        }
    }
}

pub fn test_app(origin: FakeOrigin, store: MemoryStore) -> TestApp {
    test_app_with(origin, store, test_policy())
}

pub fn test_app_with(origin: FakeOrigin, store: MemoryStore, policy: ProxyPolicy) -> TestApp {
    let origin = Arc::new(origin);
    let store = Arc::new(store);
    let state = web::Data::new(AppState {
        fetcher: origin.clone(),
        cache: ResponseCache::new(store.clone()),
        policy,
        home: HomePage::new(),
    });
    TestApp { state, origin, store }
}

/// a GET addressed to the proxy at http://proxy.test
pub fn get(uri: &str) -> TestRequest {
    TestRequest::get()
        .uri(uri)
        .insert_header((http::header::HOST, "proxy.test"))
}

pub async fn body_bytes(resp: HttpResponse) -> Bytes {
    actix_web::body::to_bytes(resp.into_body())
        .await
        .expect("response body")
}

pub async fn body(resp: HttpResponse) -> String {
    String::from_utf8(body_bytes(resp).await.to_vec()).expect("utf-8 body")
}
