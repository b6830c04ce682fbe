use crate::config::Config;
use crate::util::{ProxyError, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use http::header::{ACCEPT_ENCODING, LOCATION, USER_AGENT};
use http::{HeaderValue, Request, Response, StatusCode};
use hyper::body::HttpBody;
use hyper::client::HttpConnector;
use hyper::{Body, Client as HyperClient};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use std::time::Duration;
use url::Url;

pub type OriginResponse = Response<Body>;

/// outbound GET against an arbitrary origin. the body is left unread so
/// callers can stream it.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn get(&self, url: &Url) -> Result<OriginResponse>;
}

#[derive(Clone)]
pub struct OriginFetcher {
    client: HyperClient<HttpsConnector<HttpConnector>>,
    user_agent: HeaderValue,
    timeout: Duration,
    max_redirects: usize,
}

impl OriginFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        // native roots for https origins; plain http stays allowed.
        let https = HttpsConnectorBuilder::new()
            .with_native_roots()
            .https_or_http()
            .enable_http1()
            .build();

        Ok(Self {
            client: HyperClient::builder().build(https),
            user_agent: HeaderValue::from_str(&config.user_agent)?,
            timeout: config.origin_timeout(),
            max_redirects: config.max_redirects,
        })
    }

    async fn send(&self, url: &Url) -> Result<OriginResponse> {
        let req = Request::get(url.as_str())
            .header(USER_AGENT, self.user_agent.clone())
            .header(ACCEPT_ENCODING, "identity")
            .body(Body::empty())?;

        log::debug!("fetching from origin: {}", url);

        match tokio::time::timeout(self.timeout, self.client.request(req)).await {
            Ok(response) => response.map_err(ProxyError::Hyper),
            Err(_) => Err(ProxyError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl Fetch for OriginFetcher {
    async fn get(&self, url: &Url) -> Result<OriginResponse> {
        let mut current = url.clone();
        for _ in 0..=self.max_redirects {
            let response = self.send(&current).await?;
            match redirect_target(&current, &response)? {
                Some(next) => {
                    log::debug!("origin redirected {} -> {}", current, next);
                    current = next;
                }
                None => return Ok(response),
            }
        }
        Err(ProxyError::TooManyRedirects(self.max_redirects))
    }
}

/// where a redirect response points, resolved against the url that produced it
pub fn redirect_target<B>(current: &Url, response: &Response<B>) -> Result<Option<Url>> {
    let follows = matches!(
        response.status(),
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    );
    if !follows {
        return Ok(None);
    }
    let Some(location) = response.headers().get(LOCATION).and_then(|v| v.to_str().ok()) else {
        return Ok(None);
    };
    Ok(Some(current.join(location)?))
}

/// reads a whole body, failing once it grows past `limit` bytes
pub async fn read_limited(mut body: Body, limit: usize) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk?;
        if buf.len() + chunk.len() > limit {
            return Err(ProxyError::BodyTooLarge(limit));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}
