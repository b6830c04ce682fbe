use crate::util::{ProxyError, Result};
use url::{form_urlencoded, Url};

pub const PROXY_PATH: &str = "/proxy";
pub const HEALTH_PATH: &str = "/health";
pub const CHANNELS_PATH: &str = "/channels";

/// what a request asks for. every request maps to exactly one route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Health,
    /// channel list of the playlist at the given url
    Channels(String),
    Stream(String),
    Playlist(String),
    Fallback,
}

/// classifies by path and the `url` query parameter. an empty `url` counts
/// as missing.
pub fn classify(path: &str, query: &str) -> Route {
    let target = url_param(query);
    match (path, target) {
        (HEALTH_PATH, _) => Route::Health,
        (CHANNELS_PATH, Some(target)) => Route::Channels(target),
        (PROXY_PATH, Some(target)) => Route::Stream(target),
        ("/" | "", Some(target)) => Route::Playlist(target),
        ("/", None) => Route::Home,
        _ => Route::Fallback,
    }
}

fn url_param(query: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "url")
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// parses the origin url a client asked for; only absolute http(s) urls qualify
pub fn target_url(raw: &str) -> Result<Url> {
    let invalid = |reason: String| ProxyError::InvalidTarget {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme {}", other))),
    }
}
