use actix_web::{http::header, HttpResponse, ResponseError};
use http::StatusCode;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// which kind of origin resource a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Stream,
    Playlist,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Stream => f.write_str("stream"),
            Resource::Playlist => f.write_str("playlist"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Invalid request. Use ?url= for playlist or /proxy?url= for streams.")]
    Usage,

    #[error("invalid url parameter {url:?}: {reason}")]
    InvalidTarget { url: String, reason: String },

    #[error("Failed to fetch {resource}.")]
    OriginStatus { resource: Resource, status: StatusCode },

    #[error("Error proxying {resource}: {source}")]
    Proxying {
        resource: Resource,
        #[source]
        source: Box<ProxyError>,
    },

    #[error("hyper error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("origin did not respond within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),

    #[error("response body exceeds {0} bytes")]
    BodyTooLarge(usize),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] http::Error),

    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    #[error("tls configuration error: {0}")]
    TlsConfig(String),

    #[error("rustls error: {0}")]
    Rustls(#[from] rustls::Error),
}

impl ProxyError {
    /// wraps a fetch failure so the client sees which resource failed
    pub fn proxying(self, resource: Resource) -> Self {
        match self {
            err @ (ProxyError::Proxying { .. } | ProxyError::OriginStatus { .. }) => err,
            err => ProxyError::Proxying {
                resource,
                source: Box::new(err),
            },
        }
    }
}

impl ResponseError for ProxyError {
    fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::Usage | ProxyError::InvalidTarget { .. } => StatusCode::BAD_REQUEST,
            ProxyError::OriginStatus { status, .. } => *status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
            .content_type("text/plain; charset=utf-8")
            .body(self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;

pub fn setup_logger() {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_bad_requests() {
        assert_eq!(ProxyError::Usage.status_code(), StatusCode::BAD_REQUEST);
        let err = ProxyError::InvalidTarget {
            url: "ftp://x".into(),
            reason: "unsupported scheme ftp".into(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn origin_status_is_passed_through() {
        let err = ProxyError::OriginStatus {
            resource: Resource::Stream,
            status: StatusCode::NOT_FOUND,
        };
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Failed to fetch stream.");
    }

    #[test]
    fn transport_failures_name_the_resource() {
        let err = ProxyError::Timeout(Duration::from_secs(5)).proxying(Resource::Playlist);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.to_string(),
            "Error proxying playlist: origin did not respond within 5s"
        );
    }

    #[test]
    fn proxying_does_not_nest() {
        let err = ProxyError::TooManyRedirects(3)
            .proxying(Resource::Stream)
            .proxying(Resource::Playlist);
        assert_eq!(err.to_string(), "Error proxying stream: stopped after 3 redirects");
    }

    #[test]
    fn error_responses_allow_any_origin() {
        let resp = ProxyError::Usage.error_response();
        assert_eq!(
            resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
    }
}
