use actix_web::http::header::{CACHE_CONTROL, ETAG, IF_NONE_MATCH};
use actix_web::{HttpRequest, HttpResponse};
use sha2::{Digest, Sha256};

const INDEX_HTML: &str = include_str!("../static/index.html");

/// the player page, with its etag computed once at startup
pub struct HomePage {
    body: &'static str,
    etag: String,
}

impl HomePage {
    pub fn new() -> Self {
        Self::from_body(INDEX_HTML)
    }

    fn from_body(body: &'static str) -> Self {
        // etag from a sha256 of the document, like any other static asset
        let mut hasher = Sha256::new();
        hasher.update(body.as_bytes());
        let etag = format!("\"{}\"", &hex::encode(hasher.finalize())[..32]);
        Self { body, etag }
    }

    pub fn etag(&self) -> &str {
        &self.etag
    }

    pub fn serve(&self, req: &HttpRequest) -> HttpResponse {
        let fresh = req
            .headers()
            .get(IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|tag| tag == self.etag);

        if fresh {
            return HttpResponse::NotModified()
                .insert_header((ETAG, self.etag.clone()))
                .finish();
        }

        HttpResponse::Ok()
            .insert_header((ETAG, self.etag.clone()))
            .insert_header((CACHE_CONTROL, "no-cache"))
            .content_type("text/html; charset=utf-8")
            .body(self.body)
    }
}

impl Default for HomePage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::test::TestRequest;

    #[test]
    fn etag_is_quoted_hex() {
        let page = HomePage::from_body("<html></html>");
        assert_eq!(page.etag().len(), 34);
        assert!(page.etag().starts_with('"') && page.etag().ends_with('"'));
        assert_ne!(page.etag(), HomePage::from_body("<html> </html>").etag());
    }

    #[test]
    fn matching_if_none_match_is_not_modified() {
        let page = HomePage::new();
        let req = TestRequest::get()
            .insert_header((IF_NONE_MATCH, page.etag().to_string()))
            .to_http_request();
        assert_eq!(page.serve(&req).status(), StatusCode::NOT_MODIFIED);

        let req = TestRequest::get()
            .insert_header((IF_NONE_MATCH, "\"stale\""))
            .to_http_request();
        assert_eq!(page.serve(&req).status(), StatusCode::OK);
    }
}
