use axum::http::{header, request::Parts, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

pub const CLIENT_TYPE_HEADER: &str = "x-client-type";
pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

const EXTENSION_SCHEME: &str = "chrome-extension";

/// Browser-extension origins are always allowed; everything else must match a
/// configured origin exactly.
pub fn is_allowed_origin(origin: &str, configured: &[String]) -> bool {
    if is_extension_origin(origin) {
        return true;
    }
    configured.iter().any(|allowed| allowed == origin)
}

pub fn is_extension_origin(origin: &str) -> bool {
    url::Url::parse(origin)
        .map(|url| url.scheme() == EXTENSION_SCHEME && url.host_str().is_some())
        .unwrap_or(false)
}

/// CORS layer for the whole router. Preflight requests are answered by the
/// layer itself; disallowed origins get no `Access-Control-Allow-Origin`.
pub fn cors_layer(configured: Vec<String>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                origin
                    .to_str()
                    .map(|origin| is_allowed_origin(origin, &configured))
                    .unwrap_or(false)
            },
        ))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(CLIENT_TYPE_HEADER),
            HeaderName::from_static(CRON_SECRET_HEADER),
        ])
        .allow_credentials(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> Vec<String> {
        vec![
            "http://localhost:3000".to_string(),
            "http://127.0.0.1:3001".to_string(),
        ]
    }

    #[test]
    fn extension_origins_are_allowed() {
        assert!(is_allowed_origin("chrome-extension://abcdefghijklmnop", &configured()));
        assert!(is_allowed_origin("chrome-extension://abcdefghijklmnop", &[]));
    }

    #[test]
    fn configured_origins_match_exactly() {
        assert!(is_allowed_origin("http://localhost:3000", &configured()));
        assert!(!is_allowed_origin("http://localhost:3000.evil.com", &configured()));
        assert!(!is_allowed_origin("https://localhost:3000", &configured()));
        assert!(!is_allowed_origin("http://evil.com/?http://localhost:3000", &configured()));
    }

    #[test]
    fn malformed_extension_origin_is_rejected() {
        assert!(!is_extension_origin("chrome-extension:"));
        assert!(!is_extension_origin("https://chrome-extension.example.com"));
    }
}
