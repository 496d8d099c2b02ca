use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderMap},
    response::IntoResponse,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use serde_json::Value;

use crate::config;
use crate::error::ApiError;
use crate::handlers::db;
use crate::middleware::cors::{is_extension_origin, CLIENT_TYPE_HEADER};
use crate::middleware::response::{message, ApiResponse};
use crate::middleware::auth::TOKEN_COOKIE;
use crate::services::auth_service::{AuthService, LoginRequest};

const COOKIE_MAX_AGE_DAYS: i64 = 7;

/// The browser extension keeps its token itself and never gets a cookie
pub fn is_extension_client(headers: &HeaderMap) -> bool {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if header(CLIENT_TYPE_HEADER)
        .map(|v| v.trim().eq_ignore_ascii_case("extension"))
        .unwrap_or(false)
    {
        return true;
    }
    if header(header::ORIGIN.as_str()).map(is_extension_origin).unwrap_or(false) {
        return true;
    }
    header(header::USER_AGENT.as_str())
        .map(|ua| ua.contains("chrome-extension"))
        .unwrap_or(false)
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((TOKEN_COOKIE, token))
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config::config().security.secure_cookies)
        .path("/")
        .max_age(time::Duration::days(COOKIE_MAX_AGE_DAYS))
        .build()
}

/// POST /api/auth/login - exchange email and password for a JWT
///
/// Browser callers also receive the token as an HTTP-only `token` cookie.
pub async fn login(
    headers: HeaderMap,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    let pool = db().await?;

    let result = AuthService::new(pool).login(&request, Utc::now()).await?;

    let jar = if is_extension_client(&headers) {
        jar
    } else {
        jar.add(session_cookie(result.token.clone()))
    };
    Ok((jar, ApiResponse::success(result)))
}

/// POST /api/auth/logout - clear the session cookie
pub async fn logout(jar: CookieJar) -> (CookieJar, ApiResponse<Value>) {
    let jar = jar.remove(Cookie::build(TOKEN_COOKIE).path("/"));
    (jar, message("Logged out successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn detects_extension_clients() {
        let mut headers = HeaderMap::new();
        assert!(!is_extension_client(&headers));

        headers.insert(CLIENT_TYPE_HEADER, HeaderValue::from_static("Extension"));
        assert!(is_extension_client(&headers));

        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_static("chrome-extension://abcdef"));
        assert!(is_extension_client(&headers));

        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_static("http://localhost:3000"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("Mozilla/5.0"));
        assert!(!is_extension_client(&headers));
    }

    #[test]
    fn session_cookie_attributes() {
        let cookie = session_cookie("abc".to_string());
        assert_eq!(cookie.name(), TOKEN_COOKIE);
        assert_eq!(cookie.value(), "abc");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(time::Duration::days(7)));
    }
}
