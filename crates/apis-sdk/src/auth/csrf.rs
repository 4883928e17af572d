//! CSRF double-submit constants and the state-changing method check

use reqwest::Method;

/// Script-readable cookie the server sets alongside the session cookie
pub const CSRF_COOKIE_NAME: &str = "apis_csrf_token";

/// Header the server compares against the cookie
pub const CSRF_HEADER_NAME: &str = "X-CSRF-Token";

/// Only create/update/delete verbs carry the CSRF header
pub fn requires_csrf(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}
