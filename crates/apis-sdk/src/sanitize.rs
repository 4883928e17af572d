//! Redaction of credential-shaped text
//!
//! Server error bodies sometimes echo request material back. Everything that
//! reaches a notification or a log line passes through [`sanitize`] first.

use regex::Regex;
use std::sync::LazyLock;

const REDACTED: &str = "[REDACTED]";

/// Three base64url segments, the first starting like a JSON header
static JWT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]*").unwrap()
});

static BEARER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bbearer\s+[A-Za-z0-9._~+/=-]+").unwrap());

/// `key=value`, `key: value` and `"key":"value"` for secret-bearing keys
static KEY_VALUE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)("?(?:access_token|refresh_token|id_token|csrf_token|apis_csrf_token|apis_session|x-csrf-token|password|client_secret|secret|code_verifier)"?\s*[:=]\s*"?)([^\s"&;,}]+)"#,
    )
    .unwrap()
});

static HEX_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[0-9a-fA-F]{32,}\b").unwrap());

/// Long unbroken token-alphabet runs. `/` is left out so URL paths survive.
static OPAQUE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9+_-]{40,}={0,2}").unwrap());

/// Replace anything that looks like a credential with a placeholder
pub fn sanitize(text: &str) -> String {
    let text = JWT_REGEX.replace_all(text, REDACTED);
    let text = BEARER_REGEX.replace_all(&text, format!("Bearer {}", REDACTED));
    let text = KEY_VALUE_REGEX.replace_all(&text, format!("${{1}}{}", REDACTED));
    let text = HEX_REGEX.replace_all(&text, REDACTED);
    let text = OPAQUE_REGEX.replace_all(&text, REDACTED);
    text.into_owned()
}
