//! In-memory cookie jar
//!
//! Replays server cookies on every request like a browser would, but keeps
//! track of the `HttpOnly` attribute so client code can only read the
//! cookies a page script could read.

use parking_lot::RwLock;
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredCookie {
    value: String,
    http_only: bool,
}

/// Parsed `Set-Cookie` header
#[derive(Debug, Clone, PartialEq, Eq)]
struct SetCookie {
    name: String,
    value: String,
    http_only: bool,
    expired: bool,
}

fn parse_set_cookie(raw: &str) -> Option<SetCookie> {
    let mut parts = raw.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = SetCookie {
        name: name.to_string(),
        value: value.trim().trim_matches('"').to_string(),
        http_only: false,
        expired: false,
    };

    for attribute in parts {
        let (key, val) = match attribute.split_once('=') {
            Some((k, v)) => (k.trim(), Some(v.trim())),
            None => (attribute.trim(), None),
        };

        if key.eq_ignore_ascii_case("httponly") {
            cookie.http_only = true;
        } else if key.eq_ignore_ascii_case("max-age") {
            if let Some(age) = val.and_then(|v| v.parse::<i64>().ok()) {
                cookie.expired = age <= 0;
            }
        }
    }

    if cookie.value.is_empty() {
        cookie.expired = true;
    }

    Some(cookie)
}

/// Cookie jar shared between the HTTP transport and the auth layer
#[derive(Debug, Default)]
pub struct CookieJar {
    // host -> cookie name -> cookie
    hosts: RwLock<BTreeMap<String, BTreeMap<String, StoredCookie>>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of a script-readable cookie. HttpOnly cookies are never returned.
    pub fn readable(&self, url: &Url, name: &str) -> Option<String> {
        let host = url.host_str()?;
        self.hosts
            .read()
            .get(host)?
            .get(name)
            .filter(|cookie| !cookie.http_only)
            .map(|cookie| cookie.value.clone())
    }

    /// Drop every cookie, HttpOnly ones included
    pub fn clear(&self) {
        let mut hosts = self.hosts.write();
        let count: usize = hosts.values().map(BTreeMap::len).sum();
        hosts.clear();
        debug!("Cleared {} cookies", count);
    }

    fn store(&self, host: &str, cookie: SetCookie) {
        let mut hosts = self.hosts.write();
        let jar = hosts.entry(host.to_string()).or_default();
        if cookie.expired {
            jar.remove(&cookie.name);
            return;
        }
        jar.insert(
            cookie.name,
            StoredCookie {
                value: cookie.value,
                http_only: cookie.http_only,
            },
        );
    }
}

impl CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let Some(host) = url.host_str() else {
            return;
        };

        for header in cookie_headers {
            if let Some(cookie) = header.to_str().ok().and_then(parse_set_cookie) {
                self.store(host, cookie);
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let host = url.host_str()?;
        let hosts = self.hosts.read();
        let jar = hosts.get(host).filter(|jar| !jar.is_empty())?;

        let header = jar
            .iter()
            .map(|(name, cookie)| format!("{}={}", name, cookie.value))
            .collect::<Vec<_>>()
            .join("; ");
        HeaderValue::from_str(&header).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(jar: &CookieJar, url: &Url, headers: &[&str]) {
        let values: Vec<HeaderValue> = headers
            .iter()
            .map(|h| HeaderValue::from_str(h).unwrap())
            .collect();
        jar.set_cookies(&mut values.iter(), url);
    }

    #[test]
    fn test_http_only_cookie_is_sent_but_not_readable() {
        let url = Url::parse("http://localhost:3000/api/auth/login").unwrap();
        let jar = CookieJar::new();
        set(
            &jar,
            &url,
            &[
                "apis_session=opaque; Path=/; HttpOnly; SameSite=Strict",
                "apis_csrf_token=abc123; Path=/; SameSite=Strict",
            ],
        );

        assert_eq!(jar.readable(&url, "apis_session"), None);
        assert_eq!(jar.readable(&url, "apis_csrf_token").as_deref(), Some("abc123"));

        let header = jar.cookies(&url).unwrap();
        let header = header.to_str().unwrap();
        assert!(header.contains("apis_session=opaque"));
        assert!(header.contains("apis_csrf_token=abc123"));
    }

    #[test]
    fn test_negative_max_age_deletes() {
        let url = Url::parse("http://localhost:3000/").unwrap();
        let jar = CookieJar::new();
        set(&jar, &url, &["apis_csrf_token=abc; Path=/"]);
        set(&jar, &url, &["apis_csrf_token=; Path=/; Max-Age=-1"]);

        assert_eq!(jar.readable(&url, "apis_csrf_token"), None);
        assert!(jar.cookies(&url).is_none());
    }

    #[test]
    fn test_rotation_replaces_value() {
        let url = Url::parse("http://localhost:3000/").unwrap();
        let jar = CookieJar::new();
        set(&jar, &url, &["apis_csrf_token=first"]);
        set(&jar, &url, &["apis_csrf_token=second"]);
        assert_eq!(jar.readable(&url, "apis_csrf_token").as_deref(), Some("second"));

        jar.clear();
        assert_eq!(jar.readable(&url, "apis_csrf_token"), None);
    }

    #[test]
    fn test_malformed_headers_are_ignored() {
        assert_eq!(parse_set_cookie("no-equals-sign"), None);
        assert_eq!(parse_set_cookie("=value"), None);
    }
}
