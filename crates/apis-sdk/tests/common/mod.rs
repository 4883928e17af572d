//! Shared fixtures for the integration tests

#![allow(dead_code)]

use apis_sdk::{
    ApisClient, ClientBuilder, CollectingNavigator, CollectingNotifier, LoginOutcome, LoginRequest,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

pub struct Harness {
    pub client: ApisClient,
    pub notifier: CollectingNotifier,
    pub navigator: CollectingNavigator,
}

pub fn harness(server: &MockServer) -> Harness {
    harness_with(server, |builder| builder)
}

pub fn harness_with(
    server: &MockServer,
    configure: impl FnOnce(ClientBuilder) -> ClientBuilder,
) -> Harness {
    let notifier = CollectingNotifier::new();
    let navigator = CollectingNavigator::new();
    let builder = ClientBuilder::new()
        .base_url(server.uri())
        .timeout(Duration::from_secs(5))
        .notifier(Arc::new(notifier.clone()))
        .navigator(Arc::new(navigator.clone()));
    let client = configure(builder).build().unwrap();

    Harness {
        client,
        notifier,
        navigator,
    }
}

pub async fn mount_session_config(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/auth/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "mode": "local",
            "setup_required": false,
        })))
        .mount(server)
        .await;
}

/// Token-mode config whose identity provider is the same mock server
pub async fn mount_token_config(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/auth/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "mode": "keycloak",
            "keycloak_authority": format!("{}/realms/honeybee", server.uri()),
            "client_id": "apis-dashboard",
        })))
        .mount(server)
        .await;
}

pub fn user(role: &str, tenant_id: &str) -> Value {
    json!({
        "user": {
            "id": "user-1",
            "email": "keeper@example.com",
            "name": "Keeper",
            "role": role,
            "tenant_id": tenant_id,
        }
    })
}

/// Successful login response that sets the session and CSRF cookies
pub fn login_response(csrf: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .append_header(
            "set-cookie",
            "apis_session=opaque-session; Path=/; HttpOnly; SameSite=Strict",
        )
        .append_header(
            "set-cookie",
            format!("apis_csrf_token={}; Path=/; SameSite=Strict", csrf).as_str(),
        )
        .set_body_json(user("admin", "tenant-home"))
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Unsigned JWT with the given claims
pub fn jwt(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}

pub fn access_token(label: &str) -> String {
    jwt(json!({
        "sub": "kc-user-1",
        "name": "Keeper",
        "email": "keeper@example.com",
        "org_id": "tenant-saas",
        "realm_access": { "roles": ["user", "admin"] },
        "jti": label,
        "exp": unix_now() + 300,
    }))
}

pub fn token_response(access: &str, refresh: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "access_token": access,
        "token_type": "Bearer",
        "expires_in": 300,
        "refresh_token": refresh,
    }))
}

pub fn header<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
}

pub async fn requests_to(server: &MockServer, http_method: &str, request_path: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == http_method && r.url.path() == request_path)
        .collect()
}

pub const TOKEN_PATH: &str = "/realms/honeybee/protocol/openid-connect/token";
pub const REVOKE_PATH: &str = "/realms/honeybee/protocol/openid-connect/revoke";

/// Run the redirect sign-in against the mock provider; returns the access
/// token that was issued
pub async fn redirect_sign_in(server: &MockServer, h: &Harness) -> String {
    let issued = access_token("first");
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(token_response(&issued, "refresh-1"))
        .expect(1)
        .mount(server)
        .await;

    let LoginOutcome::Redirected { url } = h.client.login(LoginRequest::Redirect).await.unwrap()
    else {
        panic!("expected a redirect to the identity provider");
    };
    let url = Url::parse(&url).unwrap();
    assert_eq!(url.path(), "/realms/honeybee/protocol/openid-connect/auth");
    let state = url
        .query_pairs()
        .find(|(key, _)| key == "state")
        .map(|(_, value)| value.into_owned())
        .unwrap();
    assert!(url.query_pairs().any(|(key, value)| key == "code_challenge_method" && value == "S256"));

    h.client.complete_login("auth-code-1", &state).await.unwrap();
    issued
}
