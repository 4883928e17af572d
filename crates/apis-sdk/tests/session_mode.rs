//! Session-mode behavior against a mock APIS server

mod common;

use apis_sdk::{
    ApiError, ErrorKind, Level, LoginError, LoginOutcome, LoginReason, LoginRequest, Redirect,
};
use common::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn password_login() -> LoginRequest {
    LoginRequest::Password {
        email: "keeper@example.com".into(),
        password: "correct horse".into(),
        remember_me: true,
    }
}

async fn signed_in(server: &MockServer) -> Harness {
    mount_session_config(server).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(login_response("csrf-one"))
        .mount(server)
        .await;

    let h = harness(server);
    let outcome = h.client.login(password_login()).await.unwrap();
    assert!(matches!(outcome, LoginOutcome::Authenticated(_)));
    h
}

#[tokio::test]
async fn test_csrf_only_on_state_changing_methods() {
    let server = MockServer::start().await;
    let h = signed_in(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/hives"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/hives"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"data": {"id": "h1"}})))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/hives/h1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let _: serde_json::Value = h.client.get("/api/hives").await.unwrap();
    let _: serde_json::Value = h
        .client
        .post("/api/hives", &json!({"name": "Hive 1"}))
        .await
        .unwrap();
    h.client.delete("/api/hives/h1").await.unwrap();

    let gets = requests_to(&server, "GET", "/api/hives").await;
    assert_eq!(gets.len(), 1);
    assert_eq!(header(&gets[0], "x-csrf-token"), None);
    assert_eq!(header(&gets[0], "authorization"), None);
    assert!(header(&gets[0], "cookie").unwrap().contains("apis_session=opaque-session"));

    let posts = requests_to(&server, "POST", "/api/hives").await;
    assert_eq!(header(&posts[0], "x-csrf-token"), Some("csrf-one"));
    assert_eq!(header(&posts[0], "authorization"), None);

    let deletes = requests_to(&server, "DELETE", "/api/hives/h1").await;
    assert_eq!(header(&deletes[0], "x-csrf-token"), Some("csrf-one"));
}

#[tokio::test]
async fn test_csrf_is_read_fresh_after_rotation() {
    let server = MockServer::start().await;
    let h = signed_in(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/sites"))
        .respond_with(
            ResponseTemplate::new(201)
                .append_header("set-cookie", "apis_csrf_token=csrf-two; Path=/")
                .set_body_json(json!({"data": {}})),
        )
        .mount(&server)
        .await;

    for _ in 0..2 {
        let _: serde_json::Value = h.client.post("/api/sites", &json!({})).await.unwrap();
    }

    let posts = requests_to(&server, "POST", "/api/sites").await;
    assert_eq!(header(&posts[0], "x-csrf-token"), Some("csrf-one"));
    assert_eq!(header(&posts[1], "x-csrf-token"), Some("csrf-two"));
    assert_eq!(h.client.csrf_token().as_deref(), Some("csrf-two"));
}

#[tokio::test]
async fn test_missing_csrf_rejection_is_not_retried() {
    let server = MockServer::start().await;
    mount_session_config(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/hives"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({"error": "CSRF token missing", "code": 403})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server);
    let err = h
        .client
        .post::<_, serde_json::Value>("/api/hives", &json!({}))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert!(h.navigator.redirects().is_empty());
    let notes = h.notifier.notifications();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "Access denied");
}

#[tokio::test]
async fn test_unauthorized_expires_session_once() {
    let server = MockServer::start().await;
    let h = signed_in(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/hives"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Unauthorized", "code": 401})))
        .expect(2)
        .mount(&server)
        .await;

    let (a, b) = tokio::join!(
        h.client.get::<serde_json::Value>("/api/hives"),
        h.client.get::<serde_json::Value>("/api/hives"),
    );

    assert!(matches!(a, Err(ApiError::SessionExpired)));
    assert!(matches!(b, Err(ApiError::SessionExpired)));
    assert_eq!(
        h.navigator.redirects(),
        vec![Redirect::Login {
            reason: LoginReason::SessionExpired
        }]
    );
    assert!(h.notifier.notifications().is_empty());
    assert_eq!(h.client.csrf_token(), None);

    // the mode memo was invalidated, so the next call re-reads the config
    h.client.auth_mode().await;
    assert_eq!(requests_to(&server, "GET", "/api/auth/config").await.len(), 2);
}

#[tokio::test]
async fn test_error_statuses_are_notified() {
    let server = MockServer::start().await;
    mount_session_config(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/hives"))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({"error": "Hive name already exists", "code": 409})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/units"))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server);
    let conflict = h
        .client
        .post::<_, serde_json::Value>("/api/hives", &json!({}))
        .await
        .unwrap_err();
    assert_eq!(conflict.to_string(), "Hive name already exists");

    let limited = h.client.get::<serde_json::Value>("/api/units").await.unwrap_err();
    assert_eq!(limited.kind(), ErrorKind::RateLimited);

    let notes = h.notifier.notifications();
    assert_eq!(notes.len(), 2);
    assert_eq!(notes[0].message, "Hive name already exists");
    assert_eq!(notes[1].title, "Too many requests");
    assert!(notes.iter().all(|n| n.level == Level::Error));
    assert!(h.navigator.redirects().is_empty());
}

#[tokio::test]
async fn test_server_error_text_is_sanitized() {
    let server = MockServer::start().await;
    mount_session_config(&server).await;
    let leaked = jwt(json!({"sub": "u1"}));
    Mock::given(method("GET"))
        .and(path("/api/harvests"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": format!("token {} rejected upstream", leaked),
            "code": 500,
        })))
        .mount(&server)
        .await;

    let h = harness(&server);
    let _ = h.client.get::<serde_json::Value>("/api/harvests").await;

    let notes = h.notifier.notifications();
    assert_eq!(notes.len(), 1);
    assert!(!notes[0].message.contains(&leaked));
    assert!(notes[0].message.contains("[REDACTED]"));
}

#[tokio::test]
async fn test_login_failures() {
    let server = MockServer::start().await;
    mount_session_config(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Invalid credentials", "code": 401})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "Database unavailable", "code": 500})))
        .mount(&server)
        .await;

    let h = harness(&server);
    assert_eq!(
        h.client.login(password_login()).await.unwrap(),
        LoginOutcome::Failed(LoginError::InvalidCredentials)
    );
    assert_eq!(
        h.client.login(password_login()).await.unwrap(),
        LoginOutcome::Failed(LoginError::RateLimited)
    );
    assert_eq!(
        h.client.login(password_login()).await.unwrap(),
        LoginOutcome::Failed(LoginError::Login("Database unavailable".into()))
    );

    // login failures are the caller's to display
    assert!(h.navigator.redirects().is_empty());
    assert!(h.notifier.notifications().is_empty());
}

#[tokio::test]
async fn test_logout_clears_state_when_server_fails() {
    let server = MockServer::start().await;
    let h = signed_in(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    h.client.logout().await;

    let logout = requests_to(&server, "POST", "/api/auth/logout").await;
    assert_eq!(header(&logout[0], "x-csrf-token"), Some("csrf-one"));

    assert_eq!(h.client.csrf_token(), None);
    assert_eq!(
        h.navigator.redirects(),
        vec![Redirect::Login {
            reason: LoginReason::SignedOut
        }]
    );

    let check = h.client.check().await;
    assert!(!check.authenticated);
    assert_eq!(h.client.identity().await, None);

    // the session cookie is gone from later requests
    let me = requests_to(&server, "GET", "/api/auth/me").await;
    assert!(me.iter().all(|r| header(r, "cookie").is_none()));
}

#[tokio::test]
async fn test_concurrent_identity_checks_share_one_lookup() {
    let server = MockServer::start().await;
    mount_session_config(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(user("user", "tenant-home"))
                .set_delay(std::time::Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server);
    h.client.auth_mode().await;

    let (check, identity, permissions) = tokio::join!(
        h.client.check(),
        h.client.identity(),
        h.client.permissions(),
    );

    assert!(check.authenticated);
    assert_eq!(identity.unwrap().tenant_id, "tenant-home");
    assert_eq!(permissions, vec!["user".to_string()]);
}

#[tokio::test]
async fn test_change_password_rejection_keeps_session() {
    let server = MockServer::start().await;
    let h = signed_in(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/auth/change-password"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Current password is incorrect", "code": 401})))
        .mount(&server)
        .await;

    let err = h.client.change_password("wrong", "new-password-123").await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidCredentials));
    assert!(h.navigator.redirects().is_empty());
    assert_eq!(h.client.csrf_token().as_deref(), Some("csrf-one"));

    let request = &requests_to(&server, "POST", "/api/auth/change-password").await[0];
    assert_eq!(header(request, "x-csrf-token"), Some("csrf-one"));
}

#[tokio::test]
async fn test_impersonation_reloads_into_target_tenant() {
    let server = MockServer::start().await;
    let h = signed_in(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user("admin", "tenant-home")))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user("admin", "tenant-target")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/admin/impersonate/tenant-target"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "impersonating": true,
                "tenant_id": "tenant-target",
                "tenant_name": "Target Apiary",
                "original_tenant_id": "tenant-home",
                "started_at": "2026-01-01T00:00:00Z",
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let status = h
        .client
        .impersonate("tenant-target", Some("support ticket"))
        .await
        .unwrap();
    assert!(status.impersonating);
    assert_eq!(status.tenant_name.as_deref(), Some("Target Apiary"));

    assert_eq!(h.navigator.redirects(), vec![Redirect::Reload]);
    assert_eq!(h.client.identity().await.unwrap().tenant_id, "tenant-target");

    let request = &requests_to(&server, "POST", "/api/admin/impersonate/tenant-target").await[0];
    assert_eq!(header(request, "x-csrf-token"), Some("csrf-one"));
    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body, json!({"reason": "support ticket"}));
}

#[tokio::test]
async fn test_impersonation_requires_admin() {
    let server = MockServer::start().await;
    mount_session_config(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/auth/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user("viewer", "tenant-home")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/admin/impersonate/tenant-target"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let h = harness(&server);
    let err = h.client.impersonate("tenant-target", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert!(h.navigator.redirects().is_empty());
}

#[tokio::test]
async fn test_manual_refresh_times_out_and_can_retry() {
    let server = MockServer::start().await;
    mount_session_config(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/beebrain/refresh"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": {"insights": []}}))
                .set_delay(std::time::Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let h = harness_with(&server, |builder| {
        builder.refresh_timeout(std::time::Duration::from_millis(50))
    });
    let outcome = h.client.refresh_insights().await;

    assert!(matches!(outcome, apis_sdk::RefreshOutcome::TimedOut));
    let state = h.client.insights_state();
    assert!(matches!(state, apis_sdk::RefreshState::TimedOut));
    assert!(state.can_retry());
    // a bounded wait is not a user-facing failure
    assert!(h.notifier.notifications().is_empty());
}
