use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode, header};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use certwatch_api::auth::{self, AuthStateInner, DefaultManager};
use certwatch_api::certificates::CertStateInner;
use certwatch_api::middleware::{InternalToken, JwtSecret};
use certwatch_api::profiles::ProfileStateInner;
use certwatch_api::routes::{auth_router, certificate_router, profile_router};
use certwatch_api::token;
use certwatch_db::{Database, Schema};
use certwatch_gateway::dispatcher::EventBus;
use certwatch_gateway::subscriber;
use certwatch_types::api::{INTERNAL_TOKEN_HEADER, TokenKind};
use certwatch_types::models::{Role, today};

struct Harness {
    auth: Router,
    users: Router,
    certs: Router,
    secret: JwtSecret,
    bus: EventBus,
    auth_state: auth::AuthState,
    identity_db: Arc<Database>,
    profiles_db: Arc<Database>,
}

fn harness(internal: Option<&str>) -> Harness {
    let secret = JwtSecret::new("integration-secret");
    let internal_token = InternalToken::new(internal.map(str::to_string));
    let bus = EventBus::new();

    let identity_db = Arc::new(Database::open_in_memory(Schema::Identity).unwrap());
    let profiles_db = Arc::new(Database::open_in_memory(Schema::Profiles).unwrap());
    let certs_db = Arc::new(Database::open_in_memory(Schema::Certificates).unwrap());

    let auth_state = Arc::new(AuthStateInner {
        db: identity_db.clone(),
        bus: bus.clone(),
        jwt_secret: secret.clone(),
        internal_token: internal_token.clone(),
        shutdown: CancellationToken::new(),
    });

    Harness {
        auth: auth_router(auth_state.clone()),
        users: profile_router(Arc::new(ProfileStateInner {
            db: profiles_db.clone(),
            jwt_secret: secret.clone(),
            internal_token: internal_token.clone(),
        })),
        certs: certificate_router(Arc::new(CertStateInner {
            db: certs_db,
            jwt_secret: secret.clone(),
            internal_token,
        })),
        secret,
        bus,
        auth_state,
        identity_db,
        profiles_db,
    }
}

impl Harness {
    fn token(&self, id: i64, role: Role) -> String {
        token::issue(&self.secret, id, role, TokenKind::Access).unwrap()
    }
}

/// Send a request and return (status, headers, raw body).
async fn send_raw(
    app: &Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Body,
) -> (StatusCode, HeaderMap, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri);
    for &(name, value) in headers {
        builder = builder.header(name, value);
    }
    let resp = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body.to_vec())
}

/// Send an optional JSON body with an optional bearer token; parse the reply
/// as JSON.
async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let bearer = token.map(|t| format!("Bearer {t}"));
    let mut headers = vec![("content-type", "application/json")];
    if let Some(bearer) = bearer.as_deref() {
        headers.push(("authorization", bearer));
    }
    let body = match body {
        Some(v) => Body::from(v.to_string()),
        None => Body::empty(),
    };
    let (status, _, bytes) = send_raw(app, method, uri, &headers, body).await;
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn registration(username: &str, email: &str) -> Value {
    json!({ "username": username, "email": email, "password": "hunter22" })
}

// -- Identity --

#[tokio::test]
async fn manager_registration_requires_manager_caller() {
    let h = harness(None);
    let mut body = registration("boss", "boss@x.io");
    body["role"] = json!("manager");

    let (status, _) = send(&h.auth, "POST", "/auth/register", None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let user = h.token(5, Role::User);
    let (status, _) = send(&h.auth, "POST", "/auth/register", Some(&user), Some(body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(h.identity_db.get_identity_by_username("boss").unwrap().is_none());

    let manager = h.token(1, Role::Manager);
    let (status, reply) = send(&h.auth, "POST", "/auth/register", Some(&manager), Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reply["user"]["role"], "manager");
    assert!(reply["access_token"].is_string());
    assert!(reply["refresh_token"].is_string());
}

#[tokio::test]
async fn register_validates_and_rejects_duplicates() {
    let h = harness(None);

    let (status, _) = send(
        &h.auth,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "username": "  ", "email": "a@x.io", "password": "pw" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&h.auth, "POST", "/auth/register", None, Some(registration("alice", "alice@x.io"))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, reply) = send(&h.auth, "POST", "/auth/register", None, Some(registration("alice", "other@x.io"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(reply["msg"], "username is already taken");

    let (status, _) = send(&h.auth, "POST", "/auth/register", None, Some(registration("alice2", "alice@x.io"))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(h.identity_db.get_identity_by_username("alice2").unwrap().is_none());
    assert!(h.identity_db.get_identity_by_email("other@x.io").unwrap().is_none());
}

#[tokio::test]
async fn bootstrap_seeds_one_manager_across_restarts() {
    let h = harness(None);
    let manager = DefaultManager {
        username: "admin".into(),
        password: "change-me-now".into(),
        email: "admin@x.io".into(),
    };

    let first = auth::bootstrap_manager(&h.auth_state, &manager).await.unwrap();
    let second = auth::bootstrap_manager(&h.auth_state, &manager).await.unwrap();
    assert!(first.is_some());
    assert!(second.is_none());
    assert_eq!(h.identity_db.count_managers().unwrap(), 1);

    let (status, reply) = send(
        &h.auth,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "username": "admin", "password": "change-me-now" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["user"]["role"], "manager");
}

#[tokio::test]
async fn login_and_refresh() {
    let h = harness(None);
    send(&h.auth, "POST", "/auth/register", None, Some(registration("dave", "dave@x.io"))).await;

    let (status, _) = send(
        &h.auth,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "username": "dave", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&h.auth, "POST", "/auth/login", None, Some(json!({ "username": "dave" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, reply) = send(
        &h.auth,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "username": "dave", "password": "hunter22" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let access = reply["access_token"].as_str().unwrap().to_string();
    let refresh = reply["refresh_token"].as_str().unwrap().to_string();

    let (status, _) = send(&h.auth, "POST", "/auth/refresh", Some(&access), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, reply) = send(&h.auth, "POST", "/auth/refresh", Some(&refresh), None).await;
    assert_eq!(status, StatusCode::OK);
    let fresh = reply["access_token"].as_str().unwrap();
    let claims = token::verify(&h.secret, fresh, TokenKind::Access).unwrap();
    assert_eq!(claims.role, Role::User);
}

#[tokio::test]
async fn update_is_limited_to_self_or_manager() {
    let h = harness(None);
    let (_, reply) = send(&h.auth, "POST", "/auth/register", None, Some(registration("erin", "erin@x.io"))).await;
    let id = reply["user"]["id"].as_i64().unwrap();
    let own = reply["access_token"].as_str().unwrap().to_string();
    let uri = format!("/auth/update/{id}");

    let (status, _) = send(&h.auth, "PUT", &uri, None, Some(json!({ "phone": "+1" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let stranger = h.token(id + 1, Role::User);
    let (status, _) = send(&h.auth, "PUT", &uri, Some(&stranger), Some(json!({ "phone": "+1" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&h.auth, "PUT", &uri, Some(&own), Some(json!({ "role": "manager" }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, reply) = send(&h.auth, "PUT", &uri, Some(&own), Some(json!({ "phone": "+7900" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["user"]["phone"], "+7900");
    assert_eq!(reply["user"]["username"], "erin");

    let manager = h.token(1, Role::Manager);
    let (status, _) = send(&h.auth, "PUT", "/auth/update/999", Some(&manager), Some(json!({ "phone": "+1" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// -- Propagation --

async fn wait_for_profile(h: &Harness, id: i64, check: impl Fn(&Value) -> bool) -> Value {
    let uri = format!("/users/public/{id}");
    for _ in 0..100 {
        let (status, body) = send(&h.users, "GET", &uri, None, None).await;
        if status == StatusCode::OK && check(&body) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("profile {id} never converged");
}

#[tokio::test]
async fn registration_and_update_reach_the_mirror() {
    let h = harness(None);
    let shutdown = CancellationToken::new();
    let mirror = tokio::spawn(subscriber::run_local(
        h.profiles_db.clone(),
        h.bus.subscribe(),
        shutdown.clone(),
    ));

    let (status, reply) = send(
        &h.auth,
        "POST",
        "/auth/register",
        None,
        Some(json!({
            "username": "frank",
            "email": "frank@x.io",
            "password": "hunter22",
            "phone": "+100",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = reply["user"]["id"].as_i64().unwrap();
    let token = reply["access_token"].as_str().unwrap().to_string();

    let profile = wait_for_profile(&h, id, |_| true).await;
    assert_eq!(profile["id"], id);
    assert_eq!(profile["username"], "frank");
    assert_eq!(profile["phone"], "+100");

    let (status, _) = send(
        &h.auth,
        "PUT",
        &format!("/auth/update/{id}"),
        Some(&token),
        Some(json!({ "email": "frank@new.io" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    wait_for_profile(&h, id, |p| p["email"] == "frank@new.io").await;

    shutdown.cancel();
    mirror.await.unwrap();
}

#[tokio::test]
async fn mirror_admin_path_is_manager_only() {
    let h = harness(None);
    let body = json!({ "id": 40, "username": "gina", "email": "gina@x.io" });

    let user = h.token(2, Role::User);
    let (status, _) = send(&h.users, "POST", "/users", Some(&user), Some(body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let manager = h.token(1, Role::Manager);
    let (status, _) = send(&h.users, "POST", "/users", Some(&manager), Some(json!({ "username": "x", "email": "y" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, reply) = send(&h.users, "POST", "/users", Some(&manager), Some(body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reply["id"], 40);

    let (status, _) = send(&h.users, "POST", "/users", Some(&manager), Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, reply) = send(&h.users, "PUT", "/users/40", Some(&manager), Some(json!({ "role": "manager" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["role"], "manager");

    let (status, reply) = send(&h.users, "GET", "/users", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["users"].as_array().unwrap().len(), 1);

    let (status, _) = send(&h.users, "DELETE", "/users/40", Some(&manager), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&h.users, "GET", "/users/40", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// -- Certificates --

fn certificate(name: &str, start: &str, end: &str, owner: i64) -> Value {
    json!({ "name": name, "date_start": start, "date_end": end, "owner_id": owner })
}

fn in_days(days: i64) -> String {
    (today() + chrono::Duration::days(days)).format("%Y-%m-%d").to_string()
}

#[tokio::test]
async fn certificate_reads_respect_ownership() {
    let h = harness(None);
    let manager = h.token(1, Role::Manager);
    let owner = h.token(2, Role::User);
    let stranger = h.token(3, Role::User);

    let (status, _) = send(&h.certs, "POST", "/certificates", Some(&owner), Some(certificate("TLS", "2025-01-01", "2025-12-31", 2))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, created) = send(&h.certs, "POST", "/certificates", Some(&manager), Some(certificate("TLS", "2025-01-01", "2025-12-31", 2))).await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!("/certificates/{}", created["id"]);

    assert_eq!(send(&h.certs, "GET", &uri, Some(&owner), None).await.0, StatusCode::OK);
    assert_eq!(send(&h.certs, "GET", &uri, Some(&stranger), None).await.0, StatusCode::FORBIDDEN);
    assert_eq!(send(&h.certs, "GET", &uri, Some(&manager), None).await.0, StatusCode::OK);
    assert_eq!(send(&h.certs, "GET", &uri, None, None).await.0, StatusCode::UNAUTHORIZED);
    assert_eq!(send(&h.certs, "GET", "/certificates/999", Some(&manager), None).await.0, StatusCode::NOT_FOUND);

    let (_, mine) = send(&h.certs, "GET", "/certificates", Some(&owner), None).await;
    assert_eq!(mine["certificates"].as_array().unwrap().len(), 1);
    let (_, theirs) = send(&h.certs, "GET", "/certificates", Some(&stranger), None).await;
    assert!(theirs["certificates"].as_array().unwrap().is_empty());

    let (_, view) = send(&h.certs, "GET", &uri, Some(&owner), None).await;
    assert!(view["days_left"].as_i64().unwrap() >= 0);
}

#[tokio::test]
async fn certificate_dates_are_validated_on_write() {
    let h = harness(None);
    let manager = h.token(1, Role::Manager);

    let (status, _) = send(&h.certs, "POST", "/certificates", Some(&manager), Some(certificate("A", "2025-02-01", "2025-01-31", 1))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(&h.certs, "POST", "/certificates", Some(&manager), Some(certificate("A", "2025-13-01", "2025-12-31", 1))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, created) = send(&h.certs, "POST", "/certificates", Some(&manager), Some(certificate("A", "2020-01-01", "2020-06-01", 1))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["days_left"], 0);
    let uri = format!("/certificates/{}", created["id"]);

    let (status, _) = send(&h.certs, "PUT", &uri, Some(&manager), Some(json!({ "date_start": "2021-01-01" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, updated) = send(&h.certs, "PUT", &uri, Some(&manager), Some(json!({ "name": "B" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["name"], "B");
    assert_eq!(updated["date_end"], "2020-06-01");

    assert_eq!(send(&h.certs, "DELETE", &uri, Some(&manager), None).await.0, StatusCode::OK);
    assert_eq!(send(&h.certs, "DELETE", &uri, Some(&manager), None).await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn expiring_window_is_an_exact_day_match() {
    let h = harness(None);
    let manager = h.token(1, Role::Manager);
    for (name, days) in [("early", 9), ("target", 10), ("late", 11)] {
        let body = certificate(name, &in_days(-100), &in_days(days), 1);
        let (status, _) = send(&h.certs, "POST", "/certificates", Some(&manager), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, reply) = send(&h.certs, "GET", "/certificates/expiring/10", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let list = reply["certificates"].as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["name"], "target");
    assert_eq!(list[0]["days_left"], 10);
}

#[tokio::test]
async fn expiring_horizon_past_the_calendar_is_rejected() {
    let h = harness(None);
    let (status, reply) = send(&h.certs, "GET", "/certificates/expiring/4000000000", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply["msg"], "days out of range");

    let (status, _) = send(&h.certs, "GET", "/certificates/expiring/30", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn internal_reads_require_the_service_token_when_configured() {
    let h = harness(Some("s3cret"));

    let (status, _) = send(&h.certs, "GET", "/certificates/public/1", None, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _, _) = send_raw(
        &h.certs,
        "GET",
        "/certificates/public/1",
        &[(INTERNAL_TOKEN_HEADER, "s3cret")],
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&h.users, "GET", "/users/public/1", None, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn import_keeps_good_rows_and_reports_bad_ones() {
    let h = harness(None);
    let manager = h.token(1, Role::Manager);
    let bearer = format!("Bearer {manager}");
    let csv = "name,date_start,date_end\nGood,2025-01-01,2025-12-31\nBad,2025-01-01,\n";

    let (status, _, body) = send_raw(
        &h.certs,
        "POST",
        "/certificates/import?owner_id=2",
        &[("authorization", bearer.as_str()), ("content-type", "text/csv")],
        Body::from(csv),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let report: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(report["created"].as_array().unwrap().len(), 1);
    assert_eq!(report["created"][0]["row"], 2);
    assert_eq!(report["created"][0]["name"], "Good");
    let errors = report["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].as_str().unwrap().starts_with("row 3:"));

    let owner = h.token(2, Role::User);
    let (_, mine) = send(&h.certs, "GET", "/certificates", Some(&owner), None).await;
    assert_eq!(mine["certificates"][0]["name"], "Good");
}

#[tokio::test]
async fn export_downloads_visible_certificates() {
    let h = harness(None);
    let manager = h.token(1, Role::Manager);
    send(&h.certs, "POST", "/certificates", Some(&manager), Some(certificate("Mine", "2025-01-01", "2025-02-01", 2))).await;
    send(&h.certs, "POST", "/certificates", Some(&manager), Some(certificate("Other", "2025-01-01", "2025-02-01", 3))).await;

    let bearer = format!("Bearer {}", h.token(2, Role::User));
    let (status, headers, body) =
        send_raw(&h.certs, "GET", "/certificates/export", &[("authorization", bearer.as_str())], Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.contains("certificates_export.csv"));
    assert_eq!(
        String::from_utf8(body).unwrap(),
        "name,date_start,date_end\nMine,2025-01-01,2025-02-01\n"
    );
}

#[tokio::test]
async fn every_service_reports_health() {
    let h = harness(Some("s3cret"));
    for app in [&h.auth, &h.users, &h.certs] {
        let (status, body) = send(app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
