//! In-process mock of the portal backend for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use carelink_core::auth::SessionCipher;
use carelink_core::cache::MemoryStorage;
use carelink_core::services::Services;
use carelink_core::{ApiClient, Config, ManualClock, SessionCache, SessionPatch, Tokens};
use serde_json::{json, Value};

pub const PASSWORD: &str = "correct-password";
pub const FIRST_REFRESH_TOKEN: &str = "refresh-0";

/// How long the refresh endpoint takes, so concurrent 401s pile up behind it
pub const REFRESH_DELAY: Duration = Duration::from_millis(300);

#[derive(Default)]
pub struct Backend {
    pub valid_token: Mutex<String>,
    pub role: Mutex<String>,
    pub refresh_calls: AtomicUsize,
    pub user_calls: AtomicUsize,
    pub users_list_calls: AtomicUsize,
    pub rate_limited_calls: AtomicUsize,
    pub rate_limited_once_calls: AtomicUsize,
    pub always_401_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub settings_calls: AtomicUsize,
    pub upload_calls: AtomicUsize,
    pub settings: Mutex<Value>,
}

impl Backend {
    /// Invalidate every issued access token, as if they expired server-side.
    pub fn expire_tokens(&self) {
        *self.valid_token.lock().unwrap() = "expired".to_string();
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let expected = format!("Bearer {}", self.valid_token.lock().unwrap());
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == expected)
    }

    fn user_json(&self) -> Value {
        json!({
            "id": 7,
            "email": "ana@example.com",
            "firstName": "Ana",
            "lastName": "Silva",
            "role": self.role.lock().unwrap().clone(),
        })
    }
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({"message": "Token expired"}))).into_response()
}

async fn login(State(backend): State<Arc<Backend>>, Json(body): Json<Value>) -> Response {
    if body["password"] != PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "Invalid email or password"})),
        )
            .into_response();
    }
    *backend.valid_token.lock().unwrap() = "access-0".to_string();
    Json(json!({
        "user": backend.user_json(),
        "tokens": {"accessToken": "access-0", "refreshToken": FIRST_REFRESH_TOKEN},
    }))
    .into_response()
}

async fn refresh(State(backend): State<Arc<Backend>>, Json(body): Json<Value>) -> Response {
    let n = backend.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
    tokio::time::sleep(REFRESH_DELAY).await;
    let presented = body["refreshToken"].as_str().unwrap_or_default();
    if !presented.starts_with("refresh-") {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "Invalid refresh token"}))).into_response();
    }
    let access = format!("access-{}", n);
    *backend.valid_token.lock().unwrap() = access.clone();
    Json(json!({"accessToken": access, "refreshToken": format!("refresh-{}", n)})).into_response()
}

async fn current_user(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    backend.user_calls.fetch_add(1, Ordering::SeqCst);
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    Json(backend.user_json()).into_response()
}

async fn logout(State(backend): State<Arc<Backend>>) -> Json<Value> {
    backend.logout_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({}))
}

async fn upload(State(backend): State<Arc<Backend>>) -> Json<Value> {
    let n = backend.upload_calls.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({"id": n, "url": format!("/media/{}", n), "contentType": "image/png"}))
}

async fn list_users(State(backend): State<Arc<Backend>>, headers: HeaderMap) -> Response {
    backend.users_list_calls.fetch_add(1, Ordering::SeqCst);
    if !backend.authorized(&headers) {
        return unauthorized();
    }
    Json(json!([backend.user_json()])).into_response()
}

async fn assign_role(
    State(backend): State<Arc<Backend>>,
    Path(user_id): Path<i64>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let mut user = backend.user_json();
    user["id"] = json!(user_id);
    user["role"] = body["role"].clone();
    Json(user)
}

async fn rate_limited(State(backend): State<Arc<Backend>>) -> Response {
    backend.rate_limited_calls.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, "2")],
        Json(json!({"message": "Slow down"})),
    )
        .into_response()
}

async fn rate_limited_once(State(backend): State<Arc<Backend>>) -> Response {
    let n = backend.rate_limited_once_calls.fetch_add(1, Ordering::SeqCst);
    if n == 0 {
        return (StatusCode::TOO_MANY_REQUESTS, [(header::RETRY_AFTER, "1")]).into_response();
    }
    Json(json!({"ok": true})).into_response()
}

async fn always_401(State(backend): State<Arc<Backend>>) -> Response {
    backend.always_401_calls.fetch_add(1, Ordering::SeqCst);
    unauthorized()
}

async fn create_record(Json(body): Json<Value>) -> Response {
    if body.get("dueDate").is_none() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"message": "Due date is required"})),
        )
            .into_response();
    }
    let mut record = body;
    record["id"] = json!(31);
    Json(record).into_response()
}

async fn risk_assessment(Path(record_id): Path<i64>, Json(body): Json<Value>) -> Json<Value> {
    let score = body["answers"].as_object().map_or(0, |a| a.len()) as f64 * 2.5;
    let level = if score >= 5.0 { "HIGH" } else { "LOW" };
    Json(json!({
        "id": 1,
        "recordId": record_id,
        "score": score,
        "riskLevel": level,
        "recommendations": ["Schedule a follow-up visit"],
    }))
}

async fn get_settings(State(backend): State<Arc<Backend>>) -> Json<Value> {
    backend.settings_calls.fetch_add(1, Ordering::SeqCst);
    Json(backend.settings.lock().unwrap().clone())
}

async fn patch_settings(State(backend): State<Arc<Backend>>, Json(patch): Json<Value>) -> Json<Value> {
    let mut settings = backend.settings.lock().unwrap();
    if let (Some(target), Some(patch)) = (settings.as_object_mut(), patch.as_object()) {
        for (k, v) in patch {
            target.insert(k.clone(), v.clone());
        }
    }
    Json(settings.clone())
}

async fn server_error() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "maintenance window").into_response()
}

/// Start the mock backend on an ephemeral port.
pub async fn spawn_backend(role: &str) -> (Arc<Backend>, SocketAddr) {
    let backend = Arc::new(Backend {
        role: Mutex::new(role.to_string()),
        settings: Mutex::new(json!({"language": "en", "notifications": true})),
        ..Backend::default()
    });

    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh-token", post(refresh))
        .route("/api/auth/user", get(current_user))
        .route("/api/auth/logout", post(logout))
        .route("/api/users", get(list_users))
        .route("/api/users/{id}/role", put(assign_role))
        .route("/api/limited", get(rate_limited))
        .route("/api/limited-once", get(rate_limited_once))
        .route("/api/always-401", get(always_401))
        .route("/api/unavailable", get(server_error))
        .route("/api/pregnancy/records", post(create_record))
        .route("/api/pregnancy/records/{id}/risk-assessment", post(risk_assessment))
        .route("/api/settings", get(get_settings).patch(patch_settings))
        .route("/api/media", post(upload))
        .with_state(backend.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (backend, addr)
}

pub struct Harness {
    pub backend: Arc<Backend>,
    pub api: ApiClient,
    pub services: Services,
    pub session: SessionCache,
    pub storage: Arc<MemoryStorage>,
    pub clock: ManualClock,
}

pub async fn harness(role: &str) -> Harness {
    let (backend, addr) = spawn_backend(role).await;
    let config = Config {
        api_base_url: format!("http://{}/api", addr),
        ..Config::default()
    };
    let storage = Arc::new(MemoryStorage::new());
    let clock = ManualClock::default();
    let session = SessionCache::new(
        storage.clone(),
        SessionCipher::from_key(&[42u8; 32]),
        Arc::new(clock.clone()),
    );
    let api = ApiClient::new(&config, session.clone()).unwrap();
    let services = Services::new(api.clone(), config.ttl());
    Harness {
        backend,
        api,
        services,
        session,
        storage,
        clock,
    }
}

/// A server that accepts connections and never answers. Returns its address
/// and the number of connections accepted so far.
pub async fn spawn_silent_server() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            held.push(socket);
        }
    });
    (addr, accepted)
}

/// An address nothing listens on.
pub fn closed_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// A signed-in client for `addr` with a short request timeout.
pub fn client_at(addr: SocketAddr, timeout_secs: u64) -> ApiClient {
    let config = Config {
        api_base_url: format!("http://{}/api", addr),
        request_timeout_secs: timeout_secs,
        ..Config::default()
    };
    let session = SessionCache::new(
        Arc::new(MemoryStorage::new()),
        SessionCipher::from_key(&[42u8; 32]),
        Arc::new(ManualClock::default()),
    );
    session.set(SessionPatch::default().tokens(Tokens::new("access-0", FIRST_REFRESH_TOKEN)));
    ApiClient::new(&config, session).unwrap()
}
