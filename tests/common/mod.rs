// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process mock of the account API for integration tests.
//!
//! Issues real HS256 JWTs, tracks which tokens are live, and counts calls
//! so tests can assert how many refreshes or requests actually happened.

use authflow::config::Config;
use authflow::models::StoredTokens;
use authflow::storage::{MemoryStorage, TokenStore};
use authflow::ClientState;
use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Token the mock accepts for account activation.
#[allow(dead_code)]
pub const ACTIVATION_TOKEN: &str = "c8k-2b1f0e9a7d";
/// Token the mock accepts for password reset confirmation.
#[allow(dead_code)]
pub const RESET_TOKEN: &str = "c8k-reset-77a1";

const SIGNING_KEY: &[u8] = b"test_signing_key_32_bytes_long!!";

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    token_type: String,
    jti: u64,
    exp: usize,
    iat: usize,
}

#[derive(Debug, Clone)]
struct MockUser {
    id: String,
    email: String,
    password: String,
    full_name: String,
    preferred_language: String,
    active: bool,
}

impl MockUser {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "email": self.email,
            "full_name": self.full_name,
            "preferred_language": self.preferred_language,
            "agreed_to_terms": true,
            "agreed_at": "2026-01-05T10:00:00Z",
            "date_joined": "2026-01-05T10:00:00Z",
        })
    }
}

#[derive(Debug, Clone)]
struct MockKey {
    id: String,
    owner: String,
    name: String,
    key: String,
    is_active: bool,
    created_at: String,
}

impl MockKey {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "prefix": &self.key[..12],
            "is_active": self.is_active,
            "last_used_at": null,
            "created_at": self.created_at,
        })
    }
}

#[derive(Default)]
struct MockData {
    users: Vec<MockUser>,
    live_access: HashSet<String>,
    /// refresh token -> user id
    live_refresh: HashMap<String, String>,
    keys: Vec<MockKey>,
    /// access tokens that successfully fetched the profile
    me_tokens: Vec<String>,
}

/// Shared mock state; counters are public for assertions.
#[derive(Default)]
pub struct MockApi {
    pub requests: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub resend_calls: AtomicUsize,
    pub unauthorized_hits: AtomicUsize,
    pub fail_refresh: AtomicBool,
    pub fail_logout: AtomicBool,
    pub rotate_refresh: AtomicBool,
    pub refresh_delay_ms: AtomicU64,
    /// Delay applied to the next profile fetch only
    pub delay_next_me_ms: AtomicU64,
    /// Fail the next profile fetch with a 500
    pub fail_next_me: AtomicBool,
    next_id: AtomicU64,
    data: Mutex<MockData>,
}

#[allow(dead_code)]
impl MockApi {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn data(&self) -> std::sync::MutexGuard<'_, MockData> {
        self.data.lock().unwrap()
    }

    fn mint(&self, user_id: &str, token_type: &str, lifetime_secs: usize) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as usize;
        let claims = Claims {
            sub: user_id.to_string(),
            token_type: token_type.to_string(),
            jti: self.next_id(),
            exp: now + lifetime_secs,
            iat: now,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SIGNING_KEY),
        )
        .unwrap()
    }

    fn mint_access(&self, user_id: &str) -> String {
        let token = self.mint(user_id, "access", 3600);
        self.data().live_access.insert(token.clone());
        token
    }

    fn mint_refresh(&self, user_id: &str) -> String {
        let token = self.mint(user_id, "refresh", 7 * 86400);
        self.data()
            .live_refresh
            .insert(token.clone(), user_id.to_string());
        token
    }

    /// User ID behind a live bearer access token.
    fn authenticate(&self, headers: &HeaderMap) -> Option<String> {
        let token = headers
            .get(header::AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")?;
        if !self.data().live_access.contains(token) {
            return None;
        }
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(SIGNING_KEY),
            &Validation::new(Algorithm::HS256),
        )
        .ok()?;
        (data.claims.token_type == "access").then_some(data.claims.sub)
    }

    /// Add an activated user and return its ID.
    pub fn seed_user(&self, email: &str, password: &str, full_name: &str) -> String {
        let id = format!("00000000-0000-4000-8000-{:012}", self.next_id());
        self.data().users.push(MockUser {
            id: id.clone(),
            email: email.to_string(),
            password: password.to_string(),
            full_name: full_name.to_string(),
            preferred_language: "python".to_string(),
            active: true,
        });
        id
    }

    /// Issue a token pair directly, bypassing login.
    pub fn issue_tokens(&self, user_id: &str) -> StoredTokens {
        StoredTokens {
            access: self.mint_access(user_id),
            refresh: self.mint_refresh(user_id),
        }
    }

    /// Simulate access-token expiry for every outstanding token.
    pub fn expire_access_tokens(&self) {
        self.data().live_access.clear();
    }

    /// Simulate refresh-token expiry for every outstanding token.
    pub fn expire_refresh_tokens(&self) {
        self.data().live_refresh.clear();
    }

    pub fn live_refresh_count(&self) -> usize {
        self.data().live_refresh.len()
    }

    pub fn is_refresh_live(&self, refresh: &str) -> bool {
        self.data().live_refresh.contains_key(refresh)
    }

    pub fn is_active(&self, email: &str) -> bool {
        self.data()
            .users
            .iter()
            .any(|u| u.email == email && u.active)
    }

    pub fn user_id(&self, email: &str) -> Option<String> {
        self.data()
            .users
            .iter()
            .find(|u| u.email == email)
            .map(|u| u.id.clone())
    }

    /// Access tokens used by successful profile fetches, in order.
    pub fn me_tokens(&self) -> Vec<String> {
        self.data().me_tokens.clone()
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

fn error(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

fn not_authenticated() -> Response {
    error(
        StatusCode::UNAUTHORIZED,
        json!({
            "detail": "Given token not valid for any token type",
            "code": "token_not_valid",
        }),
    )
}

fn field(body: &Value, name: &str) -> String {
    body.get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

async fn count_requests(State(api): State<Arc<MockApi>>, request: Request, next: Next) -> Response {
    api.requests.fetch_add(1, Ordering::SeqCst);
    next.run(request).await
}

async fn register(State(api): State<Arc<MockApi>>, Json(body): Json<Value>) -> Response {
    let email = field(&body, "email");
    let password = field(&body, "password");

    let mut errors = serde_json::Map::new();
    if api.user_id(&email).is_some() {
        errors.insert(
            "email".into(),
            json!(["user with this email already exists."]),
        );
    }
    if password == "password123" {
        errors.insert("password".into(), json!(["This password is too common."]));
    }
    if password != field(&body, "re_password") {
        errors.insert(
            "non_field_errors".into(),
            json!(["The two password fields didn't match."]),
        );
    }
    if body.get("agreed_to_terms") != Some(&json!(true)) {
        errors.insert(
            "agreed_to_terms".into(),
            json!(["You must agree to the Terms of Service and Privacy Policy."]),
        );
    }
    if !errors.is_empty() {
        return error(StatusCode::BAD_REQUEST, Value::Object(errors));
    }

    let id = format!("00000000-0000-4000-8000-{:012}", api.next_id());
    let full_name = field(&body, "full_name");
    api.data().users.push(MockUser {
        id: id.clone(),
        email: email.clone(),
        password,
        full_name: full_name.clone(),
        preferred_language: "python".to_string(),
        active: false,
    });

    (
        StatusCode::CREATED,
        Json(json!({"id": id, "email": email, "full_name": full_name})),
    )
        .into_response()
}

async fn activate(State(api): State<Arc<MockApi>>, Json(body): Json<Value>) -> Response {
    let uid = field(&body, "uid");
    if field(&body, "token") != ACTIVATION_TOKEN {
        return error(
            StatusCode::BAD_REQUEST,
            json!({"token": ["Invalid token for given user."]}),
        );
    }
    let mut data = api.data();
    match data.users.iter_mut().find(|u| u.id == uid) {
        Some(user) if user.active => error(
            StatusCode::FORBIDDEN,
            json!({"detail": "Stale token for given user."}),
        ),
        Some(user) => {
            user.active = true;
            StatusCode::NO_CONTENT.into_response()
        }
        None => error(
            StatusCode::BAD_REQUEST,
            json!({"uid": ["Invalid user id or user doesn't exist."]}),
        ),
    }
}

async fn resend_activation(State(api): State<Arc<MockApi>>) -> Response {
    api.resend_calls.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT.into_response()
}

async fn reset_password() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

async fn reset_password_confirm(
    State(api): State<Arc<MockApi>>,
    Json(body): Json<Value>,
) -> Response {
    if field(&body, "token") != RESET_TOKEN {
        return error(
            StatusCode::BAD_REQUEST,
            json!({"token": ["Invalid token for given user."]}),
        );
    }
    let new_password = field(&body, "new_password");
    if new_password != field(&body, "re_new_password") {
        return error(
            StatusCode::BAD_REQUEST,
            json!({"non_field_errors": ["The two password fields didn't match."]}),
        );
    }
    let uid = field(&body, "uid");
    let mut data = api.data();
    match data.users.iter_mut().find(|u| u.id == uid) {
        Some(user) => {
            user.password = new_password;
            StatusCode::NO_CONTENT.into_response()
        }
        None => error(
            StatusCode::BAD_REQUEST,
            json!({"uid": ["Invalid user id or user doesn't exist."]}),
        ),
    }
}

async fn jwt_create(State(api): State<Arc<MockApi>>, Json(body): Json<Value>) -> Response {
    let email = field(&body, "email");
    let password = field(&body, "password");
    let user = api
        .data()
        .users
        .iter()
        .find(|u| u.email == email && u.password == password && u.active)
        .cloned();

    match user {
        Some(user) => {
            let tokens = api.issue_tokens(&user.id);
            Json(json!({"access": tokens.access, "refresh": tokens.refresh})).into_response()
        }
        None => error(
            StatusCode::UNAUTHORIZED,
            json!({"detail": "No active account found with the given credentials"}),
        ),
    }
}

async fn jwt_refresh(State(api): State<Arc<MockApi>>, Json(body): Json<Value>) -> Response {
    api.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let delay = api.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    let invalid = || {
        error(
            StatusCode::UNAUTHORIZED,
            json!({"detail": "Token is invalid or expired", "code": "token_not_valid"}),
        )
    };
    if api.fail_refresh.load(Ordering::SeqCst) {
        return invalid();
    }

    let refresh = field(&body, "refresh");
    let Some(user_id) = api.data().live_refresh.get(&refresh).cloned() else {
        return invalid();
    };

    let access = api.mint_access(&user_id);
    if api.rotate_refresh.load(Ordering::SeqCst) {
        api.data().live_refresh.remove(&refresh);
        let rotated = api.mint_refresh(&user_id);
        Json(json!({"access": access, "refresh": rotated})).into_response()
    } else {
        Json(json!({"access": access})).into_response()
    }
}

async fn logout(
    State(api): State<Arc<MockApi>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if api.authenticate(&headers).is_none() {
        return not_authenticated();
    }
    api.logout_calls.fetch_add(1, Ordering::SeqCst);

    if api.fail_logout.load(Ordering::SeqCst) {
        return error(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"detail": "Internal server error"}),
        );
    }
    let refresh = field(&body, "refresh");
    if refresh.is_empty() {
        return error(
            StatusCode::BAD_REQUEST,
            json!({"detail": "Refresh token is required."}),
        );
    }
    if api.data().live_refresh.remove(&refresh).is_none() {
        return error(
            StatusCode::BAD_REQUEST,
            json!({"detail": "Invalid or expired token."}),
        );
    }
    Json(json!({"detail": "Successfully logged out."})).into_response()
}

async fn me(State(api): State<Arc<MockApi>>, headers: HeaderMap) -> Response {
    let delay = api.delay_next_me_ms.swap(0, Ordering::SeqCst);
    let fail = api.fail_next_me.swap(false, Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    if fail {
        return error(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"detail": "Internal server error"}),
        );
    }

    let Some(user_id) = api.authenticate(&headers) else {
        return not_authenticated();
    };
    let mut data = api.data();
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
    {
        data.me_tokens.push(token.to_string());
    }
    match data.users.iter().find(|u| u.id == user_id) {
        Some(user) => Json(user.to_json()).into_response(),
        None => not_authenticated(),
    }
}

async fn update_me(
    State(api): State<Arc<MockApi>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let Some(user_id) = api.authenticate(&headers) else {
        return not_authenticated();
    };
    let mut data = api.data();
    let Some(user) = data.users.iter_mut().find(|u| u.id == user_id) else {
        return not_authenticated();
    };
    if let Some(name) = body.get("full_name").and_then(Value::as_str) {
        user.full_name = name.to_string();
    }
    if let Some(language) = body.get("preferred_language").and_then(Value::as_str) {
        user.preferred_language = language.to_string();
    }
    Json(user.to_json()).into_response()
}

async fn list_keys(State(api): State<Arc<MockApi>>, headers: HeaderMap) -> Response {
    let Some(user_id) = api.authenticate(&headers) else {
        return not_authenticated();
    };
    let keys: Vec<Value> = api
        .data()
        .keys
        .iter()
        .rev()
        .filter(|k| k.owner == user_id)
        .map(MockKey::to_json)
        .collect();
    Json(Value::Array(keys)).into_response()
}

async fn create_key(
    State(api): State<Arc<MockApi>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let Some(user_id) = api.authenticate(&headers) else {
        return not_authenticated();
    };
    let n = api.next_id();
    let key = MockKey {
        id: format!("10000000-0000-4000-8000-{:012}", n),
        owner: user_id,
        name: body
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("Default")
            .to_string(),
        key: format!("pk_live_{:048x}", n),
        is_active: true,
        created_at: format!("2026-02-01T00:00:{:02}Z", n % 60),
    };
    api.data().keys.push(key.clone());

    let mut created = key.to_json();
    created["key"] = json!(key.key);
    (StatusCode::CREATED, Json(created)).into_response()
}

fn key_not_found() -> Response {
    error(
        StatusCode::NOT_FOUND,
        json!({"detail": "No APIKey matches the given query."}),
    )
}

async fn get_key(
    State(api): State<Arc<MockApi>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let Some(user_id) = api.authenticate(&headers) else {
        return not_authenticated();
    };
    let data = api.data();
    match data.keys.iter().find(|k| k.id == id && k.owner == user_id) {
        Some(key) => Json(key.to_json()).into_response(),
        None => key_not_found(),
    }
}

async fn update_key(
    State(api): State<Arc<MockApi>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let Some(user_id) = api.authenticate(&headers) else {
        return not_authenticated();
    };
    let mut data = api.data();
    let Some(key) = data
        .keys
        .iter_mut()
        .find(|k| k.id == id && k.owner == user_id)
    else {
        return key_not_found();
    };
    if let Some(name) = body.get("name").and_then(Value::as_str) {
        key.name = name.to_string();
    }
    if let Some(active) = body.get("is_active").and_then(Value::as_bool) {
        key.is_active = active;
    }
    Json(key.to_json()).into_response()
}

async fn delete_key(
    State(api): State<Arc<MockApi>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    let Some(user_id) = api.authenticate(&headers) else {
        return not_authenticated();
    };
    let mut data = api.data();
    let before = data.keys.len();
    data.keys.retain(|k| !(k.id == id && k.owner == user_id));
    if data.keys.len() == before {
        return key_not_found();
    }
    StatusCode::NO_CONTENT.into_response()
}

/// Protected endpoint that rejects every token, fresh or not.
async fn always_unauthorized(State(api): State<Arc<MockApi>>) -> Response {
    api.unauthorized_hits.fetch_add(1, Ordering::SeqCst);
    not_authenticated()
}

fn router(api: Arc<MockApi>) -> Router {
    let routes = Router::new()
        .route("/auth/users/", post(register))
        .route("/auth/users/activation/", post(activate))
        .route("/auth/users/resend_activation/", post(resend_activation))
        .route("/auth/users/reset_password/", post(reset_password))
        .route(
            "/auth/users/reset_password_confirm/",
            post(reset_password_confirm),
        )
        .route("/auth/users/me/", get(me).patch(update_me))
        .route("/auth/jwt/create/", post(jwt_create))
        .route("/auth/jwt/refresh/", post(jwt_refresh))
        .route("/auth/logout/", post(logout))
        .route("/keys/", get(list_keys).post(create_key))
        .route(
            "/keys/{id}/",
            get(get_key).patch(update_key).delete(delete_key),
        )
        .route("/always-unauthorized/", get(always_unauthorized));

    Router::new()
        .nest("/api/v1", routes)
        .layer(middleware::from_fn_with_state(api.clone(), count_requests))
        .with_state(api)
}

/// Running mock server.
pub struct TestServer {
    pub api: Arc<MockApi>,
    pub base_url: String,
}

#[allow(dead_code)]
impl TestServer {
    pub fn config(&self) -> Config {
        Config::default().with_api_url(&self.base_url)
    }

    /// Client stack over a fresh in-memory store.
    pub fn client(&self) -> ClientState {
        self.client_with_store(TokenStore::in_memory())
    }

    pub fn client_with_store(&self, store: TokenStore) -> ClientState {
        ClientState::with_store(self.config(), store).expect("Failed to build client")
    }
}

/// Start the mock API on an ephemeral port.
pub async fn spawn_mock_api() -> TestServer {
    let api = Arc::new(MockApi::default());
    let app = router(api.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind mock API");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        api,
        base_url: format!("http://{}/api/v1", addr),
    }
}

/// Base URL of a port nothing listens on.
#[allow(dead_code)]
pub fn unreachable_api_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/api/v1", addr)
}

/// Token store whose two scopes the test can inspect directly.
#[allow(dead_code)]
pub fn inspectable_store() -> (TokenStore, Arc<MemoryStorage>, Arc<MemoryStorage>) {
    let durable = Arc::new(MemoryStorage::new());
    let session = Arc::new(MemoryStorage::new());
    (
        TokenStore::new(durable.clone(), session.clone()),
        durable,
        session,
    )
}
