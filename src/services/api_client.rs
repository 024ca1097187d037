// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authenticated request pipeline for the account API.
//!
//! Handles:
//! - Bearer token attachment from the token store
//! - Silent access-token refresh when a request is rejected with 401
//! - Single-flight refresh: concurrent 401s queue behind one refresh call
//! - One replay per request, so a bad token can never loop

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

use super::auth_api::paths;
use crate::config::{normalize_base_url, Config};
use crate::error::{ApiErrorBody, ClientError, Result};
use crate::models::{RefreshTokenRequest, RefreshTokenResponse, StoredTokens};
use crate::storage::{StorageScope, TokenStore};

/// A call to the account API, relative to the base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
    refresh_on_401: bool,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            refresh_on_401: true,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| ClientError::Decode(format!("Failed to encode request body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Treat a 401 as a final answer instead of refreshing the session.
    ///
    /// Used by credential exchanges, where 401 means "wrong credentials".
    pub fn skip_refresh(mut self) -> Self {
        self.refresh_on_401 = false;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether this request has already been replayed after a refresh.
    pub fn is_retried(&self) -> bool {
        self.retried
    }
}

/// What a queued request receives when the refresh settles: the new access
/// token, or the reason the session ended.
type RefreshOutcome = std::result::Result<String, String>;

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

/// HTTP client for the account API with automatic token refresh.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    store: TokenStore,
    /// Single-flight guard shared by every clone of this client.
    refresh: Arc<Mutex<RefreshState>>,
}

impl ApiClient {
    /// Create a client with default HTTP settings.
    pub fn new(base_url: &str, store: TokenStore) -> Self {
        Self::with_http_client(reqwest::Client::new(), base_url, store)
    }

    pub fn with_http_client(http: reqwest::Client, base_url: &str, store: TokenStore) -> Self {
        Self {
            http,
            base_url: normalize_base_url(base_url),
            store,
            refresh: Arc::new(Mutex::new(RefreshState::default())),
        }
    }

    /// Create a client using the configured base URL and timeout.
    pub fn from_config(config: &Config, store: TokenStore) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self::with_http_client(http, &config.api_url, store))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Send a request and decode its JSON response.
    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let path = request.path.clone();
        let response = self.execute(request).await?;
        response
            .json()
            .await
            .map_err(|e| ClientError::Decode(format!("{}: {}", path, e)))
    }

    /// Send a request whose response body is irrelevant (e.g. 204).
    pub async fn send_empty(&self, request: ApiRequest) -> Result<()> {
        self.execute(request).await?;
        Ok(())
    }

    async fn execute(&self, mut request: ApiRequest) -> Result<reqwest::Response> {
        let access = self.store.load()?.map(|t| t.access);
        let response = self.dispatch(&request, access.as_deref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED
            || !request.refresh_on_401
            || request.retried
        {
            return check_response(response).await;
        }

        let rejection = error_from_response(response).await;
        tracing::debug!(path = %request.path, "Access token rejected");

        let access = self.fresh_access_token(access.as_deref(), rejection).await?;

        // Replay once; a second 401 is returned to the caller as-is.
        request.retried = true;
        let response = self.dispatch(&request, Some(&access)).await?;
        check_response(response).await
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        access_token: Option<&str>,
    ) -> Result<reqwest::Response> {
        let mut builder = self
            .http
            .request(request.method.clone(), self.url(&request.path));
        if let Some(token) = access_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        Ok(builder.send().await?)
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.refresh.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Obtain a usable access token after `rejected` was refused.
    ///
    /// Exactly one caller at a time performs the refresh. Callers arriving
    /// while it is in flight are queued and settled with its outcome.
    /// Callers arriving after it completed find a newer token in the store
    /// and use that directly.
    async fn fresh_access_token(
        &self,
        rejected: Option<&str>,
        rejection: ClientError,
    ) -> Result<String> {
        enum Role {
            Leader,
            Waiter(oneshot::Receiver<RefreshOutcome>),
            Replay(String),
        }

        let role = {
            let mut state = self.lock_state();
            if state.in_flight {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                Role::Waiter(rx)
            } else {
                match self.store.load() {
                    Ok(Some(tokens)) if Some(tokens.access.as_str()) != rejected => {
                        Role::Replay(tokens.access)
                    }
                    _ => {
                        state.in_flight = true;
                        Role::Leader
                    }
                }
            }
        };

        match role {
            Role::Replay(access) => {
                tracing::debug!("Token already refreshed by another request");
                Ok(access)
            }
            Role::Waiter(rx) => {
                tracing::debug!("Refresh in flight, queueing request");
                match rx.await {
                    Ok(Ok(access)) => Ok(access),
                    Ok(Err(reason)) => Err(ClientError::SessionExpired(reason)),
                    Err(_) => Err(ClientError::SessionExpired(
                        "token refresh was abandoned".to_string(),
                    )),
                }
            }
            Role::Leader => {
                let flight = RefreshFlight::new(&self.refresh);
                let outcome = self.perform_refresh(rejection).await;
                flight.settle(&outcome);
                outcome
            }
        }
    }

    async fn perform_refresh(&self, rejection: ClientError) -> Result<String> {
        let tokens = match self.store.load() {
            Ok(Some(tokens)) => tokens,
            Ok(None) => {
                tracing::info!("No refresh token stored, dropping session");
                self.clear_store();
                return Err(rejection);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read stored tokens, dropping session");
                self.clear_store();
                return Err(rejection);
            }
        };

        // Keep the pair in whichever scope login chose.
        let remember = !matches!(self.store.active_scope(), Ok(Some(StorageScope::Session)));

        tracing::info!("Refreshing access token");
        let response = match self.request_refresh(&tokens.refresh).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed, forcing logout");
                self.clear_store();
                return Err(ClientError::SessionExpired(e.to_string()));
            }
        };

        let rotated = response.refresh.is_some();
        let refreshed = StoredTokens {
            access: response.access,
            refresh: response.refresh.unwrap_or(tokens.refresh),
        };

        if let Err(e) = self.store.save(&refreshed, remember) {
            tracing::warn!(error = %e, "Failed to persist refreshed tokens, forcing logout");
            self.clear_store();
            return Err(ClientError::SessionExpired(format!(
                "failed to persist refreshed tokens: {}",
                e
            )));
        }

        tracing::info!(rotated, "Access token refreshed");
        Ok(refreshed.access)
    }

    /// Exchange a refresh token. Goes straight to the API: no bearer header,
    /// no retry.
    async fn request_refresh(&self, refresh_token: &str) -> Result<RefreshTokenResponse> {
        let response = self
            .http
            .post(self.url(paths::JWT_REFRESH))
            .json(&RefreshTokenRequest {
                refresh: refresh_token.to_string(),
            })
            .send()
            .await?;

        check_response(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Decode(format!("refresh response: {}", e)))
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "Failed to clear stored tokens");
        }
    }
}

/// Marks a refresh in flight; resets the flag when dropped so a cancelled
/// leader cannot wedge the pipeline. Orphaned waiters see a closed channel.
struct RefreshFlight<'a> {
    state: &'a Mutex<RefreshState>,
    settled: bool,
}

impl<'a> RefreshFlight<'a> {
    fn new(state: &'a Mutex<RefreshState>) -> Self {
        Self {
            state,
            settled: false,
        }
    }

    fn take_waiters(&self) -> Vec<oneshot::Sender<RefreshOutcome>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.in_flight = false;
        std::mem::take(&mut state.waiters)
    }

    /// Clear the flag and hand the outcome to every queued request.
    fn settle(mut self, outcome: &Result<String>) {
        self.settled = true;
        let shared: RefreshOutcome = match outcome {
            Ok(access) => Ok(access.clone()),
            Err(ClientError::SessionExpired(reason)) => Err(reason.clone()),
            Err(e) => Err(e.to_string()),
        };

        let waiters = self.take_waiters();
        if !waiters.is_empty() {
            tracing::debug!(count = waiters.len(), "Settling queued requests");
        }
        for waiter in waiters {
            // A waiter that went away no longer needs the answer.
            let _ = waiter.send(shared.clone());
        }
    }
}

impl Drop for RefreshFlight<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let waiters = self.take_waiters();
        tracing::warn!(
            queued = waiters.len(),
            "Token refresh abandoned before completing"
        );
    }
}

/// Check response status and return error if not successful.
async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    Err(error_from_response(response).await)
}

async fn error_from_response(response: reqwest::Response) -> ClientError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    tracing::debug!(status, body = %body, "Account API rejected request");
    ClientError::Api {
        status,
        errors: ApiErrorBody::parse(&body),
    }
}
