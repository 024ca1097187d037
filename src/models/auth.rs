// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Request and response bodies for the auth endpoints.

use serde::{Deserialize, Serialize};

/// Access/refresh token pair as persisted in the token store.
///
/// Both are opaque bearer strings; the client never looks inside them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTokens {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    /// The API logs in by email; the username mirrors it
    pub username: String,
    pub password: String,
    pub re_password: String,
    pub full_name: String,
    pub agreed_to_terms: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegisterResponse {
    pub id: String,
    pub email: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
}

impl From<LoginResponse> for StoredTokens {
    fn from(response: LoginResponse) -> Self {
        Self {
            access: response.access,
            refresh: response.refresh,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshTokenRequest {
    pub refresh: String,
}

/// Refresh response. The refresh token is only present when the server
/// rotates it.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshTokenResponse {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivateRequest {
    pub uid: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResendActivationRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetPasswordRequest {
    pub uid: String,
    pub token: String,
    pub new_password: String,
    pub re_new_password: String,
}

/// Blacklist request body for `POST /auth/logout/`.
#[derive(Debug, Clone, Serialize)]
pub struct LogoutRequest {
    pub refresh: String,
}
