// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Thin wrappers over the account API's auth endpoints.

use super::api_client::{ApiClient, ApiRequest};
use crate::error::Result;
use crate::models::{
    ActivateRequest, ForgotPasswordRequest, LoginRequest, LoginResponse, LogoutRequest,
    ProfileUpdate, RegisterRequest, RegisterResponse, ResendActivationRequest,
    ResetPasswordRequest, User,
};

/// Endpoint paths, relative to the API base URL.
pub mod paths {
    pub const REGISTER: &str = "/auth/users/";
    pub const JWT_CREATE: &str = "/auth/jwt/create/";
    pub const JWT_REFRESH: &str = "/auth/jwt/refresh/";
    pub const LOGOUT: &str = "/auth/logout/";
    pub const ME: &str = "/auth/users/me/";
    pub const ACTIVATION: &str = "/auth/users/activation/";
    pub const RESEND_ACTIVATION: &str = "/auth/users/resend_activation/";
    pub const RESET_PASSWORD: &str = "/auth/users/reset_password/";
    pub const RESET_PASSWORD_CONFIRM: &str = "/auth/users/reset_password_confirm/";
}

/// Auth endpoint client.
#[derive(Clone)]
pub struct AuthApi {
    client: ApiClient,
}

impl AuthApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Create an account. The API emails an activation link on success.
    pub async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse> {
        self.client
            .send(ApiRequest::post(paths::REGISTER).json(request)?)
            .await
    }

    /// Exchange credentials for a token pair.
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse> {
        self.client
            .send(
                ApiRequest::post(paths::JWT_CREATE)
                    .json(request)?
                    .skip_refresh(),
            )
            .await
    }

    pub async fn activate(&self, request: &ActivateRequest) -> Result<()> {
        self.client
            .send_empty(ApiRequest::post(paths::ACTIVATION).json(request)?)
            .await
    }

    pub async fn resend_activation(&self, request: &ResendActivationRequest) -> Result<()> {
        self.client
            .send_empty(ApiRequest::post(paths::RESEND_ACTIVATION).json(request)?)
            .await
    }

    /// Request a password reset email. The API answers 204 whether or not
    /// the address exists.
    pub async fn forgot_password(&self, request: &ForgotPasswordRequest) -> Result<()> {
        self.client
            .send_empty(ApiRequest::post(paths::RESET_PASSWORD).json(request)?)
            .await
    }

    pub async fn reset_password(&self, request: &ResetPasswordRequest) -> Result<()> {
        self.client
            .send_empty(ApiRequest::post(paths::RESET_PASSWORD_CONFIRM).json(request)?)
            .await
    }

    /// Current user's profile.
    pub async fn me(&self) -> Result<User> {
        self.client.send(ApiRequest::get(paths::ME)).await
    }

    pub async fn update_me(&self, update: &ProfileUpdate) -> Result<User> {
        self.client
            .send(ApiRequest::patch(paths::ME).json(update)?)
            .await
    }

    /// Blacklist a refresh token server-side.
    pub async fn logout(&self, refresh: &str) -> Result<()> {
        let body = LogoutRequest {
            refresh: refresh.to_string(),
        };
        self.client
            .send_empty(ApiRequest::post(paths::LOGOUT).json(&body)?)
            .await
    }
}
