// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models exchanged with the account API.

pub mod api_key;
pub mod auth;
pub mod user;

pub use api_key::{ApiKey, ApiKeyCreated, ApiKeyUpdate};
pub use auth::{
    ActivateRequest, ForgotPasswordRequest, LoginRequest, LoginResponse, RefreshTokenRequest,
    RefreshTokenResponse, RegisterRequest, RegisterResponse, ResendActivationRequest,
    LogoutRequest, ResetPasswordRequest, StoredTokens,
};
pub use user::{ProfileUpdate, ProgrammingLanguage, User};
