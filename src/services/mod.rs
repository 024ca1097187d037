// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - API access and session logic.

pub mod api_client;
pub mod api_keys;
pub mod auth_api;
pub mod session;

pub use api_client::{ApiClient, ApiRequest};
pub use api_keys::ApiKeysApi;
pub use auth_api::AuthApi;
pub use session::SessionManager;
