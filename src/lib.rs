// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! authflow: client for a JWT-issuing account API
//!
//! This crate persists the session's token pair, sends authenticated
//! requests with single-flight token refresh, and wraps the registration,
//! activation, login, password-reset, profile and API key flows.

pub mod config;
pub mod error;
pub mod forms;
pub mod models;
pub mod services;
pub mod storage;

use config::Config;
use error::Result;
use services::{ApiClient, ApiKeysApi, AuthApi, SessionManager};
use std::time::Duration;
use storage::TokenStore;

/// Shared client state.
#[derive(Clone)]
pub struct ClientState {
    pub config: Config,
    pub session: SessionManager,
    pub api_keys: ApiKeysApi,
}

impl ClientState {
    /// Build the client stack with the durable scope under
    /// `config.storage_dir`.
    pub fn from_config(config: Config) -> Result<Self> {
        let store = TokenStore::with_storage_dir(&config.storage_dir);
        Self::with_store(config, store)
    }

    /// Build the client stack over an existing token store.
    pub fn with_store(config: Config, store: TokenStore) -> Result<Self> {
        let client = ApiClient::from_config(&config, store)?;
        let session = SessionManager::new(
            AuthApi::new(client.clone()),
            Duration::from_secs(config.resend_cooldown_secs),
        );
        let api_keys = ApiKeysApi::new(client);

        Ok(Self {
            config,
            session,
            api_keys,
        })
    }

    pub fn store(&self) -> &TokenStore {
        self.session.store()
    }
}
