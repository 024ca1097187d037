// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Token persistence across two scopes.
//!
//! The token pair lives in exactly one of:
//! - the durable scope ("remember me"), which survives restarts
//! - the session scope, which lasts as long as the process
//!
//! A marker in the durable scope records which one is active. Tokens are
//! stored as-is; expiry is only discovered when the API rejects a request.

pub mod backend;

pub use backend::{FileStorage, MemoryStorage, StorageBackend};

use std::path::PathBuf;
use std::sync::Arc;

use crate::models::StoredTokens;

/// Key holding the JSON-encoded token pair.
pub const TOKEN_KEY: &str = "auth_tokens";
/// Key (durable scope) recording which scope holds the tokens.
pub const STORAGE_TYPE_KEY: &str = "auth_storage_type";

/// Where the token pair is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageScope {
    Durable,
    Session,
}

impl StorageScope {
    /// Value written under [`STORAGE_TYPE_KEY`].
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageScope::Durable => "local",
            StorageScope::Session => "session",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "local" => Some(StorageScope::Durable),
            "session" => Some(StorageScope::Session),
            _ => None,
        }
    }
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode tokens: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),
}

/// Token store over a durable and a session backend.
#[derive(Clone)]
pub struct TokenStore {
    durable: Arc<dyn StorageBackend>,
    session: Arc<dyn StorageBackend>,
}

impl TokenStore {
    pub fn new(durable: Arc<dyn StorageBackend>, session: Arc<dyn StorageBackend>) -> Self {
        Self { durable, session }
    }

    /// Both scopes in memory (tests, ephemeral tools).
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), Arc::new(MemoryStorage::new()))
    }

    /// Durable scope on disk under `dir`, session scope in memory.
    pub fn with_storage_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(
            Arc::new(FileStorage::new(dir)),
            Arc::new(MemoryStorage::new()),
        )
    }

    /// Persist the pair in the scope chosen by `remember`.
    ///
    /// Both scopes are cleared first so only one ever holds tokens.
    pub fn save(&self, tokens: &StoredTokens, remember: bool) -> Result<(), StorageError> {
        let blob = serde_json::to_string(tokens)?;

        self.durable.remove(TOKEN_KEY)?;
        self.session.remove(TOKEN_KEY)?;

        let scope = if remember {
            StorageScope::Durable
        } else {
            StorageScope::Session
        };
        self.durable.set(STORAGE_TYPE_KEY, scope.as_str())?;
        match scope {
            StorageScope::Durable => self.durable.set(TOKEN_KEY, &blob)?,
            StorageScope::Session => self.session.set(TOKEN_KEY, &blob)?,
        }

        tracing::debug!(scope = scope.as_str(), "Tokens saved");
        Ok(())
    }

    /// Load the pair, durable scope first.
    ///
    /// A blob that does not decode counts as no tokens.
    pub fn load(&self) -> Result<Option<StoredTokens>, StorageError> {
        let blob = match self.durable.get(TOKEN_KEY)? {
            Some(blob) => Some(blob),
            None => self.session.get(TOKEN_KEY)?,
        };
        let Some(blob) = blob else {
            return Ok(None);
        };

        match serde_json::from_str(&blob) {
            Ok(tokens) => Ok(Some(tokens)),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable stored tokens");
                Ok(None)
            }
        }
    }

    /// Remove tokens from both scopes along with the scope marker.
    ///
    /// Every removal is attempted; the first failure is reported.
    pub fn clear(&self) -> Result<(), StorageError> {
        let results = [
            self.durable.remove(TOKEN_KEY),
            self.durable.remove(STORAGE_TYPE_KEY),
            self.session.remove(TOKEN_KEY),
        ];
        tracing::debug!("Tokens cleared");
        results.into_iter().collect()
    }

    /// Scope recorded by the last `save`, if any.
    pub fn active_scope(&self) -> Result<Option<StorageScope>, StorageError> {
        Ok(self
            .durable
            .get(STORAGE_TYPE_KEY)?
            .as_deref()
            .and_then(StorageScope::parse))
    }
}
