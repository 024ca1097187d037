// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session lifecycle: restore, login, logout and the account flows.
//!
//! Holds the signed-in user's profile in memory. The profile is never
//! persisted; `restore` re-fetches it from the stored tokens.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;

use super::auth_api::AuthApi;
use crate::error::{ClientError, FieldErrors, Result};
use crate::forms::{ForgotPasswordForm, LoginForm, ResendCooldown, ResetPasswordForm, SignupForm};
use crate::models::{
    ActivateRequest, ProfileUpdate, RegisterResponse, ResendActivationRequest, StoredTokens, User,
};
use crate::storage::TokenStore;

/// Signed-in state shared by every clone.
#[derive(Clone)]
pub struct SessionManager {
    api: AuthApi,
    user: Arc<RwLock<Option<User>>>,
    /// Bumped on every login/logout. A profile fetch started under an older
    /// epoch must not overwrite the newer state.
    epoch: Arc<AtomicU64>,
    resend_cooldown: Arc<Mutex<ResendCooldown>>,
}

impl SessionManager {
    pub fn new(api: AuthApi, resend_cooldown: Duration) -> Self {
        Self {
            api,
            user: Arc::new(RwLock::new(None)),
            epoch: Arc::new(AtomicU64::new(0)),
            resend_cooldown: Arc::new(Mutex::new(ResendCooldown::new(resend_cooldown))),
        }
    }

    pub fn api(&self) -> &AuthApi {
        &self.api
    }

    pub fn store(&self) -> &TokenStore {
        self.api.client().store()
    }

    pub async fn current_user(&self) -> Option<User> {
        self.user.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.user.read().await.is_some()
    }

    /// Re-establish the session from stored tokens.
    ///
    /// Any failure to fetch the profile drops the stored tokens. Auth
    /// failures just mean "not signed in"; other errors are returned after
    /// the cleanup.
    pub async fn restore(&self) -> Result<Option<User>> {
        let started = self.epoch.load(Ordering::SeqCst);

        let Some(_) = self.store().load()? else {
            return Ok(None);
        };

        match self.api.me().await {
            Ok(user) => {
                let mut slot = self.user.write().await;
                if self.epoch.load(Ordering::SeqCst) != started {
                    tracing::debug!("Session changed while restoring, discarding profile");
                    return Ok(slot.clone());
                }
                *slot = Some(user.clone());
                tracing::info!(user_id = %user.id, "Session restored");
                Ok(Some(user))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to restore session");
                {
                    let mut slot = self.user.write().await;
                    if self.epoch.load(Ordering::SeqCst) == started {
                        *slot = None;
                        self.clear_store();
                    }
                }
                if e.is_auth_failure() {
                    Ok(None)
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Sign in and load the profile.
    ///
    /// Tokens go to the durable scope when `remember_me` is set, to the
    /// session scope otherwise. If the profile cannot be loaded the tokens
    /// are discarded again.
    pub async fn login(&self, form: &LoginForm) -> Result<User> {
        form.check().map_err(ClientError::Validation)?;

        let tokens: StoredTokens = self.api.login(&form.to_request()).await?.into();

        // Claim the session before saving so a restore still in flight
        // cannot clear the new pair.
        let epoch = {
            let _slot = self.user.write().await;
            self.epoch.fetch_add(1, Ordering::SeqCst) + 1
        };
        self.store().save(&tokens, form.remember_me)?;

        match self.api.me().await {
            Ok(user) => {
                let mut slot = self.user.write().await;
                if self.epoch.load(Ordering::SeqCst) == epoch {
                    *slot = Some(user.clone());
                } else {
                    tracing::debug!("Session changed while signing in, not caching profile");
                }
                tracing::info!(
                    user_id = %user.id,
                    remember = form.remember_me,
                    "Signed in"
                );
                Ok(user)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Signed in but profile fetch failed");
                let mut slot = self.user.write().await;
                if self.epoch.load(Ordering::SeqCst) == epoch {
                    self.epoch.fetch_add(1, Ordering::SeqCst);
                    *slot = None;
                    self.clear_store();
                }
                Err(e)
            }
        }
    }

    /// Sign out. The server-side blacklist call is best effort; local
    /// tokens are cleared from both scopes regardless of its outcome.
    pub async fn logout(&self) -> Result<()> {
        let tokens = self.store().load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read stored tokens during logout");
            None
        });

        if let Some(tokens) = tokens {
            if let Err(e) = self.api.logout(&tokens.refresh).await {
                self.retry_blacklist(&tokens.refresh, e).await;
            }
        }

        self.reset_local().await;
        self.store().clear()?;
        tracing::info!("Signed out");
        Ok(())
    }

    /// Create an account. Nothing is stored; the user activates by email
    /// and then signs in.
    pub async fn signup(&self, form: &SignupForm) -> Result<RegisterResponse> {
        form.check().map_err(ClientError::Validation)?;
        let created = self.api.register(&form.to_request()).await?;
        tracing::info!(user_id = %created.id, "Account created, activation pending");
        Ok(created)
    }

    pub async fn activate(&self, uid: &str, token: &str) -> Result<()> {
        if uid.trim().is_empty() || token.trim().is_empty() {
            return Err(ClientError::Validation(FieldErrors::single(
                "non_field_errors",
                "Invalid activation link",
            )));
        }
        self.api
            .activate(&ActivateRequest {
                uid: uid.to_string(),
                token: token.to_string(),
            })
            .await?;
        tracing::info!("Account activated");
        Ok(())
    }

    /// Ask for another activation email, at most once per cooldown period.
    ///
    /// The window is claimed before sending and released again if the
    /// request fails.
    pub async fn resend_activation(&self, email: &str) -> Result<()> {
        let previous = {
            let mut cooldown = self.lock_cooldown();
            let remaining = cooldown.remaining();
            if !remaining.is_zero() {
                let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                return Err(ClientError::CooldownActive(secs));
            }
            cooldown.mark_sent()
        };

        let sent = self
            .api
            .resend_activation(&ResendActivationRequest {
                email: email.trim().to_string(),
            })
            .await;
        if sent.is_err() {
            self.lock_cooldown().rollback(previous);
        }
        sent
    }

    pub async fn forgot_password(&self, form: &ForgotPasswordForm) -> Result<()> {
        form.check().map_err(ClientError::Validation)?;
        self.api.forgot_password(&form.to_request()).await
    }

    pub async fn reset_password(&self, form: &ResetPasswordForm) -> Result<()> {
        form.check().map_err(ClientError::Validation)?;
        self.api.reset_password(&form.to_request()).await?;
        tracing::info!("Password reset");
        Ok(())
    }

    /// Update the writable profile fields and refresh the cached profile.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User> {
        if update.is_empty() {
            return Err(ClientError::Validation(FieldErrors::single(
                "non_field_errors",
                "Nothing to update",
            )));
        }
        if let Some(name) = &update.full_name {
            if name.trim().is_empty() {
                return Err(ClientError::Validation(FieldErrors::single(
                    "full_name",
                    crate::forms::FULL_NAME_REQUIRED,
                )));
            }
        }

        if self.store().load()?.is_none() {
            return Err(ClientError::NotAuthenticated);
        }

        match self.api.update_me(update).await {
            Ok(user) => {
                *self.user.write().await = Some(user.clone());
                Ok(user)
            }
            Err(e) => {
                if e.is_auth_failure() {
                    self.reset_local().await;
                }
                Err(e)
            }
        }
    }

    /// The blacklist call may have gone through a refresh that rotated the
    /// refresh token, leaving `sent` already dead. Try once more with the
    /// rotated one.
    async fn retry_blacklist(&self, sent: &str, error: ClientError) {
        let current = match self.store().load() {
            Ok(Some(current)) if current.refresh != sent => current,
            _ => {
                tracing::warn!(error = %error, "Server-side logout failed, clearing local session anyway");
                return;
            }
        };

        tracing::debug!("Refresh token rotated during logout, retrying blacklist");
        if let Err(e) = self.api.logout(&current.refresh).await {
            tracing::warn!(error = %e, "Server-side logout failed, clearing local session anyway");
        }
    }

    async fn reset_local(&self) {
        let mut slot = self.user.write().await;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *slot = None;
    }

    fn clear_store(&self) {
        if let Err(e) = self.store().clear() {
            tracing::warn!(error = %e, "Failed to clear stored tokens");
        }
    }

    fn lock_cooldown(&self) -> std::sync::MutexGuard<'_, ResendCooldown> {
        self.resend_cooldown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
