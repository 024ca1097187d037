// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client-side form handling for the auth flows.
//!
//! Forms are checked locally before any network call, and API rejections
//! are mapped back onto form fields plus a one-line summary.

use std::time::{Duration, Instant};
use validator::{Validate, ValidationErrors};

use crate::error::{ClientError, FieldErrors};
use crate::models::{
    ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest,
};

pub const MIN_PASSWORD_LENGTH: usize = 8;

pub const GENERIC_ERROR: &str = "Something went wrong. Please try again.";
pub const PASSWORD_MISMATCH: &str = "Passwords do not match";
pub const PASSWORD_TOO_SHORT: &str = "Password must be at least 8 characters";
pub const FULL_NAME_REQUIRED: &str = "Full name is required.";
pub const TERMS_REQUIRED: &str = "You must agree to the Terms of Service and Privacy Policy.";
pub const INVALID_CREDENTIALS: &str = "Invalid email or password";
pub const INVALID_RESET_LINK: &str = "Invalid reset link";
pub const RESET_LINK_EXPIRED: &str = "This reset link is invalid or has expired.";
pub const RESET_FAILED: &str = "Failed to reset password. Please try again.";

/// Copy the first message of each failing field.
fn collect(errors: &ValidationErrors, into: &mut FieldErrors) {
    for (field, field_errors) in errors.field_errors() {
        if let Some(message) = field_errors.iter().find_map(|e| e.message.as_deref()) {
            into.insert(&field, message);
        }
    }
}

fn finish(errors: FieldErrors) -> Result<(), FieldErrors> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Account creation form.
#[derive(Debug, Clone, Validate)]
pub struct SignupForm {
    pub full_name: String,
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub confirm_password: String,
    pub agreed_to_terms: bool,
}

impl SignupForm {
    /// A mismatched confirmation is reported alone; otherwise every failing
    /// field is reported.
    pub fn check(&self) -> Result<(), FieldErrors> {
        if self.password != self.confirm_password {
            return Err(FieldErrors::single("re_password", PASSWORD_MISMATCH));
        }

        let mut errors = FieldErrors::default();
        if self.full_name.trim().is_empty() {
            errors.insert("full_name", FULL_NAME_REQUIRED);
        }
        if let Err(e) = self.validate() {
            collect(&e, &mut errors);
        }
        if !self.agreed_to_terms {
            errors.insert("agreed_to_terms", TERMS_REQUIRED);
        }
        finish(errors)
    }

    pub fn to_request(&self) -> RegisterRequest {
        let email = self.email.trim().to_string();
        RegisterRequest {
            username: email.clone(),
            email,
            password: self.password.clone(),
            re_password: self.confirm_password.clone(),
            full_name: self.full_name.trim().to_string(),
            agreed_to_terms: self.agreed_to_terms,
        }
    }
}

/// Sign-in form.
#[derive(Debug, Clone, Validate)]
pub struct LoginForm {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required."))]
    pub password: String,
    /// Keep the session across restarts
    pub remember_me: bool,
}

impl LoginForm {
    pub fn check(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();
        if let Err(e) = self.validate() {
            collect(&e, &mut errors);
        }
        finish(errors)
    }

    pub fn to_request(&self) -> LoginRequest {
        LoginRequest {
            email: self.email.trim().to_string(),
            password: self.password.clone(),
        }
    }
}

#[derive(Debug, Clone, Validate)]
pub struct ForgotPasswordForm {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
}

impl ForgotPasswordForm {
    pub fn check(&self) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();
        if let Err(e) = self.validate() {
            collect(&e, &mut errors);
        }
        finish(errors)
    }

    pub fn to_request(&self) -> ForgotPasswordRequest {
        ForgotPasswordRequest {
            email: self.email.trim().to_string(),
        }
    }
}

/// New-password form reached from an emailed reset link.
#[derive(Debug, Clone)]
pub struct ResetPasswordForm {
    pub uid: String,
    pub token: String,
    pub new_password: String,
    pub re_new_password: String,
}

impl ResetPasswordForm {
    pub fn from_link(link: &EmailLink, new_password: &str, re_new_password: &str) -> Self {
        Self {
            uid: link.uid.clone(),
            token: link.token.clone(),
            new_password: new_password.to_string(),
            re_new_password: re_new_password.to_string(),
        }
    }

    /// Checks run in order and stop at the first failure.
    pub fn check(&self) -> Result<(), FieldErrors> {
        if self.new_password != self.re_new_password {
            return Err(FieldErrors::single("re_new_password", PASSWORD_MISMATCH));
        }
        if self.new_password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(FieldErrors::single("new_password", PASSWORD_TOO_SHORT));
        }
        if self.uid.trim().is_empty() || self.token.trim().is_empty() {
            return Err(FieldErrors::single("non_field_errors", INVALID_RESET_LINK));
        }
        Ok(())
    }

    pub fn to_request(&self) -> ResetPasswordRequest {
        ResetPasswordRequest {
            uid: self.uid.clone(),
            token: self.token.clone(),
            new_password: self.new_password.clone(),
            re_new_password: self.re_new_password.clone(),
        }
    }
}

/// Which emailed flow a link belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Activation,
    PasswordReset,
}

/// `uid`/`token` pair carried by activation and password-reset emails.
///
/// Links look like `<site>/activate/{uid}/{token}` and
/// `<site>/password-reset/{uid}/{token}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailLink {
    pub kind: LinkKind,
    pub uid: String,
    pub token: String,
}

impl EmailLink {
    /// Parse a full URL or a bare path.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let path = if input.contains("://") {
            reqwest::Url::parse(input).ok()?.path().to_string()
        } else {
            input.to_string()
        };

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        segments.windows(3).find_map(|window| {
            let kind = match window[0] {
                "activate" => LinkKind::Activation,
                "password-reset" => LinkKind::PasswordReset,
                _ => return None,
            };
            Some(Self {
                kind,
                uid: window[1].to_string(),
                token: window[2].to_string(),
            })
        })
    }
}

/// Field errors plus a summary line for a failed form submission.
#[derive(Debug, Clone, PartialEq)]
pub struct FormFailure {
    pub fields: FieldErrors,
    pub message: String,
}

impl FormFailure {
    fn local(error: &ClientError) -> Option<Self> {
        match error {
            ClientError::Validation(fields) => Some(Self {
                message: fields
                    .iter()
                    .next()
                    .map(|(_, m)| m.to_string())
                    .unwrap_or_else(|| GENERIC_ERROR.to_string()),
                fields: fields.clone(),
            }),
            ClientError::CooldownActive(_) => Some(Self {
                fields: FieldErrors::default(),
                message: error.to_string(),
            }),
            _ => None,
        }
    }

    fn generic() -> Self {
        Self {
            fields: FieldErrors::default(),
            message: GENERIC_ERROR.to_string(),
        }
    }

    /// Signup: every field gets its first message; the summary is the
    /// first message overall.
    pub fn signup(error: &ClientError) -> Self {
        if let Some(local) = Self::local(error) {
            return local;
        }
        match error.api_errors() {
            Some(body) if !body.is_empty() => Self {
                fields: body.field_errors(),
                message: body.first_message().unwrap_or(GENERIC_ERROR).to_string(),
            },
            _ => Self::generic(),
        }
    }

    /// Login: the server's `detail` when it is a string, otherwise a fixed
    /// credentials message.
    pub fn login(error: &ClientError) -> Self {
        if let Some(local) = Self::local(error) {
            return local;
        }
        match error.api_errors() {
            Some(body) if !body.is_empty() => Self {
                fields: FieldErrors::default(),
                message: body.detail().unwrap_or(INVALID_CREDENTIALS).to_string(),
            },
            _ => Self::generic(),
        }
    }

    /// Password reset: `uid`/`token` errors mean the link is dead.
    pub fn password_reset(error: &ClientError) -> Self {
        if let Some(local) = Self::local(error) {
            return local;
        }
        match error.api_errors() {
            Some(body) if !body.is_empty() => {
                let message = if body.has_field("token") || body.has_field("uid") {
                    RESET_LINK_EXPIRED
                } else {
                    RESET_FAILED
                };
                Self {
                    fields: body.field_errors(),
                    message: message.to_string(),
                }
            }
            _ => Self::generic(),
        }
    }
}

/// Minimum spacing between resend-activation requests.
#[derive(Debug, Clone)]
pub struct ResendCooldown {
    period: Duration,
    last_sent: Option<Instant>,
}

impl ResendCooldown {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_sent: None,
        }
    }

    /// Time left before another email may be requested.
    pub fn remaining(&self) -> Duration {
        match self.last_sent {
            Some(at) => self.period.saturating_sub(at.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Start a new window now. Returns the previous send time so a failed
    /// send can be undone with [`ResendCooldown::rollback`].
    pub fn mark_sent(&mut self) -> Option<Instant> {
        self.last_sent.replace(Instant::now())
    }

    pub fn rollback(&mut self, previous: Option<Instant>) {
        self.last_sent = previous;
    }
}
