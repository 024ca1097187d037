// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client error types and the account API's error body format.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::storage::StorageError;

/// Client error type returned by every API and session operation.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("API error ({status}): {}", .errors.first_message().unwrap_or("no details"))]
    Api { status: u16, errors: ApiErrorBody },

    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Invalid input: {0}")]
    Validation(FieldErrors),

    #[error("Please wait {0}s before requesting another email")]
    CooldownActive(u64),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Token storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ClientError {
    /// HTTP status of an API rejection, if this error came from one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Parsed error body of an API rejection.
    pub fn api_errors(&self) -> Option<&ApiErrorBody> {
        match self {
            ClientError::Api { errors, .. } => Some(errors),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Whether this error means the caller no longer holds a usable session
    /// and should drop to an unauthenticated state.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ClientError::SessionExpired(_) | ClientError::NotAuthenticated
        ) || self.is_unauthorized()
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Error body returned by the account API on non-2xx responses.
///
/// The API answers with a JSON object mapping field names (or `detail`,
/// `non_field_errors`) to either a list of messages or a single message.
/// Key order is preserved so "first message" matches what the server sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiErrorBody {
    fields: Map<String, Value>,
    raw: String,
}

impl ApiErrorBody {
    /// Parse a response body. Anything that is not a JSON object yields an
    /// empty field map; the raw text is kept for logging.
    pub fn parse(raw: &str) -> Self {
        let fields = match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        Self {
            fields,
            raw: raw.to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// The `detail` message, when the server sent it as a plain string.
    pub fn detail(&self) -> Option<&str> {
        self.fields.get("detail").and_then(Value::as_str)
    }

    /// All string messages in server order, flattening message lists.
    pub fn messages(&self) -> Vec<&str> {
        let mut messages = Vec::new();
        for value in self.fields.values() {
            match value {
                Value::Array(items) => messages.extend(items.iter().filter_map(Value::as_str)),
                Value::String(s) => messages.push(s.as_str()),
                _ => {}
            }
        }
        messages
    }

    pub fn first_message(&self) -> Option<&str> {
        self.messages().into_iter().next()
    }

    /// One message per field: the first entry of a list, or the string itself.
    pub fn field_errors(&self) -> FieldErrors {
        let mut errors = FieldErrors::default();
        for (field, value) in &self.fields {
            let message = match value {
                Value::Array(items) => items.iter().find_map(Value::as_str),
                Value::String(s) => Some(s.as_str()),
                _ => None,
            };
            if let Some(message) = message {
                errors.insert(field, message);
            }
        }
        errors
    }
}

/// Field name to message map surfaced on forms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    /// A single-field error set.
    pub fn single(field: &str, message: &str) -> Self {
        let mut errors = Self::default();
        errors.insert(field, message);
        errors
    }

    /// Record a message for a field, keeping the first one if already set.
    pub fn insert(&mut self, field: &str, message: &str) {
        self.0
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", field, message)?;
            first = false;
        }
        Ok(())
    }
}
