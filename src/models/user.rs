//! User profile model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current user's profile as returned by `GET /auth/users/me/`.
///
/// Fetched, never mutated locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Account ID (UUID string)
    pub id: String,
    pub email: String,
    pub full_name: String,
    /// Language used for code samples (absent on older API versions)
    #[serde(default)]
    pub preferred_language: Option<ProgrammingLanguage>,
    pub agreed_to_terms: bool,
    /// When the terms were accepted
    pub agreed_at: Option<DateTime<Utc>>,
    pub date_joined: DateTime<Utc>,
}

/// Languages offered for code samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgrammingLanguage {
    Python,
    Javascript,
    Typescript,
    Php,
    Ruby,
    Go,
    Java,
    Csharp,
}

impl std::str::FromStr for ProgrammingLanguage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_ascii_lowercase()))
            .map_err(|_| format!("unsupported language: {}", s))
    }
}

/// Writable profile fields for `PATCH /auth/users/me/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_language: Option<ProgrammingLanguage>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.preferred_language.is_none()
    }
}
