//! Data models shared by the signup pipeline

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use validator::Validate;

/// User ids become branch names and file names, so keep them to one safe segment
static USER_ID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid pattern"));

/// A pending signup as stored in the realtime database under `/users/<uid>`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRecord {
    #[serde(skip)]
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub affiliation: String,
    #[serde(default)]
    pub personal_page: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub link_profile: bool,
    pub twitter_token: String,
    pub twitter_secret: String,
}

impl SignupRecord {
    /// Strictly decode a raw database payload into a record
    pub fn decode(user_id: &str, payload: &serde_json::Value) -> Result<Self, ValidationError> {
        validate_user_id(user_id).map_err(|e| {
            ValidationError::InvalidUserId(
                e.message.map(|m| m.to_string()).unwrap_or_else(|| user_id.to_string()),
            )
        })?;

        if !payload.is_object() {
            return Err(ValidationError::MalformedRecord(format!(
                "expected an object for user {}, got {}",
                user_id,
                json_kind(payload)
            )));
        }

        let mut record = Self::deserialize(payload)
            .map_err(|e| ValidationError::MalformedRecord(format!("user {}: {}", user_id, e)))?;
        record.user_id = user_id.to_string();
        Ok(record)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            token: self.twitter_token.clone(),
            secret: self.twitter_secret.clone(),
        }
    }

    /// A signature without a name cannot be published
    pub fn require_name(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingName);
        }
        Ok(())
    }
}

/// OAuth access token pair stored with the signup
#[derive(Clone, PartialEq, Eq, Validate)]
pub struct Credentials {
    #[validate(length(min = 1, message = "Access token is required"))]
    pub token: String,
    #[validate(length(min = 1, message = "Access token secret is required"))]
    pub secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Identity and reputation data fetched from the social profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedProfile {
    pub handle: String,
    pub display_name: String,
    /// Empty when the profile has no website set
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub followers: u64,
    pub following: u64,
    pub posts: u64,
    pub default_avatar: bool,
    pub bio: String,
}

/// An opened pull request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRef {
    /// `owner/repo` the pull request was opened against
    pub repository: String,
    pub branch: String,
    pub number: u64,
    pub url: String,
}

/// Validate a user id as a single path segment
fn validate_user_id(user_id: &str) -> Result<(), validator::ValidationError> {
    if !USER_ID_PATTERN.is_match(user_id) {
        let mut err = validator::ValidationError::new("invalid_user_id");
        err.message = Some(format!("'{}' is not a valid user id", user_id).into());
        return Err(err);
    }
    Ok(())
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
