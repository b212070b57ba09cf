//! Profile verification
//!
//! Fetches the signatory's social profile with their stored access token
//! and normalizes it into a [`VerifiedProfile`].

use crate::error::VerificationError;
use crate::models::{Credentials, VerifiedProfile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use validator::Validate;

/// Twitter's `created_at` format, e.g. `Wed Aug 27 13:08:45 +0000 2008`
const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Performs the single authenticated profile request
#[async_trait]
pub trait VerificationTransport: Send + Sync {
    /// Raw JSON body of the credential check, or a transport error message
    async fn fetch_profile(&self, credentials: &Credentials) -> Result<Vec<u8>, String>;
}

/// Wire shape of `account/verify_credentials`
#[derive(Debug, Deserialize)]
struct RawProfile {
    screen_name: String,
    name: String,
    #[serde(default)]
    url: Option<String>,
    created_at: String,
    followers_count: u64,
    friends_count: u64,
    statuses_count: u64,
    default_profile_image: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Turns stored credentials into a verified profile
#[derive(Clone)]
pub struct ProfileVerifier {
    transport: Arc<dyn VerificationTransport>,
}

impl ProfileVerifier {
    pub fn new(transport: Arc<dyn VerificationTransport>) -> Self {
        Self { transport }
    }

    pub async fn verify(&self, credentials: &Credentials) -> Result<VerifiedProfile, VerificationError> {
        credentials
            .validate()
            .map_err(|_| VerificationError::EmptyCredentials)?;

        let body = self
            .transport
            .fetch_profile(credentials)
            .await
            .map_err(VerificationError::Transport)?;

        let profile = Self::parse(&body)?;
        debug!(
            "Verified @{} (followers={}, following={}, posts={})",
            profile.handle, profile.followers, profile.following, profile.posts
        );
        Ok(profile)
    }

    /// Normalize a raw profile document
    pub fn parse(body: &[u8]) -> Result<VerifiedProfile, VerificationError> {
        let raw: RawProfile =
            serde_json::from_slice(body).map_err(|e| VerificationError::Malformed(e.to_string()))?;

        let created_at = DateTime::parse_from_str(&raw.created_at, CREATED_AT_FORMAT)
            .map_err(|e| VerificationError::Malformed(format!("created_at '{}': {}", raw.created_at, e)))?
            .with_timezone(&Utc);

        Ok(VerifiedProfile {
            handle: raw.screen_name,
            display_name: raw.name,
            url: raw.url.unwrap_or_default(),
            created_at,
            followers: raw.followers_count,
            following: raw.friends_count,
            posts: raw.statuses_count,
            default_avatar: raw.default_profile_image,
            bio: raw.description.unwrap_or_default(),
        })
    }
}
