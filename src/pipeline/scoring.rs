//! Reputation scoring
//!
//! A scorer maps a verified profile to an integer. Anything below zero is
//! rejected; zero and above is accepted.

use crate::models::VerifiedProfile;
use chrono::{DateTime, Utc};

/// Scores at or above this value are accepted
pub const ACCEPT_THRESHOLD: i64 = 0;

/// Pure, deterministic reputation heuristic
pub trait ReputationScorer: Send + Sync {
    fn score(&self, profile: &VerifiedProfile, personal_page: &str) -> i64;

    fn accepts(&self, score: i64) -> bool {
        score >= ACCEPT_THRESHOLD
    }
}

/// Default spam heuristic over public profile stats
#[derive(Debug, Clone)]
pub struct HeuristicScorer {
    /// Accounts older than this are unlikely to be throwaways
    established_before: DateTime<Utc>,
}

impl HeuristicScorer {
    pub fn new(established_before: DateTime<Utc>) -> Self {
        Self { established_before }
    }
}

impl ReputationScorer for HeuristicScorer {
    fn score(&self, profile: &VerifiedProfile, personal_page: &str) -> i64 {
        let mut score = 0;

        // The default "egg" avatar is the strongest throwaway signal
        if profile.default_avatar {
            score -= 2;
        }

        if profile.created_at < self.established_before {
            score += 2;
        }

        score += match profile.posts {
            0..=9 => -2,
            10..=99 => 0,
            _ => 1,
        };

        score += match profile.followers {
            0..=4 => -1,
            5..=49 => 0,
            _ => 1,
        };

        // Follow-spam: following far more accounts than follow back
        if profile.following > 0 && profile.followers.saturating_mul(20) < profile.following {
            score -= 2;
        }

        if profile.bio.trim().is_empty() {
            score -= 1;
        }
        if !profile.url.trim().is_empty() {
            score += 1;
        }
        if !personal_page.trim().is_empty() {
            score += 1;
        }

        score
    }
}
