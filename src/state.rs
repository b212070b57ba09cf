//! Application context
//!
//! Every collaborator the pipeline needs, built once at startup and handed
//! to the reconciliation loop behind an `Arc`.

use crate::config::Settings;
use crate::events::{FirebaseRecordStore, RecordStore};
use crate::github::GitHubClient;
use crate::pipeline::publisher::RepositoryPublisher;
use crate::pipeline::render::DocumentRenderer;
use crate::pipeline::scoring::{HeuristicScorer, ReputationScorer};
use crate::pipeline::verifier::ProfileVerifier;
use crate::twitter::TwitterTransport;
use std::sync::Arc;
use std::time::Duration;

/// Shared pipeline context
pub struct AppContext {
    /// Social profile verification
    pub verifier: ProfileVerifier,

    /// Reputation heuristic
    pub scorer: Arc<dyn ReputationScorer>,

    /// Signature document rendering
    pub renderer: DocumentRenderer,

    /// Git object sequence against the target repository
    pub publisher: RepositoryPublisher,

    /// Record acknowledgement
    pub records: Arc<dyn RecordStore>,

    /// Upper bound for a single per-user attempt
    pub attempt_timeout: Duration,
}

impl AppContext {
    pub fn new(
        verifier: ProfileVerifier,
        scorer: Arc<dyn ReputationScorer>,
        renderer: DocumentRenderer,
        publisher: RepositoryPublisher,
        records: Arc<dyn RecordStore>,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            verifier,
            scorer,
            renderer,
            publisher,
            records,
            attempt_timeout,
        }
    }

    /// Wire up the production clients from settings
    pub fn from_settings(settings: &Settings, http: reqwest::Client) -> Self {
        let transport = Arc::new(TwitterTransport::new(http.clone(), &settings.twitter));
        let github = Arc::new(GitHubClient::new(http.clone(), &settings.github));
        let records = Arc::new(FirebaseRecordStore::new(http, &settings.firebase));

        Self::new(
            ProfileVerifier::new(transport),
            Arc::new(HeuristicScorer::new(settings.worker.established_before)),
            DocumentRenderer::new(settings.documents.clone()),
            RepositoryPublisher::new(github, &settings.github),
            records,
            settings.worker.attempt_timeout,
        )
    }
}

/// Type alias for shared context
pub type SharedContext = Arc<AppContext>;
