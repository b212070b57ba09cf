//! Repository publishing
//!
//! Commits a rendered signature onto a per-user branch of the fork and opens
//! a pull request for it upstream. The sequence is written so that a rerun
//! after a partial failure converges on the same branch state instead of
//! tripping over what the previous attempt already created:
//!
//! 1. resolve the upstream base branch tip (always fresh)
//! 2. point the per-user branch at that tip (update, or create if missing)
//! 3. read the base commit's tree
//! 4. create a tree with the signature blob added
//! 5. create a commit on top of the base commit
//! 6. force the per-user branch to the new commit
//! 7. open the pull request
//!
//! No step is retried and nothing is rolled back.

use crate::config::GitHubConfig;
use crate::error::{GitHostError, PublishError, PublishStage};
use crate::models::PullRequestRef;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Regular, non-executable file
pub const BLOB_MODE_FILE: &str = "100644";

/// `owner/name` of a hosted repository
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self { owner: owner.into(), name: name.into() }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A ref and the object it points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRef {
    /// Short form, e.g. `heads/master`
    pub name: String,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommit {
    pub sha: String,
    pub tree_sha: String,
}

/// One entry of a tree to create; content is written as a new blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeEntry {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
}

impl TreeEntry {
    pub fn file(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            mode: BLOB_MODE_FILE.to_string(),
            kind: "blob".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    /// `owner:branch`
    pub head: String,
    pub base: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
}

/// The git data operations the publisher needs from a hosting service
#[async_trait]
pub trait GitHost: Send + Sync {
    async fn get_ref(&self, repo: &RepoRef, name: &str) -> Result<GitRef, GitHostError>;

    async fn create_ref(&self, repo: &RepoRef, name: &str, sha: &str) -> Result<GitRef, GitHostError>;

    /// Must report a missing ref as [`GitHostError::NotFound`]
    async fn update_ref(&self, repo: &RepoRef, name: &str, sha: &str, force: bool) -> Result<GitRef, GitHostError>;

    async fn get_commit(&self, repo: &RepoRef, sha: &str) -> Result<GitCommit, GitHostError>;

    /// Returns the sha of the new tree
    async fn create_tree(&self, repo: &RepoRef, base_tree: &str, entries: &[TreeEntry]) -> Result<String, GitHostError>;

    async fn create_commit(
        &self,
        repo: &RepoRef,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> Result<GitCommit, GitHostError>;

    async fn create_pull_request(&self, repo: &RepoRef, pull: &NewPullRequest) -> Result<PullRequest, GitHostError>;
}

/// Outcome of one publish attempt
pub type PublishResult = Result<PullRequestRef, PublishError>;

/// Drives the git object sequence for one signatory
#[derive(Clone)]
pub struct RepositoryPublisher {
    host: Arc<dyn GitHost>,
    upstream: RepoRef,
    fork: RepoRef,
    base_branch: String,
}

impl RepositoryPublisher {
    pub fn new(host: Arc<dyn GitHost>, config: &GitHubConfig) -> Self {
        Self {
            host,
            upstream: RepoRef::new(&config.upstream_owner, &config.upstream_repo),
            fork: RepoRef::new(&config.fork_owner, &config.upstream_repo),
            base_branch: config.base_branch.clone(),
        }
    }

    pub async fn publish(
        &self,
        user_id: &str,
        document_path: &str,
        document_body: &str,
        commit_title: &str,
        review_body: &str,
    ) -> PublishResult {
        let branch_ref = format!("heads/{}", user_id);

        // 1. Base tip, re-read on every attempt
        let base = self
            .host
            .get_ref(&self.upstream, &format!("heads/{}", self.base_branch))
            .await
            .map_err(|e| PublishError::new(PublishStage::RefResolve, e))?;
        debug!("Base {} {} is {}", self.upstream, base.name, base.sha);

        // 2. Update first so a rerun never trips over an existing branch
        match self.host.update_ref(&self.fork, &branch_ref, &base.sha, true).await {
            Ok(_) => debug!("Reset existing branch {} to base", user_id),
            Err(GitHostError::NotFound(_)) => {
                self.host
                    .create_ref(&self.fork, &format!("refs/{}", branch_ref), &base.sha)
                    .await
                    .map_err(|e| PublishError::new(PublishStage::BranchSync, e))?;
                debug!("Created branch {} at base", user_id);
            }
            Err(e) => return Err(PublishError::new(PublishStage::BranchSync, e)),
        }

        // 3. Base tree
        let base_commit = self
            .host
            .get_commit(&self.fork, &base.sha)
            .await
            .map_err(|e| PublishError::new(PublishStage::TreeRead, e))?;

        // 4. Tree with the signature added
        let tree_sha = self
            .host
            .create_tree(
                &self.fork,
                &base_commit.tree_sha,
                &[TreeEntry::file(document_path, document_body)],
            )
            .await
            .map_err(|e| PublishError::new(PublishStage::TreeCreate, e))?;

        // 5. Commit on top of base
        let commit = self
            .host
            .create_commit(&self.fork, commit_title, &tree_sha, &[base_commit.sha.clone()])
            .await
            .map_err(|e| PublishError::new(PublishStage::CommitCreate, e))?;

        // 6. Step 2 may have left the branch on a stale base; this is the real advance
        self.host
            .update_ref(&self.fork, &branch_ref, &commit.sha, true)
            .await
            .map_err(|e| PublishError::new(PublishStage::RefUpdate, e))?;

        // 7. Pull request upstream
        let pull = self
            .host
            .create_pull_request(
                &self.upstream,
                &NewPullRequest {
                    title: commit_title.to_string(),
                    head: format!("{}:{}", self.fork.owner, user_id),
                    base: self.base_branch.clone(),
                    body: review_body.to_string(),
                },
            )
            .await
            .map_err(|e| PublishError::new(PublishStage::PullRequestCreate, e))?;

        info!("🔀 Opened pull request #{} for {} ({})", pull.number, user_id, pull.html_url);

        Ok(PullRequestRef {
            repository: self.upstream.to_string(),
            branch: user_id.to_string(),
            number: pull.number,
            url: pull.html_url,
        })
    }
}
