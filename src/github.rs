//! GitHub REST client
//!
//! Implements [`GitHost`] over the git data and pulls endpoints.

use crate::config::GitHubConfig;
use crate::error::GitHostError;
use crate::pipeline::publisher::{GitCommit, GitHost, GitRef, NewPullRequest, PullRequest, RepoRef, TreeEntry};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const USER_AGENT: &str = concat!("signbot/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct RefResponse {
    #[serde(rename = "ref")]
    name: String,
    object: ObjectResponse,
}

#[derive(Debug, Deserialize)]
struct ObjectResponse {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
    tree: ObjectResponse,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

/// Authenticated GitHub API client
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(http: reqwest::Client, config: &GitHubConfig) -> Self {
        Self {
            http,
            api_url: config.api_url.clone(),
            token: config.token.clone(),
        }
    }

    fn repo_url(&self, repo: &RepoRef, rest: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.api_url, repo.owner, repo.name, rest)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: String,
        body: Option<serde_json::Value>,
    ) -> Result<T, GitHostError> {
        debug!("GitHub {} {}", method, url);

        let mut request = self
            .http
            .request(method, &url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header(reqwest::header::USER_AGENT, USER_AGENT);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GitHostError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ErrorResponse>()
                .await
                .map(|e| e.message)
                .unwrap_or_else(|_| status.canonical_reason().unwrap_or("unknown error").to_string());
            return Err(classify(status, message));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| GitHostError::Decode(e.to_string()))
    }
}

/// Missing refs come back as 404, or 422 for ref updates
fn classify(status: StatusCode, message: String) -> GitHostError {
    if status == StatusCode::NOT_FOUND
        || (status == StatusCode::UNPROCESSABLE_ENTITY && message.contains("Reference does not exist"))
    {
        return GitHostError::NotFound(message);
    }
    GitHostError::Api { status: status.as_u16(), message }
}

fn to_git_ref(response: RefResponse) -> GitRef {
    GitRef {
        name: response.name.trim_start_matches("refs/").to_string(),
        sha: response.object.sha,
    }
}

#[async_trait]
impl GitHost for GitHubClient {
    async fn get_ref(&self, repo: &RepoRef, name: &str) -> Result<GitRef, GitHostError> {
        let response: RefResponse = self
            .send(Method::GET, self.repo_url(repo, &format!("git/ref/{}", name)), None)
            .await?;
        Ok(to_git_ref(response))
    }

    async fn create_ref(&self, repo: &RepoRef, name: &str, sha: &str) -> Result<GitRef, GitHostError> {
        let response: RefResponse = self
            .send(
                Method::POST,
                self.repo_url(repo, "git/refs"),
                Some(json!({ "ref": name, "sha": sha })),
            )
            .await?;
        Ok(to_git_ref(response))
    }

    async fn update_ref(&self, repo: &RepoRef, name: &str, sha: &str, force: bool) -> Result<GitRef, GitHostError> {
        let response: RefResponse = self
            .send(
                Method::PATCH,
                self.repo_url(repo, &format!("git/refs/{}", name)),
                Some(json!({ "sha": sha, "force": force })),
            )
            .await?;
        Ok(to_git_ref(response))
    }

    async fn get_commit(&self, repo: &RepoRef, sha: &str) -> Result<GitCommit, GitHostError> {
        let response: CommitResponse = self
            .send(Method::GET, self.repo_url(repo, &format!("git/commits/{}", sha)), None)
            .await?;
        Ok(GitCommit { sha: response.sha, tree_sha: response.tree.sha })
    }

    async fn create_tree(&self, repo: &RepoRef, base_tree: &str, entries: &[TreeEntry]) -> Result<String, GitHostError> {
        let response: ObjectResponse = self
            .send(
                Method::POST,
                self.repo_url(repo, "git/trees"),
                Some(json!({ "base_tree": base_tree, "tree": entries })),
            )
            .await?;
        Ok(response.sha)
    }

    async fn create_commit(
        &self,
        repo: &RepoRef,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> Result<GitCommit, GitHostError> {
        let response: CommitResponse = self
            .send(
                Method::POST,
                self.repo_url(repo, "git/commits"),
                Some(json!({ "message": message, "tree": tree_sha, "parents": parents })),
            )
            .await?;
        Ok(GitCommit { sha: response.sha, tree_sha: response.tree.sha })
    }

    async fn create_pull_request(&self, repo: &RepoRef, pull: &NewPullRequest) -> Result<PullRequest, GitHostError> {
        self.send(Method::POST, self.repo_url(repo, "pulls"), Some(json!(pull)))
            .await
    }
}
