//! In-memory fakes for the pipeline's trait seams

use crate::config::{DocumentConfig, GitHubConfig};
use crate::error::{DeletionError, EventSourceError, GitHostError};
use crate::events::{Event, EventSource, RecordStore};
use crate::models::{Credentials, SignupRecord, VerifiedProfile};
use crate::pipeline::publisher::{
    GitCommit, GitHost, GitRef, NewPullRequest, PullRequest, RepoRef, RepositoryPublisher, TreeEntry,
};
use crate::pipeline::render::DocumentRenderer;
use crate::pipeline::scoring::ReputationScorer;
use crate::pipeline::verifier::{ProfileVerifier, VerificationTransport};
use crate::state::{AppContext, SharedContext};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// =============================================================================
// FIXTURES
// =============================================================================

pub fn github_config() -> GitHubConfig {
    GitHubConfig {
        upstream_owner: "upstream".to_string(),
        upstream_repo: "site".to_string(),
        ..GitHubConfig::with_credentials("token", "signbot")
    }
}

/// `verify_credentials` body for a healthy account
pub fn profile_json(handle: &str) -> Value {
    json!({
        "screen_name": handle,
        "name": "Ada",
        "url": "https://ada.example",
        "created_at": "Sat Mar 14 15:09:26 +0000 2009",
        "followers_count": 1200,
        "friends_count": 180,
        "statuses_count": 5400,
        "default_profile_image": false,
        "description": "Enchantress of numbers",
    })
}

/// The normalized form of [`profile_json`]
pub fn profile(handle: &str) -> VerifiedProfile {
    VerifiedProfile {
        handle: handle.to_string(),
        display_name: "Ada".to_string(),
        url: "https://ada.example".to_string(),
        created_at: Utc.with_ymd_and_hms(2009, 3, 14, 15, 9, 26).unwrap(),
        followers: 1200,
        following: 180,
        posts: 5400,
        default_avatar: false,
        bio: "Enchantress of numbers".to_string(),
    }
}

pub fn record(user_id: &str, name: &str) -> SignupRecord {
    SignupRecord {
        user_id: user_id.to_string(),
        name: name.to_string(),
        title: String::new(),
        affiliation: String::new(),
        personal_page: String::new(),
        link: String::new(),
        link_profile: true,
        twitter_token: format!("tok-{}", user_id),
        twitter_secret: format!("sec-{}", user_id),
    }
}

/// Raw database payload for a signup, credentials derived from the uid
pub fn record_json(user_id: &str, name: &str) -> Value {
    json!({
        "name": name,
        "linkProfile": true,
        "twitterToken": format!("tok-{}", user_id),
        "twitterSecret": format!("sec-{}", user_id),
    })
}

// =============================================================================
// VERIFICATION
// =============================================================================

/// Canned `verify_credentials` responses keyed by access token
#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<HashMap<String, Result<Value, String>>>,
    calls: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, token: &str, body: Value) {
        self.responses.lock().unwrap().insert(token.to_string(), Ok(body));
    }

    pub fn fail(&self, token: &str, message: &str) {
        self.responses.lock().unwrap().insert(token.to_string(), Err(message.to_string()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VerificationTransport for FakeTransport {
    async fn fetch_profile(&self, credentials: &Credentials) -> Result<Vec<u8>, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.responses.lock().unwrap().get(&credentials.token) {
            Some(Ok(body)) => Ok(body.to_string().into_bytes()),
            Some(Err(message)) => Err(message.clone()),
            None => Err(format!("unknown token {}", credentials.token)),
        }
    }
}

/// Accepts everyone except the listed handles
#[derive(Default)]
pub struct FakeScorer {
    rejected: Mutex<HashSet<String>>,
}

impl FakeScorer {
    pub fn reject(&self, handle: &str) {
        self.rejected.lock().unwrap().insert(handle.to_string());
    }
}

impl ReputationScorer for FakeScorer {
    fn score(&self, profile: &VerifiedProfile, _personal_page: &str) -> i64 {
        if self.rejected.lock().unwrap().contains(&profile.handle) {
            -5
        } else {
            3
        }
    }
}

// =============================================================================
// GIT HOST
// =============================================================================

#[derive(Debug, Clone)]
struct FakeCommit {
    tree: String,
    parents: Vec<String>,
}

#[derive(Debug, Clone)]
struct FakePull {
    request: NewPullRequest,
    open: bool,
}

#[derive(Default)]
struct HostState {
    /// (repository, short ref name) -> sha
    refs: HashMap<(String, String), String>,
    commits: HashMap<String, FakeCommit>,
    trees: HashMap<String, BTreeMap<String, String>>,
    pulls: Vec<FakePull>,
    calls: Vec<String>,
    failures: HashMap<String, GitHostError>,
}

/// Content-addressed in-memory git host shared by upstream and fork
#[derive(Default)]
pub struct FakeGitHost {
    state: Mutex<HostState>,
    hold_pulls: AtomicBool,
}

const UPSTREAM: &str = "upstream/site";
const FORK: &str = "signbot/site";

fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

fn short_ref(name: &str) -> String {
    name.strip_prefix("refs/").unwrap_or(name).to_string()
}

impl HostState {
    fn insert_tree(&mut self, files: BTreeMap<String, String>) -> String {
        let parts: Vec<String> = files.iter().map(|(p, c)| format!("{}={}", p, c)).collect();
        let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
        let sha = digest(&refs);
        self.trees.insert(sha.clone(), files);
        sha
    }

    fn insert_commit(&mut self, tree: &str, parents: &[String], message: &str) -> String {
        let mut parts = vec![tree, message];
        parts.extend(parents.iter().map(String::as_str));
        let sha = digest(&parts);
        self.commits.insert(sha.clone(), FakeCommit { tree: tree.to_string(), parents: parents.to_vec() });
        sha
    }

    fn begin(&mut self, op: &str) -> Result<(), GitHostError> {
        self.calls.push(op.to_string());
        match self.failures.get(op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

impl FakeGitHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upstream and fork `master` pointing at a single root commit
    pub fn seeded() -> Self {
        let host = Self::new();
        {
            let mut st = host.state.lock().unwrap();
            let tree = st.insert_tree(BTreeMap::from([("index.html".to_string(), "<h1>Signatories</h1>".to_string())]));
            let root = st.insert_commit(&tree, &[], "Initial commit");
            st.refs.insert((UPSTREAM.to_string(), "heads/master".to_string()), root.clone());
            st.refs.insert((FORK.to_string(), "heads/master".to_string()), root);
        }
        host
    }

    pub fn fail_on(&self, op: &str, err: GitHostError) {
        self.state.lock().unwrap().failures.insert(op.to_string(), err);
    }

    pub fn hold_pull_requests(&self, hold: bool) {
        self.hold_pulls.store(hold, Ordering::SeqCst);
    }

    pub fn count(&self, op: &str) -> usize {
        self.state.lock().unwrap().calls.iter().filter(|c| *c == op).count()
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub fn base_sha(&self) -> String {
        self.state.lock().unwrap().refs[&(UPSTREAM.to_string(), "heads/master".to_string())].clone()
    }

    pub fn branch_sha(&self, branch: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .refs
            .get(&(FORK.to_string(), format!("heads/{}", branch)))
            .cloned()
    }

    pub fn parents_of(&self, sha: &str) -> Vec<String> {
        self.state.lock().unwrap().commits[sha].parents.clone()
    }

    pub fn file_on_branch(&self, branch: &str, path: &str) -> Option<String> {
        let sha = self.branch_sha(branch)?;
        let st = self.state.lock().unwrap();
        let tree = &st.commits.get(&sha)?.tree;
        st.trees.get(tree)?.get(path).cloned()
    }

    pub fn pull_requests(&self) -> Vec<NewPullRequest> {
        self.state.lock().unwrap().pulls.iter().map(|p| p.request.clone()).collect()
    }

    pub fn close_pull_requests(&self) {
        for pull in self.state.lock().unwrap().pulls.iter_mut() {
            pull.open = false;
        }
    }

    /// Land a new commit on upstream `master`, returning its sha
    pub fn advance_base(&self, path: &str, content: &str) -> String {
        let mut st = self.state.lock().unwrap();
        let base = st.refs[&(UPSTREAM.to_string(), "heads/master".to_string())].clone();
        let mut files = st.trees[&st.commits[&base].tree].clone();
        files.insert(path.to_string(), content.to_string());
        let tree = st.insert_tree(files);
        let sha = st.insert_commit(&tree, &[base], "Upstream change");
        st.refs.insert((UPSTREAM.to_string(), "heads/master".to_string()), sha.clone());
        sha
    }
}

#[async_trait]
impl GitHost for FakeGitHost {
    async fn get_ref(&self, repo: &RepoRef, name: &str) -> Result<GitRef, GitHostError> {
        let mut st = self.state.lock().unwrap();
        st.begin("get_ref")?;
        st.refs
            .get(&(repo.to_string(), short_ref(name)))
            .map(|sha| GitRef { name: short_ref(name), sha: sha.clone() })
            .ok_or_else(|| GitHostError::NotFound(format!("{} {}", repo, name)))
    }

    async fn create_ref(&self, repo: &RepoRef, name: &str, sha: &str) -> Result<GitRef, GitHostError> {
        let mut st = self.state.lock().unwrap();
        st.begin("create_ref")?;
        let key = (repo.to_string(), short_ref(name));
        if st.refs.contains_key(&key) {
            return Err(GitHostError::Api { status: 422, message: "Reference already exists".into() });
        }
        st.refs.insert(key, sha.to_string());
        Ok(GitRef { name: short_ref(name), sha: sha.to_string() })
    }

    async fn update_ref(&self, repo: &RepoRef, name: &str, sha: &str, _force: bool) -> Result<GitRef, GitHostError> {
        let mut st = self.state.lock().unwrap();
        st.begin("update_ref")?;
        let key = (repo.to_string(), short_ref(name));
        match st.refs.get_mut(&key) {
            Some(current) => {
                *current = sha.to_string();
                Ok(GitRef { name: short_ref(name), sha: sha.to_string() })
            }
            None => Err(GitHostError::NotFound("Reference does not exist".into())),
        }
    }

    async fn get_commit(&self, _repo: &RepoRef, sha: &str) -> Result<GitCommit, GitHostError> {
        let mut st = self.state.lock().unwrap();
        st.begin("get_commit")?;
        st.commits
            .get(sha)
            .map(|c| GitCommit { sha: sha.to_string(), tree_sha: c.tree.clone() })
            .ok_or_else(|| GitHostError::NotFound(format!("commit {}", sha)))
    }

    async fn create_tree(&self, _repo: &RepoRef, base_tree: &str, entries: &[TreeEntry]) -> Result<String, GitHostError> {
        let mut st = self.state.lock().unwrap();
        st.begin("create_tree")?;
        let mut files = st
            .trees
            .get(base_tree)
            .cloned()
            .ok_or_else(|| GitHostError::Api { status: 422, message: "base_tree is invalid".into() })?;
        for entry in entries {
            files.insert(entry.path.clone(), entry.content.clone());
        }
        Ok(st.insert_tree(files))
    }

    async fn create_commit(
        &self,
        _repo: &RepoRef,
        message: &str,
        tree_sha: &str,
        parents: &[String],
    ) -> Result<GitCommit, GitHostError> {
        let mut st = self.state.lock().unwrap();
        st.begin("create_commit")?;
        if !st.trees.contains_key(tree_sha) || parents.iter().any(|p| !st.commits.contains_key(p)) {
            return Err(GitHostError::Api { status: 422, message: "Invalid tree or parent".into() });
        }
        let sha = st.insert_commit(tree_sha, parents, message);
        Ok(GitCommit { sha, tree_sha: tree_sha.to_string() })
    }

    async fn create_pull_request(&self, repo: &RepoRef, pull: &NewPullRequest) -> Result<PullRequest, GitHostError> {
        if self.hold_pulls.load(Ordering::SeqCst) {
            self.state.lock().unwrap().calls.push("create_pull_request".to_string());
            std::future::pending::<()>().await;
        }

        let mut st = self.state.lock().unwrap();
        st.begin("create_pull_request")?;
        let branch = pull.head.split_once(':').map(|(_, b)| b).unwrap_or(pull.head.as_str());
        if !st.refs.contains_key(&(FORK.to_string(), format!("heads/{}", branch))) {
            return Err(GitHostError::Api { status: 422, message: format!("head {} not found", pull.head) });
        }
        if st.pulls.iter().any(|p| p.open && p.request.head == pull.head) {
            return Err(GitHostError::Api {
                status: 422,
                message: format!("A pull request already exists for {}.", pull.head),
            });
        }
        st.pulls.push(FakePull { request: pull.clone(), open: true });
        let number = st.pulls.len() as u64;
        Ok(PullRequest {
            number,
            html_url: format!("https://github.com/{}/pull/{}", repo, number),
        })
    }
}

// =============================================================================
// EVENTS AND RECORDS
// =============================================================================

/// Scripted event stream; optionally blocks instead of ending once drained
#[derive(Default)]
pub struct FakeEventSource {
    events: VecDeque<Event>,
    hang_when_drained: bool,
    pub stopped: bool,
}

impl FakeEventSource {
    pub fn new(events: Vec<Event>) -> Self {
        Self { events: events.into(), ..Default::default() }
    }

    pub fn hanging(events: Vec<Event>) -> Self {
        Self { events: events.into(), hang_when_drained: true, stopped: false }
    }
}

#[async_trait]
impl EventSource for FakeEventSource {
    async fn next_event(&mut self) -> Result<Option<Event>, EventSourceError> {
        if self.stopped {
            return Ok(None);
        }
        match self.events.pop_front() {
            Some(event) => Ok(Some(event)),
            None if self.hang_when_drained => {
                std::future::pending::<()>().await;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn stop(&mut self) {
        self.stopped = true;
    }
}

/// Records every acknowledged user id
#[derive(Default)]
pub struct FakeRecordStore {
    deleted: Mutex<Vec<String>>,
    fail: AtomicBool,
}

impl FakeRecordStore {
    pub fn deleted(&self) -> Vec<String> {
        let mut deleted = self.deleted.lock().unwrap().clone();
        deleted.sort();
        deleted
    }

    pub fn fail_deletes(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for FakeRecordStore {
    async fn delete(&self, user_id: &str) -> Result<(), DeletionError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DeletionError::Status(503));
        }
        self.deleted.lock().unwrap().push(user_id.to_string());
        Ok(())
    }
}

// =============================================================================
// CONTEXT
// =============================================================================

/// All fakes wired into one context
pub struct Harness {
    pub transport: Arc<FakeTransport>,
    pub scorer: Arc<FakeScorer>,
    pub host: Arc<FakeGitHost>,
    pub records: Arc<FakeRecordStore>,
    pub context: SharedContext,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(5))
    }

    pub fn with_timeout(attempt_timeout: Duration) -> Self {
        let transport = Arc::new(FakeTransport::new());
        let scorer = Arc::new(FakeScorer::default());
        let host = Arc::new(FakeGitHost::seeded());
        let records = Arc::new(FakeRecordStore::default());

        let context = Arc::new(AppContext::new(
            ProfileVerifier::new(transport.clone()),
            scorer.clone(),
            DocumentRenderer::new(DocumentConfig::default()),
            RepositoryPublisher::new(host.clone(), &github_config()),
            records.clone(),
            attempt_timeout,
        ));

        Self { transport, scorer, host, records, context }
    }

    /// Register a verifiable profile for `user_id` under `handle`
    pub fn known_user(&self, user_id: &str, handle: &str) {
        self.transport.respond(&format!("tok-{}", user_id), profile_json(handle));
    }
}
