//! Error handling module
//!
//! Provides the error taxonomy for the signup pipeline. Every per-user
//! failure ends up as a [`ProcessError`], which the reconciliation loop logs
//! and then moves on from.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Identity verification failures (transient, the record is kept)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("Credentials are empty")]
    EmptyCredentials,

    #[error("Verification transport error: {0}")]
    Transport(String),

    #[error("Malformed profile response: {0}")]
    Malformed(String),
}

/// Permanent problems with the submitted record itself
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No signatory name specified")]
    MissingName,

    #[error("Malformed signup record: {0}")]
    MalformedRecord(String),

    #[error("Invalid user id: {0}")]
    InvalidUserId(String),

    #[error("Link contains control characters: {0:?}")]
    InvalidLink(String),
}

/// Errors reported by a git hosting backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GitHostError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Unexpected response: {0}")]
    Decode(String),
}

/// The step of the publish sequence that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublishStage {
    RefResolve,
    BranchSync,
    TreeRead,
    TreeCreate,
    CommitCreate,
    RefUpdate,
    PullRequestCreate,
}

impl fmt::Display for PublishStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PublishStage::RefResolve => "refResolve",
            PublishStage::BranchSync => "branchSync",
            PublishStage::TreeRead => "treeRead",
            PublishStage::TreeCreate => "treeCreate",
            PublishStage::CommitCreate => "commitCreate",
            PublishStage::RefUpdate => "refUpdate",
            PublishStage::PullRequestCreate => "pullRequestCreate",
        };
        f.write_str(name)
    }
}

/// A failed publish attempt, tagged with the stage that aborted it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Publish failed at {stage}: {cause}")]
pub struct PublishError {
    pub stage: PublishStage,
    #[source]
    pub cause: GitHostError,
}

impl PublishError {
    pub fn new(stage: PublishStage, cause: GitHostError) -> Self {
        Self { stage, cause }
    }
}

/// Record acknowledgement failures (logged only, never undo a publish)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeletionError {
    #[error("Network error: {0}")]
    Transport(String),

    #[error("Record store returned status {0}")]
    Status(u16),
}

/// Event stream failures
#[derive(Error, Debug)]
pub enum EventSourceError {
    #[error("Failed to open event stream: {0}")]
    Connect(String),

    #[error("Event stream transport error: {0}")]
    Transport(String),

    #[error("Malformed event: {0}")]
    Malformed(String),
}

/// Everything that can end a single per-user processing attempt
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Rejected with score {score}")]
    ScoreRejected { score: i64 },

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("Attempt cancelled")]
    Cancelled,

    #[error("Attempt timed out after {0:?}")]
    TimedOut(Duration),
}

impl ProcessError {
    /// Whether the same record might succeed on a later attempt unchanged
    pub fn is_transient(&self) -> bool {
        match self {
            ProcessError::Verification(_)
            | ProcessError::Publish(_)
            | ProcessError::Cancelled
            | ProcessError::TimedOut(_) => true,
            ProcessError::Validation(_) | ProcessError::ScoreRejected { .. } => false,
        }
    }
}

/// Result type alias for a per-user attempt
pub type ProcessResult<T> = Result<T, ProcessError>;
