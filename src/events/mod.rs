//! Realtime database change events
//!
//! The reconciliation loop pulls [`Event`]s from an [`EventSource`] and
//! acknowledges processed signups through a [`RecordStore`]. The Firebase
//! implementation of both lives in [`firebase`].

pub mod firebase;

use crate::error::{DeletionError, EventSourceError};
use async_trait::async_trait;
use serde_json::Value;

pub use firebase::{FirebaseEventSource, FirebaseRecordStore};

/// Path prefix under which signup records live
pub const USERS_PREFIX: &str = "/users/";

/// Kind of change carried by an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    /// Full state of the watched location
    Snapshot,
    /// A single location was written
    Put,
    /// Anything else (patches, unknown event names)
    Other,
}

/// A single change notification
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub path: String,
    pub change_type: ChangeType,
    pub payload: Option<Value>,
}

impl Event {
    pub fn new(path: impl Into<String>, change_type: ChangeType, payload: Option<Value>) -> Self {
        Self {
            path: path.into(),
            change_type,
            payload: payload.filter(|p| !p.is_null()),
        }
    }

    /// Extract the `(user id, raw record)` pairs this event asks us to process.
    ///
    /// Shapes we do not recognise yield nothing; they are not errors.
    pub fn signups(&self) -> Vec<(String, Value)> {
        let Some(payload) = &self.payload else {
            return Vec::new();
        };

        match self.change_type {
            ChangeType::Snapshot if self.path == "/" => payload
                .get("users")
                .and_then(Value::as_object)
                .map(|users| {
                    users
                        .iter()
                        .filter(|(_, record)| !record.is_null())
                        .map(|(uid, record)| (uid.clone(), record.clone()))
                        .collect()
                })
                .unwrap_or_default(),
            ChangeType::Put => match self.path.strip_prefix(USERS_PREFIX) {
                Some(uid) if !uid.is_empty() && !uid.contains('/') => {
                    vec![(uid.to_string(), payload.clone())]
                }
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }
}

/// Pull-based, cancellable subscription to database changes
#[async_trait]
pub trait EventSource: Send {
    /// Next event, or `None` once the stream has ended
    async fn next_event(&mut self) -> Result<Option<Event>, EventSourceError>;

    /// Unsubscribe; subsequent calls to `next_event` return `None`
    async fn stop(&mut self);
}

/// Acknowledgement side of the database: removes processed signups
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn delete(&self, user_id: &str) -> Result<(), DeletionError>;
}
