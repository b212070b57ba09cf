//! Firebase Realtime Database adapter
//!
//! Watches the database through the REST streaming API (server-sent events)
//! and removes processed signups with a plain `DELETE`. Requests are
//! authenticated with the database secret passed as the `auth` parameter.

use super::{ChangeType, Event, EventSource, RecordStore};
use crate::config::FirebaseConfig;
use crate::error::{DeletionError, EventSourceError};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// One decoded server-sent event
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseMessage {
    pub event: String,
    pub data: String,
}

/// Incremental `text/event-stream` decoder
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every message it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        // Bytes before this offset were already searched for a terminator
        let mut scan_from = self.buffer.len().saturating_sub(1);
        self.buffer.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut messages = Vec::new();
        while let Some(found) = self.buffer[scan_from..].windows(2).position(|w| w == b"\n\n") {
            let end = scan_from + found;
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let text = String::from_utf8_lossy(&block[..end]);
            if let Some(message) = Self::parse_block(&text) {
                messages.push(message);
            }
            scan_from = 0;
        }
        messages
    }

    fn parse_block(block: &str) -> Option<SseMessage> {
        let mut message = SseMessage::default();
        let mut data_lines = Vec::new();

        for line in block.lines() {
            if line.starts_with(':') {
                continue;
            }
            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => message.event = value.to_string(),
                "data" => data_lines.push(value),
                _ => {}
            }
        }

        if message.event.is_empty() && data_lines.is_empty() {
            return None;
        }
        message.data = data_lines.join("\n");
        Some(message)
    }
}

/// What a single Firebase streaming message means for the watcher
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Change(Event),
    KeepAlive,
    /// The server ended the subscription (`cancel` or `auth_revoked`)
    Closed(String),
}

#[derive(Debug, Deserialize)]
struct ChangeBody {
    path: String,
    #[serde(default)]
    data: Value,
}

impl Frame {
    pub fn from_message(message: &SseMessage) -> Result<Self, EventSourceError> {
        match message.event.as_str() {
            "keep-alive" => Ok(Frame::KeepAlive),
            "cancel" | "auth_revoked" => Ok(Frame::Closed(format!("{}: {}", message.event, message.data))),
            name => {
                let body: ChangeBody = serde_json::from_str(&message.data)
                    .map_err(|e| EventSourceError::Malformed(format!("{} event: {}", name, e)))?;
                let change_type = match name {
                    "put" if body.path == "/" => ChangeType::Snapshot,
                    "put" => ChangeType::Put,
                    _ => ChangeType::Other,
                };
                Ok(Frame::Change(Event::new(body.path, change_type, Some(body.data))))
            }
        }
    }
}

/// Raw body chunks; errors are already stripped of the request URL
type ChunkStream = BoxStream<'static, Result<Vec<u8>, String>>;

/// reqwest puts the full URL (including `?auth=<secret>`) into its error text
fn redacted(err: reqwest::Error) -> String {
    err.without_url().to_string()
}

/// Server-sent event subscription to the whole database
pub struct FirebaseEventSource {
    stream: Option<ChunkStream>,
    decoder: SseDecoder,
    pending: VecDeque<Event>,
}

impl FirebaseEventSource {
    /// Open the streaming connection
    pub async fn connect(http: &reqwest::Client, config: &FirebaseConfig) -> Result<Self, EventSourceError> {
        let url = format!("{}/.json", config.db_url);
        let response = http
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .query(&[("auth", config.secret.as_str())])
            .send()
            .await
            .map_err(|e| EventSourceError::Connect(redacted(e)))?
            .error_for_status()
            .map_err(|e| EventSourceError::Connect(redacted(e)))?;

        info!("📡 Watching {} for signups", config.db_url);

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(redacted))
            .boxed();
        Ok(Self::from_stream(stream))
    }

    fn from_stream(stream: ChunkStream) -> Self {
        Self {
            stream: Some(stream),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
        }
    }

    fn absorb(&mut self, chunk: &[u8]) {
        for message in self.decoder.push(chunk) {
            match Frame::from_message(&message) {
                Ok(Frame::Change(event)) => self.pending.push_back(event),
                Ok(Frame::KeepAlive) => {}
                Ok(Frame::Closed(reason)) => {
                    info!("Event stream closed by server ({})", reason);
                    self.stream = None;
                    return;
                }
                Err(e) => warn!("Skipping event: {}", e),
            }
        }
    }
}

#[async_trait]
impl EventSource for FirebaseEventSource {
    async fn next_event(&mut self) -> Result<Option<Event>, EventSourceError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            let Some(stream) = self.stream.as_mut() else {
                return Ok(None);
            };
            match stream.next().await {
                Some(Ok(chunk)) => self.absorb(&chunk),
                Some(Err(e)) => {
                    self.stream = None;
                    return Err(EventSourceError::Transport(e));
                }
                None => {
                    debug!("Event stream ended");
                    self.stream = None;
                }
            }
        }
    }

    async fn stop(&mut self) {
        self.stream = None;
        self.pending.clear();
    }
}

/// Deletes signup records once they have been published
pub struct FirebaseRecordStore {
    http: reqwest::Client,
    db_url: String,
    secret: String,
}

impl FirebaseRecordStore {
    pub fn new(http: reqwest::Client, config: &FirebaseConfig) -> Self {
        Self {
            http,
            db_url: config.db_url.clone(),
            secret: config.secret.clone(),
        }
    }
}

#[async_trait]
impl RecordStore for FirebaseRecordStore {
    async fn delete(&self, user_id: &str) -> Result<(), DeletionError> {
        let url = format!("{}/users/{}.json", self.db_url, user_id);
        let response = self
            .http
            .delete(&url)
            .query(&[("auth", self.secret.as_str())])
            .send()
            .await
            .map_err(|e| DeletionError::Transport(redacted(e)))?;

        if !response.status().is_success() {
            return Err(DeletionError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}
