//! Outcome events and the sinks that publish them.

use std::fmt;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::error::SinkError;

/// Event tag distinguishing the two outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventTag {
    #[serde(rename = "AcceptMinion")]
    Accept,
    #[serde(rename = "RejectMinion")]
    Reject,
}

impl EventTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "AcceptMinion",
            Self::Reject => "RejectMinion",
        }
    }
}

impl fmt::Display for EventTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification emitted once per authorization check.
///
/// Serializes to the event data only; the tag travels separately, the way
/// Salt keeps tag and data apart on its event bus.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutcomeEvent {
    #[serde(skip)]
    pub tag: EventTag,
    pub message: String,
    /// Original minion id; only set on acceptance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minion_id: Option<String>,
    #[serde(rename = "_stamp")]
    pub stamp: DateTime<Utc>,
}

impl OutcomeEvent {
    pub fn accept(minion_id: &str) -> Self {
        Self {
            tag: EventTag::Accept,
            message: format!("Authorizing minion: {minion_id}"),
            minion_id: Some(minion_id.to_string()),
            stamp: Utc::now(),
        }
    }

    pub fn reject(minion_id: &str) -> Self {
        Self {
            tag: EventTag::Reject,
            message: format!("Unable to locate minion: {minion_id}"),
            minion_id: None,
            stamp: Utc::now(),
        }
    }
}

/// Fire-and-forget destination for outcome events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn fire(&self, event: &OutcomeEvent) -> Result<(), SinkError>;
}

/// Keeps fired events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<OutcomeEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything fired so far, oldest first.
    pub fn events(&self) -> Vec<OutcomeEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn fire(&self, event: &OutcomeEvent) -> Result<(), SinkError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }
}

/// Writes each event as one `{"tag": ..., "data": ...}` JSON line.
pub struct JsonLinesSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    async fn fire(&self, event: &OutcomeEvent) -> Result<(), SinkError> {
        let line = serde_json::to_string(&json!({ "tag": event.tag, "data": event }))?;
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{line}")?;
        out.flush()?;
        info!(tag = %event.tag, "event written");
        Ok(())
    }
}
