use std::{path::PathBuf, time::SystemTime};

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Started,
    Progress,
    Completed,
    Failed,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Started,
        EventKind::Progress,
        EventKind::Completed,
        EventKind::Failed,
    ];

    pub fn event_type(&self) -> &'static str {
        match self {
            EventKind::Started => "chat_file.started",
            EventKind::Progress => "chat_file.progress",
            EventKind::Completed => "chat_file.completed",
            EventKind::Failed => "chat_file.failed",
        }
    }
}

/// Lifecycle and progress of a chat file creation run.
///
/// The same type is published by the fetcher, the converter and the creator
/// itself, so listeners see one stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { message: String },
    Progress { message: String, percent: u8 },
    Completed { message: String, output_path: PathBuf },
    Failed { message: String },
}

impl ProgressEvent {
    pub fn started(message: impl Into<String>) -> Self {
        Self::Started {
            message: message.into(),
        }
    }

    /// Percent is clamped to 100.
    pub fn progress(message: impl Into<String>, percent: u8) -> Self {
        Self::Progress {
            message: message.into(),
            percent: percent.min(100),
        }
    }

    pub fn completed(message: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self::Completed {
            message: message.into(),
            output_path: output_path.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            ProgressEvent::Started { .. } => EventKind::Started,
            ProgressEvent::Progress { .. } => EventKind::Progress,
            ProgressEvent::Completed { .. } => EventKind::Completed,
            ProgressEvent::Failed { .. } => EventKind::Failed,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.kind().event_type()
    }

    pub fn message(&self) -> &str {
        match self {
            ProgressEvent::Started { message }
            | ProgressEvent::Progress { message, .. }
            | ProgressEvent::Completed { message, .. }
            | ProgressEvent::Failed { message } => message,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Completed { .. } | ProgressEvent::Failed { .. }
        )
    }
}

/// An event as delivered to listeners, stamped by the bus.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedEvent {
    pub event_id: Uuid,
    pub session_id: Uuid,
    pub ingest_seq: u64,
    pub timestamp: SystemTime,
    /// Creation run the event belongs to; `None` for events published
    /// outside a run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    #[serde(flatten)]
    pub event: ProgressEvent,
}
