use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Serialize;

use crate::error::ValidationError;

pub const CHAT_FILE_EXTENSION: &str = "cht";
pub const CHAT_LOG_EXTENSION: &str = "json";

/// Where the chat log comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatSource {
    /// An existing chat log on disk.
    LogFile(PathBuf),
    /// Download the chat log of this VOD first.
    VodId(String),
}

/// Begin/end as entered by the user; either may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RequestedWindow {
    pub begin: Option<Duration>,
    pub end: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    pub begin: Duration,
    pub end: Duration,
}

impl TimeWindow {
    pub fn new(begin: Duration, end: Duration) -> Self {
        Self { begin, end }
    }

    pub fn contains(&self, offset: Duration) -> bool {
        offset >= self.begin && offset <= self.end
    }

    pub fn length(&self) -> Duration {
        self.end.saturating_sub(self.begin)
    }
}

/// A video the chat file is created for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VideoContext {
    pub file_path: PathBuf,
    pub end_time: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreationRequest {
    pub output_dir: PathBuf,
    pub source: ChatSource,
    pub window: Option<RequestedWindow>,
    pub video: Option<VideoContext>,
}

impl CreationRequest {
    pub fn from_log_file(output_dir: impl Into<PathBuf>, chat_log: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            source: ChatSource::LogFile(chat_log.into()),
            window: None,
            video: None,
        }
    }

    pub fn from_vod_id(output_dir: impl Into<PathBuf>, vod_id: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            source: ChatSource::VodId(vod_id.into()),
            window: None,
            video: None,
        }
    }

    pub fn with_window(mut self, begin: Option<Duration>, end: Option<Duration>) -> Self {
        self.window = Some(RequestedWindow { begin, end });
        self
    }

    pub fn with_video(mut self, video: VideoContext) -> Self {
        self.video = Some(video);
        self
    }

    /// Checks the request in the order the user is told about problems.
    pub fn validate(&self, client_id: Option<&str>) -> Result<(), ValidationError> {
        if is_empty(&self.output_dir) {
            return Err(ValidationError::MissingOutputDirectory);
        }
        match &self.source {
            ChatSource::LogFile(path) if is_empty(path) => {
                return Err(ValidationError::MissingChatLogPath);
            }
            ChatSource::VodId(id) if id.trim().is_empty() => {
                return Err(ValidationError::MissingVodId);
            }
            _ => {}
        }
        if client_id.is_none_or(|id| id.trim().is_empty()) {
            return Err(ValidationError::MissingClientId);
        }
        if let Some(window) = &self.window
            && (window.begin.is_none() || window.end.is_none())
        {
            return Err(ValidationError::InvalidTimeWindow);
        }
        Ok(())
    }

    /// Explicit window if given, else the whole video, else none.
    pub fn effective_window(&self) -> Option<TimeWindow> {
        match (&self.window, &self.video) {
            (Some(RequestedWindow {
                begin: Some(begin),
                end: Some(end),
            }), _) => Some(TimeWindow::new(*begin, *end)),
            (Some(_), _) => None,
            (None, Some(video)) => Some(TimeWindow::new(Duration::ZERO, video.end_time)),
            (None, None) => None,
        }
    }

    pub fn vod_id(&self) -> Option<&str> {
        match &self.source {
            ChatSource::VodId(id) => Some(id.trim()),
            ChatSource::LogFile(_) => None,
        }
    }
}

fn is_empty(path: &Path) -> bool {
    path.as_os_str().is_empty()
}

/// Where a downloaded chat log is stored before conversion.
pub fn chat_log_path(output_dir: &Path, vod_id: &str) -> PathBuf {
    output_dir.join(format!("{vod_id}.{CHAT_LOG_EXTENSION}"))
}

/// Final chat file path, named after the video if there is one.
pub fn chat_file_path(output_dir: &Path, chat_log: &Path, video: Option<&VideoContext>) -> PathBuf {
    let named_after = video.map_or(chat_log, |v| v.file_path.as_path());
    let stem = named_after
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "chat".to_string());
    output_dir.join(format!("{stem}.{CHAT_FILE_EXTENSION}"))
}
