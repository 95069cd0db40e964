use std::path::PathBuf;

use thiserror::Error;

/// Request rejected before any I/O. The display text is what the user sees.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("You must specify the output directory for this VOD Set.")]
    MissingOutputDirectory,

    #[error("You must specify the path of the chat log file.")]
    MissingChatLogPath,

    #[error("VOD ID cannot be empty.")]
    MissingVodId,

    #[error(
        "Your Twitch Client ID hasn't been set up yet.\nPlease set up your Client ID first before creating a VOD Set."
    )]
    MissingClientId,

    #[error("Invalid Begin Time or End Time.")]
    InvalidTimeWindow,
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid VOD ID: {vod_id}")]
    InvalidVodId { vod_id: String },

    #[error("request to {url} failed with status {status}")]
    Status { url: String, status: u16 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("chat log not found at {path}")]
    SourceNotFound { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Channel not found: {channel}")]
    NotFound { channel: String },

    #[error("request to {url} failed with status {status}")]
    Status { url: String, status: u16 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine the configuration directory")]
    NoConfigDir,

    #[error("Failed to read settings at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write settings at {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse settings at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Outcome of a creation run that did not produce a chat file.
#[derive(Error, Debug)]
pub enum CreationError {
    #[error("A chat file is already being created.")]
    Busy,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Error occured creating VOD Set directory: {0}")]
    Fetch(#[source] FetchError),

    #[error("Error occured converting chat log: {0}")]
    Conversion(#[source] ConvertError),

    #[error("Chat file creation was cancelled.")]
    Cancelled,

    #[error("Chat file creation task aborted: {0}")]
    Aborted(String),
}

pub type Result<T> = std::result::Result<T, CreationError>;
