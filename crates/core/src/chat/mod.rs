//! Collaborators the chat file creator delegates to: downloading a chat
//! log, converting it to a `.cht` file and looking up channel ids.

pub mod api;
pub mod converter;
pub mod fetcher;
pub mod resolver;

pub use api::*;
pub use converter::*;
pub use fetcher::*;
pub use resolver::*;

use std::path::Path;

use async_trait::async_trait;

use crate::{
    error::{ConvertError, FetchError, ResolveError},
    events::ProgressReporter,
    request::TimeWindow,
};

#[async_trait]
pub trait TranscriptFetcher: Send + Sync {
    /// Download the chat log of `vod_id` into `destination`.
    async fn fetch(
        &self,
        vod_id: &str,
        destination: &Path,
        window: Option<TimeWindow>,
        progress: &ProgressReporter,
    ) -> Result<(), FetchError>;
}

#[async_trait]
pub trait TranscriptConverter: Send + Sync {
    /// Turn the chat log at `source` into a chat file at `destination`.
    async fn convert(
        &self,
        source: &Path,
        destination: &Path,
        window: Option<TimeWindow>,
        progress: &ProgressReporter,
    ) -> Result<(), ConvertError>;
}

#[async_trait]
pub trait ChannelResolver: Send + Sync {
    async fn resolve_id(&self, channel_name: &str) -> Result<String, ResolveError>;
}
