use std::path::Path;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::fs;

use crate::{
    chat::{TranscriptFetcher, TwitchApi},
    error::FetchError,
    events::{PercentTracker, ProgressReporter},
    request::TimeWindow,
    types::{Comment, CommentPage, VideoInfo},
};

const DOWNLOADING: &str = "Downloading chat log...";

/// Downloads a VOD's chat log page by page from the v5 comments endpoint.
pub struct TwitchCommentFetcher {
    api: TwitchApi,
}

impl TwitchCommentFetcher {
    pub fn new(api: TwitchApi) -> Self {
        Self { api }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let response = self.api.get(url, query).await?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn video_length(&self, vod_id: u64) -> Result<f64, FetchError> {
        let url = self.api.url(&format!("v5/videos/{vod_id}"));
        let info: VideoInfo = self.get_json(&url, &[]).await?;
        Ok(info.length as f64)
    }

    async fn first_page(&self, vod_id: u64, offset: f64) -> Result<CommentPage, FetchError> {
        let url = self.api.url(&format!("v5/videos/{vod_id}/comments"));
        let offset = format!("{}", offset.floor() as u64);
        self.get_json(&url, &[("content_offset_seconds", offset.as_str())])
            .await
    }

    async fn next_page(&self, vod_id: u64, cursor: &str) -> Result<CommentPage, FetchError> {
        let url = self.api.url(&format!("v5/videos/{vod_id}/comments"));
        self.get_json(&url, &[("cursor", cursor)]).await
    }
}

#[async_trait]
impl TranscriptFetcher for TwitchCommentFetcher {
    async fn fetch(
        &self,
        vod_id: &str,
        destination: &Path,
        window: Option<TimeWindow>,
        progress: &ProgressReporter,
    ) -> Result<(), FetchError> {
        let numeric_id: u64 = vod_id.trim().parse().map_err(|_| FetchError::InvalidVodId {
            vod_id: vod_id.to_string(),
        })?;

        let (begin, end) = match window {
            Some(w) => (w.begin.as_secs_f64(), w.end.as_secs_f64()),
            None => (0.0, self.video_length(numeric_id).await?),
        };
        tracing::info!(vod_id = numeric_id, begin, end, "downloading chat log");

        let mut tracker = PercentTracker::new();
        let mut comments: Vec<Comment> = Vec::new();
        let mut page = self.first_page(numeric_id, begin).await?;
        let mut pages = 1usize;

        let mut cursor: Option<String> = None;

        loop {
            let mut past_end = false;
            let received = page.comments.len();
            for comment in page.comments {
                if comment.content_offset_seconds < begin {
                    continue;
                }
                if comment.content_offset_seconds > end {
                    past_end = true;
                    break;
                }
                comments.push(comment);
            }

            if let Some(last) = comments.last()
                && let Some(percent) =
                    tracker.update(last.content_offset_seconds - begin, end - begin)
            {
                progress.report(DOWNLOADING, percent);
            }

            match page.next {
                Some(next) if !past_end && received > 0 && cursor.as_ref() != Some(&next) => {
                    tracing::debug!(vod_id = numeric_id, pages, "fetching next comment page");
                    page = self.next_page(numeric_id, &next).await?;
                    cursor = Some(next);
                    pages += 1;
                }
                Some(next) if !past_end => {
                    tracing::warn!(vod_id = numeric_id, cursor = %next, "comment paging stalled");
                    break;
                }
                _ => break,
            }
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(destination, serde_json::to_vec(&comments)?).await?;

        if let Some(percent) = tracker.update(1.0, 1.0) {
            progress.report(DOWNLOADING, percent);
        }
        tracing::info!(
            vod_id = numeric_id,
            pages,
            comments = comments.len(),
            path = %destination.display(),
            "chat log downloaded"
        );

        Ok(())
    }
}
