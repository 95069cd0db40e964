use std::{io::ErrorKind, path::Path, time::Duration};

use async_trait::async_trait;
use tokio::fs;

use crate::{
    chat::TranscriptConverter,
    error::ConvertError,
    events::{PercentTracker, ProgressReporter},
    format::{CHT_HEADER, format_cht_line},
    request::TimeWindow,
    types::Comment,
};

const CONVERTING: &str = "Converting chat log...";

/// Writes `.cht` chat files: a header line, then one tab separated line per
/// message with its offset relative to the window begin.
pub struct ChtConverter;

impl ChtConverter {
    pub fn new() -> Self {
        Self
    }

    pub fn render(
        comments: &mut [Comment],
        window: Option<TimeWindow>,
        progress: &ProgressReporter,
    ) -> String {
        comments.sort_by(|a, b| a.content_offset_seconds.total_cmp(&b.content_offset_seconds));

        let begin = window.map_or(Duration::ZERO, |w| w.begin);
        let total = comments.len() as f64;
        let mut tracker = PercentTracker::new();
        let mut out = String::from(CHT_HEADER);
        out.push('\n');

        for (i, comment) in comments.iter().enumerate() {
            let offset = Duration::try_from_secs_f64(comment.content_offset_seconds)
                .unwrap_or(Duration::ZERO);
            if window.is_none_or(|w| w.contains(offset)) {
                out.push_str(&format_cht_line(
                    offset.saturating_sub(begin),
                    comment.message.user_color.as_deref(),
                    &comment.commenter.display_name,
                    &comment.message.body,
                ));
                out.push('\n');
            }
            if let Some(percent) = tracker.update((i + 1) as f64, total) {
                progress.report(CONVERTING, percent);
            }
        }

        if let Some(percent) = tracker.update(total, total) {
            progress.report(CONVERTING, percent);
        }
        out
    }
}

impl Default for ChtConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptConverter for ChtConverter {
    async fn convert(
        &self,
        source: &Path,
        destination: &Path,
        window: Option<TimeWindow>,
        progress: &ProgressReporter,
    ) -> Result<(), ConvertError> {
        let raw = match fs::read(source).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ConvertError::SourceNotFound {
                    path: source.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let mut comments: Vec<Comment> = serde_json::from_slice(&raw)?;
        tracing::info!(
            source = %source.display(),
            comments = comments.len(),
            "converting chat log"
        );

        let rendered = Self::render(&mut comments, window, progress);

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(destination, rendered).await?;
        tracing::info!(path = %destination.display(), "chat file written");

        Ok(())
    }
}
