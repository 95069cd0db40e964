pub mod chat;
pub mod config;
pub mod creator;
pub mod error;
pub mod events;
pub mod format;
pub mod request;
pub mod types;

pub use chat::{
    ChannelResolver, ChtConverter, TranscriptConverter, TranscriptFetcher, TwitchApi,
    TwitchChannelResolver, TwitchCommentFetcher,
};
pub use config::Settings;
pub use creator::{ChatFileCreator, CreationHandle, CreationStatus};
pub use error::{
    ConfigError, ConvertError, CreationError, FetchError, ResolveError, Result, ValidationError,
};
pub use events::{EventBus, EventKind, ProgressEvent, ProgressReporter, Subscription, SubscriptionSpec};
pub use format::format_timestamp;
pub use request::{ChatSource, CreationRequest, RequestedWindow, TimeWindow, VideoContext};
pub use tokio_util::sync::CancellationToken;
