//! The chat file creation workflow.
//!
//! A run validates the request, optionally downloads the chat log of a VOD,
//! converts it to a `.cht` chat file and deletes the downloaded log again.
//! Everything the caller needs to show progress goes over the [`EventBus`];
//! the returned [`CreationHandle`] additionally resolves to the outcome.
//!
//! Only one run is active per [`ChatFileCreator`]. Requests made while a run
//! is active are dropped without emitting any event.

use std::{
    panic::AssertUnwindSafe,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use futures_util::FutureExt;
use serde::Serialize;
use tokio::{fs, sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    chat::{ChtConverter, TranscriptConverter, TranscriptFetcher, TwitchApi, TwitchCommentFetcher},
    config::Settings,
    error::{ConvertError, CreationError, FetchError, Result},
    events::{
        EventBus, EventKind, ProgressEvent, ProgressReporter, Subscription, SubscriptionSpec,
        bus::panic_message,
    },
    request::{ChatSource, CreationRequest, chat_file_path, chat_log_path},
};

pub const STARTED_MESSAGE: &str = "Creating Chat file...";
pub const COMPLETED_MESSAGE: &str = "Successfully created chat file!";

const RELAY_SUBSCRIBER_ID: &str = "creator.progress_relay";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationStatus {
    Idle,
    Validating,
    Fetching,
    Converting,
    Completed,
    Failed,
}

#[derive(Clone)]
pub struct ChatFileCreator {
    inner: Arc<CreatorInner>,
}

struct CreatorInner {
    bus: EventBus,
    fetcher: Arc<dyn TranscriptFetcher>,
    converter: Arc<dyn TranscriptConverter>,
    client_id: Option<String>,
    busy: AtomicBool,
    status: watch::Sender<CreationStatus>,
}

/// Holds the single-flight flag; dropping it clears the flag.
struct FlightGuard {
    inner: Arc<CreatorInner>,
}

impl FlightGuard {
    fn acquire(inner: &Arc<CreatorInner>) -> Option<Self> {
        inner
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                inner: Arc::clone(inner),
            })
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.inner.busy.store(false, Ordering::Release);
    }
}

enum HandleState {
    Rejected,
    Running(JoinHandle<Result<PathBuf>>),
}

/// Completion handle of a creation request.
pub struct CreationHandle {
    run_id: Option<Uuid>,
    state: HandleState,
}

impl CreationHandle {
    /// `None` when the request was dropped because a run was active.
    pub fn run_id(&self) -> Option<Uuid> {
        self.run_id
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.state, HandleState::Rejected)
    }

    /// Waits for the run and returns the chat file path.
    pub async fn wait(self) -> Result<PathBuf> {
        match self.state {
            HandleState::Rejected => Err(CreationError::Busy),
            HandleState::Running(task) => task
                .await
                .map_err(|e| CreationError::Aborted(e.to_string()))?,
        }
    }
}

impl ChatFileCreator {
    pub fn new(
        bus: EventBus,
        fetcher: Arc<dyn TranscriptFetcher>,
        converter: Arc<dyn TranscriptConverter>,
        client_id: Option<String>,
    ) -> Self {
        let (status, _) = watch::channel(CreationStatus::Idle);
        Self {
            inner: Arc::new(CreatorInner {
                bus,
                fetcher,
                converter,
                client_id,
                busy: AtomicBool::new(false),
                status,
            }),
        }
    }

    /// Creator wired to the Twitch API and the `.cht` converter.
    pub fn for_twitch(bus: EventBus, settings: &Settings) -> Self {
        let client_id = settings.client_id().map(str::to_string);
        let api = TwitchApi::with_base_url(
            client_id.clone().unwrap_or_default(),
            settings.api_base_url(),
        );
        Self::new(
            bus,
            Arc::new(TwitchCommentFetcher::new(api)),
            Arc::new(ChtConverter::new()),
            client_id,
        )
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::Acquire)
    }

    pub fn status(&self) -> CreationStatus {
        *self.inner.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<CreationStatus> {
        self.inner.status.subscribe()
    }

    /// Starts a run on a background task.
    ///
    /// If a run is already active nothing happens: no event is published and
    /// the handle resolves to [`CreationError::Busy`].
    pub fn request_creation(
        &self,
        request: CreationRequest,
        cancel: CancellationToken,
    ) -> CreationHandle {
        let Some(guard) = FlightGuard::acquire(&self.inner) else {
            tracing::debug!("chat file creation already running; request dropped");
            return CreationHandle {
                run_id: None,
                state: HandleState::Rejected,
            };
        };

        let run_id = Uuid::new_v4();
        let inner = Arc::clone(&self.inner);
        let span = tracing::info_span!("chat_file", %run_id);
        let task = tokio::spawn(inner.execute(run_id, guard, request, cancel).instrument(span));

        CreationHandle {
            run_id: Some(run_id),
            state: HandleState::Running(task),
        }
    }
}

impl CreatorInner {
    async fn execute(
        self: Arc<Self>,
        run_id: Uuid,
        guard: FlightGuard,
        request: CreationRequest,
        cancel: CancellationToken,
    ) -> Result<PathBuf> {
        let outcome = self.run(run_id, &request, &cancel).await;

        self.status.send_replace(match &outcome {
            Ok(_) => CreationStatus::Completed,
            Err(_) => CreationStatus::Failed,
        });
        // Free for the next request before listeners hear about the outcome.
        drop(guard);

        match &outcome {
            Ok(path) => {
                tracing::info!(path = %path.display(), "chat file created");
                self.bus.publish_for_run(
                    run_id,
                    ProgressEvent::completed(COMPLETED_MESSAGE, path.clone()),
                );
            }
            Err(e) => {
                tracing::warn!("chat file creation failed: {e}");
                self.bus
                    .publish_for_run(run_id, ProgressEvent::failed(e.to_string()));
            }
        }
        outcome
    }

    async fn run(
        &self,
        run_id: Uuid,
        request: &CreationRequest,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        self.status.send_replace(CreationStatus::Validating);
        request.validate(self.client_id.as_deref())?;

        self.bus
            .publish_for_run(run_id, ProgressEvent::started(STARTED_MESSAGE));
        let window = request.effective_window();

        let chat_log = match &request.source {
            ChatSource::LogFile(path) => path.clone(),
            ChatSource::VodId(vod_id) => {
                let vod_id = vod_id.trim();
                let path = chat_log_path(&request.output_dir, vod_id);
                self.status.send_replace(CreationStatus::Fetching);
                tracing::info!(vod_id, path = %path.display(), "fetching chat log");

                let (reporter, relay) = self.relay(run_id)?;
                let fetch = AssertUnwindSafe(self.fetcher.fetch(vod_id, &path, window, &reporter))
                    .catch_unwind();
                let fetched = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(CreationError::Cancelled),
                    r = fetch => match r {
                        Ok(r) => r.map_err(CreationError::Fetch),
                        Err(payload) => Err(CreationError::Fetch(FetchError::Other(format!(
                            "fetcher panicked: {}",
                            panic_message(payload.as_ref())
                        )))),
                    },
                };
                drop(relay);
                fetched?;
                path
            }
        };

        let chat_file = chat_file_path(&request.output_dir, &chat_log, request.video.as_ref());
        self.status.send_replace(CreationStatus::Converting);
        tracing::info!(
            source = %chat_log.display(),
            destination = %chat_file.display(),
            "converting chat log"
        );

        let (reporter, relay) = self.relay(run_id)?;
        let convert =
            AssertUnwindSafe(self.converter.convert(&chat_log, &chat_file, window, &reporter))
                .catch_unwind();
        let converted = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CreationError::Cancelled),
            r = convert => match r {
                Ok(r) => r.map_err(CreationError::Conversion),
                Err(payload) => Err(CreationError::Conversion(ConvertError::Other(format!(
                    "converter panicked: {}",
                    panic_message(payload.as_ref())
                )))),
            },
        };
        drop(relay);
        converted?;

        if request.vod_id().is_some() {
            fs::remove_file(&chat_log)
                .await
                .map_err(|e| CreationError::Conversion(ConvertError::Io(e)))?;
            tracing::debug!(path = %chat_log.display(), "removed downloaded chat log");
        }

        Ok(chat_file)
    }

    /// Per-phase reporter whose progress is re-published on the main bus,
    /// stamped with `run_id`, for as long as the returned subscription lives.
    fn relay(&self, run_id: Uuid) -> Result<(ProgressReporter, Subscription)> {
        let phase_bus = EventBus::with_session(self.bus.session_id());
        let main_bus = self.bus.clone();
        let relay = phase_bus
            .subscribe(
                SubscriptionSpec::only(RELAY_SUBSCRIBER_ID, &[EventKind::Progress]),
                move |e| main_bus.publish_for_run(run_id, e.event.clone()),
            )
            .map_err(|e| CreationError::Aborted(format!("{e:#}")))?;
        Ok((ProgressReporter::new(phase_bus), relay))
    }
}
