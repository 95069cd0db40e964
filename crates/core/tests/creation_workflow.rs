use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc::UnboundedReceiver};
use vodchat_core::{
    CancellationToken, ChatFileCreator, ConvertError, CreationError, CreationRequest,
    CreationStatus, EventBus, EventKind, FetchError, ProgressEvent, ProgressReporter, Subscription,
    SubscriptionSpec, TimeWindow, TranscriptConverter, TranscriptFetcher, VideoContext,
    events::EnrichedEvent,
};

const CLIENT_ID: &str = "test-client-id";

#[derive(Default)]
struct WritingFetcher {
    calls: Mutex<Vec<(String, PathBuf, Option<TimeWindow>)>>,
}

#[async_trait]
impl TranscriptFetcher for WritingFetcher {
    async fn fetch(
        &self,
        vod_id: &str,
        destination: &Path,
        window: Option<TimeWindow>,
        progress: &ProgressReporter,
    ) -> Result<(), FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((vod_id.to_string(), destination.to_path_buf(), window));
        progress.report("Downloading chat log...", 50);
        tokio::fs::write(destination, b"[]").await?;
        progress.report("Downloading chat log...", 100);
        Ok(())
    }
}

struct FailingFetcher;

#[async_trait]
impl TranscriptFetcher for FailingFetcher {
    async fn fetch(
        &self,
        _vod_id: &str,
        _destination: &Path,
        _window: Option<TimeWindow>,
        _progress: &ProgressReporter,
    ) -> Result<(), FetchError> {
        Err(FetchError::Other("network unreachable".to_string()))
    }
}

/// Blocks inside `fetch` until released, so a run can be held active.
#[derive(Default)]
struct GatedFetcher {
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl TranscriptFetcher for GatedFetcher {
    async fn fetch(
        &self,
        _vod_id: &str,
        destination: &Path,
        _window: Option<TimeWindow>,
        _progress: &ProgressReporter,
    ) -> Result<(), FetchError> {
        self.entered.notify_one();
        self.release.notified().await;
        tokio::fs::write(destination, b"[]").await?;
        Ok(())
    }
}

/// Records its calls; writes the destination only when `write` is set.
#[derive(Default)]
struct RecordingConverter {
    write: bool,
    calls: Mutex<Vec<(PathBuf, PathBuf, Option<TimeWindow>)>>,
}

impl RecordingConverter {
    fn writing() -> Self {
        Self {
            write: true,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TranscriptConverter for RecordingConverter {
    async fn convert(
        &self,
        source: &Path,
        destination: &Path,
        window: Option<TimeWindow>,
        progress: &ProgressReporter,
    ) -> Result<(), ConvertError> {
        self.calls.lock().unwrap().push((
            source.to_path_buf(),
            destination.to_path_buf(),
            window,
        ));
        progress.report("Converting chat log...", 100);
        if self.write {
            tokio::fs::write(destination, b"#CHT1\n").await?;
        }
        Ok(())
    }
}

struct FailingConverter;

#[async_trait]
impl TranscriptConverter for FailingConverter {
    async fn convert(
        &self,
        _source: &Path,
        _destination: &Path,
        _window: Option<TimeWindow>,
        _progress: &ProgressReporter,
    ) -> Result<(), ConvertError> {
        Err(ConvertError::Other("unexpected token".to_string()))
    }
}

struct PanickingFetcher;

#[async_trait]
impl TranscriptFetcher for PanickingFetcher {
    async fn fetch(
        &self,
        _vod_id: &str,
        _destination: &Path,
        _window: Option<TimeWindow>,
        _progress: &ProgressReporter,
    ) -> Result<(), FetchError> {
        panic!("fetcher bug")
    }
}

struct PanickingConverter;

#[async_trait]
impl TranscriptConverter for PanickingConverter {
    async fn convert(
        &self,
        _source: &Path,
        _destination: &Path,
        _window: Option<TimeWindow>,
        progress: &ProgressReporter,
    ) -> Result<(), ConvertError> {
        progress.report("Converting chat log...", 10);
        panic!("converter bug")
    }
}

struct Harness {
    creator: ChatFileCreator,
    rx: UnboundedReceiver<EnrichedEvent>,
    _collector: Subscription,
}

fn creator_with(
    fetcher: Arc<dyn TranscriptFetcher>,
    converter: Arc<dyn TranscriptConverter>,
) -> Harness {
    let bus = EventBus::new();
    let (collector, rx) = bus
        .subscribe_channel(SubscriptionSpec::all("test.collector"))
        .unwrap();
    Harness {
        creator: ChatFileCreator::new(bus, fetcher, converter, Some(CLIENT_ID.to_string())),
        rx,
        _collector: collector,
    }
}

fn drain(rx: &mut UnboundedReceiver<EnrichedEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(e) = rx.try_recv() {
        events.push(e.event);
    }
    events
}

async fn run(creator: &ChatFileCreator, request: CreationRequest) -> Result<PathBuf, CreationError> {
    creator
        .request_creation(request, CancellationToken::new())
        .wait()
        .await
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

#[tokio::test]
async fn empty_output_directory_emits_only_failed() {
    let Harness { creator, mut rx, _collector } = creator_with(
        Arc::new(WritingFetcher::default()),
        Arc::new(RecordingConverter::default()),
    );

    let result = run(&creator, CreationRequest::from_log_file("", "/in/log.json")).await;

    assert!(result.is_err());
    assert_eq!(
        drain(&mut rx),
        vec![ProgressEvent::failed(
            "You must specify the output directory for this VOD Set."
        )]
    );
    assert!(!creator.is_busy());
}

#[tokio::test]
async fn empty_chat_log_path_emits_only_failed() {
    let Harness { creator, mut rx, _collector } = creator_with(
        Arc::new(WritingFetcher::default()),
        Arc::new(RecordingConverter::default()),
    );

    run(&creator, CreationRequest::from_log_file("/out", "")).await.unwrap_err();

    assert_eq!(
        drain(&mut rx),
        vec![ProgressEvent::failed(
            "You must specify the path of the chat log file."
        )]
    );
}

#[tokio::test]
async fn empty_vod_id_emits_only_failed() {
    let fetcher = Arc::new(WritingFetcher::default());
    let Harness { creator, mut rx, _collector } =
        creator_with(fetcher.clone(), Arc::new(RecordingConverter::default()));

    run(&creator, CreationRequest::from_vod_id("/out", "")).await.unwrap_err();

    assert_eq!(
        drain(&mut rx),
        vec![ProgressEvent::failed("VOD ID cannot be empty.")]
    );
    assert!(fetcher.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn missing_client_id_emits_only_failed() {
    let bus = EventBus::new();
    let (_sub, mut rx) = bus.subscribe_channel(SubscriptionSpec::all("test")).unwrap();
    let creator = ChatFileCreator::new(
        bus,
        Arc::new(WritingFetcher::default()),
        Arc::new(RecordingConverter::default()),
        None,
    );

    run(&creator, CreationRequest::from_log_file("/out", "/in/log.json"))
        .await
        .unwrap_err();

    assert_eq!(
        drain(&mut rx),
        vec![ProgressEvent::failed(
            "Your Twitch Client ID hasn't been set up yet.\nPlease set up your Client ID first before creating a VOD Set."
        )]
    );
}

#[tokio::test]
async fn half_open_time_window_emits_only_failed() {
    let Harness { creator, mut rx, _collector } = creator_with(
        Arc::new(WritingFetcher::default()),
        Arc::new(RecordingConverter::default()),
    );

    let begin_only = CreationRequest::from_vod_id("/out", "1").with_window(Some(secs(5)), None);
    let end_only = CreationRequest::from_vod_id("/out", "1").with_window(None, Some(secs(5)));
    run(&creator, begin_only).await.unwrap_err();
    run(&creator, end_only).await.unwrap_err();

    let invalid = ProgressEvent::failed("Invalid Begin Time or End Time.");
    assert_eq!(drain(&mut rx), vec![invalid.clone(), invalid]);
}

#[tokio::test]
async fn log_file_run_emits_started_progress_completed() {
    let converter = Arc::new(RecordingConverter::default());
    let Harness { creator, mut rx, _collector } =
        creator_with(Arc::new(WritingFetcher::default()), converter.clone());

    let path = run(&creator, CreationRequest::from_log_file("/out", "/in/log.json"))
        .await
        .unwrap();

    assert_eq!(path, PathBuf::from("/out/log.cht"));
    assert_eq!(
        drain(&mut rx),
        vec![
            ProgressEvent::started("Creating Chat file..."),
            ProgressEvent::progress("Converting chat log...", 100),
            ProgressEvent::completed("Successfully created chat file!", "/out/log.cht"),
        ]
    );
    assert_eq!(
        *converter.calls.lock().unwrap(),
        vec![(
            PathBuf::from("/in/log.json"),
            PathBuf::from("/out/log.cht"),
            None
        )]
    );
}

#[tokio::test]
async fn vod_run_converts_and_removes_downloaded_log() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(WritingFetcher::default());
    let converter = Arc::new(RecordingConverter::writing());
    let Harness { creator, mut rx, _collector } = creator_with(fetcher.clone(), converter.clone());

    let path = run(&creator, CreationRequest::from_vod_id(dir.path(), "12345"))
        .await
        .unwrap();

    let chat_log = dir.path().join("12345.json");
    assert_eq!(path, dir.path().join("12345.cht"));
    assert!(path.exists());
    assert!(!chat_log.exists());
    assert_eq!(fetcher.calls.lock().unwrap()[0].1, chat_log);
    assert_eq!(converter.calls.lock().unwrap()[0].0, chat_log);

    let events = drain(&mut rx);
    assert_eq!(events.first(), Some(&ProgressEvent::started("Creating Chat file...")));
    assert_eq!(
        events.last(),
        Some(&ProgressEvent::completed("Successfully created chat file!", path))
    );
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::Progress { .. }))
            .count(),
        3
    );
}

#[tokio::test]
async fn fetch_failure_is_reported_and_frees_the_creator() {
    let converter = Arc::new(RecordingConverter::default());
    let Harness { creator, mut rx, _collector } =
        creator_with(Arc::new(FailingFetcher), converter.clone());

    let error = run(&creator, CreationRequest::from_vod_id("/out", "12345"))
        .await
        .unwrap_err();

    assert!(matches!(error, CreationError::Fetch(_)));
    let events = drain(&mut rx);
    let failed: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Failed { message } => Some(message.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        failed,
        vec!["Error occured creating VOD Set directory: network unreachable"]
    );
    assert!(!events.iter().any(|e| matches!(e, ProgressEvent::Completed { .. })));
    assert!(converter.calls.lock().unwrap().is_empty());
    assert!(!creator.is_busy());
    assert_eq!(creator.status(), CreationStatus::Failed);

    let next = run(&creator, CreationRequest::from_log_file("/out", "/in/log.json")).await;
    assert_eq!(next.unwrap(), PathBuf::from("/out/log.cht"));
}

#[tokio::test]
async fn conversion_failure_keeps_downloaded_log() {
    let dir = tempfile::tempdir().unwrap();
    let Harness { creator, mut rx, _collector } =
        creator_with(Arc::new(WritingFetcher::default()), Arc::new(FailingConverter));

    let error = run(&creator, CreationRequest::from_vod_id(dir.path(), "777"))
        .await
        .unwrap_err();

    assert!(matches!(error, CreationError::Conversion(_)));
    assert!(dir.path().join("777.json").exists());
    assert_eq!(
        drain(&mut rx).last(),
        Some(&ProgressEvent::failed(
            "Error occured converting chat log: unexpected token"
        ))
    );
    assert!(!creator.is_busy());
}

#[tokio::test]
async fn panicking_converter_fails_the_run() {
    let Harness { creator, mut rx, _collector } = creator_with(
        Arc::new(WritingFetcher::default()),
        Arc::new(PanickingConverter),
    );

    let error = run(&creator, CreationRequest::from_log_file("/out", "/in/log.json"))
        .await
        .unwrap_err();

    assert!(matches!(error, CreationError::Conversion(ConvertError::Other(_))));
    assert_eq!(
        drain(&mut rx),
        vec![
            ProgressEvent::started("Creating Chat file..."),
            ProgressEvent::progress("Converting chat log...", 10),
            ProgressEvent::failed(
                "Error occured converting chat log: converter panicked: converter bug"
            ),
        ]
    );
    assert_eq!(creator.status(), CreationStatus::Failed);
    assert!(!creator.is_busy());

    let next = run(&creator, CreationRequest::from_log_file("/out", "/in/log.json")).await;
    assert!(next.is_err());
    assert!(!creator.is_busy());
}

#[tokio::test]
async fn panicking_fetcher_fails_the_run() {
    let converter = Arc::new(RecordingConverter::default());
    let Harness { creator, mut rx, _collector } =
        creator_with(Arc::new(PanickingFetcher), converter.clone());

    let error = run(&creator, CreationRequest::from_vod_id("/out", "12345"))
        .await
        .unwrap_err();

    assert!(matches!(error, CreationError::Fetch(FetchError::Other(_))));
    assert_eq!(
        drain(&mut rx).last(),
        Some(&ProgressEvent::failed(
            "Error occured creating VOD Set directory: fetcher panicked: fetcher bug"
        ))
    );
    assert!(converter.calls.lock().unwrap().is_empty());
    assert_eq!(creator.status(), CreationStatus::Failed);
}

#[tokio::test]
async fn every_run_event_carries_the_run_id() {
    let dir = tempfile::tempdir().unwrap();
    let Harness { creator, mut rx, _collector } = creator_with(
        Arc::new(WritingFetcher::default()),
        Arc::new(RecordingConverter::writing()),
    );

    let first = creator.request_creation(
        CreationRequest::from_vod_id(dir.path(), "1"),
        CancellationToken::new(),
    );
    let first_id = first.run_id().unwrap();
    first.wait().await.unwrap();

    let second = creator.request_creation(
        CreationRequest::from_vod_id(dir.path(), "2"),
        CancellationToken::new(),
    );
    let second_id = second.run_id().unwrap();
    second.wait().await.unwrap();
    assert_ne!(first_id, second_id);

    let mut events = Vec::new();
    while let Ok(e) = rx.try_recv() {
        events.push(e);
    }
    let first_run: Vec<_> = events.iter().filter(|e| e.run_id == Some(first_id)).collect();
    let second_run: Vec<_> = events.iter().filter(|e| e.run_id == Some(second_id)).collect();
    assert_eq!(first_run.len() + second_run.len(), events.len());
    for run_events in [first_run, second_run] {
        assert_eq!(run_events.first().unwrap().event.kind(), EventKind::Started);
        assert!(run_events.last().unwrap().event.is_terminal());
        assert_eq!(run_events.iter().filter(|e| e.event.is_terminal()).count(), 1);
    }
}

#[tokio::test]
async fn second_request_while_running_is_silently_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(GatedFetcher::default());
    let Harness { creator, mut rx, _collector } =
        creator_with(fetcher.clone(), Arc::new(RecordingConverter::writing()));

    let first = creator.request_creation(
        CreationRequest::from_vod_id(dir.path(), "1"),
        CancellationToken::new(),
    );
    fetcher.entered.notified().await;
    assert!(creator.is_busy());
    assert_eq!(creator.status(), CreationStatus::Fetching);
    let events_before = drain(&mut rx);

    // Invalid on purpose: a dropped request must not even be validated.
    let second = creator.request_creation(
        CreationRequest::from_log_file("", ""),
        CancellationToken::new(),
    );
    assert!(second.is_rejected());
    assert!(drain(&mut rx).is_empty());

    fetcher.release.notify_one();
    assert_eq!(first.wait().await.unwrap(), dir.path().join("1.cht"));
    assert!(matches!(second.wait().await, Err(CreationError::Busy)));

    assert_eq!(events_before, vec![ProgressEvent::started("Creating Chat file...")]);
    let events_after = drain(&mut rx);
    assert_eq!(
        events_after.last(),
        Some(&ProgressEvent::completed(
            "Successfully created chat file!",
            dir.path().join("1.cht")
        ))
    );
    assert!(
        !events_after
            .iter()
            .any(|e| matches!(e, ProgressEvent::Failed { .. }))
    );
}

#[tokio::test]
async fn video_context_names_output_and_bounds_window() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(WritingFetcher::default());
    let converter = Arc::new(RecordingConverter::writing());
    let Harness { creator, _collector, .. } = creator_with(fetcher.clone(), converter.clone());

    let request = CreationRequest::from_vod_id(dir.path(), "55").with_video(VideoContext {
        file_path: "/videos/highlights.mp4".into(),
        end_time: secs(90),
    });
    let path = run(&creator, request).await.unwrap();

    let expected_window = Some(TimeWindow::new(Duration::ZERO, secs(90)));
    assert_eq!(path, dir.path().join("highlights.cht"));
    assert_eq!(fetcher.calls.lock().unwrap()[0].2, expected_window);
    assert_eq!(converter.calls.lock().unwrap()[0].2, expected_window);
}

#[tokio::test]
async fn explicit_window_is_passed_verbatim() {
    let converter = Arc::new(RecordingConverter::default());
    let Harness { creator, _collector, .. } = creator_with(Arc::new(WritingFetcher::default()), converter.clone());

    let request = CreationRequest::from_log_file("/out", "/in/log.json")
        .with_window(Some(secs(60)), Some(secs(120)))
        .with_video(VideoContext {
            file_path: "/videos/full.mkv".into(),
            end_time: secs(3600),
        });
    let path = run(&creator, request).await.unwrap();

    assert_eq!(path, PathBuf::from("/out/full.cht"));
    assert_eq!(
        converter.calls.lock().unwrap()[0].2,
        Some(TimeWindow::new(secs(60), secs(120)))
    );
}

#[tokio::test]
async fn cancellation_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = Arc::new(GatedFetcher::default());
    let Harness { creator, mut rx, _collector } =
        creator_with(fetcher.clone(), Arc::new(RecordingConverter::writing()));
    let cancel = CancellationToken::new();

    let handle = creator.request_creation(
        CreationRequest::from_vod_id(dir.path(), "9"),
        cancel.clone(),
    );
    fetcher.entered.notified().await;
    cancel.cancel();

    assert!(matches!(handle.wait().await, Err(CreationError::Cancelled)));
    assert_eq!(
        drain(&mut rx).last(),
        Some(&ProgressEvent::failed("Chat file creation was cancelled."))
    );
    assert!(!creator.is_busy());
    assert!(!dir.path().join("9.cht").exists());
}

#[tokio::test]
async fn panicking_listener_does_not_break_the_run() {
    let Harness { creator, mut rx, _collector } = creator_with(
        Arc::new(WritingFetcher::default()),
        Arc::new(RecordingConverter::default()),
    );
    let _bad = creator
        .bus()
        .subscribe(SubscriptionSpec::all("test.panics"), |_| panic!("ui bug"))
        .unwrap();

    let path = run(&creator, CreationRequest::from_log_file("/out", "/in/log.json"))
        .await
        .unwrap();

    assert_eq!(path, PathBuf::from("/out/log.cht"));
    assert_eq!(drain(&mut rx).len(), 3);
    assert_eq!(creator.bus().metrics().listener_faults(), 3);
}

#[tokio::test]
async fn listener_can_start_next_run_from_terminal_event() {
    let converter = Arc::new(RecordingConverter::default());
    let Harness { creator, _collector, .. } = creator_with(Arc::new(FailingFetcher), converter.clone());
    let handles = Arc::new(Mutex::new(Vec::new()));

    let chained = creator.clone();
    let sink = Arc::clone(&handles);
    let _sub = creator
        .bus()
        .subscribe(
            SubscriptionSpec::only("test.chain", &[vodchat_core::EventKind::Failed]),
            move |_| {
                let handle = chained.request_creation(
                    CreationRequest::from_log_file("/out", "/in/retry.json"),
                    CancellationToken::new(),
                );
                sink.lock().unwrap().push(handle);
            },
        )
        .unwrap();

    run(&creator, CreationRequest::from_vod_id("/out", "1"))
        .await
        .unwrap_err();

    let handle = handles.lock().unwrap().pop().unwrap();
    assert!(!handle.is_rejected());
    assert_eq!(handle.wait().await.unwrap(), PathBuf::from("/out/retry.cht"));
}
