use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use presence_core::{
    BackendError, CaptureError, CapturedFrame, CheckinAction, CheckinOutcome, CheckinSession,
    DetectionResult, FrameSource, Notifier, RecognitionBackend, ScanOutcome, SessionConfig,
    SessionError, SessionState, TickOutcome,
};

#[derive(Default)]
struct CameraCounters {
    acquired: AtomicUsize,
    released: AtomicUsize,
    captured: AtomicUsize,
}

/// Scripted camera: counts acquisitions and releases, hands out frames with
/// increasing sequence numbers.
struct ScriptedCamera {
    counters: Arc<CameraCounters>,
    live: bool,
    sequence: u64,
    fail_acquire: bool,
}

impl ScriptedCamera {
    fn new(counters: Arc<CameraCounters>) -> Self {
        Self {
            counters,
            live: false,
            sequence: 0,
            fail_acquire: false,
        }
    }
}

impl FrameSource for ScriptedCamera {
    fn acquire(&mut self) -> Result<(), CaptureError> {
        if self.fail_acquire {
            return Err(CaptureError::DeviceUnavailable("no such device".into()));
        }
        self.live = true;
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn capture(&mut self) -> Result<CapturedFrame, CaptureError> {
        if !self.live {
            return Err(CaptureError::NotAcquired);
        }
        self.sequence += 1;
        self.counters.captured.fetch_add(1, Ordering::SeqCst);
        Ok(CapturedFrame {
            image: vec![0xFF, 0xD8, 0xFF],
            sequence: self.sequence,
        })
    }

    fn release(&mut self) {
        if self.live {
            self.live = false;
            self.counters.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[derive(Clone, Copy)]
enum RecognizeReply {
    NoMatch,
    Match(&'static str),
    NetworkError,
    /// Never resolves; only a cancellation ends it.
    Hang,
}

#[derive(Clone)]
enum SubmitReply {
    Ok,
    Schedule(&'static str),
    NetworkError,
}

#[derive(Default)]
struct ScriptedBackend {
    recognize_replies: Mutex<VecDeque<RecognizeReply>>,
    submit_replies: Mutex<VecDeque<SubmitReply>>,
    recognize_calls: AtomicUsize,
    submit_calls: AtomicUsize,
    in_flight: AtomicBool,
    overlap_seen: AtomicBool,
}

impl ScriptedBackend {
    fn with_recognize(replies: impl IntoIterator<Item = RecognizeReply>) -> Arc<Self> {
        let backend = Self::default();
        backend
            .recognize_replies
            .lock()
            .unwrap()
            .extend(replies);
        Arc::new(backend)
    }

    fn push_submit(&self, reply: SubmitReply) {
        self.submit_replies.lock().unwrap().push_back(reply);
    }
}

fn detection(id: &str) -> DetectionResult {
    DetectionResult {
        identity_id: id.into(),
        display_name: format!("Employee {id}"),
        metadata: serde_json::Value::Null,
    }
}

#[async_trait]
impl RecognitionBackend for ScriptedBackend {
    async fn recognize(
        &self,
        _frame: &CapturedFrame,
    ) -> Result<Option<DetectionResult>, BackendError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlap_seen.store(true, Ordering::SeqCst);
        }
        self.recognize_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .recognize_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RecognizeReply::NoMatch);
        tokio::task::yield_now().await;
        let out = match reply {
            RecognizeReply::NoMatch => Ok(None),
            RecognizeReply::Match(id) => Ok(Some(detection(id))),
            RecognizeReply::NetworkError => Err(BackendError::Network("connection reset".into())),
            RecognizeReply::Hang => {
                self.in_flight.store(false, Ordering::SeqCst);
                std::future::pending().await
            }
        };
        self.in_flight.store(false, Ordering::SeqCst);
        out
    }

    async fn submit(
        &self,
        identity_id: &str,
        action: CheckinAction,
        timestamp: DateTime<Utc>,
    ) -> Result<CheckinOutcome, BackendError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .submit_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SubmitReply::Ok);
        match reply {
            SubmitReply::Ok => Ok(CheckinOutcome {
                identity_id: identity_id.into(),
                action,
                timestamp,
                record_id: "rec-1".into(),
            }),
            SubmitReply::Schedule(msg) => Err(BackendError::Schedule(msg.into())),
            SubmitReply::NetworkError => Err(BackendError::Network("connection reset".into())),
        }
    }
}

#[derive(Default)]
struct RecordingNotifier {
    matches: Mutex<Vec<String>>,
    recorded: Mutex<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    fn positive_match(&self, detection: &DetectionResult) {
        self.matches
            .lock()
            .unwrap()
            .push(detection.identity_id.clone());
    }

    fn submission_recorded(&self, outcome: &CheckinOutcome) {
        self.recorded.lock().unwrap().push(outcome.record_id.clone());
    }
}

fn fast_config() -> SessionConfig {
    SessionConfig {
        poll_interval: Duration::from_millis(5),
    }
}

fn session_with(
    backend: Arc<ScriptedBackend>,
) -> (
    CheckinSession,
    presence_core::SessionHandle,
    Arc<CameraCounters>,
    Arc<RecordingNotifier>,
) {
    let counters = Arc::new(CameraCounters::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let camera = ScriptedCamera::new(counters.clone());
    let (session, handle) = CheckinSession::new(
        fast_config(),
        Box::new(camera),
        backend,
        notifier.clone(),
    );
    (session, handle, counters, notifier)
}

#[tokio::test]
async fn matches_on_fourth_tick_and_releases_camera() {
    let backend = ScriptedBackend::with_recognize([
        RecognizeReply::NoMatch,
        RecognizeReply::NoMatch,
        RecognizeReply::NoMatch,
        RecognizeReply::Match("emp-7"),
    ]);
    let (mut session, _handle, counters, notifier) = session_with(backend.clone());

    session.open().unwrap();
    let outcome = session.scan().await.unwrap();

    let ScanOutcome::Detected(det) = outcome else {
        panic!("expected a detection");
    };
    assert_eq!(det.identity_id, "emp-7");
    assert_eq!(session.state(), SessionState::Detected);
    assert_eq!(backend.recognize_calls.load(Ordering::SeqCst), 4);
    assert_eq!(counters.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(counters.released.load(Ordering::SeqCst), 1);
    assert!(!backend.overlap_seen.load(Ordering::SeqCst));
    assert_eq!(notifier.matches.lock().unwrap().as_slice(), ["emp-7"]);
}

#[tokio::test]
async fn transient_failures_keep_scanning() {
    let backend = ScriptedBackend::with_recognize([
        RecognizeReply::NetworkError,
        RecognizeReply::NoMatch,
        RecognizeReply::NetworkError,
        RecognizeReply::Match("emp-1"),
    ]);
    let (mut session, _handle, counters, _notifier) = session_with(backend.clone());

    session.open().unwrap();
    let outcome = session.scan().await.unwrap();

    assert!(matches!(outcome, ScanOutcome::Detected(_)));
    assert_eq!(backend.recognize_calls.load(Ordering::SeqCst), 4);
    assert_eq!(counters.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retake_clears_detection_and_reacquires() {
    let backend = ScriptedBackend::with_recognize([
        RecognizeReply::Match("emp-7"),
        RecognizeReply::Match("emp-9"),
    ]);
    let (mut session, _handle, counters, _notifier) = session_with(backend.clone());

    session.open().unwrap();
    session.scan().await.unwrap();
    assert_eq!(session.state(), SessionState::Detected);

    session.retake().unwrap();
    assert_eq!(session.state(), SessionState::Scanning);
    assert!(session.detection().is_none());
    assert_eq!(counters.acquired.load(Ordering::SeqCst), 2);

    let outcome = session.scan().await.unwrap();
    let ScanOutcome::Detected(det) = outcome else {
        panic!("expected a detection after retake");
    };
    assert_eq!(det.identity_id, "emp-9");
    assert_eq!(counters.released.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn schedule_error_returns_to_detected_with_message() {
    let backend = ScriptedBackend::with_recognize([RecognizeReply::Match("emp-7")]);
    backend.push_submit(SubmitReply::Schedule("no schedule today"));
    let (mut session, _handle, _counters, _notifier) = session_with(backend.clone());

    session.open().unwrap();
    session.scan().await.unwrap();

    let err = session.submit(CheckinAction::CheckIn).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Backend(BackendError::Schedule(_))
    ));
    assert_eq!(session.state(), SessionState::Detected);
    assert_eq!(session.last_error(), Some("no schedule today"));
    assert_eq!(
        session.detection().map(|d| d.identity_id.as_str()),
        Some("emp-7")
    );

    // The user may retry from here.
    backend.push_submit(SubmitReply::Ok);
    let outcome = session.submit(CheckinAction::CheckIn).await.unwrap();
    assert_eq!(outcome.identity_id, "emp-7");
    assert_eq!(session.state(), SessionState::Success);
}

#[tokio::test]
async fn close_mid_request_releases_camera_once() {
    let backend = ScriptedBackend::with_recognize([RecognizeReply::Hang]);
    let (mut session, handle, counters, notifier) = session_with(backend.clone());

    session.open().unwrap();
    let task = tokio::spawn(async move {
        let outcome = session.scan().await;
        (outcome, session)
    });

    // Let the first tick get its request in flight, then close.
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.close();

    let (outcome, session) = task.await.unwrap();
    assert!(matches!(outcome.unwrap(), ScanOutcome::Closed));
    assert!(!session.is_open());
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.detection().is_none());
    assert_eq!(counters.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(counters.released.load(Ordering::SeqCst), 1);
    assert!(notifier.matches.lock().unwrap().is_empty());
}

#[tokio::test]
async fn close_before_any_tick_is_clean() {
    let backend = ScriptedBackend::with_recognize([]);
    let (mut session, handle, counters, _notifier) = session_with(backend.clone());

    session.open().unwrap();
    handle.close();
    let outcome = session.scan().await.unwrap();

    assert!(matches!(outcome, ScanOutcome::Closed));
    assert_eq!(counters.released.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn submit_success_is_terminal_and_close_is_idempotent() {
    let backend = ScriptedBackend::with_recognize([RecognizeReply::Match("emp-7")]);
    let (mut session, _handle, counters, notifier) = session_with(backend.clone());

    session.open().unwrap();
    session.scan().await.unwrap();
    let outcome = session.submit(CheckinAction::CheckOut).await.unwrap();

    assert_eq!(outcome.action, CheckinAction::CheckOut);
    assert_eq!(outcome.record_id, "rec-1");
    assert_eq!(session.state(), SessionState::Success);
    assert_eq!(notifier.recorded.lock().unwrap().as_slice(), ["rec-1"]);

    // Success still carries the identity until teardown.
    assert!(session.detection().is_some());

    session.close();
    let released = counters.released.load(Ordering::SeqCst);
    session.close();
    assert_eq!(counters.released.load(Ordering::SeqCst), released);
    assert_eq!(session.state(), SessionState::Idle);
}

#[tokio::test]
async fn ticks_after_stop_never_reach_the_backend() {
    let backend = ScriptedBackend::with_recognize([RecognizeReply::Match("emp-7")]);
    let (mut session, _handle, _counters, _notifier) = session_with(backend.clone());

    session.open().unwrap();
    assert_eq!(session.tick().await.unwrap(), TickOutcome::Matched);
    let calls = backend.recognize_calls.load(Ordering::SeqCst);

    // The poller stopped on the match; further ticks are guarded off.
    assert_eq!(session.tick().await.unwrap(), TickOutcome::Skipped);
    session.close();
    assert_eq!(session.tick().await.unwrap(), TickOutcome::Skipped);
    assert_eq!(backend.recognize_calls.load(Ordering::SeqCst), calls);
}

#[tokio::test]
async fn reopen_after_close_acquires_freshly() {
    let backend = ScriptedBackend::with_recognize([
        RecognizeReply::NoMatch,
        RecognizeReply::Match("emp-2"),
    ]);
    let (mut session, _handle, counters, _notifier) = session_with(backend.clone());

    session.open().unwrap();
    assert_eq!(session.tick().await.unwrap(), TickOutcome::NoMatch);
    session.close();
    assert_eq!(counters.released.load(Ordering::SeqCst), 1);

    session.open().unwrap();
    assert_eq!(counters.acquired.load(Ordering::SeqCst), 2);
    assert_eq!(session.tick().await.unwrap(), TickOutcome::Matched);
    assert_eq!(counters.released.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn open_fails_fatally_without_camera() {
    let backend = ScriptedBackend::with_recognize([]);
    let counters = Arc::new(CameraCounters::default());
    let mut camera = ScriptedCamera::new(counters.clone());
    camera.fail_acquire = true;
    let (mut session, _handle) = CheckinSession::new(
        fast_config(),
        Box::new(camera),
        backend,
        Arc::new(RecordingNotifier::default()),
    );

    let err = session.open().unwrap_err();
    assert!(matches!(
        err,
        SessionError::Camera(CaptureError::DeviceUnavailable(_))
    ));
    assert_eq!(session.state(), SessionState::Failed);
    assert!(!session.is_open());
    assert_eq!(counters.released.load(Ordering::SeqCst), 0);

    // No flow event is legal from Failed.
    assert!(session.submit(CheckinAction::CheckIn).await.is_err());
}

#[tokio::test]
async fn submit_without_detection_is_rejected() {
    let backend = ScriptedBackend::with_recognize([]);
    let (mut session, _handle, _counters, _notifier) = session_with(backend);

    session.open().unwrap();
    let err = session.submit(CheckinAction::CheckIn).await.unwrap_err();
    assert!(matches!(err, SessionError::Transition(_)));
    assert_eq!(session.state(), SessionState::Scanning);
}
