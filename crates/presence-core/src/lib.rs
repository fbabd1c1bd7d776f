//! presence-core — Check-in session logic: state machine, recognition
//! poller, and cancellation primitives.
//!
//! The camera, the remote recognition service, and the notification sink
//! all live behind the seams in [`traits`], so the whole flow is drivable
//! from a CLI, a UI, or a test harness without touching hardware or the
//! network.

pub mod cancel;
pub mod poller;
pub mod session;
pub mod state;
pub mod traits;
pub mod types;

pub use poller::TickOutcome;
pub use session::{CheckinSession, ScanOutcome, SessionConfig, SessionError, SessionHandle};
pub use state::{transition, SessionEvent, SessionState};
pub use traits::{
    BackendError, CaptureError, FrameSource, Notifier, NullNotifier, RecognitionBackend,
};
pub use types::{CapturedFrame, CheckinAction, CheckinOutcome, DetectionResult};
