//! Cancellation primitive shared by polling ticks and the final submission.

use std::future::Future;

use tokio::sync::watch;

/// Resolution of a cancellable operation.
///
/// `Cancelled` is distinguishable from both success and failure so a torn
/// down session can discard it without touching any state.
#[derive(Debug)]
pub enum Outcome<T> {
    Done(T),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }
}

/// Sender half: tells the in-flight operation to stop.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Receiver half: carried by the operation.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

impl CancelHandle {
    /// Signal abort. Calling after natural completion, or repeatedly, is a
    /// no-op.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl CancelSignal {
    /// Resolve once the paired handle fires. Pends forever if the handle is
    /// dropped without cancelling, so it loses every `select!` it should
    /// lose.
    pub async fn fired(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // Handle gone; cancellation can never arrive.
                std::future::pending::<()>().await;
            }
        }
    }

    /// Run `fut` to completion unless this signal fires first.
    ///
    /// On cancellation the future is dropped, which aborts any underlying
    /// network call.
    pub async fn bind<T>(mut self, fut: impl Future<Output = T>) -> Outcome<T> {
        tokio::pin!(fut);
        tokio::select! {
            out = &mut fut => Outcome::Done(out),
            _ = self.fired() => Outcome::Cancelled,
        }
    }
}
