//! Request cancellation.
//!
//! A [`CancelHandle`] is held by whoever owns the request (a CLI Ctrl-C
//! listener, an HTTP handler); the matching [`CancelToken`] is passed into
//! the answer loop, which checks it around every suspension point.
//! Dropping the handle without cancelling leaves the token live forever.

use tokio::sync::watch;

/// Sending side: flips every linked token to cancelled.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Receiving side, cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

/// Create a linked handle/token pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        // Err only when no token is alive.
        let _ = self.tx.send(true);
    }
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (handle, token) = cancel_pair();
        // Closed sender: `cancelled()` parks forever.
        drop(handle);
        token
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the linked handle cancels.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
