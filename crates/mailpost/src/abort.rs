//! Caller-driven cancellation of a send.

use std::sync::Arc;

use tokio::sync::watch;

/// Creates a connected abort handle and signal.
///
/// ```
/// let (handle, signal) = mailpost::abort_pair();
/// assert!(!signal.is_aborted());
/// handle.abort();
/// assert!(signal.is_aborted());
/// ```
#[must_use]
pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (sender, receiver) = watch::channel(false);
    (
        AbortHandle {
            sender: Arc::new(sender),
        },
        AbortSignal {
            receiver: Some(receiver),
        },
    )
}

/// Triggers the paired [`AbortSignal`].
#[derive(Debug, Clone)]
pub struct AbortHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    /// Aborts every send using the paired signal.
    pub fn abort(&self) {
        self.sender.send_replace(true);
    }
}

/// Observed by a send; resolves once the paired handle aborts.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    receiver: Option<watch::Receiver<bool>>,
}

impl AbortSignal {
    /// A signal that never fires.
    #[must_use]
    pub const fn never() -> Self {
        Self { receiver: None }
    }

    /// Returns true if the paired handle has aborted.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.receiver
            .as_ref()
            .is_some_and(|receiver| *receiver.borrow())
    }

    /// Waits until the paired handle aborts. Never resolves if the handle is
    /// dropped without aborting.
    pub async fn aborted(&mut self) {
        let Some(receiver) = self.receiver.as_mut() else {
            return std::future::pending().await;
        };
        let fired = receiver.wait_for(|aborted| *aborted).await.is_ok();
        if !fired {
            std::future::pending::<()>().await;
        }
    }
}
