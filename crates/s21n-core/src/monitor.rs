//! Lifecycle handle for the single running poll loop.

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::poll::{PollLoop, PollSnapshot, PollState};

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    status: watch::Receiver<PollSnapshot>,
}

/// Owns at most one poll loop task.
///
/// Starting always replaces the running loop, so a campus or credential change
/// gets a fresh session and seen set instead of mutating the old ones.
#[derive(Default)]
pub struct Monitor {
    running: Mutex<Option<Running>>,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop whatever is running and spawn `poll`.
    pub async fn start(&self, poll: PollLoop) {
        let mut slot = self.running.lock().await;
        if let Some(prev) = slot.take() {
            tracing::info!("restarting monitoring");
            shutdown(prev);
        }

        let cancel = CancellationToken::new();
        let (tx, rx) = watch::channel(poll.snapshot());
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            // Rejected credentials are already reported to the chat by the loop.
            if let Err(e) = poll.run(task_cancel, tx).await {
                tracing::debug!("poll loop ended: {e}");
            }
        });

        *slot = Some(Running {
            cancel,
            handle,
            status: rx,
        });
    }

    /// Returns whether a live loop was stopped.
    pub async fn stop(&self) -> bool {
        let Some(prev) = self.running.lock().await.take() else {
            return false;
        };
        let was_live = !prev.handle.is_finished();
        shutdown(prev);
        was_live
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Latest snapshot of the current (or last) loop, if one was started.
    pub async fn status(&self) -> Option<PollSnapshot> {
        let slot = self.running.lock().await;
        let running = slot.as_ref()?;
        let mut snap = running.status.borrow().clone();
        if running.handle.is_finished() {
            snap.state = PollState::Stopped;
        }
        Some(snap)
    }
}

fn shutdown(running: Running) {
    running.cancel.cancel();
    running.handle.abort(); // best-effort, the loop may be mid-tick
}
