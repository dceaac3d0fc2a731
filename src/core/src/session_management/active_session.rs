use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;
use tokio::sync::watch;
use uuid::Uuid;

use crate::data_capture::provider::FrameAbort;

use super::session::SessionSnapshot;
use super::SessionStatus;

/// Cross-thread view of a running (or finished) capture session.
///
/// Held by the registry and cloned out to request handlers. It can read the
/// latest snapshot, wait for the session to finish, and request a stop. It
/// never touches the session's record buffer.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    stop_requested: Arc<AtomicBool>,
    abort: Option<Arc<dyn FrameAbort>>,
    state_tx: Arc<watch::Sender<SessionSnapshot>>,
    state: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub fn new(
        stop_requested: Arc<AtomicBool>,
        abort: Option<Arc<dyn FrameAbort>>,
        state_tx: Arc<watch::Sender<SessionSnapshot>>,
    ) -> Self {
        let state = state_tx.subscribe();
        let id = state.borrow().id;
        Self {
            id,
            stop_requested,
            abort,
            state_tx,
            state,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.borrow().status
    }

    pub fn is_active(&self) -> bool {
        self.status().is_active()
    }

    /// Requests the session to stop.
    ///
    /// Raises the stop flag and aborts the capture handle so a loop blocked on
    /// the next frame returns without waiting for traffic. Does not wait for
    /// the loop to finish; use [`wait_terminal`](Self::wait_terminal) for that.
    /// Returns `false` (and does nothing) unless the session was `Running`.
    pub fn stop(&self) -> bool {
        let initiated = self.state_tx.send_if_modified(|s| {
            if s.status == SessionStatus::Running {
                s.status = SessionStatus::Stopping;
                true
            } else {
                false
            }
        });
        if !initiated {
            return false;
        }
        info!("[{}] Stop requested", self.id);
        self.stop_requested.store(true, Ordering::SeqCst);
        if let Some(abort) = &self.abort {
            abort.abort();
        }
        true
    }

    /// Resolves once the session reaches `Completed` or `Failed`.
    pub async fn wait_terminal(&self) -> SessionSnapshot {
        let mut rx = self.state.clone();
        let done = rx
            .wait_for(|s| s.status.is_terminal())
            .await
            .map(|s| s.clone());
        done.unwrap_or_else(|_| self.snapshot())
    }
}
