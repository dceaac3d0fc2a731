//! Session management core module.
//!
//! This module provides the types and submodules for running live-capture
//! sessions: the session status, the capture loop owned by a session's
//! worker, the handle used to observe and stop it from elsewhere, and the
//! registry that keeps at most one live session per slot.

use serde::{Deserialize, Serialize};

/// Handle shared between the registry and request handlers.
pub mod active_session;
/// Capture loop and session state snapshots.
pub mod session;
/// Process-wide table of sessions keyed by slot.
pub mod session_registry;

pub use active_session::SessionHandle;
pub use session::{CaptureSession, SessionSnapshot};
pub use session_registry::{SessionRegistry, DEFAULT_SLOT};

/// Represents the current status of a capture session.
///
/// Variants:
/// - `Idle`: created, capture handle not opened yet.
/// - `Running`: the acquisition loop is pulling frames.
/// - `Stopping`: a stop was requested; the loop is winding down.
/// - `Completed`: the loop ended (stop, limit or end of stream) and records were handed off.
/// - `Failed`: the capture handle could not be opened or failed mid-capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Running,
    Stopping,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }

    /// Whether the session still occupies its slot.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}
