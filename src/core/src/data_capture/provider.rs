//! Capture provider seam.
//!
//! A provider opens an interface and hands back a [`FrameSource`]. The source's
//! `next_frame` blocks its caller until a frame arrives, the stream ends, or the
//! source is aborted through a [`FrameAbort`] handle obtained beforehand. The
//! abort handle is the only piece that may be used from another thread while
//! the capture loop is blocked.

use std::sync::Arc;

use crate::error_handling::types::CaptureError;

use super::types::Frame;

pub trait CaptureProvider: Send + Sync {
    /// Opens a live frame source on `interface`.
    fn open(&self, interface: &str) -> Result<Box<dyn FrameSource>, CaptureError>;
}

pub trait FrameSource: Send {
    /// Blocks until the next frame is available.
    ///
    /// Returns `Ok(None)` at end of stream and `Err(CaptureError::Aborted)` when
    /// a forced abort released the wait.
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Handle that forces any blocked or future `next_frame` call to return.
    fn abort_handle(&self) -> Arc<dyn FrameAbort>;

    /// Releases the underlying capture resources. Calling it more than once,
    /// or after an abort, is a no-op.
    fn close(&mut self);
}

pub trait FrameAbort: Send + Sync {
    /// Forces the source to stop. Safe to call any number of times.
    fn abort(&self);
}
