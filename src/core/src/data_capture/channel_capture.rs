//! Channel-fed frame source.
//!
//! [`ChannelSource`] waits on a channel whose producing side is a
//! [`FrameFeeder`]. Aborting pushes a marker into that same channel, so a
//! `next_frame` call that is blocked with no traffic returns immediately.
//! Background acquisition threads (replay, pcap) and tests feed frames through
//! a feeder; dropping the feeder ends the stream.
//!
//! The channel is bounded. [`FrameFeeder::send`] waits for room (replay),
//! [`FrameFeeder::offer`] drops the frame when the loop has fallen behind
//! (live capture). Closing the source drains the channel so a producer waiting
//! for room is released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};

use log::{debug, trace, warn};

use crate::error_handling::types::CaptureError;

use super::provider::{CaptureProvider, FrameAbort, FrameSource};
use super::types::Frame;

/// Frames buffered between an acquisition thread and the capture loop.
pub const FEED_CAPACITY: usize = 4096;

enum Feed {
    Frame(Frame),
    EndOfStream,
    Failed(String),
    Aborted,
}

/// Producer half of a channel-fed source.
pub struct FrameFeeder {
    label: String,
    tx: SyncSender<Feed>,
    closed: Arc<AtomicBool>,
    dropped: AtomicU64,
    finished: bool,
}

impl FrameFeeder {
    /// Queues a frame, waiting while the channel is full. Fails once the
    /// consuming source has been closed or aborted.
    pub fn send(&self, frame: Frame) -> Result<(), CaptureError> {
        if self.is_closed() {
            return Err(CaptureError::Aborted);
        }
        self.tx
            .send(Feed::Frame(frame))
            .map_err(|_| CaptureError::Aborted)
    }

    /// Queues a frame without waiting. Returns `Ok(false)` when the channel is
    /// full and the frame was dropped.
    pub fn offer(&self, frame: Frame) -> Result<bool, CaptureError> {
        if self.is_closed() {
            return Err(CaptureError::Aborted);
        }
        match self.tx.try_send(Feed::Frame(frame)) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Ok(false)
            }
            Err(TrySendError::Disconnected(_)) => Err(CaptureError::Aborted),
        }
    }

    /// Frames dropped by [`offer`](Self::offer) so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Reports an unrecoverable acquisition error and ends the feed.
    pub fn fail(mut self, reason: impl Into<String>) {
        if !self.is_closed() {
            let _ = self.tx.send(Feed::Failed(reason.into()));
        }
        self.finished = true;
    }

    /// Signals end of stream.
    pub fn finish(self) {}

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for FrameFeeder {
    fn drop(&mut self) {
        let dropped = self.dropped();
        if dropped > 0 {
            warn!("{}: {} frame(s) dropped, capture loop fell behind", self.label, dropped);
        }
        if !self.finished && !self.is_closed() {
            let _ = self.tx.send(Feed::EndOfStream);
        }
    }
}

struct ChannelAbort {
    tx: Mutex<SyncSender<Feed>>,
    closed: Arc<AtomicBool>,
}

impl FrameAbort for ChannelAbort {
    fn abort(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // A full channel means the reader is not blocked; it sees the flag first.
        if let Ok(tx) = self.tx.lock() {
            let _ = tx.try_send(Feed::Aborted);
        }
    }
}

/// Consumer half of a channel-fed source.
pub struct ChannelSource {
    label: String,
    rx: Receiver<Feed>,
    abort: Arc<ChannelAbort>,
    ended: bool,
    on_close: Option<Box<dyn FnOnce() + Send>>,
}

impl ChannelSource {
    /// Creates a connected feeder/source pair buffering up to
    /// [`FEED_CAPACITY`] frames. `label` only appears in logs.
    pub fn pair(label: &str) -> (FrameFeeder, ChannelSource) {
        Self::with_capacity(label, FEED_CAPACITY)
    }

    pub fn with_capacity(label: &str, capacity: usize) -> (FrameFeeder, ChannelSource) {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        let closed = Arc::new(AtomicBool::new(false));
        let feeder = FrameFeeder {
            label: label.to_string(),
            tx: tx.clone(),
            closed: Arc::clone(&closed),
            dropped: AtomicU64::new(0),
            finished: false,
        };
        let source = ChannelSource {
            label: label.to_string(),
            rx,
            abort: Arc::new(ChannelAbort {
                tx: Mutex::new(tx),
                closed,
            }),
            ended: false,
            on_close: None,
        };
        (feeder, source)
    }

    /// Registers teardown work (e.g. joining an acquisition thread) run by `close`.
    pub fn on_close<F: FnOnce() + Send + 'static>(mut self, f: F) -> Self {
        self.on_close = Some(Box::new(f));
        self
    }

    fn aborted(&self) -> bool {
        self.abort.closed.load(Ordering::SeqCst)
    }
}

impl FrameSource for ChannelSource {
    fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.aborted() {
            return Err(CaptureError::Aborted);
        }
        if self.ended {
            return Ok(None);
        }
        match self.rx.recv() {
            Ok(Feed::Frame(frame)) => Ok(Some(frame)),
            Ok(Feed::EndOfStream) | Err(_) => {
                trace!("{}: end of stream", self.label);
                self.ended = true;
                Ok(None)
            }
            Ok(Feed::Failed(reason)) => {
                self.ended = true;
                Err(CaptureError::ProviderRead(reason))
            }
            Ok(Feed::Aborted) => Err(CaptureError::Aborted),
        }
    }

    fn abort_handle(&self) -> Arc<dyn FrameAbort> {
        self.abort.clone()
    }

    fn close(&mut self) {
        self.abort.closed.store(true, Ordering::SeqCst);
        while self.rx.try_recv().is_ok() {}
        if let Some(teardown) = self.on_close.take() {
            debug!("{}: closing source", self.label);
            teardown();
        }
    }
}

/// Provider handing out sources prepared in advance with [`ChannelProvider::feeder`].
///
/// Lets an embedding application (or a test) push already-dissected frames
/// into a capture session.
#[derive(Default)]
pub struct ChannelProvider {
    pending: Mutex<HashMap<String, ChannelSource>>,
}

impl ChannelProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepares a source for the next `open(interface)` and returns its feeder.
    pub fn feeder(&self, interface: &str) -> FrameFeeder {
        let (feeder, source) = ChannelSource::pair(interface);
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(interface.to_string(), source);
        }
        feeder
    }
}

impl CaptureProvider for ChannelProvider {
    fn open(&self, interface: &str) -> Result<Box<dyn FrameSource>, CaptureError> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| CaptureError::ProviderOpen("provider state poisoned".into()))?;
        pending
            .remove(interface)
            .map(|s| Box::new(s) as Box<dyn FrameSource>)
            .ok_or_else(|| CaptureError::ProviderOpen(format!("no such interface: {}", interface)))
    }
}
