use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use log::{debug, error, info, trace};
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::data_capture::frame_parser::FrameParser;
use crate::data_capture::provider::FrameSource;
use crate::data_capture::publisher::Publisher;
use crate::data_capture::types::{Frame, Record};
use crate::error_handling::types::CaptureError;
use crate::storage::durable_sink::DurableSink;
use crate::storage::types::FinalizeOutcome;
use super::SessionStatus;

/// Point-in-time view of a session, as reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub slot: String,
    pub interface: String,
    pub packet_limit: usize,
    pub count: usize,
    pub status: SessionStatus,
    pub started_at: DateTime<Local>,
    pub ended_at: Option<DateTime<Local>>,
    pub base_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub finalize: Option<FinalizeOutcome>,
}

impl SessionSnapshot {
    pub fn new(
        id: Uuid,
        slot: &str,
        interface: &str,
        packet_limit: usize,
        started_at: DateTime<Local>,
    ) -> Self {
        Self {
            id,
            slot: slot.to_string(),
            interface: interface.to_string(),
            packet_limit,
            count: 0,
            status: SessionStatus::Idle,
            started_at,
            ended_at: None,
            base_time: None,
            error: None,
            finalize: None,
        }
    }
}

#[derive(Debug, PartialEq)]
enum LoopExit {
    StopRequested,
    LimitReached,
    EndOfStream,
    Failed(CaptureError),
}

/// The acquisition loop of one session.
///
/// Owned by the session's worker: the parser state, the record buffer and the
/// count are never touched from anywhere else. Other threads only see the
/// session through its published [`SessionSnapshot`] and can only raise the
/// stop flag (see [`SessionHandle::stop`](super::SessionHandle::stop)).
pub struct CaptureSession {
    id: Uuid,
    packet_limit: usize,
    started_at: DateTime<Local>,
    parser: FrameParser,
    records: Vec<Record>,
    last_relative: f64,
    stop_requested: Arc<AtomicBool>,
    publisher: Arc<dyn Publisher>,
    sink: Arc<DurableSink>,
    state: Arc<watch::Sender<SessionSnapshot>>,
}

impl CaptureSession {
    pub fn new(
        packet_limit: usize,
        stop_requested: Arc<AtomicBool>,
        publisher: Arc<dyn Publisher>,
        sink: Arc<DurableSink>,
        state: Arc<watch::Sender<SessionSnapshot>>,
    ) -> Self {
        let (id, started_at) = {
            let s = state.borrow();
            (s.id, s.started_at)
        };
        Self {
            id,
            packet_limit,
            started_at,
            parser: FrameParser::new(),
            records: Vec::new(),
            last_relative: 0.0,
            stop_requested,
            publisher,
            sink,
            state,
        }
    }

    /// Runs the loop to completion, closes `source`, hands the buffered
    /// records to the sink and publishes the terminal snapshot.
    pub fn run(mut self, mut source: Box<dyn FrameSource>) -> SessionSnapshot {
        info!("[{}] Capture loop started (limit {})", self.id, self.packet_limit);

        let exit = self.acquire(source.as_mut());
        source.close();
        debug!("[{}] Capture handle closed", self.id);

        let (status, error) = match &exit {
            LoopExit::Failed(e) => {
                error!("[{}] Capture failed after {} record(s): {}", self.id, self.records.len(), e);
                (SessionStatus::Failed, Some(e.to_string()))
            }
            other => {
                info!("[{}] Capture ended ({:?}) with {} record(s)", self.id, other, self.records.len());
                (SessionStatus::Completed, None)
            }
        };

        let outcome = self.sink.finalize(self.id, self.started_at, &self.records);
        let count = self.records.len();
        self.state.send_modify(|s| {
            s.count = count;
            s.status = status;
            s.ended_at = Some(Local::now());
            s.error = error;
            s.finalize = Some(outcome);
        });
        self.state.borrow().clone()
    }

    fn acquire(&mut self, source: &mut dyn FrameSource) -> LoopExit {
        loop {
            if self.stop_requested.load(Ordering::SeqCst) {
                return LoopExit::StopRequested;
            }
            if self.records.len() >= self.packet_limit {
                return LoopExit::LimitReached;
            }
            match source.next_frame() {
                Ok(Some(frame)) => self.ingest(&frame),
                Ok(None) => return LoopExit::EndOfStream,
                Err(CaptureError::Aborted) => return LoopExit::StopRequested,
                Err(_) if self.stop_requested.load(Ordering::SeqCst) => {
                    return LoopExit::StopRequested
                }
                Err(e) => return LoopExit::Failed(e),
            }
        }
    }

    fn ingest(&mut self, frame: &Frame) {
        let Some(mut record) = self.parser.parse(frame) else {
            return;
        };
        // Equal or out-of-order timestamps keep arrival order.
        if record.relative_time < self.last_relative {
            record.relative_time = self.last_relative;
        }
        self.last_relative = record.relative_time;

        if let Err(e) = self.publisher.publish(self.id, &record) {
            trace!("[{}] publish skipped: {}", self.id, e);
        }
        self.records.push(record);

        let count = self.records.len();
        let base_time = self.parser.base_time();
        self.state.send_modify(|s| {
            s.count = count;
            s.base_time = base_time;
        });
    }
}
