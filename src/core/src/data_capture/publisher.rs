//! Live fan-out of records to subscribers.
//!
//! Publishing is best effort and never waits: the broadcast channel keeps a
//! bounded backlog per subscriber, and a subscriber that falls behind simply
//! loses the oldest records (at-most-once delivery). Every subscriber observes
//! records in the order the capture loop published them.

use log::trace;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error_handling::types::PublishError;

use super::types::{Record, RecordEvent};

pub trait Publisher: Send + Sync {
    fn publish(&self, session_id: Uuid, record: &Record) -> Result<(), PublishError>;
}

/// Publisher backed by a `tokio::sync::broadcast` channel.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<RecordEvent>,
}

impl BroadcastPublisher {
    /// `capacity` is the number of records buffered per subscriber before the
    /// slowest one starts losing records.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecordEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Publisher for BroadcastPublisher {
    fn publish(&self, session_id: Uuid, record: &Record) -> Result<(), PublishError> {
        let event = RecordEvent {
            session_id,
            record: record.clone(),
        };
        match self.tx.send(event) {
            Ok(n) => {
                trace!("[{}] record delivered to {} subscriber(s)", session_id, n);
                Ok(())
            }
            Err(_) => Err(PublishError::NoSubscribers),
        }
    }
}
