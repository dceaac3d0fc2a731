use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::Local;
use log::{error, info, warn};
use tokio::sync::watch;
use uuid::Uuid;

use crate::data_capture::provider::CaptureProvider;
use crate::data_capture::publisher::Publisher;
use crate::error_handling::types::{CaptureError, SessionError};
use crate::storage::durable_sink::DurableSink;

use super::active_session::SessionHandle;
use super::session::{CaptureSession, SessionSnapshot};
use super::SessionStatus;

/// Slot used by the request layer when it does not name one.
pub const DEFAULT_SLOT: &str = "default";

/// The structure related to session management
///
/// Keeps, per slot, the latest capture session started in it. A slot holds at
/// most one session that is not yet terminal; starting another one in the same
/// slot fails fast with [`SessionError::AlreadyRunning`] and leaves the
/// existing session untouched. Terminal sessions stay queryable until they are
/// replaced by the next start or removed by [`reap`](Self::reap).
///
/// # Fields Overview
///
/// - `provider`: opens capture handles for interfaces
/// - `publisher`: live fan-out of records to subscribers
/// - `sink`: durable handoff of each finished session
/// - `default_packet_limit`: used when a start request does not give one
/// - `slots`: the slot table
pub struct SessionRegistry {
    provider: Arc<dyn CaptureProvider>,
    publisher: Arc<dyn Publisher>,
    sink: Arc<DurableSink>,
    default_packet_limit: usize,
    slots: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(
        provider: Arc<dyn CaptureProvider>,
        publisher: Arc<dyn Publisher>,
        sink: Arc<DurableSink>,
        default_packet_limit: usize,
    ) -> Self {
        Self {
            provider,
            publisher,
            sink,
            default_packet_limit,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn default_packet_limit(&self) -> usize {
        self.default_packet_limit
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, SessionHandle>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a capture session on `interface` in `slot`.
    ///
    /// The slot is reserved (status `Idle`) before the capture handle is
    /// opened, and the table lock is not held while opening, so a slow open
    /// never stalls status or stop requests. If the open fails the session is
    /// recorded as `Failed` (no loop runs) and the open error is returned.
    /// Otherwise the loop is spawned on a dedicated worker thread and the new
    /// session id is returned.
    pub fn start(
        &self,
        slot: &str,
        interface: &str,
        packet_limit: Option<usize>,
    ) -> Result<Uuid, SessionError> {
        let packet_limit = packet_limit.unwrap_or(self.default_packet_limit);
        if packet_limit == 0 {
            return Err(SessionError::InvalidPacketLimit);
        }

        let id = Uuid::new_v4();
        let snapshot = SessionSnapshot::new(id, slot, interface, packet_limit, Local::now());
        let state_tx = Arc::new(watch::channel(snapshot).0);
        let stop_requested = Arc::new(AtomicBool::new(false));

        {
            let mut slots = self.slots();
            if let Some(existing) = slots.get(slot) {
                if existing.is_active() {
                    warn!("Start refused: session {} already running in slot {}", existing.id(), slot);
                    return Err(SessionError::AlreadyRunning);
                }
            }
            slots.insert(
                slot.to_string(),
                SessionHandle::new(Arc::clone(&stop_requested), None, Arc::clone(&state_tx)),
            );
        }

        let source = match self.provider.open(interface) {
            Ok(s) => s,
            Err(e) => {
                error!("[{}] Unable to open capture on {}: {}", id, interface, e);
                mark_failed(&state_tx, &e);
                return Err(SessionError::CaptureError(e));
            }
        };

        let handle = SessionHandle::new(
            Arc::clone(&stop_requested),
            Some(source.abort_handle()),
            Arc::clone(&state_tx),
        );
        // The reservation is still active, so nothing else can have taken the slot.
        self.slots().insert(slot.to_string(), handle);
        state_tx.send_modify(|s| s.status = SessionStatus::Running);

        let session = CaptureSession::new(
            packet_limit,
            stop_requested,
            Arc::clone(&self.publisher),
            Arc::clone(&self.sink),
            Arc::clone(&state_tx),
        );
        let spawned = thread::Builder::new()
            .name(format!("capture-{}", &id.simple().to_string()[..8]))
            .spawn(move || {
                session.run(source);
            });
        if let Err(e) = spawned {
            let e = CaptureError::ProviderOpen(format!("cannot spawn capture worker: {}", e));
            error!("[{}] {}", id, e);
            mark_failed(&state_tx, &e);
            return Err(SessionError::CaptureError(e));
        }

        info!(
            "[{}] Capture started on {} in slot {} (limit {})",
            id, interface, slot, packet_limit
        );
        Ok(id)
    }

    /// Requests session `id` to stop. Succeeds without effect when the session
    /// is already stopping or terminal.
    pub fn stop(&self, id: Uuid) -> Result<(), SessionError> {
        let handle = self.handle(id).ok_or(SessionError::NotFound)?;
        handle.stop();
        Ok(())
    }

    /// Stops whatever session is live in `slot`, returning its id.
    pub fn stop_slot(&self, slot: &str) -> Result<Uuid, SessionError> {
        let handle = self
            .slots()
            .get(slot)
            .filter(|h| matches!(h.status(), SessionStatus::Running | SessionStatus::Stopping))
            .cloned()
            .ok_or(SessionError::NotRunning)?;
        handle.stop();
        Ok(handle.id())
    }

    pub fn status(&self, id: Uuid) -> Result<SessionSnapshot, SessionError> {
        self.handle(id)
            .map(|h| h.snapshot())
            .ok_or(SessionError::NotFound)
    }

    pub fn slot_status(&self, slot: &str) -> Result<SessionSnapshot, SessionError> {
        self.slots()
            .get(slot)
            .map(|h| h.snapshot())
            .ok_or(SessionError::NotFound)
    }

    pub fn handle(&self, id: Uuid) -> Option<SessionHandle> {
        self.slots().values().find(|h| h.id() == id).cloned()
    }

    /// Drops terminal sessions from the table, returning how many were removed.
    pub fn reap(&self) -> usize {
        let mut slots = self.slots();
        let before = slots.len();
        slots.retain(|_, h| h.is_active());
        before - slots.len()
    }

    /// Stops every live session and waits (up to `timeout` each) for it to finish.
    pub async fn shutdown_all(&self, timeout: Duration) -> Vec<SessionSnapshot> {
        let live: Vec<SessionHandle> = self
            .slots()
            .values()
            .filter(|h| h.is_active())
            .cloned()
            .collect();
        info!("Shutting down {} live session(s)", live.len());

        let mut finished = Vec::with_capacity(live.len());
        for handle in live {
            handle.stop();
            match tokio::time::timeout(timeout, handle.wait_terminal()).await {
                Ok(snapshot) => finished.push(snapshot),
                Err(_) => {
                    warn!("[{}] Session did not finish within {:?}", handle.id(), timeout);
                    finished.push(handle.snapshot());
                }
            }
        }
        finished
    }
}

fn mark_failed(state_tx: &watch::Sender<SessionSnapshot>, e: &CaptureError) {
    state_tx.send_modify(|s| {
        s.status = SessionStatus::Failed;
        s.ended_at = Some(Local::now());
        s.error = Some(e.to_string());
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_capture::channel_capture::{ChannelProvider, FrameFeeder};
    use crate::data_capture::publisher::BroadcastPublisher;
    use crate::data_capture::types::{Frame, Layer};
    use crate::storage::durable_sink::tests::MemStore;
    use crate::storage::storage_trait::ObjectStore;
    use crate::storage::types::FinalizeOutcome;
    use chrono::Utc;
    use tempfile::TempDir;

    const WAIT: Duration = Duration::from_secs(5);

    struct Fixture {
        _dir: TempDir,
        provider: Arc<ChannelProvider>,
        publisher: Arc<BroadcastPublisher>,
        store: Arc<MemStore>,
        registry: SessionRegistry,
    }

    fn fixture(limit: usize) -> Fixture {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = TempDir::new().unwrap();
        let provider = Arc::new(ChannelProvider::new());
        let publisher = Arc::new(BroadcastPublisher::new(64));
        let store = Arc::new(MemStore::default());
        let sink = Arc::new(DurableSink::new(dir.path(), "pfx_", store.clone()));
        let registry = SessionRegistry::new(provider.clone(), publisher.clone(), sink, limit);
        Fixture {
            _dir: dir,
            provider,
            publisher,
            store,
            registry,
        }
    }

    fn frame() -> Frame {
        Frame::new(Utc::now(), 60).with_layer(Layer::new("eth").with_field("src", "a").with_field("dst", "b"))
    }

    async fn wait(fx: &Fixture, id: Uuid) -> SessionSnapshot {
        let handle = fx.registry.handle(id).unwrap();
        tokio::time::timeout(WAIT, handle.wait_terminal())
            .await
            .expect("session did not terminate")
    }

    #[tokio::test]
    async fn stop_releases_a_loop_blocked_without_traffic() {
        let fx = fixture(100);
        let _feeder: FrameFeeder = fx.provider.feeder("eth0");
        let id = fx.registry.start(DEFAULT_SLOT, "eth0", None).unwrap();
        assert_eq!(fx.registry.status(id).unwrap().status, SessionStatus::Running);

        fx.registry.stop(id).unwrap();
        let snapshot = wait(&fx, id).await;
        assert_eq!(snapshot.status, SessionStatus::Completed);
        assert_eq!(snapshot.finalize, Some(FinalizeOutcome::NothingToPersist));
        assert!(fx.store.list("").unwrap().is_empty());
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let fx = fixture(100);
        let feeder = fx.provider.feeder("eth0");
        let mut live = fx.publisher.subscribe();
        let id = fx.registry.start(DEFAULT_SLOT, "eth0", None).unwrap();
        feeder.send(frame()).unwrap();
        live.recv().await.unwrap();

        fx.registry.stop(id).unwrap();
        fx.registry.stop(id).unwrap();
        let snapshot = wait(&fx, id).await;
        assert_eq!(snapshot.count, 1);
        fx.registry.stop(id).unwrap();
        assert_eq!(fx.registry.status(id).unwrap().status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn second_start_in_slot_is_refused() {
        let fx = fixture(100);
        let _feeder = fx.provider.feeder("eth0");
        let _other = fx.provider.feeder("eth1");
        let id = fx.registry.start(DEFAULT_SLOT, "eth0", None).unwrap();
        let before = fx.registry.status(id).unwrap();

        assert_eq!(
            fx.registry.start(DEFAULT_SLOT, "eth1", None),
            Err(SessionError::AlreadyRunning)
        );
        assert_eq!(fx.registry.status(id).unwrap(), before);
        assert_eq!(fx.registry.slot_status(DEFAULT_SLOT).unwrap().id, id);

        // Other slots are independent.
        let other = fx.registry.start("secondary", "eth1", None).unwrap();
        fx.registry.stop(id).unwrap();
        fx.registry.stop(other).unwrap();
        wait(&fx, id).await;
        wait(&fx, other).await;
    }

    #[tokio::test]
    async fn slot_can_be_reused_after_completion() {
        let fx = fixture(2);
        let feeder = fx.provider.feeder("eth0");
        let first = fx.registry.start(DEFAULT_SLOT, "eth0", None).unwrap();
        feeder.send(frame()).unwrap();
        feeder.send(frame()).unwrap();
        let snapshot = wait(&fx, first).await;
        assert_eq!(snapshot.count, 2);
        assert!(matches!(snapshot.finalize, Some(FinalizeOutcome::Persisted { rows: 2, .. })));

        let _feeder = fx.provider.feeder("eth0");
        let second = fx.registry.start(DEFAULT_SLOT, "eth0", None).unwrap();
        assert_ne!(first, second);
        assert_eq!(fx.registry.status(first), Err(SessionError::NotFound));
        fx.registry.stop(second).unwrap();
        wait(&fx, second).await;
    }

    #[tokio::test]
    async fn open_failure_marks_session_failed() {
        let fx = fixture(100);
        let err = fx.registry.start(DEFAULT_SLOT, "missing0", None).unwrap_err();
        assert!(matches!(err, SessionError::CaptureError(CaptureError::ProviderOpen(_))));

        let snapshot = fx.registry.slot_status(DEFAULT_SLOT).unwrap();
        assert_eq!(snapshot.status, SessionStatus::Failed);
        assert!(snapshot.finalize.is_none());
        assert_eq!(fx.registry.stop_slot(DEFAULT_SLOT), Err(SessionError::NotRunning));
    }

    #[tokio::test]
    async fn unknown_ids_and_empty_slots_are_reported() {
        let fx = fixture(100);
        assert_eq!(fx.registry.stop(Uuid::new_v4()), Err(SessionError::NotFound));
        assert_eq!(fx.registry.status(Uuid::new_v4()), Err(SessionError::NotFound));
        assert_eq!(fx.registry.stop_slot(DEFAULT_SLOT), Err(SessionError::NotRunning));
        assert_eq!(
            fx.registry.start(DEFAULT_SLOT, "eth0", Some(0)),
            Err(SessionError::InvalidPacketLimit)
        );
    }

    #[tokio::test]
    async fn stop_slot_and_reap() {
        let fx = fixture(100);
        let _feeder = fx.provider.feeder("eth0");
        let id = fx.registry.start(DEFAULT_SLOT, "eth0", None).unwrap();
        assert_eq!(fx.registry.reap(), 0);
        assert_eq!(fx.registry.stop_slot(DEFAULT_SLOT), Ok(id));
        wait(&fx, id).await;
        assert_eq!(fx.registry.reap(), 1);
        assert_eq!(fx.registry.slot_status(DEFAULT_SLOT), Err(SessionError::NotFound));
    }

    #[tokio::test]
    async fn shutdown_all_finishes_live_sessions() {
        let fx = fixture(100);
        let _a = fx.provider.feeder("eth0");
        let _b = fx.provider.feeder("eth1");
        fx.registry.start("a", "eth0", None).unwrap();
        fx.registry.start("b", "eth1", None).unwrap();

        let finished = fx.registry.shutdown_all(WAIT).await;
        assert_eq!(finished.len(), 2);
        assert!(finished.iter().all(|s| s.status == SessionStatus::Completed));
    }

    /// Provider whose `open` blocks until the test lets it through.
    struct GatedProvider {
        inner: ChannelProvider,
        entered: Mutex<std::sync::mpsc::Sender<()>>,
        gate: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl CaptureProvider for GatedProvider {
        fn open(
            &self,
            interface: &str,
        ) -> Result<Box<dyn crate::data_capture::provider::FrameSource>, CaptureError> {
            self.entered.lock().unwrap().send(()).unwrap();
            self.gate.lock().unwrap().recv().unwrap();
            self.inner.open(interface)
        }
    }

    #[tokio::test]
    async fn slow_open_does_not_block_the_table() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = TempDir::new().unwrap();
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (gate_tx, gate_rx) = std::sync::mpsc::channel();
        let provider = Arc::new(GatedProvider {
            inner: ChannelProvider::new(),
            entered: Mutex::new(entered_tx),
            gate: Mutex::new(gate_rx),
        });
        let _feeder = provider.inner.feeder("eth0");
        let store = Arc::new(MemStore::default());
        let sink = Arc::new(DurableSink::new(dir.path(), "pfx_", store));
        let registry = Arc::new(SessionRegistry::new(
            provider.clone(),
            Arc::new(BroadcastPublisher::new(4)),
            sink,
            10,
        ));

        let starter = {
            let registry = registry.clone();
            std::thread::spawn(move || registry.start(DEFAULT_SLOT, "eth0", None))
        };
        entered_rx.recv_timeout(WAIT).unwrap();

        // The open is in progress: the table still answers and the slot is taken.
        assert_eq!(registry.slot_status(DEFAULT_SLOT).unwrap().status, SessionStatus::Idle);
        assert_eq!(
            registry.start(DEFAULT_SLOT, "eth0", None),
            Err(SessionError::AlreadyRunning)
        );
        assert_eq!(registry.stop_slot(DEFAULT_SLOT), Err(SessionError::NotRunning));

        gate_tx.send(()).unwrap();
        let id = starter.join().unwrap().unwrap();
        assert_eq!(registry.status(id).unwrap().status, SessionStatus::Running);

        registry.stop(id).unwrap();
        let handle = registry.handle(id).unwrap();
        let snapshot = tokio::time::timeout(WAIT, handle.wait_terminal()).await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Completed);
    }
}
