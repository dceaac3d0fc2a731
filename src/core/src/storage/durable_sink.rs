//! Durable handoff of a finished session.
//!
//! `finalize` stages the records as a CSV file, uploads it to the object store
//! under `<key_prefix><staging file name>`, then deletes the staging file. A
//! failed upload leaves the staging file in place and reports where it is.
//! There is no retry here; callers decide what to do with a failed outcome.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use log::{error, info, warn};
use uuid::Uuid;

use crate::data_capture::types::Record;
use crate::error_handling::types::SinkError;
use crate::storage::csv_codec;
use crate::storage::storage_trait::ObjectStore;
use crate::storage::types::FinalizeOutcome;

pub struct DurableSink {
    staging_dir: PathBuf,
    key_prefix: String,
    store: Arc<dyn ObjectStore>,
}

impl DurableSink {
    pub fn new<P: AsRef<Path>>(staging_dir: P, key_prefix: &str, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            staging_dir: staging_dir.as_ref().to_path_buf(),
            key_prefix: key_prefix.to_string(),
            store,
        }
    }

    /// Staging file name for a session, e.g.
    /// `capture_2025-04-22_19-30-17_1b4e28ba.csv`. The short session id keeps
    /// sessions started within the same second apart, both on disk and in
    /// the store.
    pub fn staging_name(session_id: Uuid, started_at: DateTime<Local>) -> String {
        let short = session_id.simple().to_string();
        format!(
            "capture_{}_{}.csv",
            started_at.format("%Y-%m-%d_%H-%M-%S"),
            &short[..8]
        )
    }

    pub fn finalize(
        &self,
        session_id: Uuid,
        started_at: DateTime<Local>,
        records: &[Record],
    ) -> FinalizeOutcome {
        if records.is_empty() {
            info!("[{}] Nothing to persist", session_id);
            return FinalizeOutcome::NothingToPersist;
        }

        let staging_path = match self.stage(session_id, started_at, records) {
            Ok(p) => p,
            Err(e) => {
                error!("[{}] {}", session_id, e);
                return FinalizeOutcome::SerializeFailed {
                    reason: e.to_string(),
                };
            }
        };

        let file_name = staging_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let key = format!("{}{}", self.key_prefix, file_name);

        if let Err(e) = self.upload(&key, &staging_path) {
            error!(
                "[{}] {}; staging artifact kept at {}",
                session_id,
                e,
                staging_path.display()
            );
            return FinalizeOutcome::UploadFailed {
                key,
                staging_path,
                reason: e.to_string(),
            };
        }

        if let Err(e) = fs::remove_file(&staging_path) {
            warn!(
                "[{}] Uploaded but could not remove staging artifact {}: {}",
                session_id,
                staging_path.display(),
                e
            );
        }
        info!("[{}] Persisted {} record(s) as {}", session_id, records.len(), key);
        FinalizeOutcome::Persisted {
            key,
            rows: records.len(),
        }
    }

    fn stage(
        &self,
        session_id: Uuid,
        started_at: DateTime<Local>,
        records: &[Record],
    ) -> Result<PathBuf, SinkError> {
        fs::create_dir_all(&self.staging_dir).map_err(|e| {
            SinkError::Serialize(format!(
                "cannot create staging dir {}: {}",
                self.staging_dir.display(),
                e
            ))
        })?;

        let name = Self::staging_name(session_id, started_at);
        let final_path = self.staging_dir.join(&name);
        let part_path = self.staging_dir.join(format!("{}.part", name));

        let written = File::create(&part_path).and_then(|f| {
            let mut out = BufWriter::new(f);
            csv_codec::write_records(&mut out, records)?;
            out.into_inner().map_err(|e| e.into_error())?.sync_all()
        });
        if let Err(e) = written.and_then(|_| fs::rename(&part_path, &final_path)) {
            let _ = fs::remove_file(&part_path);
            return Err(SinkError::Serialize(format!(
                "cannot write {}: {}",
                final_path.display(),
                e
            )));
        }
        Ok(final_path)
    }

    fn upload(&self, key: &str, staging_path: &Path) -> Result<(), SinkError> {
        let bytes = fs::read(staging_path)
            .map_err(|e| SinkError::Upload(format!("cannot read staging artifact: {}", e)))?;
        self.store
            .put(key, &bytes)
            .map_err(|e| SinkError::Upload(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error_handling::types::StorageError;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    pub(crate) struct MemStore {
        pub(crate) objects: Mutex<BTreeMap<String, Vec<u8>>>,
    }

    impl ObjectStore for MemStore {
        fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
            self.objects.lock().unwrap().insert(key.to_string(), bytes.to_vec());
            Ok(())
        }

        fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
            self.objects
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(key.to_string()))
        }

        fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
            Ok(self
                .objects
                .lock()
                .unwrap()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }
    }

    pub(crate) struct FailingStore;

    impl ObjectStore for FailingStore {
        fn put(&self, _key: &str, _bytes: &[u8]) -> Result<(), StorageError> {
            Err(StorageError::ConnectionFailed)
        }

        fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
            Err(StorageError::NotFound(key.to_string()))
        }

        fn list(&self, _prefix: &str) -> Result<Vec<String>, StorageError> {
            Err(StorageError::ConnectionFailed)
        }
    }

    fn session(n: u128) -> Uuid {
        Uuid::from_u128(n << 96)
    }

    fn started() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 4, 22, 19, 30, 17).unwrap()
    }

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record {
                relative_time: i as f64 * 0.5,
                source: Some("aa:bb:cc:dd:ee:ff".into()),
                destination: None,
                protocol: "TCP".into(),
                length: 60,
                source_port: Some(1000),
                destination_port: Some(80),
                label: 0,
            })
            .collect()
    }

    #[test]
    fn empty_batch_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemStore::default());
        let sink = DurableSink::new(dir.path().join("tmp"), "pfx_", store.clone());

        let outcome = sink.finalize(Uuid::new_v4(), started(), &[]);
        assert_eq!(outcome, FinalizeOutcome::NothingToPersist);
        assert!(!outcome.is_failure());
        assert!(store.objects.lock().unwrap().is_empty());
        assert!(!dir.path().join("tmp").exists());
    }

    #[test]
    fn successful_upload_removes_staging_artifact() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemStore::default());
        let sink = DurableSink::new(dir.path(), "success_packet_capture_", store.clone());

        let outcome = sink.finalize(session(0x1b4e28ba), started(), &records(3));
        let key = "success_packet_capture_capture_2025-04-22_19-30-17_1b4e28ba.csv".to_string();
        assert_eq!(outcome, FinalizeOutcome::Persisted { key: key.clone(), rows: 3 });

        let stored = store.get(&key).unwrap();
        assert_eq!(csv_codec::decode_records(&stored).unwrap(), records(3));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn failed_upload_keeps_staging_artifact() {
        let dir = TempDir::new().unwrap();
        let sink = DurableSink::new(dir.path(), "pfx_", Arc::new(FailingStore));

        match sink.finalize(session(0xabcdef01), started(), &records(2)) {
            FinalizeOutcome::UploadFailed { key, staging_path, .. } => {
                assert_eq!(key, "pfx_capture_2025-04-22_19-30-17_abcdef01.csv");
                let kept = fs::read(&staging_path).unwrap();
                assert_eq!(csv_codec::decode_records(&kept).unwrap(), records(2));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn retained_artifact_is_not_overwritten_by_next_session() {
        let dir = TempDir::new().unwrap();
        let sink = DurableSink::new(dir.path(), "pfx_", Arc::new(FailingStore));
        let first = sink.finalize(Uuid::new_v4(), started(), &records(1));
        let second = sink.finalize(Uuid::new_v4(), started(), &records(2));
        match (first, second) {
            (
                FinalizeOutcome::UploadFailed { staging_path: a, .. },
                FinalizeOutcome::UploadFailed { staging_path: b, .. },
            ) => {
                assert_ne!(a, b);
                assert!(a.exists() && b.exists());
            }
            other => panic!("unexpected outcomes: {:?}", other),
        }
    }

    #[test]
    fn sessions_started_in_the_same_second_keep_separate_objects() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemStore::default());
        let sink = DurableSink::new(dir.path(), "pfx_", store.clone());

        let first = sink.finalize(session(1), started(), &records(3));
        let second = sink.finalize(session(2), started(), &records(1));
        let (a, b) = match (first, second) {
            (
                FinalizeOutcome::Persisted { key: a, rows: 3 },
                FinalizeOutcome::Persisted { key: b, rows: 1 },
            ) => (a, b),
            other => panic!("unexpected outcomes: {:?}", other),
        };
        assert_ne!(a, b);

        let total: usize = store
            .list("pfx_")
            .unwrap()
            .iter()
            .map(|k| csv_codec::decode_records(&store.get(k).unwrap()).unwrap().len())
            .sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn unwritable_staging_dir_reports_serialize_failure() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"x").unwrap();
        let store = Arc::new(MemStore::default());
        let sink = DurableSink::new(&blocker, "pfx_", store.clone());

        let outcome = sink.finalize(Uuid::new_v4(), started(), &records(1));
        assert!(matches!(outcome, FinalizeOutcome::SerializeFailed { .. }));
        assert!(matches!(outcome.error(), Some(SinkError::Serialize(_))));
        assert!(store.objects.lock().unwrap().is_empty());
    }
}
