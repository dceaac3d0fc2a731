//! Storage subsystem
//!
//! This module provides the durable side of a capture session: the storage
//! collaborator interface, a filesystem implementation of it, the CSV layout
//! of persisted captures, and the sink that hands a finished session over.
//!
//! Components:
//! - `storage_trait`: the ObjectStore trait defining a uniform API.
//! - `file_storage`: directory-backed implementation ("bucket" on disk).
//! - `csv_codec`: record-per-row tabular encoding and decoding.
//! - `durable_sink`: staging, upload and cleanup of a session's records.
//! - `types`: the finalize outcome reported back to the session.

pub mod csv_codec;
pub mod durable_sink;
pub mod file_storage;
pub mod storage_trait;
pub mod types;

pub use durable_sink::DurableSink;
pub use file_storage::FileObjectStore;
pub use storage_trait::ObjectStore;
pub use types::FinalizeOutcome;
