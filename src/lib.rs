//! Inspection Kernel
//!
//! Real-time decision core for a line camera: decides when an object is in
//! front of the camera and turns a jittery stream of per-frame classifier
//! guesses into one stable verdict per object.
//!
//! # Architecture
//!
//! Per evaluated frame the host calls, in order:
//!
//! 1. `PresenceDetector::detect` on the downsampled working frame,
//! 2. the classifier on the full frame, when an inspection is running,
//! 3. `InspectionStateMachine::process_frame` with the presence signal and the
//!    optional sample.
//!
//! `pipeline::Inspector` is the composition root that does exactly this and
//! hands completed verdicts to a `HistoryStore`. Everything is single-threaded
//! and frame-synchronous; no component holds global state.
//!
//! # Module Structure
//!
//! - `frame`: full-resolution and working frames, thumbnails
//! - `presence`: frame differencing with exit hysteresis
//! - `aggregate`: majority-vote verdicts
//! - `inspection`: inspection lifecycle and the prediction buffer
//! - `classify`: classifier port, registry and backends
//! - `ingest`: frame sources
//! - `storage`: inspection history
//! - `config`: layered daemon configuration
//! - `pipeline`: composition root

use anyhow::Result;
use rand::RngCore;
use rusqlite::{Connection, OpenFlags};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod frame;
pub mod ingest;
pub mod inspection;
pub mod pipeline;
pub mod presence;
pub mod storage;

pub use aggregate::{aggregate, verdict_from_sample, AggregatedVerdict, VerdictStatus, OK_LABEL};
pub use classify::{
    CentroidClassifier, Classifier, ClassifierRegistry, ClassifierSample, StubClassifier,
    StubStep,
};
pub use frame::{FullFrame, Thumbnail, WorkingFrame};
pub use ingest::{open_source, Capture, FrameSource, PixelFormat, SourceConfig};
pub use inspection::{
    FrameOutcome, Inspection, InspectionState, InspectionStateMachine, PredictionBuffer,
};
pub use pipeline::{Inspector, InspectorSettings, StepReport};
pub use presence::{PresenceConfig, PresenceDetector, PresenceSignal};
pub use storage::{
    HistoryStore, InMemoryHistoryStore, InspectionRecord, InspectionStats, SqliteHistoryStore,
};

/// URI of a fresh shared in-memory SQLite database.
pub fn shared_memory_uri() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!(
        "file:inspection_kernel_{:x}?mode=memory&cache=shared",
        u64::from_le_bytes(bytes)
    )
}

pub(crate) fn open_db_connection(db_path: &str) -> Result<Connection> {
    if db_path.starts_with("file:") {
        return Ok(Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?);
    }
    Ok(Connection::open(db_path)?)
}

pub(crate) fn now_s() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}
