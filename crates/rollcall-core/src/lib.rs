//! rollcall-core — Face-based attendance engine.
//!
//! Matches faces found in camera frames against a directory of reference
//! photos and writes each recognised person to a CSV log at most once per
//! cooldown window. Detection (SCRFD) and encoding (ArcFace) run via ONNX
//! Runtime behind the [`FaceEncoder`] trait.

pub mod attendance;
pub mod detector;
pub mod encoder;
pub mod ledger;
pub mod matcher;
pub mod recognizer;
pub mod session;
pub mod store;
pub mod types;

use std::path::PathBuf;

pub use attendance::{AttendanceLogError, AttendanceSink, CsvAttendanceLog, LogRecord};
pub use encoder::{EncodeError, FaceEncoder, OnnxEncoder};
pub use ledger::CooldownLedger;
pub use matcher::{FirstMatchMatcher, Matcher};
pub use session::{
    Annotation, Clock, FrameSource, FrameSourceError, Marker, Presenter, RecognitionSession, SessionReport,
    SystemClock, Termination,
};
pub use store::{EncodingStore, ReferencePhoto, StoreError};
pub use types::{Detection, Embedding, FaceRegion, KnownIdentity, MatchResult};

/// Default location of the ONNX model files: `$XDG_DATA_HOME/rollcall/models`,
/// falling back to `~/.local/share/rollcall/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
        .join("models")
}
