use std::io;

use thiserror::Error;

/// Every failure a murmur operation can report. Parser and validator
/// variants carry the offending index/value so a caller doesn't have to
/// re-derive what went wrong from the message text alone.
#[derive(Debug, Error)]
pub enum MurmurError {
    #[error("archive spec list was empty")]
    EmptySpec,

    #[error("invalid archive spec {spec:?}: {reason}")]
    InvalidSpec { spec: String, reason: String },

    #[error("archive {index} ({value}) violates a structural rule: {reason}")]
    StructuralViolation {
        index: usize,
        value: u32,
        reason: String,
    },

    #[error("i/o error: {0}")]
    IoError(#[from] io::Error),

    #[error("corrupt file: {0}")]
    CorruptFile(String),

    #[error("timestamp out of range: {reason}")]
    OutOfRange { reason: String },

    #[error("path already exists: {0}")]
    AlreadyExists(String),
}

pub type Result<T> = std::result::Result<T, MurmurError>;
