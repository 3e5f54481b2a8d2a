//! Error types shared by every storage component.
//!
//! Every error in this crate is fatal for the batch job that hit it: there is
//! no in-process recovery path. Components surface typed errors so the driver
//! can report a precise diagnostic before terminating and restarting from a
//! checkpoint.

use std::{io, path::PathBuf};

/// Result type shared across storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Fatal failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller broke an API contract (duplicate key, bad index, oversized ID).
    ContractViolation,
    /// The backing store could not be grown, truncated or mapped.
    ResourceExhaustion,
    /// Persisted layout invariants do not hold.
    DataCorruption,
}

/// Errors surfaced by arenas, vectors, maps and reverse indices.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// API contract broken by the caller.
    #[error("contract violation: {0}")]
    ContractViolation(String),
    /// Growing, truncating or mapping a backing file failed.
    #[error("cannot grow backing store {path:?}: {source}")]
    ResourceExhaustion {
        /// File being grown.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Persisted data violates the on-disk layout.
    #[error("data corruption: {0}")]
    DataCorruption(String),
    /// Opening, renaming or syncing a backing file failed.
    #[error("io error on {path:?}: {source}")]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    /// Classify the error into one of the fatal failure classes.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::ContractViolation(_) => ErrorKind::ContractViolation,
            StoreError::ResourceExhaustion { .. } | StoreError::Io { .. } => {
                ErrorKind::ResourceExhaustion
            }
            StoreError::DataCorruption(_) => ErrorKind::DataCorruption,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn exhausted(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::ResourceExhaustion {
            path: path.into(),
            source,
        }
    }
}

/// Return a [`StoreError::ContractViolation`] unless `cond` holds.
macro_rules! ensure_contract {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::StoreError::ContractViolation(format!($($arg)+)));
        }
    };
}

/// Return a [`StoreError::DataCorruption`] unless `cond` holds.
macro_rules! ensure_intact {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::StoreError::DataCorruption(format!($($arg)+)));
        }
    };
}

pub(crate) use ensure_contract;
pub(crate) use ensure_intact;
