use std::path::PathBuf;

use thiserror::Error;

/// Fatal error taxonomy for the storage engine.
///
/// Every variant here corresponds to a row of the error-taxonomy table:
/// all of them are unrecoverable for the operation in progress. Callers
/// that want a single top-level `Result` type (the CLI binary) wrap this
/// in `anyhow::Error` via `#[from]`.
#[derive(Error, Debug)]
pub enum VexError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("node id {id} exceeds MAX_NODE_ID")]
    NodeIdOutOfBounds { id: u64 },

    #[error("way id {id} exceeds MAX_WAY_ID")]
    WayIdOutOfBounds { id: u64 },

    #[error("tag sub-file index {index} out of range [0, 32)")]
    TagSubfileOutOfBounds { index: u64 },

    #[error("way {id} arrived before any node was loaded")]
    WayBeforeNode { id: u64 },

    #[error("node {id} arrived after a way was already loaded")]
    NodeAfterWay { id: u64 },

    #[error("way-block allocator exhausted: {count} blocks already allocated")]
    WayBlockCapacityExceeded { count: u64 },

    #[error("node-ref cursor would exceed MAX_NODE_REFS ({cursor})")]
    NodeRefCapacityExceeded { cursor: u64 },

    #[error("tag stream position would exceed 2^32 while writing tags for id {id}")]
    TagOffsetOverflow { id: u64 },

    #[error("invalid argument: {message}")]
    Argument { message: String },
}

pub type Result<T> = std::result::Result<T, VexError>;

impl VexError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VexError::Io {
            path: path.into(),
            source,
        }
    }
}
