use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building, persisting or querying shards.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no shard matches pattern `{pattern}`")]
    NoShards { pattern: String },

    #[error("invalid shard pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("corrupt shard {}: {source}", .path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },

    #[error(
        "unsupported shard format version {found} in {} (expected {expected})",
        .path.display()
    )]
    Version { path: PathBuf, found: u32, expected: u32 },

    #[error("record {record}: malformed document: {reason}")]
    Decode { record: usize, reason: String },

    #[error("syntax error at token {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("worker {worker} terminated unexpectedly")]
    WorkerLost { worker: usize },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }

    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        Error::Syntax { position, message: message.into() }
    }
}
