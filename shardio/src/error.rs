use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShardError {
    #[error("partition {partition} failed to open {}: {source}", .path.display())]
    OpenFailure {
        partition: usize,
        path: PathBuf,
        #[source]
        source: Box<ShardError>,
    },

    #[error("partition unit is not open")]
    Closed,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // Failed entries stay buffered and are retried by the next flush.
    #[error("{failed} buffered write(s) failed to flush, {retained_bytes} bytes retained")]
    PartialFlush { failed: usize, retained_bytes: usize },

    #[error("remote call failed: {0}")]
    Remote(String),

    #[error("symbolic name {0} is already registered")]
    NameTaken(String),

    #[error("symbolic name {0} is not registered")]
    NameNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
}

impl ShardError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ShardError::InvalidArgument(msg.into())
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        ShardError::Remote(msg.into())
    }
}

pub type Result<T, E = ShardError> = std::result::Result<T, E>;
