//! Error types for pcap-dispatcher.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(#[from] zeromq::ZmqError),

    #[error("malformed notification: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("dispatch queue closed")]
    QueueClosed,

    #[error("telemetry error: {0}")]
    Telemetry(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
