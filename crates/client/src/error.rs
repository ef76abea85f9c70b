//! Error types for the client crate.

use std::io;

use protocol::{error_code, ProtocolError};
use thiserror::Error;

use crate::config::ConfigError;

/// Client error type.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No live connection and none could be established.
    #[error("invalid connection")]
    InvalidConnection,

    /// The connection closed before the operation completed.
    #[error("connection closed")]
    ConnectionClosed,

    /// TCP dial failed.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// TCP dial did not finish within the connect timeout.
    #[error("connecting to {0} timed out")]
    ConnectTimeout(String),

    /// Key agreement or handshake send failed.
    #[error("encryption handshake failed: {0}")]
    Handshake(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// A blocking send was attempted with a one-way quest.
    #[error("one-way quest cannot wait for an answer; use send_one_way")]
    OneWayQuest,

    /// A one-way send was attempted with a two-way quest.
    #[error("two-way quest expects an answer; use send_quest")]
    TwoWayQuest,

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// FPNN error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            ClientError::InvalidConnection
            | ClientError::Connect { .. }
            | ClientError::ConnectTimeout(_)
            | ClientError::Handshake(_)
            | ClientError::Config(_) => error_code::CORE_INVALID_CONNECTION,
            ClientError::ConnectionClosed => error_code::CORE_CONNECTION_CLOSED,
            ClientError::Protocol(ProtocolError::Serialization(_))
            | ClientError::Protocol(ProtocolError::MethodNameTooLong(_)) => {
                error_code::CORE_ENCODING
            }
            ClientError::Protocol(ProtocolError::Deserialization(_)) => error_code::CORE_DECODING,
            ClientError::Protocol(_) => error_code::CORE_INVALID_PACKAGE,
            ClientError::Io(_) => error_code::CORE_SEND_ERROR,
            ClientError::OneWayQuest | ClientError::TwoWayQuest => error_code::CORE_UNKNOWN_ERROR,
        }
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
