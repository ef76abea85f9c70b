//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering all possible failure modes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    // Serialization errors
    /// Failed to serialize a payload.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize a payload.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    // Frame errors
    /// Frame does not start with the FPNN magic bytes.
    #[error("invalid frame magic: expected {expected:#010x}, got {got:#010x}")]
    InvalidFrameMagic {
        /// Expected magic value.
        expected: u32,
        /// Actual magic value received.
        got: u32,
    },

    /// Flag byte selects no known payload codec.
    #[error("invalid frame flags: {0:#04x}")]
    InvalidFrameFlags(u8),

    /// Message type byte is not one-way, two-way or answer.
    #[error("invalid message type: {0}")]
    InvalidMessageType(u8),

    /// Declared payload exceeds the configured maximum.
    #[error("payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge {
        /// Declared payload size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Body is shorter than the header announced.
    #[error("truncated frame: need {needed} bytes, have {available}")]
    TruncatedFrame {
        /// Bytes required.
        needed: usize,
        /// Bytes present.
        available: usize,
    },

    /// Method names are length-prefixed by a single byte.
    #[error("method name too long: {0} bytes exceeds 255")]
    MethodNameTooLong(usize),

    // Payload access errors
    /// Assertive accessor found no value for the key.
    #[error("missing field: {0}")]
    MissingField(String),

    /// Assertive accessor found a value of an incompatible type.
    #[error("type conversion failed for field {key}: expected {expected}, found {found}")]
    TypeConversion {
        /// Field name.
        key: String,
        /// Requested type.
        expected: &'static str,
        /// Stored value tag.
        found: &'static str,
    },

    // Cryptographic errors
    /// Curve is recognised but has no ECDH implementation.
    #[error("unsupported curve: {0}")]
    UnsupportedCurve(String),

    /// Invalid or malformed public key.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Key agreement failed.
    #[error("key exchange failed: {0}")]
    KeyExchange(String),

    /// AES key width other than 128 or 256.
    #[error("invalid AES key bits: {0}")]
    InvalidKeyBits(u32),

    // Transport errors
    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(String),
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

// Conversions from underlying crate errors

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_eof() || err.is_syntax() {
            ProtocolError::Deserialization(err.to_string())
        } else {
            ProtocolError::Serialization(err.to_string())
        }
    }
}

impl From<rmp_serde::encode::Error> for ProtocolError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        ProtocolError::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for ProtocolError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        ProtocolError::Deserialization(err.to_string())
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        ProtocolError::Io(err.to_string())
    }
}
