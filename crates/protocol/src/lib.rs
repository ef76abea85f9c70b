//! # FPNN Protocol Library
//!
//! Wire-level building blocks for FPNN clients: payload values, the binary
//! frame codec and the optional ECDH + AES-CFB stream encryption.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Quest / Answer payloads          │  MessagePack or JSON
//! ├─────────────────────────────────────────┤
//! │              Framing                    │  12-byte FPNN header
//! ├─────────────────────────────────────────┤
//! │        Stream Encryption (opt.)         │  ECDH + AES-CFB
//! ├─────────────────────────────────────────┤
//! │              Transport (TCP)            │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{FrameCodec, Message, Quest};
//!
//! let mut quest = Quest::new("echo").with_param("x", 1);
//! quest.set_seq_num(1);
//!
//! let codec = FrameCodec::new();
//! let bytes = codec.encode_quest(&quest).unwrap();
//!
//! let (decoded, consumed) = codec.decode(&bytes).unwrap();
//! assert_eq!(consumed, bytes.len());
//! assert_eq!(decoded, Message::Quest(quest));
//! ```
//!
//! ## Modules
//!
//! - [`value`]: Dynamic payload values and coercion
//! - [`payload`]: Key-value payload with typed accessors
//! - [`messages`]: Quest, answer and error codes
//! - [`framing`]: Frame header and codec
//! - [`crypto`]: Key exchange and stream ciphers
//! - [`error`]: Error types

pub mod crypto;
pub mod error;
pub mod framing;
pub mod messages;
pub mod payload;
pub mod value;

pub use crypto::{
    AesKeyBits, Curve, EcdhExchange, EcdhKeyPair, PeerPublicKey, SessionKeys, StreamDecryptor,
    StreamEncryptor,
};
pub use error::{ProtocolError, Result};
pub use framing::{
    FrameCodec, FrameFlags, FrameHeader, MessageType, DEFAULT_MAX_PAYLOAD_SIZE,
    FRAME_HEADER_SIZE, FRAME_MAGIC, MAX_METHOD_NAME_LEN,
};
pub use messages::{
    error_code, Answer, Message, Quest, HANDSHAKE_METHOD, PING_METHOD, PROTOCOL_VERSION,
};
pub use payload::{Payload, PayloadFormat};
pub use value::Value;
