//! FPNN frame codec.
//!
//! # Frame Format
//!
//! Each frame starts with a fixed 12-byte header:
//!
//! ```text
//! +-------+---------+-------+-------+------+------------------+
//! | magic | version | flags | mtype | info | payload size     |
//! | FPNN  |   u8    |  u8   |  u8   |  u8  | u32 little-endian|
//! +-------+---------+-------+-------+------+------------------+
//! ```
//!
//! `info` is the method name length for quests and the status for answers.
//! The body that follows depends on the message type:
//!
//! - one-way: `[method][payload]`
//! - two-way: `[seq u32 LE][method][payload]`
//! - answer:  `[seq u32 LE][payload]`
//!
//! The payload is serialized with the codec selected by the flags.

use crate::error::{ProtocolError, Result};
use crate::messages::{Answer, Message, Quest, PROTOCOL_VERSION};
use crate::payload::{Payload, PayloadFormat};

/// Magic bytes identifying an FPNN frame.
pub const FRAME_MAGIC: [u8; 4] = *b"FPNN";

/// Fixed header size.
pub const FRAME_HEADER_SIZE: usize = 12;

/// Default limit for a single frame payload (200 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 200 * 1024 * 1024;

/// Method names are length-prefixed by a single byte.
pub const MAX_METHOD_NAME_LEN: usize = u8::MAX as usize;

const SEQ_NUM_SIZE: usize = 4;

/// Flag byte of the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags(pub u8);

impl FrameFlags {
    /// Payload is MessagePack.
    pub const MSGPACK: u8 = 0x80;
    /// Payload is JSON.
    pub const JSON: u8 = 0x40;
    /// Payload is compressed. Recognised, never produced.
    pub const ZIP: u8 = 0x20;
    /// Stream is encrypted. Informational only.
    pub const ENCRYPT: u8 = 0x10;

    /// Flags selecting the given payload codec.
    #[inline]
    pub fn for_format(format: PayloadFormat) -> Self {
        Self(format.flag())
    }

    #[inline]
    pub fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    #[inline]
    pub fn as_byte(self) -> u8 {
        self.0
    }

    /// Check whether every bit of `flag` is set.
    #[inline]
    pub fn has(self, flag: u8) -> bool {
        self.0 & flag == flag
    }
}

/// Message type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    OneWay = 0,
    TwoWay = 1,
    Answer = 2,
}

impl MessageType {
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(MessageType::OneWay),
            1 => Ok(MessageType::TwoWay),
            2 => Ok(MessageType::Answer),
            other => Err(ProtocolError::InvalidMessageType(other)),
        }
    }
}

/// A parsed and validated frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub flags: FrameFlags,
    pub mtype: MessageType,
    /// Method name length for quests, status for answers.
    pub info: u8,
    pub payload_size: u32,
}

impl FrameHeader {
    /// Parse a header, rejecting unknown magic, flags, message types and
    /// payloads larger than `max_payload`.
    ///
    /// The version byte is carried through but not checked.
    pub fn parse(bytes: &[u8; FRAME_HEADER_SIZE], max_payload: usize) -> Result<Self> {
        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        if magic != FRAME_MAGIC {
            return Err(ProtocolError::InvalidFrameMagic {
                expected: u32::from_be_bytes(FRAME_MAGIC),
                got: u32::from_be_bytes(magic),
            });
        }

        let flags = FrameFlags(bytes[5]);
        PayloadFormat::from_flags(flags.0)?;
        let mtype = MessageType::from_byte(bytes[6])?;

        let payload_size = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        if payload_size as usize > max_payload {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size as usize,
                max: max_payload,
            });
        }

        Ok(Self {
            version: bytes[4],
            flags,
            mtype,
            info: bytes[7],
            payload_size,
        })
    }

    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_SIZE] {
        let size = self.payload_size.to_le_bytes();
        [
            FRAME_MAGIC[0],
            FRAME_MAGIC[1],
            FRAME_MAGIC[2],
            FRAME_MAGIC[3],
            self.version,
            self.flags.0,
            self.mtype as u8,
            self.info,
            size[0],
            size[1],
            size[2],
            size[3],
        ]
    }

    /// Number of body bytes following the header.
    pub fn body_len(&self) -> usize {
        let payload = self.payload_size as usize;
        let method = self.info as usize;
        match self.mtype {
            MessageType::OneWay => payload + method,
            MessageType::TwoWay => payload + SEQ_NUM_SIZE + method,
            MessageType::Answer => payload + SEQ_NUM_SIZE,
        }
    }

    /// Payload codec selected by the flags.
    pub fn format(&self) -> Result<PayloadFormat> {
        PayloadFormat::from_flags(self.flags.0)
    }
}

/// Encoder and decoder for FPNN frames.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_payload_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// Create a codec with the default payload limit.
    pub fn new() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }

    /// Create a codec that rejects payloads larger than `max_payload_size`.
    pub fn with_max_payload_size(max_payload_size: usize) -> Self {
        Self { max_payload_size }
    }

    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    /// Encode a quest. One-way quests carry no sequence number.
    pub fn encode_quest(&self, quest: &Quest) -> Result<Vec<u8>> {
        let method = quest.method().as_bytes();
        if method.len() > MAX_METHOD_NAME_LEN {
            return Err(ProtocolError::MethodNameTooLong(method.len()));
        }

        let payload = quest.payload().encode(quest.format())?;
        let mtype = if quest.is_two_way() {
            MessageType::TwoWay
        } else {
            MessageType::OneWay
        };
        let header = FrameHeader {
            version: PROTOCOL_VERSION,
            flags: FrameFlags::for_format(quest.format()),
            mtype,
            info: method.len() as u8,
            payload_size: payload_size(&payload)?,
        };

        let mut output = Vec::with_capacity(FRAME_HEADER_SIZE + header.body_len());
        output.extend_from_slice(&header.to_bytes());
        if quest.is_two_way() {
            output.extend_from_slice(&quest.seq_num().to_le_bytes());
        }
        output.extend_from_slice(method);
        output.extend_from_slice(&payload);
        Ok(output)
    }

    /// Encode an answer.
    pub fn encode_answer(&self, answer: &Answer) -> Result<Vec<u8>> {
        let payload = answer.payload().encode(answer.format())?;
        let header = FrameHeader {
            version: PROTOCOL_VERSION,
            flags: FrameFlags::for_format(answer.format()),
            mtype: MessageType::Answer,
            info: answer.status(),
            payload_size: payload_size(&payload)?,
        };

        let mut output = Vec::with_capacity(FRAME_HEADER_SIZE + header.body_len());
        output.extend_from_slice(&header.to_bytes());
        output.extend_from_slice(&answer.seq_num().to_le_bytes());
        output.extend_from_slice(&payload);
        Ok(output)
    }

    /// Encode either kind of message.
    pub fn encode(&self, message: &Message) -> Result<Vec<u8>> {
        match message {
            Message::Quest(quest) => self.encode_quest(quest),
            Message::Answer(answer) => self.encode_answer(answer),
        }
    }

    /// Parse a header with this codec's payload limit.
    pub fn parse_header(&self, bytes: &[u8; FRAME_HEADER_SIZE]) -> Result<FrameHeader> {
        FrameHeader::parse(bytes, self.max_payload_size)
    }

    /// Decode one complete frame.
    ///
    /// Returns the message and the number of bytes consumed.
    pub fn decode(&self, data: &[u8]) -> Result<(Message, usize)> {
        let header = self.decode_header(data)?;
        let total = FRAME_HEADER_SIZE + header.body_len();
        if data.len() < total {
            return Err(ProtocolError::TruncatedFrame {
                needed: total,
                available: data.len(),
            });
        }

        let message = self.decode_body(&header, &data[FRAME_HEADER_SIZE..total])?;
        Ok((message, total))
    }

    /// Try to decode a frame, returning `None` if the buffer is incomplete.
    ///
    /// Header errors are reported as soon as the header is available.
    pub fn try_decode(&self, data: &[u8]) -> Result<Option<(Message, usize)>> {
        if data.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let header = self.decode_header(data)?;
        if data.len() < FRAME_HEADER_SIZE + header.body_len() {
            return Ok(None);
        }

        self.decode(data).map(Some)
    }

    /// Decode a frame body whose header was already parsed.
    pub fn decode_body(&self, header: &FrameHeader, body: &[u8]) -> Result<Message> {
        let needed = header.body_len();
        if body.len() < needed {
            return Err(ProtocolError::TruncatedFrame {
                needed,
                available: body.len(),
            });
        }

        let format = header.format()?;
        let method_len = header.info as usize;
        let payload_len = header.payload_size as usize;

        match header.mtype {
            MessageType::OneWay => {
                let method = decode_method(&body[..method_len])?;
                let payload = Payload::decode(format, &body[method_len..needed])?;
                let mut quest = Quest::with_format(method, false, format);
                quest.set_payload(payload);
                Ok(Message::Quest(quest))
            }
            MessageType::TwoWay => {
                let seq_num = read_seq_num(body);
                let method_end = SEQ_NUM_SIZE + method_len;
                let method = decode_method(&body[SEQ_NUM_SIZE..method_end])?;
                let payload = Payload::decode(format, &body[method_end..needed])?;
                let mut quest = Quest::with_format(method, true, format);
                quest.set_seq_num(seq_num);
                quest.set_payload(payload);
                Ok(Message::Quest(quest))
            }
            MessageType::Answer => {
                let seq_num = read_seq_num(body);
                let payload =
                    Payload::decode(format, &body[SEQ_NUM_SIZE..SEQ_NUM_SIZE + payload_len])?;
                Ok(Message::Answer(Answer::from_parts(
                    seq_num,
                    header.info,
                    format,
                    payload,
                )))
            }
        }
    }

    fn decode_header(&self, data: &[u8]) -> Result<FrameHeader> {
        let bytes: &[u8; FRAME_HEADER_SIZE] = data
            .get(..FRAME_HEADER_SIZE)
            .and_then(|slice| slice.try_into().ok())
            .ok_or(ProtocolError::TruncatedFrame {
                needed: FRAME_HEADER_SIZE,
                available: data.len(),
            })?;
        self.parse_header(bytes)
    }
}

fn payload_size(payload: &[u8]) -> Result<u32> {
    u32::try_from(payload.len()).map_err(|_| ProtocolError::PayloadTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })
}

// Callers have checked that the body holds at least SEQ_NUM_SIZE bytes.
fn read_seq_num(body: &[u8]) -> u32 {
    u32::from_le_bytes([body[0], body[1], body[2], body[3]])
}

fn decode_method(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| ProtocolError::Deserialization(format!("method name is not UTF-8: {e}")))
}
