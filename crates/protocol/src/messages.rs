//! Quest and answer message definitions.
//!
//! A [`Quest`] is a request frame, either one-way (no answer expected) or
//! two-way (answered by an [`Answer`] carrying the same sequence number).
//! Exception answers have a non-zero status and carry `code` and `ex`
//! payload fields.

use crate::payload::{Payload, PayloadFormat};
use crate::value::Value;

/// Current wire protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Reserved method name of the key exchange quest.
pub const HANDSHAKE_METHOD: &str = "*key";

/// Reserved method name of the keep-alive quest.
pub const PING_METHOD: &str = "*ping";

/// Status byte of a successful answer.
pub const STATUS_OK: u8 = 0;

/// Status byte of an exception answer.
pub const STATUS_EXCEPTION: u8 = 1;

/// FPNN core error codes.
pub mod error_code {
    pub const OK: i32 = 0;
    pub const CORE_UNKNOWN_ERROR: i32 = 20001;
    pub const CORE_CONNECTION_CLOSED: i32 = 20002;
    pub const CORE_TIMEOUT: i32 = 20003;
    pub const CORE_UNKNOWN_METHOD: i32 = 20004;
    pub const CORE_ENCODING: i32 = 20005;
    pub const CORE_DECODING: i32 = 20006;
    pub const CORE_SEND_ERROR: i32 = 20007;
    pub const CORE_INVALID_PACKAGE: i32 = 20009;
    pub const CORE_INVALID_CONNECTION: i32 = 20012;
}

/// A request frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Quest {
    seq_num: u32,
    method: String,
    two_way: bool,
    format: PayloadFormat,
    payload: Payload,
}

impl Quest {
    /// Create a two-way MessagePack quest.
    pub fn new(method: impl Into<String>) -> Self {
        Self::with_format(method, true, PayloadFormat::MessagePack)
    }

    /// Create a one-way MessagePack quest.
    pub fn one_way(method: impl Into<String>) -> Self {
        Self::with_format(method, false, PayloadFormat::MessagePack)
    }

    /// Create a quest with an explicit direction and codec.
    pub fn with_format(method: impl Into<String>, two_way: bool, format: PayloadFormat) -> Self {
        Self {
            seq_num: 0,
            method: method.into(),
            two_way,
            format,
            payload: Payload::new(),
        }
    }

    /// Sequence number; zero until the connection assigns one.
    pub fn seq_num(&self) -> u32 {
        self.seq_num
    }

    /// Overwrite the sequence number. Used by the connection at send time.
    pub fn set_seq_num(&mut self, seq_num: u32) {
        self.seq_num = seq_num;
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn is_two_way(&self) -> bool {
        self.two_way
    }

    pub fn is_one_way(&self) -> bool {
        !self.two_way
    }

    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    /// Replace the whole payload.
    pub fn set_payload(&mut self, payload: Payload) {
        self.payload = payload;
    }

    /// Set a payload field.
    pub fn param(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.payload.insert(key, value);
        self
    }

    /// Builder form of [`Quest::param`].
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key, value);
        self
    }
}

/// A response frame correlated to a two-way quest by sequence number.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    seq_num: u32,
    status: u8,
    format: PayloadFormat,
    payload: Payload,
}

impl Answer {
    /// Create an empty success answer for `quest`, using its codec.
    pub fn new(quest: &Quest) -> Self {
        Self::from_parts(quest.seq_num, STATUS_OK, quest.format, Payload::new())
    }

    /// Create an exception answer for `quest`.
    pub fn error(quest: &Quest, code: i32, ex: impl Into<String>) -> Self {
        let mut answer = Self::error_with_seq(quest.seq_num, code, ex);
        answer.format = quest.format;
        answer
    }

    /// Create a MessagePack exception answer for a bare sequence number.
    ///
    /// Used for synthetic answers (timeout, connection closed).
    pub fn error_with_seq(seq_num: u32, code: i32, ex: impl Into<String>) -> Self {
        let payload = Payload::new().with("code", code).with("ex", ex.into());
        Self::from_parts(seq_num, STATUS_EXCEPTION, PayloadFormat::MessagePack, payload)
    }

    pub fn from_parts(seq_num: u32, status: u8, format: PayloadFormat, payload: Payload) -> Self {
        Self {
            seq_num,
            status,
            format,
            payload,
        }
    }

    pub fn seq_num(&self) -> u32 {
        self.seq_num
    }

    pub fn status(&self) -> u8 {
        self.status
    }

    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    pub fn is_exception(&self) -> bool {
        self.status != STATUS_OK
    }

    /// Error code: OK for success, the `code` field for exceptions.
    ///
    /// An exception without a usable `code` reports `CORE_UNKNOWN_ERROR`.
    pub fn error_code(&self) -> i32 {
        if !self.is_exception() {
            return error_code::OK;
        }
        match self.payload.get("code").and_then(Value::as_i64) {
            Some(code) => code as i32,
            None => error_code::CORE_UNKNOWN_ERROR,
        }
    }

    /// Exception message from the `ex` field, if present.
    pub fn exception_message(&self) -> Option<String> {
        self.payload
            .get("ex")
            .and_then(Value::as_str)
            .map(|s| s.into_owned())
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut Payload {
        &mut self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// Set a payload field.
    pub fn param(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.payload.insert(key, value);
        self
    }

    /// Builder form of [`Answer::param`].
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key, value);
        self
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Quest(Quest),
    Answer(Answer),
}

impl Message {
    pub fn seq_num(&self) -> u32 {
        match self {
            Message::Quest(q) => q.seq_num(),
            Message::Answer(a) => a.seq_num(),
        }
    }
}

impl From<Quest> for Message {
    fn from(quest: Quest) -> Self {
        Message::Quest(quest)
    }
}

impl From<Answer> for Message {
    fn from(answer: Answer) -> Self {
        Message::Answer(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quest_defaults() {
        let quest = Quest::new("echo");
        assert_eq!(quest.seq_num(), 0);
        assert!(quest.is_two_way());
        assert_eq!(quest.format(), PayloadFormat::MessagePack);
        assert!(quest.payload().is_empty());

        let one_way = Quest::one_way("notify");
        assert!(one_way.is_one_way());
    }

    #[test]
    fn test_quest_params() {
        let mut quest = Quest::new("echo").with_param("x", 1);
        quest.param("y", "two").param("z", 3.5);
        assert_eq!(quest.payload().get_i64("x"), (1, true));
        assert_eq!(quest.payload().get_string("y"), ("two".to_string(), true));
        assert_eq!(quest.payload().len(), 3);
    }

    #[test]
    fn test_answer_copies_seq_and_format() {
        let mut quest = Quest::with_format("echo", true, PayloadFormat::Json);
        quest.set_seq_num(42);

        let answer = Answer::new(&quest);
        assert_eq!(answer.seq_num(), 42);
        assert_eq!(answer.format(), PayloadFormat::Json);
        assert!(!answer.is_exception());
        assert_eq!(answer.error_code(), error_code::OK);
    }

    #[test]
    fn test_error_answer() {
        let mut quest = Quest::new("missing");
        quest.set_seq_num(9);

        let answer = Answer::error(&quest, error_code::CORE_UNKNOWN_METHOD, "no such method");
        assert_eq!(answer.seq_num(), 9);
        assert!(answer.is_exception());
        assert_eq!(answer.error_code(), error_code::CORE_UNKNOWN_METHOD);
        assert_eq!(answer.exception_message().as_deref(), Some("no such method"));
    }

    #[test]
    fn test_synthetic_error_answer() {
        let answer = Answer::error_with_seq(7, error_code::CORE_TIMEOUT, "Quest is timeout.");
        assert_eq!(answer.seq_num(), 7);
        assert_eq!(answer.format(), PayloadFormat::MessagePack);
        assert_eq!(answer.error_code(), error_code::CORE_TIMEOUT);
    }

    #[test]
    fn test_exception_without_code() {
        let answer = Answer::from_parts(1, STATUS_EXCEPTION, PayloadFormat::MessagePack, Payload::new());
        assert_eq!(answer.error_code(), error_code::CORE_UNKNOWN_ERROR);
        assert_eq!(answer.exception_message(), None);
    }

    #[test]
    fn test_message_seq_num() {
        let mut quest = Quest::new("a");
        quest.set_seq_num(3);
        assert_eq!(Message::from(quest).seq_num(), 3);
        assert_eq!(Message::from(Answer::error_with_seq(5, 1, "x")).seq_num(), 5);
    }
}
