//! Print wire test vectors for interop testing against other FPNN peers.
//!
//! Run with: cargo run --package protocol --example test_vectors

use protocol::{error_code, Answer, FrameCodec, Message, Payload, PayloadFormat, Quest, Value};

fn main() -> Result<(), protocol::ProtocolError> {
    let codec = FrameCodec::new();

    // Vector 1: two-way echo quest
    let mut echo = Quest::new("echo").with_param("x", 1);
    echo.set_seq_num(1);
    print_vector("echo_quest", &codec.encode_quest(&echo)?);

    // Vector 2: its answer
    let answer = Answer::new(&echo).with_param("x", 1);
    print_vector("echo_answer", &codec.encode_answer(&answer)?);

    // Vector 3: one-way quest with mixed value types
    let notify = Quest::one_way("notify")
        .with_param("name", "fpnn")
        .with_param("blob", vec![0xde_u8, 0xad, 0xbe, 0xef])
        .with_param("list", vec![Value::Int(-1), Value::Float(0.5), Value::Null]);
    print_vector("notify_one_way", &codec.encode_quest(&notify)?);

    // Vector 4: JSON two-way quest
    let mut json = Quest::with_format("status", true, PayloadFormat::Json).with_param("verbose", true);
    json.set_seq_num(2);
    print_vector("status_json", &codec.encode_quest(&json)?);

    // Vector 5: timeout exception answer
    let timeout = Answer::error_with_seq(3, error_code::CORE_TIMEOUT, "Quest is timeout.");
    print_vector("timeout_answer", &codec.encode_answer(&timeout)?);

    // Vector 6: empty keep-alive ping
    let mut ping = Quest::new(protocol::PING_METHOD);
    ping.set_payload(Payload::new());
    ping.set_seq_num(4);
    let bytes = codec.encode_quest(&ping)?;
    print_vector("ping", &bytes);

    // Sanity check: every vector decodes back.
    let (decoded, _) = codec.decode(&bytes)?;
    assert!(matches!(decoded, Message::Quest(q) if q.method() == protocol::PING_METHOD));

    Ok(())
}

fn print_vector(name: &str, bytes: &[u8]) {
    let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
    println!("{name} ({} bytes): {}", bytes.len(), hex.join(" "));
}
