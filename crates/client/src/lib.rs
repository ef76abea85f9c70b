//! # FPNN Client
//!
//! Asynchronous client for the FPNN binary RPC protocol, built on tokio.
//!
//! ## Overview
//!
//! One persistent TCP connection carries multiplexed quests (requests) and
//! answers in both directions:
//!
//! - **Two-way quests**: answers are correlated by sequence number and
//!   delivered exactly once, to an awaiting caller, an [`AnswerCallback`]
//!   or a closure
//! - **One-way quests**: fire and forget
//! - **Duplex**: quests pushed by the server are served by a [`QuestHandler`]
//! - **Timeouts and keep-alive**: a periodic sweep expires overdue quests and
//!   pings an idle server, closing the link when it stops answering
//! - **Encryption**: optional ECDH key exchange followed by AES-CFB on the
//!   whole stream
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                  TcpClient                    │
//! │   connect on demand, callbacks, close on drop │
//! ├───────────────────────────────────────────────┤
//! │                  Connection                   │
//! │  pending map │ reader task │ writer task+tick │
//! ├───────────────────────────────────────────────┤
//! │        protocol: FrameCodec, Payload,         │
//! │        EcdhExchange, StreamEncryptor          │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fpnn_client::{ClientConfig, TcpClient};
//! use protocol::Quest;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::load_default()?;
//!     fpnn_client::logging::init(&config.logging);
//!
//!     let client = TcpClient::new("127.0.0.1:13011", config);
//!     let answer = client
//!         .send_quest(Quest::new("echo").with_param("msg", "hi"))
//!         .await?;
//!     println!("{:?}", answer.payload());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`client`]: The [`TcpClient`] facade
//! - [`connection`]: Connection engine
//! - [`callback`]: Answer delivery
//! - [`handler`]: Inbound quest processing
//! - [`keepalive`]: Keep-alive bookkeeping
//! - [`config`]: TOML configuration
//! - [`logging`]: Tracing subscriber setup
//! - [`error`]: Error types

pub mod callback;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod keepalive;
pub mod logging;

pub use callback::{AnswerCallback, AnswerFn, Callback};
pub use client::{ConnectedFn, TcpClient};
pub use config::{ClientConfig, ConfigError};
pub use connection::{ClosedFn, Connection, ConnectionOptions, ConnectionState, EncryptionOptions};
pub use error::{ClientError, Result};
pub use handler::{HandlerError, MethodFn, MethodTable, QuestHandler};
pub use keepalive::{KeepAliveAction, KeepAliveConfig};
