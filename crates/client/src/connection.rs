//! Connection engine.
//!
//! Each [`Connection`] owns one TCP stream and two tasks:
//!
//! ```text
//!                 ┌──────────────┐   frames    ┌──────────┐
//!  send_quest ───▶│ outbound mpsc │───────────▶│  writer  │──▶ socket
//!                 └──────────────┘             └──────────┘
//!  sweep (1s tick) ──▶ timeouts, keep-alive pings
//!  socket ──▶ reader ──▶ answers: pending map ──▶ callbacks (blocking pool)
//!                   └──▶ quests: handler ──▶ answer ──▶ outbound mpsc
//! ```
//!
//! The writer is the only task that touches the socket's write half; a
//! socket write is abandoned as soon as the connection closes. A separate
//! sweep task expires overdue requests and drives keep-alive every second,
//! so a peer that stops reading cannot stall timeouts.
//!
//! The pending map, sequence counter and status share one mutex that is
//! never held across an await point. A request is registered and its
//! frame enqueued under the same lock acquisition, so an answer can never
//! arrive for a sequence number that is not yet registered. Removal from
//! the map is the single gate before a callback fires, which makes answer,
//! timeout and close mutually exclusive.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use protocol::{
    error_code, AesKeyBits, Answer, EcdhExchange, FrameCodec, Message, PeerPublicKey, Quest,
    StreamDecryptor, StreamEncryptor, DEFAULT_MAX_PAYLOAD_SIZE, FRAME_HEADER_SIZE,
    HANDSHAKE_METHOD, PING_METHOD,
};
use rand::Rng;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::callback::{guarded, panic_message, Callback};
use crate::error::{ClientError, Result};
use crate::handler::{panic_answer, process_quest, QuestHandler};
use crate::keepalive::{KeepAliveAction, KeepAliveConfig, KeepAliveState};

/// Period of the timeout sweep and keep-alive check.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound of the random initial sequence number.
const INITIAL_SEQ_LIMIT: u32 = 4096;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Notification fired once when a connection closes: `(conn_id, endpoint)`.
pub type ClosedFn = Arc<dyn Fn(u64, &str) + Send + Sync + 'static>;

/// Options for a single connection.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Default answer timeout.
    pub quest_timeout: Duration,
    pub connect_timeout: Duration,
    /// Capacity of the outbound frame queue.
    pub queue_capacity: usize,
    /// Largest payload accepted from the peer.
    pub max_payload_size: usize,
    pub keep_alive: Option<KeepAliveConfig>,
    pub encryption: Option<EncryptionOptions>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            quest_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            queue_capacity: 64,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            keep_alive: None,
            encryption: None,
        }
    }
}

/// Server key and AES width for an encrypted connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionOptions {
    pub server_key: PeerPublicKey,
    pub bits: AesKeyBits,
}

/// Connection lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Closed,
}

struct PendingRequest {
    deadline: Instant,
    callback: Callback,
}

struct State {
    status: ConnectionState,
    next_seq: u32,
    pending: HashMap<u32, PendingRequest>,
    keep_alive: Option<KeepAliveState>,
}

impl State {
    /// Next free sequence number. Zero is skipped on wrap-around.
    fn allocate_seq(&mut self) -> u32 {
        loop {
            let seq = self.next_seq;
            self.next_seq = self.next_seq.wrapping_add(1);
            if self.next_seq == 0 {
                self.next_seq = 1;
            }
            if !self.pending.contains_key(&seq) {
                return seq;
            }
        }
    }
}

struct Shared {
    id: u64,
    endpoint: String,
    state: Mutex<State>,
    outbound: mpsc::Sender<Vec<u8>>,
    shutdown: CancellationToken,
    handler: Option<Arc<dyn QuestHandler>>,
    on_closed: Mutex<Option<ClosedFn>>,
    runtime: Handle,
    codec: FrameCodec,
    quest_timeout: Duration,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_received(&self) {
        if let Some(keep_alive) = self.state().keep_alive.as_mut() {
            keep_alive.record_received(Instant::now());
        }
    }
}

/// A live FPNN connection.
///
/// Cloning is cheap; all clones refer to the same connection.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Dial `endpoint`, run the key exchange if configured and start the
    /// reader and writer tasks.
    ///
    /// # Errors
    ///
    /// Returns an error if the dial fails or times out, or if the
    /// encryption handshake cannot be completed. No application traffic
    /// is sent on a connection whose handshake failed.
    pub async fn open(
        endpoint: &str,
        options: &ConnectionOptions,
        handler: Option<Arc<dyn QuestHandler>>,
        on_closed: Option<ClosedFn>,
    ) -> Result<Self> {
        let stream = tokio::time::timeout(options.connect_timeout, TcpStream::connect(endpoint))
            .await
            .map_err(|_| ClientError::ConnectTimeout(endpoint.to_string()))?
            .map_err(|source| ClientError::Connect {
                endpoint: endpoint.to_string(),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(endpoint, error = %e, "failed to set TCP_NODELAY");
        }
        let (reader, writer) = stream.into_split();
        Self::start(endpoint, reader, writer, options, handler, on_closed).await
    }

    /// Run the key exchange over an established transport and spawn the
    /// reader, writer and sweep tasks.
    async fn start<R, W>(
        endpoint: &str,
        reader: R,
        mut writer: W,
        options: &ConnectionOptions,
        handler: Option<Arc<dyn QuestHandler>>,
        on_closed: Option<ClosedFn>,
    ) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, outbound_rx) = mpsc::channel(options.queue_capacity.max(1));
        let now = Instant::now();
        let shared = Arc::new(Shared {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            endpoint: endpoint.to_string(),
            state: Mutex::new(State {
                status: ConnectionState::Connected,
                next_seq: rand::thread_rng().gen_range(1..INITIAL_SEQ_LIMIT),
                pending: HashMap::new(),
                keep_alive: options.keep_alive.map(|config| KeepAliveState::new(config, now)),
            }),
            outbound,
            shutdown: CancellationToken::new(),
            handler,
            on_closed: Mutex::new(None),
            runtime: Handle::current(),
            codec: FrameCodec::with_max_payload_size(options.max_payload_size),
            quest_timeout: options.quest_timeout,
        });
        let conn = Connection { shared };

        let (encryptor, decryptor) = match &options.encryption {
            Some(encryption) => match conn.handshake(&mut writer, encryption).await {
                Ok((encryptor, decryptor)) => (Some(encryptor), Some(decryptor)),
                Err(e) => {
                    tracing::error!(conn_id = conn.id(), endpoint, error = %e, "encryption handshake failed");
                    conn.close();
                    return Err(e);
                }
            },
            None => (None, None),
        };

        *conn
            .shared
            .on_closed
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = on_closed;

        tokio::spawn(read_loop(conn.shared.clone(), reader, decryptor));
        tokio::spawn(write_loop(
            conn.shared.clone(),
            writer,
            outbound_rx,
            encryptor,
        ));
        tokio::spawn(sweep_loop(conn.shared.clone()));

        tracing::info!(
            conn_id = conn.id(),
            endpoint,
            encrypted = options.encryption.is_some(),
            "connection established"
        );
        Ok(conn)
    }

    /// Process-unique connection id.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state().status
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Number of two-way quests awaiting an answer.
    pub fn pending_count(&self) -> usize {
        self.shared.state().pending.len()
    }

    /// Send a two-way quest; `callback` receives exactly one answer.
    ///
    /// `timeout` defaults to the connection's quest timeout.
    ///
    /// # Errors
    ///
    /// On error the callback is dropped without being invoked.
    pub async fn send_quest(
        &self,
        mut quest: Quest,
        callback: Callback,
        timeout: Option<Duration>,
    ) -> Result<()> {
        if quest.is_one_way() {
            return Err(ClientError::OneWayQuest);
        }

        let seq = {
            let mut state = self.shared.state();
            if state.status != ConnectionState::Connected {
                return Err(ClientError::ConnectionClosed);
            }
            state.allocate_seq()
        };
        quest.set_seq_num(seq);
        let bytes = self.shared.codec.encode_quest(&quest)?;

        let timeout = timeout.unwrap_or(self.shared.quest_timeout);
        tracing::trace!(conn_id = self.id(), seq, method = quest.method(), "sending quest");
        self.enqueue(bytes, Some((seq, callback, timeout))).await
    }

    /// Send a one-way quest. Returns once the frame is queued.
    pub async fn send_one_way(&self, quest: Quest) -> Result<()> {
        if quest.is_two_way() {
            return Err(ClientError::TwoWayQuest);
        }
        let bytes = self.shared.codec.encode_quest(&quest)?;
        self.enqueue(bytes, None).await
    }

    /// Send an answer to a quest received from the peer.
    pub async fn send_answer(&self, answer: &Answer) -> Result<()> {
        let bytes = self.shared.codec.encode_answer(answer)?;
        self.enqueue(bytes, None).await
    }

    /// Close the connection. Idempotent.
    ///
    /// Every pending request receives a `CORE_CONNECTION_CLOSED` answer and
    /// the closed notification fires once.
    pub fn close(&self) {
        let drained = {
            let mut state = self.shared.state();
            if state.status == ConnectionState::Closed {
                return;
            }
            state.status = ConnectionState::Closed;
            std::mem::take(&mut state.pending)
        };
        self.shared.shutdown.cancel();

        tracing::info!(
            conn_id = self.id(),
            endpoint = %self.shared.endpoint,
            pending = drained.len(),
            "connection closed"
        );

        for (seq, request) in drained {
            request.callback.invoke(
                Answer::error_with_seq(
                    seq,
                    error_code::CORE_CONNECTION_CLOSED,
                    "Connection is closed.",
                ),
                &self.shared.runtime,
            );
        }

        let on_closed = self
            .shared
            .on_closed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(on_closed) = on_closed {
            let id = self.id();
            let endpoint = self.shared.endpoint.clone();
            self.shared.runtime.spawn_blocking(move || {
                guarded("closed notification", || on_closed(id, &endpoint))
            });
        }
    }

    /// Reserve queue space, then register and enqueue under one lock.
    async fn enqueue(
        &self,
        bytes: Vec<u8>,
        pending: Option<(u32, Callback, Duration)>,
    ) -> Result<()> {
        let permit = tokio::select! {
            permit = self.shared.outbound.reserve() => {
                permit.map_err(|_| ClientError::ConnectionClosed)?
            }
            _ = self.shared.shutdown.cancelled() => return Err(ClientError::ConnectionClosed),
        };

        let mut state = self.shared.state();
        if state.status != ConnectionState::Connected {
            return Err(ClientError::ConnectionClosed);
        }
        if let Some((seq, callback, timeout)) = pending {
            state.pending.insert(
                seq,
                PendingRequest {
                    deadline: Instant::now() + timeout,
                    callback,
                },
            );
        }
        permit.send(bytes);
        Ok(())
    }

    /// Send the `*key` quest in plaintext and build both stream ciphers.
    async fn handshake<W: AsyncWrite + Unpin>(
        &self,
        writer: &mut W,
        encryption: &EncryptionOptions,
    ) -> Result<(StreamEncryptor, StreamDecryptor)> {
        let exchange = EcdhExchange::new(&encryption.server_key)
            .map_err(|e| ClientError::Handshake(e.to_string()))?;
        let keys = exchange.session_keys(encryption.bits);
        let encryptor = keys
            .encryptor()
            .map_err(|e| ClientError::Handshake(e.to_string()))?;
        let decryptor = keys
            .decryptor()
            .map_err(|e| ClientError::Handshake(e.to_string()))?;

        let mut quest = Quest::new(HANDSHAKE_METHOD)
            .with_param("publicKey", exchange.public_key().raw_bytes().to_vec())
            .with_param("bits", encryption.bits.bits())
            .with_param("streamMode", true);

        let seq = {
            let mut state = self.shared.state();
            let seq = state.allocate_seq();
            let conn_id = self.id();
            state.pending.insert(
                seq,
                PendingRequest {
                    deadline: Instant::now() + self.shared.quest_timeout,
                    callback: Callback::Function(Box::new(move |answer, code| {
                        if code != error_code::OK {
                            tracing::error!(
                                conn_id,
                                code,
                                ex = %answer.exception_message().unwrap_or_default(),
                                "key exchange rejected by server"
                            );
                        }
                    })),
                },
            );
            seq
        };
        quest.set_seq_num(seq);

        let bytes = self.shared.codec.encode_quest(&quest)?;
        writer
            .write_all(&bytes)
            .await
            .map_err(|e| ClientError::Handshake(format!("failed to send key exchange: {e}")))?;

        tracing::debug!(conn_id = self.id(), bits = encryption.bits.bits(), "key exchange sent");
        Ok((encryptor, decryptor))
    }

    fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.shared.id)
            .field("endpoint", &self.shared.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

async fn read_loop<R: AsyncRead + Unpin>(
    shared: Arc<Shared>,
    mut reader: R,
    mut decryptor: Option<StreamDecryptor>,
) {
    let result = tokio::select! {
        result = read_frames(&shared, &mut reader, &mut decryptor) => result,
        _ = shared.shutdown.cancelled() => Ok(()),
    };

    match result {
        Err(ClientError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            tracing::debug!(conn_id = shared.id, "peer closed the connection");
        }
        Err(e) => {
            tracing::warn!(conn_id = shared.id, error = %e, "read loop terminated");
        }
        Ok(()) => {}
    }
    Connection::from_shared(shared).close();
}

async fn read_frames<R: AsyncRead + Unpin>(
    shared: &Arc<Shared>,
    reader: &mut R,
    decryptor: &mut Option<StreamDecryptor>,
) -> Result<()> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    loop {
        reader.read_exact(&mut header).await?;
        if let Some(decryptor) = decryptor.as_mut() {
            decryptor.decrypt(&mut header);
        }
        let parsed = shared.codec.parse_header(&header)?;

        let mut body = vec![0u8; parsed.body_len()];
        reader.read_exact(&mut body).await?;
        if let Some(decryptor) = decryptor.as_mut() {
            decryptor.decrypt(&mut body);
        }
        let message = shared.codec.decode_body(&parsed, &body)?;

        shared.record_received();

        match message {
            Message::Answer(answer) => dispatch_answer(shared, answer),
            Message::Quest(quest) => dispatch_quest(shared.clone(), quest),
        }
    }
}

fn dispatch_answer(shared: &Shared, answer: Answer) {
    let seq = answer.seq_num();
    let request = shared.state().pending.remove(&seq);
    match request {
        Some(request) => request.callback.invoke(answer, &shared.runtime),
        None => tracing::debug!(conn_id = shared.id, seq, "discarding answer with no pending quest"),
    }
}

fn dispatch_quest(shared: Arc<Shared>, quest: Quest) {
    tokio::spawn(async move {
        let handler = shared.handler.clone();
        let method = quest.method().to_string();
        let answer = tokio::task::spawn_blocking(move || {
            match panic::catch_unwind(AssertUnwindSafe(|| {
                process_quest(handler.as_deref(), &quest)
            })) {
                Ok(answer) => answer,
                Err(panic) => panic_answer(&quest, &panic_message(&panic)),
            }
        })
        .await;

        match answer {
            Ok(Some(answer)) => {
                let conn = Connection::from_shared(shared);
                if let Err(e) = conn.send_answer(&answer).await {
                    tracing::error!(conn_id = conn.id(), %method, error = %e, "failed to send answer");
                }
            }
            Ok(None) => {}
            Err(e) => tracing::error!(conn_id = shared.id, %method, error = %e, "quest task failed"),
        }
    });
}

async fn write_loop<W: AsyncWrite + Unpin>(
    shared: Arc<Shared>,
    mut writer: W,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    mut encryptor: Option<StreamEncryptor>,
) {
    loop {
        let frame = tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            frame = outbound.recv() => frame,
        };
        let Some(mut bytes) = frame else { break };
        if let Some(encryptor) = encryptor.as_mut() {
            encryptor.encrypt(&mut bytes);
        }

        // Abandoned on close even if the peer never drains the socket.
        tokio::select! {
            result = writer.write_all(&bytes) => {
                if let Err(e) = result {
                    tracing::warn!(conn_id = shared.id, error = %e, "write failed");
                    break;
                }
            }
            _ = shared.shutdown.cancelled() => break,
        }
    }

    if !shared.shutdown.is_cancelled() {
        let _ = writer.shutdown().await;
    }
    Connection::from_shared(shared).close();
}

/// Drive the timeout sweep and keep-alive until the connection closes.
async fn sweep_loop(shared: Arc<Shared>) {
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shared.shutdown.cancelled() => break,
            _ = ticker.tick() => on_tick(&shared),
        }
    }
}

/// Sweep expired requests and evaluate keep-alive.
fn on_tick(shared: &Arc<Shared>) {
    let now = Instant::now();
    let (expired, action, ping_timeout) = {
        let mut state = shared.state();
        let expired_seqs: Vec<u32> = state
            .pending
            .iter()
            .filter(|(_, request)| request.deadline <= now)
            .map(|(seq, _)| *seq)
            .collect();
        let expired: Vec<(u32, PendingRequest)> = expired_seqs
            .into_iter()
            .filter_map(|seq| state.pending.remove(&seq).map(|request| (seq, request)))
            .collect();
        let action = state
            .keep_alive
            .as_mut()
            .map_or(KeepAliveAction::Idle, |keep_alive| keep_alive.check(now));
        let ping_timeout = state.keep_alive.as_ref().map(|k| k.config().timeout);
        (expired, action, ping_timeout)
    };

    for (seq, request) in expired {
        tracing::debug!(conn_id = shared.id, seq, "quest timed out");
        request.callback.invoke(
            Answer::error_with_seq(seq, error_code::CORE_TIMEOUT, "Quest is timeout."),
            &shared.runtime,
        );
    }

    match action {
        KeepAliveAction::Idle => {}
        KeepAliveAction::SendPing => {
            let conn = Connection::from_shared(shared.clone());
            tokio::spawn(async move {
                let conn_id = conn.id();
                let callback = Callback::Function(Box::new(move |answer, code| {
                    if code != error_code::OK {
                        tracing::warn!(
                            conn_id,
                            code,
                            ex = %answer.exception_message().unwrap_or_default(),
                            "keep-alive ping failed"
                        );
                    }
                }));
                if let Err(e) = conn.send_quest(Quest::new(PING_METHOD), callback, ping_timeout).await {
                    tracing::debug!(conn_id, error = %e, "failed to send keep-alive ping");
                }
            });
        }
        KeepAliveAction::Lost => {
            tracing::warn!(
                conn_id = shared.id,
                endpoint = %shared.endpoint,
                "keep-alive lost, closing connection"
            );
            Connection::from_shared(shared.clone()).close();
        }
    }
}
