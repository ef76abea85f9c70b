//! TCP client facade.
//!
//! [`TcpClient`] owns at most one live [`Connection`] to a fixed endpoint.
//! It connects lazily on the first send when auto-reconnect is enabled and
//! replaces a closed connection the same way.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use protocol::{Answer, Quest};
use tokio::sync::oneshot;

use crate::callback::{guarded, AnswerCallback, Callback};
use crate::config::ClientConfig;
use crate::connection::{ClosedFn, Connection, ConnectionState};
use crate::error::{ClientError, Result};
use crate::handler::QuestHandler;

/// Notification fired after every connect attempt: `(conn_id, endpoint, ok)`.
///
/// `conn_id` is 0 when no connection was created.
pub type ConnectedFn = Arc<dyn Fn(u64, &str, bool) + Send + Sync + 'static>;

/// FPNN TCP client.
///
/// # Example
///
/// ```no_run
/// use fpnn_client::{ClientConfig, TcpClient};
/// use protocol::Quest;
///
/// # async fn run() -> fpnn_client::Result<()> {
/// let client = TcpClient::new("127.0.0.1:13011", ClientConfig::default());
/// let answer = client
///     .send_quest(Quest::new("echo").with_param("msg", "hello"))
///     .await?;
/// assert_eq!(answer.payload().get_string("msg").0, "hello");
/// # Ok(())
/// # }
/// ```
pub struct TcpClient {
    endpoint: String,
    config: ClientConfig,
    handler: Option<Arc<dyn QuestHandler>>,
    on_connected: Option<ConnectedFn>,
    on_closed: Option<ClosedFn>,
    current: Mutex<Option<Connection>>,
    connect_lock: tokio::sync::Mutex<()>,
}

impl TcpClient {
    pub fn new(endpoint: impl Into<String>, config: ClientConfig) -> Self {
        Self {
            endpoint: endpoint.into(),
            config,
            handler: None,
            on_connected: None,
            on_closed: None,
            current: Mutex::new(None),
            connect_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Serve quests pushed by the server with `handler`.
    pub fn with_handler(mut self, handler: Arc<dyn QuestHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn on_connected<F>(mut self, f: F) -> Self
    where
        F: Fn(u64, &str, bool) + Send + Sync + 'static,
    {
        self.on_connected = Some(Arc::new(f));
        self
    }

    pub fn on_closed<F>(mut self, f: F) -> Self
    where
        F: Fn(u64, &str) + Send + Sync + 'static,
    {
        self.on_closed = Some(Arc::new(f));
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.live().is_some()
    }

    pub fn state(&self) -> ConnectionState {
        self.slot()
            .as_ref()
            .map_or(ConnectionState::Disconnected, Connection::state)
    }

    /// The live connection, if any.
    pub fn connection(&self) -> Option<Connection> {
        self.live()
    }

    /// Connect if not already connected.
    ///
    /// Concurrent callers share one attempt. The connected notification
    /// fires after every attempt with its outcome.
    pub async fn connect(&self) -> Result<()> {
        if self.live().is_some() {
            return Ok(());
        }

        let _guard = self.connect_lock.lock().await;
        if self.live().is_some() {
            return Ok(());
        }

        let options = self.config.connection_options()?;
        let result = Connection::open(
            &self.endpoint,
            &options,
            self.handler.clone(),
            self.on_closed.clone(),
        )
        .await;

        match result {
            Ok(conn) => {
                self.notify_connected(conn.id(), true);
                *self.slot() = Some(conn);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(endpoint = %self.endpoint, error = %e, "connect failed");
                self.notify_connected(0, false);
                Err(e)
            }
        }
    }

    /// Send a two-way quest and wait for its answer.
    ///
    /// Timeouts and connection loss come back as exception answers
    /// (`CORE_TIMEOUT`, `CORE_CONNECTION_CLOSED`), not as errors.
    pub async fn send_quest(&self, quest: Quest) -> Result<Answer> {
        self.send_quest_with_timeout(quest, None).await
    }

    /// Like [`send_quest`](Self::send_quest) with a per-request timeout.
    pub async fn send_quest_with_timeout(
        &self,
        quest: Quest,
        timeout: Option<Duration>,
    ) -> Result<Answer> {
        if quest.is_one_way() {
            return Err(ClientError::OneWayQuest);
        }
        let conn = self.ensure_connected().await?;

        let (tx, rx) = oneshot::channel();
        conn.send_quest(quest, Callback::Blocking(tx), timeout)
            .await?;
        rx.await.map_err(|_| ClientError::ConnectionClosed)
    }

    /// Send a two-way quest; `callback` receives the answer exactly once.
    ///
    /// Returns once the quest is queued. If an error is returned the
    /// callback is never invoked.
    pub async fn send_quest_with_callback(
        &self,
        quest: Quest,
        callback: Arc<dyn AnswerCallback>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.send_with(quest, Callback::Object(callback), timeout)
            .await
    }

    /// Send a two-way quest; `f` receives the answer and its error code.
    pub async fn send_quest_with_fn<F>(
        &self,
        quest: Quest,
        timeout: Option<Duration>,
        f: F,
    ) -> Result<()>
    where
        F: FnOnce(Answer, i32) + Send + 'static,
    {
        self.send_with(quest, Callback::Function(Box::new(f)), timeout)
            .await
    }

    /// Send a one-way quest. No answer is expected.
    pub async fn send_one_way(&self, quest: Quest) -> Result<()> {
        if quest.is_two_way() {
            return Err(ClientError::TwoWayQuest);
        }
        self.ensure_connected().await?.send_one_way(quest).await
    }

    /// Close the current connection, if any.
    pub fn close(&self) {
        let conn = self.slot().take();
        if let Some(conn) = conn {
            conn.close();
        }
    }

    async fn send_with(
        &self,
        quest: Quest,
        callback: Callback,
        timeout: Option<Duration>,
    ) -> Result<()> {
        if quest.is_one_way() {
            return Err(ClientError::OneWayQuest);
        }
        self.ensure_connected()
            .await?
            .send_quest(quest, callback, timeout)
            .await
    }

    async fn ensure_connected(&self) -> Result<Connection> {
        if let Some(conn) = self.live() {
            return Ok(conn);
        }
        if !self.config.connection.auto_reconnect {
            return Err(ClientError::InvalidConnection);
        }

        tracing::debug!(endpoint = %self.endpoint, "connecting on demand");
        if let Err(e) = self.connect().await {
            tracing::debug!(endpoint = %self.endpoint, error = %e, "on-demand connect failed");
            return Err(ClientError::InvalidConnection);
        }
        self.live().ok_or(ClientError::InvalidConnection)
    }

    /// The current connection if it is still open; drops a closed one.
    fn live(&self) -> Option<Connection> {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(Connection::is_connected) {
            return (*slot).clone();
        }
        *slot = None;
        None
    }

    fn slot(&self) -> MutexGuard<'_, Option<Connection>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify_connected(&self, conn_id: u64, ok: bool) {
        if let Some(on_connected) = self.on_connected.clone() {
            let endpoint = self.endpoint.clone();
            tokio::task::spawn_blocking(move || {
                guarded("connected notification", || on_connected(conn_id, &endpoint, ok))
            });
        }
    }
}

impl Drop for TcpClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TcpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpClient")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .finish()
    }
}
