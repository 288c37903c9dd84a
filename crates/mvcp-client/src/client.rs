//! Connection lifecycle and the public client handle.
//!
//! One [`Client`] owns one logical connection at a time. All state shared
//! with the background tasks lives behind a single mutex: the connection
//! state, the correlator, and the writer channel. Submitting a command
//! pushes its line to the writer and its entry to the pending queue under
//! that one lock, so wire order always equals queue order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures_util::{SinkExt, StreamExt};
use mvcp_frame::{classify, validate_command, FrameError, ResponseCodec, Response};
use mvcp_transport::{Connector, Endpoint, TransportError};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use crate::completion::Completion;
use crate::config::{ClientConfig, DisconnectedPolicy};
use crate::correlator::{Correlator, ErrorRecord, PendingCommand};
use crate::error::{ClientError, Result};
use crate::handshake::read_greeting;
use crate::state::ConnectionState;

type SharedState = Arc<Mutex<ClientState>>;
type WeakState = Weak<Mutex<ClientState>>;

struct ClientState {
    phase: ConnectionState,
    correlator: Correlator,
    /// Commands accepted while disconnected under `DisconnectedPolicy::Buffer`.
    backlog: Vec<String>,
    /// Bumped on every connect attempt; background tasks of older
    /// connections compare against it and stand down.
    generation: u64,
    link: Option<Link>,
}

struct Link {
    writer_tx: mpsc::UnboundedSender<String>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Drop for ClientState {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            link.reader.abort();
            link.writer.abort();
        }
    }
}

/// Client for an MVCP engine.
///
/// Cheap to clone; clones share one connection, one pending queue and one
/// error ledger. Dropping the last clone closes the connection and abandons
/// anything still outstanding.
pub struct Client<C: Connector = Endpoint> {
    connector: Arc<C>,
    config: Arc<ClientConfig>,
    state: SharedState,
}

impl<C: Connector> Clone for Client<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            config: Arc::clone(&self.config),
            state: Arc::clone(&self.state),
        }
    }
}

impl Client<Endpoint> {
    /// Client for `endpoint` with default configuration.
    pub fn new(endpoint: Endpoint) -> Self {
        Self::with_config(endpoint, ClientConfig::default())
    }
}

impl<C: Connector> Client<C> {
    /// Client with explicit connector and configuration.
    pub fn with_config(connector: C, config: ClientConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            config: Arc::new(config),
            state: Arc::new(Mutex::new(ClientState {
                phase: ConnectionState::Disconnected,
                correlator: Correlator::new(),
                backlog: Vec::new(),
                generation: 0,
                link: None,
            })),
        }
    }

    /// Open a connection and wait for the engine greeting.
    ///
    /// Only allowed while disconnected. On failure the client is left
    /// disconnected and the pending queue is untouched.
    pub async fn connect(&self) -> Result<()> {
        let generation = {
            let mut state = lock(&self.state);
            if state.phase != ConnectionState::Disconnected {
                return Err(ClientError::InvalidState(state.phase));
            }
            state.phase = ConnectionState::Connecting;
            state.generation += 1;
            state.generation
        };

        let mut guard = ConnectingGuard {
            state: &self.state,
            generation,
            armed: true,
        };
        let result = self.open(generation).await;
        if result.is_ok() {
            guard.armed = false;
        }
        result
    }

    async fn open(&self, generation: u64) -> Result<()> {
        let target = self.connector.describe();
        let timeout = self.config.connect_timeout;
        let stream = tokio::time::timeout(timeout, self.connector.connect())
            .await
            .map_err(|_| TransportError::Timeout {
                endpoint: target.clone(),
                timeout,
            })??;

        let (read_half, write_half) = tokio::io::split(stream);
        let codec = ResponseCodec::new(self.config.frame.clone());
        let mut frames = FramedRead::new(read_half, codec.clone());
        if self.config.expect_greeting {
            read_greeting(&mut frames, self.config.greeting_timeout).await?;
        }
        let sink = FramedWrite::new(write_half, codec);

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let mut state = lock(&self.state);
        let backlog = std::mem::take(&mut state.backlog);
        let weak = Arc::downgrade(&self.state);
        let reader = tokio::spawn(read_loop(weak.clone(), generation, frames));
        let writer = tokio::spawn(write_loop(weak, generation, sink, backlog, writer_rx));
        state.link = Some(Link {
            writer_tx,
            reader,
            writer,
        });
        state.phase = ConnectionState::Connected;
        info!(
            endpoint = %target,
            flushed = state.correlator.pending_len(),
            "connected to engine"
        );
        Ok(())
    }

    /// Close the connection.
    ///
    /// Every outstanding command is abandoned with reason `"disconnected"`,
    /// including commands buffered while disconnected. Disconnecting while
    /// already disconnected does nothing else and succeeds.
    pub async fn disconnect(&self) -> Result<()> {
        let link = {
            let mut state = lock(&self.state);
            match state.phase {
                ConnectionState::Disconnected => {
                    // Commands buffered for a connection that will not come.
                    state.backlog.clear();
                    let abandoned = state.correlator.abandon_all("disconnected");
                    debug!(abandoned, "disconnect requested while already disconnected");
                    return Ok(());
                }
                ConnectionState::Connecting | ConnectionState::Disconnecting => {
                    return Err(ClientError::InvalidState(state.phase));
                }
                ConnectionState::Connected => {}
            }
            state.phase = ConnectionState::Disconnecting;
            let link = state.link.take();
            if let (Some(link), Some(goodbye)) = (&link, &self.config.goodbye) {
                let _ = link.writer_tx.send(goodbye.clone());
            }
            let abandoned = state.correlator.abandon_all("disconnected");
            info!(abandoned, "disconnecting from engine");
            link
        };

        if let Some(link) = link {
            self.close_link(link).await;
        }

        lock(&self.state).phase = ConnectionState::Disconnected;
        Ok(())
    }

    async fn close_link(&self, link: Link) {
        let Link {
            writer_tx,
            reader,
            mut writer,
        } = link;
        // Closing the channel lets the writer drain and shut the stream down.
        drop(writer_tx);
        let timeout = self.config.shutdown_timeout;
        if tokio::time::timeout(timeout, &mut writer).await.is_err() {
            warn!(?timeout, "writer did not drain before shutdown timeout");
            writer.abort();
        }
        reader.abort();
    }

    /// Submit a command and return its completion immediately.
    ///
    /// Never blocks and never fails directly: problems are reported through
    /// the returned [`Completion`].
    pub fn submit(&self, command: impl Into<String>) -> Completion {
        let command = command.into();
        let mut state = lock(&self.state);

        if let Err(err) = validate_command(&command) {
            let error = ClientError::InvalidCommand(err.to_string());
            return state.correlator.reject(command, error);
        }

        if state.phase == ConnectionState::Connected {
            let sent = match &state.link {
                Some(link) => link.writer_tx.send(command.clone()).is_ok(),
                None => false,
            };
            if sent {
                return state.correlator.submit(command);
            }
            return state.correlator.reject(command, ClientError::NotConnected);
        }

        match self.config.disconnected_policy {
            DisconnectedPolicy::Reject => state.correlator.reject(command, ClientError::NotConnected),
            DisconnectedPolicy::Buffer => {
                debug!(%command, "buffering command until connected");
                state.backlog.push(command.clone());
                state.correlator.submit(command)
            }
        }
    }

    /// Submit a command and wait for its reply.
    pub async fn command(&self, command: impl Into<String>) -> Result<Response> {
        self.submit(command).await
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        lock(&self.state).phase
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Outstanding commands, oldest first.
    pub fn pending(&self) -> Vec<PendingCommand> {
        lock(&self.state).correlator.pending()
    }

    /// Every failure recorded over the client's lifetime, oldest first.
    pub fn errors(&self) -> Vec<ErrorRecord> {
        lock(&self.state).correlator.errors().to_vec()
    }

    pub fn error_count(&self) -> usize {
        lock(&self.state).correlator.errors().len()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl<C: Connector> std::fmt::Debug for Client<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("Client")
            .field("endpoint", &self.connector.describe())
            .field("state", &state.phase)
            .field("correlator", &state.correlator)
            .finish()
    }
}

/// Resets `Connecting` if a connect attempt fails or its future is dropped.
struct ConnectingGuard<'a> {
    state: &'a SharedState,
    generation: u64,
    armed: bool,
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = lock(self.state);
        if state.generation == self.generation && state.phase == ConnectionState::Connecting {
            debug!("connect attempt did not complete");
            state.phase = ConnectionState::Disconnected;
        }
    }
}

fn lock(state: &Mutex<ClientState>) -> MutexGuard<'_, ClientState> {
    // Settlement never panics while holding the lock; recover the data if a
    // caller's panic poisoned it anyway.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn read_loop<S>(
    state: WeakState,
    generation: u64,
    mut frames: FramedRead<ReadHalf<S>, ResponseCodec>,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let reason = loop {
        match frames.next().await {
            Some(Ok(frame)) => {
                let outcome = classify(frame);
                let Some(shared) = state.upgrade() else {
                    return;
                };
                let mut guard = lock(&shared);
                if guard.generation == generation && guard.phase == ConnectionState::Connected {
                    guard.correlator.on_outcome(outcome);
                } else {
                    debug!(?outcome, "discarding reply after teardown");
                }
            }
            Some(Err(FrameError::Io(err))) => break format!("read failed: {err}"),
            Some(Err(err)) => break format!("unframeable reply: {err}"),
            None => break "closed by engine".to_string(),
        }
    };
    connection_lost(&state, generation, &reason);
}

async fn write_loop<S>(
    state: WeakState,
    generation: u64,
    mut sink: FramedWrite<WriteHalf<S>, ResponseCodec>,
    backlog: Vec<String>,
    mut rx: mpsc::UnboundedReceiver<String>,
) where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let result: std::result::Result<(), FrameError> = async {
        for command in backlog {
            sink.feed(command).await?;
        }
        SinkExt::<String>::flush(&mut sink).await?;

        while let Some(command) = rx.recv().await {
            debug!(%command, "writing command");
            sink.feed(command).await?;
            while let Ok(command) = rx.try_recv() {
                debug!(%command, "writing command");
                sink.feed(command).await?;
            }
            SinkExt::<String>::flush(&mut sink).await?;
        }
        SinkExt::<String>::close(&mut sink).await
    }
    .await;

    if let Err(err) = result {
        connection_lost(&state, generation, &format!("write failed: {err}"));
    }
}

fn connection_lost(state: &WeakState, generation: u64, reason: &str) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let mut state = lock(&state);
    if state.generation != generation || state.phase != ConnectionState::Connected {
        return;
    }
    state.phase = ConnectionState::Disconnected;
    if let Some(link) = state.link.take() {
        link.reader.abort();
        link.writer.abort();
    }
    let abandoned = state
        .correlator
        .abandon_all(&format!("connection lost: {reason}"));
    warn!(reason, abandoned, "connection to engine lost");
}
