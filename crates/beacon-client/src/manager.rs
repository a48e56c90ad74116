//! Connection manager.
//!
//! A [`ConnectionManager`] is a cheap, cloneable handle to a background task
//! that owns the socket. Every transition (connect, frame arrival, close,
//! scheduled retry, disconnect) is handled by that one task in order, so the
//! lifecycle needs no locking. Handles talk to it over an unbounded channel,
//! which keeps every public operation non-blocking and infallible.
//!
//! Lifecycle:
//!
//! ```text
//! Idle ──connect──▶ Connecting ──open──▶ Open
//!                      │  ▲                │
//!            failure   │  │ timer          │ abnormal close
//!                      ▼  │                ▼
//!                  Closed(Abnormal) ◀──────┘
//!                      │
//!         budget spent ▼
//!                  Closed(Exhausted)
//!
//! disconnect() from any state ──▶ Closed(Normal)
//! ```

use crate::auth::TokenProvider;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::policy::ReconnectPolicy;
use crate::registry::{ConnectionHandler, HandlerId, MessageHandler, Registry};
use crate::transport::{Connection, Transport, TransportEvent, WsTransport, url_with_token};
use beacon_core::{
    CloseCode, Closure, ConnectionState, Envelope, MediaStatus, Notification, VideoAction,
};
use futures_util::future::BoxFuture;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;

enum Command {
    Connect,
    Disconnect,
    Send(Envelope),
    Shutdown,
}

struct Shared {
    messages: Registry<MessageHandler>,
    connectivity: Registry<ConnectionHandler>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the real-time connection.
///
/// Cloning is cheap; all clones drive the same socket. The background task
/// stops after [`shutdown`](Self::shutdown) or once every handle is dropped.
/// A handler that captures a handle keeps the task alive until `shutdown`.
#[derive(Clone)]
pub struct ConnectionManager {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Create a manager using the WebSocket transport.
    ///
    /// Must be called from within a tokio runtime. Nothing connects until
    /// [`connect`](Self::connect) is called.
    pub fn new(config: ClientConfig, tokens: impl TokenProvider) -> Self {
        Self::with_transport(config, tokens, Arc::new(WsTransport))
    }

    /// Create a manager over a custom transport.
    pub fn with_transport(
        config: ClientConfig,
        tokens: impl TokenProvider,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Idle);
        let shared = Arc::new(Shared {
            messages: Registry::new(),
            connectivity: Registry::new(),
            task: Mutex::new(None),
        });

        let worker = Worker {
            policy: config.policy(),
            config,
            tokens: Arc::new(tokens),
            transport,
            shared: Arc::clone(&shared),
            state: state_tx,
            connected: false,
        };
        let task = tokio::spawn(worker.run(command_rx));
        *shared.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);

        Self {
            commands,
            state,
            shared,
        }
    }

    /// Start connecting. No-op while already connecting or open.
    ///
    /// Never fails: a failed attempt goes through the reconnection policy and
    /// is visible only as connectivity staying `false`.
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Close with the normal closure code and cancel any pending retry.
    pub fn disconnect(&self) {
        self.command(Command::Disconnect);
    }

    /// Disconnect and stop the background task.
    pub async fn shutdown(&self) {
        self.command(Command::Shutdown);
        let task = self
            .shared
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "connection task ended abnormally");
            }
        }
    }

    /// Transmit `envelope` if open; otherwise drop it with a warning.
    ///
    /// Envelopes are never queued while disconnected.
    pub fn send(&self, envelope: Envelope) {
        self.command(Command::Send(envelope));
    }

    pub fn send_chat(&self, room_id: impl Into<String>, content: impl Into<String>) {
        self.send(Envelope::chat(room_id, content));
    }

    pub fn send_direct_message(
        &self,
        conversation_id: impl Into<String>,
        content: impl Into<String>,
    ) {
        self.send(Envelope::direct(conversation_id, content));
    }

    pub fn send_notification(&self, notification: Notification) {
        self.send(Envelope::notification(notification));
    }

    pub fn join_video(&self, room_id: impl Into<String>) {
        self.send(Envelope::video(room_id, VideoAction::Join));
    }

    pub fn leave_video(&self, room_id: impl Into<String>) {
        self.send(Envelope::video(room_id, VideoAction::Leave));
    }

    pub fn send_video_chat(&self, room_id: impl Into<String>, message: impl Into<String>) {
        self.send(Envelope::video(
            room_id,
            VideoAction::Chat {
                message: message.into(),
            },
        ));
    }

    pub fn send_video_reaction(&self, room_id: impl Into<String>, reaction: impl Into<String>) {
        self.send(Envelope::video(
            room_id,
            VideoAction::Reaction {
                reaction: reaction.into(),
            },
        ));
    }

    pub fn send_video_status(&self, room_id: impl Into<String>, status: MediaStatus) {
        self.send(Envelope::video(room_id, VideoAction::Status(status)));
    }

    /// Register a handler for every inbound envelope.
    pub fn on_message(&self, handler: impl Fn(&Envelope) + Send + Sync + 'static) -> HandlerId {
        self.shared.messages.insert(Arc::new(handler))
    }

    /// Unregister a message handler. Unknown ids are ignored.
    pub fn off_message(&self, id: HandlerId) {
        self.shared.messages.remove(id);
    }

    /// Register a handler for connected/disconnected transitions.
    pub fn on_connection_change(&self, handler: impl Fn(bool) + Send + Sync + 'static) -> HandlerId {
        self.shared.connectivity.insert(Arc::new(handler))
    }

    /// Unregister a connectivity handler. Unknown ids are ignored.
    pub fn off_connection_change(&self, id: HandlerId) {
        self.shared.connectivity.remove(id);
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_open()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    fn command(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("connection task has stopped; ignoring command");
        }
    }
}

type Handshake = BoxFuture<'static, Result<Box<dyn Connection>, ClientError>>;

/// Where the worker is in the lifecycle, with the resource that state owns.
enum Link {
    /// Idle, or closed with no retry pending.
    Down,
    Handshake(Handshake),
    Up(Box<dyn Connection>),
    Backoff(Pin<Box<Sleep>>),
}

struct Worker {
    config: ClientConfig,
    tokens: Arc<dyn TokenProvider>,
    transport: Arc<dyn Transport>,
    shared: Arc<Shared>,
    state: watch::Sender<ConnectionState>,
    policy: ReconnectPolicy,
    connected: bool,
}

impl Worker {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut link = Link::Down;
        loop {
            link = match link {
                Link::Down => match commands.recv().await {
                    Some(Command::Connect) => {
                        // Explicit connect starts a fresh retry budget.
                        self.policy.reset();
                        self.begin_attempt()
                    }
                    Some(Command::Disconnect) => {
                        self.disconnected();
                        Link::Down
                    }
                    Some(Command::Send(envelope)) => {
                        self.drop_unsent(&envelope);
                        Link::Down
                    }
                    Some(Command::Shutdown) | None => break,
                },

                Link::Handshake(mut attempt) => tokio::select! {
                    biased;
                    command = commands.recv() => match command {
                        Some(Command::Connect) => {
                            tracing::debug!("connect ignored; already connecting");
                            Link::Handshake(attempt)
                        }
                        Some(Command::Send(envelope)) => {
                            self.drop_unsent(&envelope);
                            Link::Handshake(attempt)
                        }
                        Some(Command::Disconnect) => {
                            drop(attempt);
                            self.disconnected();
                            Link::Down
                        }
                        Some(Command::Shutdown) | None => {
                            drop(attempt);
                            self.disconnected();
                            break;
                        }
                    },
                    result = &mut attempt => match result {
                        Ok(connection) => self.opened(connection),
                        Err(e) => {
                            tracing::warn!(
                                error = %e,
                                attempt = self.policy.attempts() + 1,
                                "connection attempt failed"
                            );
                            self.lost()
                        }
                    },
                },

                Link::Up(mut connection) => tokio::select! {
                    biased;
                    command = commands.recv() => match command {
                        Some(Command::Connect) => Link::Up(connection),
                        Some(Command::Send(envelope)) => {
                            self.write(connection.as_mut(), &envelope).await;
                            Link::Up(connection)
                        }
                        Some(Command::Disconnect) => {
                            self.close(connection).await;
                            Link::Down
                        }
                        Some(Command::Shutdown) | None => {
                            self.close(connection).await;
                            break;
                        }
                    },
                    event = connection.recv() => match event {
                        TransportEvent::Frame(text) => {
                            self.dispatch(&text);
                            Link::Up(connection)
                        }
                        TransportEvent::Error(e) => {
                            tracing::warn!(error = %e, "transport error");
                            Link::Up(connection)
                        }
                        TransportEvent::Closed { code, reason } => {
                            self.closed_by_peer(code, &reason)
                        }
                    },
                },

                Link::Backoff(mut timer) => tokio::select! {
                    biased;
                    command = commands.recv() => match command {
                        Some(Command::Connect) => {
                            tracing::debug!("explicit connect; skipping backoff");
                            self.begin_attempt()
                        }
                        Some(Command::Send(envelope)) => {
                            self.drop_unsent(&envelope);
                            Link::Backoff(timer)
                        }
                        Some(Command::Disconnect) => {
                            self.disconnected();
                            Link::Down
                        }
                        Some(Command::Shutdown) | None => {
                            self.disconnected();
                            break;
                        }
                    },
                    () = &mut timer => {
                        tracing::info!(attempt = self.policy.attempts(), "reconnecting");
                        self.begin_attempt()
                    }
                },
            };
        }
        tracing::debug!("connection task stopped");
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "connection state changed");
        }
    }

    /// Notify connectivity handlers on a connected/disconnected flip only.
    fn set_connected(&mut self, connected: bool) {
        if self.connected == connected {
            return;
        }
        self.connected = connected;
        self.shared.connectivity.dispatch(connected);
    }

    fn begin_attempt(&mut self) -> Link {
        self.set_state(ConnectionState::Connecting);
        let tokens = Arc::clone(&self.tokens);
        let transport = Arc::clone(&self.transport);
        let url = self.config.url.clone();
        Link::Handshake(Box::pin(async move {
            let token = tokens.fetch_token().await?;
            tracing::debug!(%url, "opening connection");
            let connection = transport.open(url_with_token(&url, &token)).await?;
            Ok::<_, ClientError>(connection)
        }))
    }

    fn opened(&mut self, connection: Box<dyn Connection>) -> Link {
        tracing::info!(url = %self.config.url, "connected");
        self.policy.reset();
        self.set_state(ConnectionState::Open);
        self.set_connected(true);
        Link::Up(connection)
    }

    fn closed_by_peer(&mut self, code: CloseCode, reason: &str) -> Link {
        if code.is_normal() {
            tracing::info!(%code, reason, "server closed the connection normally");
            self.disconnected();
            return Link::Down;
        }
        tracing::warn!(%code, reason, "connection closed abnormally");
        self.lost()
    }

    /// Abnormal closure or failed attempt: schedule a retry or give up.
    fn lost(&mut self) -> Link {
        let link = match self.policy.on_abnormal_close() {
            Some(delay) => {
                tracing::info!(
                    attempt = self.policy.attempts(),
                    max = self.policy.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "scheduling reconnect"
                );
                self.set_state(ConnectionState::Closed(Closure::Abnormal));
                Link::Backoff(Box::pin(tokio::time::sleep(delay)))
            }
            None => {
                tracing::warn!(
                    max = self.policy.max_attempts(),
                    "reconnect attempts exhausted; waiting for explicit connect"
                );
                self.set_state(ConnectionState::Closed(Closure::Exhausted));
                Link::Down
            }
        };
        self.set_connected(false);
        link
    }

    /// Terminal normal closure.
    fn disconnected(&mut self) {
        self.policy.reset();
        self.set_state(ConnectionState::Closed(Closure::Normal));
        self.set_connected(false);
    }

    async fn close(&mut self, mut connection: Box<dyn Connection>) {
        if let Err(e) = connection.close(CloseCode::NORMAL, "client disconnect").await {
            tracing::debug!(error = %e, "error while closing connection");
        }
        tracing::info!("disconnected");
        self.disconnected();
    }

    async fn write(&self, connection: &mut dyn Connection, envelope: &Envelope) {
        let text = match envelope.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, kind = envelope.kind(), "could not encode envelope");
                return;
            }
        };
        if let Err(e) = connection.send(text).await {
            tracing::warn!(error = %e, kind = envelope.kind(), "failed to send envelope");
        }
    }

    fn drop_unsent(&self, envelope: &Envelope) {
        let state = *self.state.borrow();
        tracing::warn!(
            kind = envelope.kind(),
            %state,
            "not connected; dropping outbound envelope"
        );
    }

    fn dispatch(&self, text: &str) {
        match Envelope::from_json(text) {
            Ok(envelope) => self.shared.messages.dispatch(&envelope),
            Err(e) => tracing::warn!(error = %e, "dropping malformed frame"),
        }
    }
}
