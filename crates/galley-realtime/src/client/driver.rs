//! The connection driver task.
//!
//! Owns the socket, the outbound queue, the retry counter and the heartbeat.
//! Everything reaches it as a [`Command`] or as one of the events it waits
//! on in [`Driver::run`]; nothing else ever touches the socket.

use std::future::{Future, pending};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use galley_core::{
    ConnectionSnapshot, ConnectionState, InboundEvent, OutboundMessage, RetryState, SyncError,
    TransportError, WireEnvelope,
};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Sleep, sleep, timeout};
use tracing::{debug, error, info, warn};

use super::heartbeat::{Beat, Heartbeat};
use super::queue::OutboundQueue;
use crate::auth::{TenantContext, TokenProvider, build_socket_url, redacted};
use crate::config::ClientConfig;
use crate::distributor::EventDistributor;
use crate::interceptor::MessageInterceptor;
use crate::transport::{
    ABNORMAL_CLOSURE, Connector, HEARTBEAT_TIMEOUT_CLOSE, NORMAL_CLOSURE, Socket, SocketFrame,
};

/// Upper bound on waiting for a close handshake during teardown.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

type ConnectReply = oneshot::Sender<Result<(), SyncError>>;
type OpenFuture = Pin<Box<dyn Future<Output = Result<Box<dyn Socket>, SyncError>> + Send>>;

/// Requests from [`RealtimeClient`](super::RealtimeClient) handles.
pub(crate) enum Command {
    Connect(ConnectReply),
    Send(OutboundMessage),
    Disconnect(oneshot::Sender<()>),
    QueueLen(oneshot::Sender<usize>),
    Shutdown(oneshot::Sender<()>),
}

/// Collaborators handed to the driver at spawn time.
pub(crate) struct DriverParts {
    pub(crate) config: ClientConfig,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) tokens: Arc<dyn TokenProvider>,
    pub(crate) tenant: Arc<dyn TenantContext>,
    pub(crate) interceptor: Option<Arc<dyn MessageInterceptor>>,
    pub(crate) distributor: EventDistributor,
}

pub(crate) struct Driver {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    tokens: Arc<dyn TokenProvider>,
    tenant: Arc<dyn TenantContext>,
    interceptor: Option<Arc<dyn MessageInterceptor>>,
    distributor: EventDistributor,

    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionSnapshot>,

    state: ConnectionState,
    queue: OutboundQueue,
    retry: RetryState,
    intentional_close: bool,
    last_error: Option<String>,
    waiters: Vec<ConnectReply>,

    opening: Option<OpenFuture>,
    socket: Option<Box<dyn Socket>>,
    heartbeat: Option<Heartbeat>,
    retry_timer: Option<Pin<Box<Sleep>>>,
}

impl Driver {
    pub(crate) fn new(
        parts: DriverParts,
        commands: mpsc::UnboundedReceiver<Command>,
        state_tx: watch::Sender<ConnectionSnapshot>,
    ) -> Self {
        Self {
            config: parts.config,
            connector: parts.connector,
            tokens: parts.tokens,
            tenant: parts.tenant,
            interceptor: parts.interceptor,
            distributor: parts.distributor,
            commands,
            state_tx,
            state: ConnectionState::Disconnected,
            queue: OutboundQueue::default(),
            retry: RetryState::default(),
            intentional_close: false,
            last_error: None,
            waiters: Vec::new(),
            opening: None,
            socket: None,
            heartbeat: None,
            retry_timer: None,
        }
    }

    /// Run until shut down or every handle is dropped.
    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    let Some(cmd) = cmd else {
                        debug!("all client handles dropped, stopping driver");
                        self.disconnect().await;
                        break;
                    };
                    if let Command::Shutdown(done) = cmd {
                        self.disconnect().await;
                        let _ = done.send(());
                        break;
                    }
                    self.handle_command(cmd).await;
                }
                result = poll_opening(&mut self.opening) => self.on_open(result).await,
                frame = next_frame(&mut self.socket) => self.on_frame(frame).await,
                beat = tick_heartbeat(&mut self.heartbeat) => self.on_heartbeat(beat).await,
                () = wait_retry(&mut self.retry_timer) => self.on_retry_timer().await,
            }
        }
        info!("realtime driver stopped");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect(reply) => self.connect(Some(reply)).await,
            Command::Send(message) => self.enqueue(message).await,
            Command::Disconnect(done) => {
                self.disconnect().await;
                let _ = done.send(());
            }
            Command::QueueLen(reply) => {
                let _ = reply.send(self.queue.len());
            }
            Command::Shutdown(done) => {
                let _ = done.send(());
            }
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    async fn connect(&mut self, reply: Option<ConnectReply>) {
        match self.state {
            ConnectionState::Connected => {
                if let Some(reply) = reply {
                    let _ = reply.send(Ok(()));
                }
            }
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                if let Some(reply) = reply {
                    self.waiters.push(reply);
                }
            }
            ConnectionState::Disconnected | ConnectionState::Error => {
                if let Some(reply) = reply {
                    self.waiters.push(reply);
                }
                self.intentional_close = false;
                self.retry.reset();
                self.retry_timer = None;
                self.last_error = None;
                self.begin_attempt(ConnectionState::Connecting).await;
            }
        }
    }

    async fn begin_attempt(&mut self, state: ConnectionState) {
        self.teardown_socket(NORMAL_CLOSURE, "reconnecting").await;

        let connector = Arc::clone(&self.connector);
        let tokens = Arc::clone(&self.tokens);
        let base_url = self.config.base_url.clone();
        let restaurant_id = self.tenant.restaurant_id();
        let limit = self.config.connect_timeout;
        let attempt = self.retry.attempt + 1;

        let open = async move {
            let token = tokens.token().await?;
            if token.is_none() {
                warn!("no auth token available, connecting without credentials");
            }
            let url = build_socket_url(&base_url, token.as_deref(), restaurant_id.as_deref())?;
            debug!(url = %redacted(&url), attempt, "opening socket");
            Ok::<_, SyncError>(connector.connect(&url).await?)
        };
        self.opening = Some(Box::pin(async move {
            match timeout(limit, open).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(limit).into()),
            }
        }));
        self.set_state(state);
    }

    async fn on_open(&mut self, result: Result<Box<dyn Socket>, SyncError>) {
        match result {
            Ok(socket) => {
                self.socket = Some(socket);
                self.retry.reset();
                self.retry_timer = None;
                self.last_error = None;
                self.heartbeat = Some(Heartbeat::start(
                    self.config.heartbeat_interval,
                    self.config.heartbeat_timeout(),
                ));
                info!(queued = self.queue.len(), "realtime connected");
                self.set_state(ConnectionState::Connected);
                for waiter in self.waiters.drain(..) {
                    let _ = waiter.send(Ok(()));
                }
                self.flush_queue().await;
            }
            Err(err) => {
                warn!(error = %err, attempt = self.retry.attempt + 1, "connect attempt failed");
                self.handle_failure(err);
            }
        }
    }

    /// Decide what follows a failed attempt or a lost socket. The socket and
    /// heartbeat must already be gone.
    fn handle_failure(&mut self, err: SyncError) {
        self.socket = None;
        self.heartbeat = None;
        self.last_error = Some(err.to_string());

        if self.intentional_close {
            self.resolve_waiters(&SyncError::Cancelled);
            self.set_state(ConnectionState::Disconnected);
            return;
        }
        if !err.is_transient() {
            error!(error = %err, "connection failed permanently");
            self.resolve_waiters(&err);
            self.set_state(ConnectionState::Error);
            return;
        }

        match self.retry.record_failure(&self.config.reconnect) {
            Some(delay) => {
                #[allow(clippy::cast_possible_truncation)]
                let delay_ms = delay.as_millis() as u64;
                info!(
                    attempt = self.retry.attempt,
                    max_attempts = self.config.reconnect.max_attempts,
                    delay_ms,
                    "reconnect scheduled"
                );
                self.resolve_waiters(&err);
                self.retry_timer = Some(Box::pin(sleep(delay)));
                self.set_state(ConnectionState::Reconnecting);
            }
            None => {
                let exhausted = SyncError::RetriesExhausted {
                    attempts: self.config.reconnect.max_attempts,
                };
                error!(error = %err, "{exhausted}");
                self.last_error = Some(format!("{exhausted}: {err}"));
                self.resolve_waiters(&exhausted);
                self.set_state(ConnectionState::Error);
            }
        }
    }

    /// The open socket failed; drop it without a close handshake.
    fn connection_lost(&mut self, err: TransportError) {
        warn!(error = %err, "connection lost");
        self.handle_failure(err.into());
    }

    async fn disconnect(&mut self) {
        self.intentional_close = true;
        self.retry_timer = None;
        if self.opening.take().is_some() {
            debug!("in-flight connect attempt cancelled");
        }
        self.resolve_waiters(&SyncError::Cancelled);
        let dropped = self.queue.clear();
        if dropped > 0 {
            debug!(dropped, "outbound queue cleared");
        }
        self.teardown_socket(NORMAL_CLOSURE, "client disconnect").await;
        self.retry.reset();
        self.last_error = None;
        if self.state != ConnectionState::Disconnected {
            info!("realtime disconnected");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    async fn teardown_socket(&mut self, code: u16, reason: &str) {
        self.heartbeat = None;
        if let Some(mut socket) = self.socket.take() {
            if timeout(CLOSE_GRACE, socket.close(code, reason)).await.is_err() {
                debug!(code, "close handshake timed out");
            }
        }
    }

    async fn on_retry_timer(&mut self) {
        if self.intentional_close {
            return;
        }
        debug!(attempt = self.retry.attempt, "retry timer fired");
        self.begin_attempt(ConnectionState::Reconnecting).await;
    }

    // ── Outbound ────────────────────────────────────────────────────────

    async fn enqueue(&mut self, message: OutboundMessage) {
        self.queue.push(message);
        match self.state {
            ConnectionState::Connected => self.flush_queue().await,
            ConnectionState::Disconnected => self.connect(None).await,
            // Flushed on open, or held until an explicit connect.
            ConnectionState::Connecting
            | ConnectionState::Reconnecting
            | ConnectionState::Error => {}
        }
    }

    async fn flush_queue(&mut self) {
        let restaurant_id = self.tenant.restaurant_id();
        while self.state.is_connected() {
            let Some(message) = self.queue.pop_front() else {
                break;
            };
            let text = match message.to_envelope(restaurant_id.as_deref()).to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!(
                        message_type = %message.message_type,
                        error = %e,
                        "dropping unserializable message"
                    );
                    continue;
                }
            };
            if let Err(e) = self.write_text(text).await {
                warn!(
                    message_type = %message.message_type,
                    error = %e,
                    "send failed, message dropped"
                );
                self.connection_lost(e);
                break;
            }
        }
    }

    async fn write_envelope(&mut self, envelope: &WireEnvelope) -> Result<(), TransportError> {
        let text = envelope
            .to_json()
            .map_err(|e| TransportError::Send(e.to_string()))?;
        self.write_text(text).await
    }

    async fn write_text(&mut self, text: String) -> Result<(), TransportError> {
        let Some(socket) = self.socket.as_mut() else {
            return Err(TransportError::Send("no open socket".into()));
        };
        if let Some(interceptor) = &self.interceptor {
            interceptor.on_outbound(&text);
        }
        socket.send(text).await
    }

    // ── Inbound ─────────────────────────────────────────────────────────

    async fn on_frame(&mut self, frame: Option<Result<SocketFrame, TransportError>>) {
        match frame {
            None => self.connection_lost(TransportError::closed(ABNORMAL_CLOSURE, "stream ended")),
            Some(Err(e)) => self.connection_lost(e),
            Some(Ok(SocketFrame::Close { code, reason })) if code == NORMAL_CLOSURE => {
                info!(reason = %reason, queued = self.queue.len(), "server closed connection");
                self.socket = None;
                self.heartbeat = None;
                self.set_state(ConnectionState::Disconnected);
            }
            Some(Ok(SocketFrame::Close { code, reason })) => {
                self.connection_lost(TransportError::Closed { code, reason });
            }
            Some(Ok(SocketFrame::Text(text))) => self.on_text(&text).await,
        }
    }

    async fn on_text(&mut self, text: &str) {
        if let Some(interceptor) = &self.interceptor {
            interceptor.on_inbound(text);
        }
        let envelope = match WireEnvelope::parse(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, len = text.len(), "dropping malformed frame");
                return;
            }
        };
        if envelope.is_pong() {
            if let Some(heartbeat) = self.heartbeat.as_mut() {
                heartbeat.mark_alive();
            }
            return;
        }
        if envelope.is_ping() {
            let pong = WireEnvelope::pong(self.tenant.restaurant_id().as_deref());
            if let Err(e) = self.write_envelope(&pong).await {
                self.connection_lost(e);
            }
            return;
        }
        match InboundEvent::from_envelope(&envelope) {
            Ok(event) => self.distributor.emit(event),
            Err(e) => {
                warn!(
                    event_type = %envelope.message_type,
                    error = %e,
                    "dropping undecodable event"
                );
            }
        }
    }

    async fn on_heartbeat(&mut self, beat: Beat) {
        match beat {
            Beat::Ping => {
                let ping = WireEnvelope::ping(self.tenant.restaurant_id().as_deref());
                if let Err(e) = self.write_envelope(&ping).await {
                    self.connection_lost(e);
                }
            }
            Beat::TimedOut => {
                #[allow(clippy::cast_possible_truncation)]
                let silent_ms = self
                    .heartbeat
                    .as_ref()
                    .map_or(0, |h| h.since_last_pong().as_millis() as u64);
                warn!(silent_ms, "heartbeat timed out, closing socket");
                self.teardown_socket(HEARTBEAT_TIMEOUT_CLOSE, "heartbeat timeout")
                    .await;
                self.handle_failure(
                    TransportError::closed(HEARTBEAT_TIMEOUT_CLOSE, "heartbeat timeout").into(),
                );
            }
        }
    }

    // ── State publication ───────────────────────────────────────────────

    fn resolve_waiters(&mut self, err: &SyncError) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(err.clone()));
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "connection state changed");
        }
        self.state = state;
        let snapshot = ConnectionSnapshot {
            state,
            attempt: self.retry.attempt,
            max_attempts: self.config.reconnect.max_attempts,
            next_delay_ms: self.retry_timer.as_ref().and(self.retry.next_delay_ms),
            last_error: self.last_error.clone(),
        };
        let _ = self.state_tx.send_replace(snapshot);
    }
}

// ── select! arms ────────────────────────────────────────────────────────
//
// Each waits forever when its resource is absent so the branch never fires.

async fn poll_opening(opening: &mut Option<OpenFuture>) -> Result<Box<dyn Socket>, SyncError> {
    let result = match opening.as_mut() {
        Some(fut) => fut.await,
        None => pending().await,
    };
    *opening = None;
    result
}

async fn next_frame(
    socket: &mut Option<Box<dyn Socket>>,
) -> Option<Result<SocketFrame, TransportError>> {
    match socket.as_mut() {
        Some(socket) => socket.recv().await,
        None => pending().await,
    }
}

async fn tick_heartbeat(heartbeat: &mut Option<Heartbeat>) -> Beat {
    match heartbeat.as_mut() {
        Some(heartbeat) => heartbeat.tick().await,
        None => pending().await,
    }
}

async fn wait_retry(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer.as_mut() {
        Some(sleep) => sleep.as_mut().await,
        None => pending::<()>().await,
    }
    *timer = None;
}
