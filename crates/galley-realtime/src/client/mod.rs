//! Connection state machine.
//!
//! [`RealtimeClient`] is a cheap, cloneable handle. The socket, outbound
//! queue, retry counter and heartbeat live on a single driver task that
//! handles commands from every handle in order.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──open──▶ Connected ──close 1000──▶ Disconnected
//!                               │                   │
//!                               ▼                   ▼ abnormal close / heartbeat timeout
//!                          Reconnecting ◀──────────────
//!                               │ attempts exhausted
//!                               ▼
//!                             Error ──connect──▶ Connecting
//! ```

mod driver;
mod heartbeat;
mod queue;

use std::sync::Arc;

use galley_core::{ConnectionSnapshot, ConnectionState, InboundEvent, OutboundMessage, SyncError};
use tokio::sync::{mpsc, oneshot, watch};

use self::driver::{Command, Driver, DriverParts};
use crate::auth::{NoToken, StaticTenant, TenantContext, TokenProvider};
use crate::config::{ClientConfig, ConfigError};
use crate::distributor::{EventDistributor, Subscription};
use crate::interceptor::MessageInterceptor;
use crate::transport::Connector;
use crate::tungstenite::WsConnector;

/// Handle to the realtime connection.
#[derive(Clone)]
pub struct RealtimeClient {
    commands: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionSnapshot>,
    distributor: EventDistributor,
}

impl RealtimeClient {
    /// Start building a client.
    pub fn builder(config: ClientConfig) -> RealtimeClientBuilder {
        RealtimeClientBuilder::new(config)
    }

    /// Open the connection, or join the attempt already in flight.
    ///
    /// Resolves once that attempt opens or fails. Callers that join while a
    /// retry is pending share the outcome of that retry.
    pub async fn connect(&self) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Connect(tx))?;
        rx.await.map_err(|_| SyncError::Shutdown)?
    }

    /// Queue a message. Never blocks.
    ///
    /// Written immediately when connected; otherwise held in FIFO order and,
    /// if the connection is idle, a connect is started.
    pub fn send(&self, message: OutboundMessage) -> Result<(), SyncError> {
        self.command(Command::Send(message))
    }

    /// Close intentionally. Cancels pending retries and connect attempts,
    /// drops queued messages, and stays down until the next [`connect`](Self::connect).
    pub async fn disconnect(&self) {
        let (tx, rx) = oneshot::channel();
        if self.command(Command::Disconnect(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Disconnect and stop the driver task. Other handles get
    /// [`SyncError::Shutdown`] afterwards.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.command(Command::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().state
    }

    /// Whether the socket is open.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Current snapshot including retry progress.
    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.state_rx.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.state_rx.clone()
    }

    /// Subscribe to inbound event batches.
    pub fn subscribe<F>(&self, id: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&[InboundEvent]) + Send + Sync + 'static,
    {
        self.distributor.subscribe(id, callback)
    }

    /// The distributor inbound events are emitted to.
    pub fn distributor(&self) -> &EventDistributor {
        &self.distributor
    }

    /// Messages waiting in the outbound queue.
    pub async fn queued_len(&self) -> Result<usize, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::QueueLen(tx))?;
        rx.await.map_err(|_| SyncError::Shutdown)
    }

    fn command(&self, cmd: Command) -> Result<(), SyncError> {
        self.commands.send(cmd).map_err(|_| SyncError::Shutdown)
    }
}

impl std::fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Builder for [`RealtimeClient`].
///
/// Defaults: [`WsConnector`], [`NoToken`], and a [`StaticTenant`] taken from
/// the config's restaurant id.
pub struct RealtimeClientBuilder {
    config: ClientConfig,
    connector: Option<Arc<dyn Connector>>,
    tokens: Option<Arc<dyn TokenProvider>>,
    tenant: Option<Arc<dyn TenantContext>>,
    interceptor: Option<Arc<dyn MessageInterceptor>>,
    distributor: Option<EventDistributor>,
}

impl RealtimeClientBuilder {
    fn new(config: ClientConfig) -> Self {
        Self {
            config,
            connector: None,
            tokens: None,
            tenant: None,
            interceptor: None,
            distributor: None,
        }
    }

    /// Socket factory.
    #[must_use]
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Credentials source.
    #[must_use]
    pub fn token_provider(mut self, tokens: impl TokenProvider + 'static) -> Self {
        self.tokens = Some(Arc::new(tokens));
        self
    }

    /// Tenant source. Overrides the config's restaurant id.
    #[must_use]
    pub fn tenant(mut self, tenant: impl TenantContext + 'static) -> Self {
        self.tenant = Some(Arc::new(tenant));
        self
    }

    /// Traffic observer.
    #[must_use]
    pub fn interceptor(mut self, interceptor: impl MessageInterceptor + 'static) -> Self {
        self.interceptor = Some(Arc::new(interceptor));
        self
    }

    /// Share an existing distributor instead of creating one from the
    /// configured batch window.
    #[must_use]
    pub fn distributor(mut self, distributor: EventDistributor) -> Self {
        self.distributor = Some(distributor);
        self
    }

    /// Validate the config and spawn the driver on the current runtime.
    pub fn spawn(self) -> Result<RealtimeClient, ConfigError> {
        self.config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ConfigError("spawn must be called inside a tokio runtime".into()))?;

        let distributor = self
            .distributor
            .unwrap_or_else(|| EventDistributor::new(self.config.batch_window));
        let tenant = self.tenant.unwrap_or_else(|| {
            Arc::new(StaticTenant::new(self.config.restaurant_id.clone()))
        });
        let parts = DriverParts {
            connector: self.connector.unwrap_or_else(|| Arc::new(WsConnector)),
            tokens: self.tokens.unwrap_or_else(|| Arc::new(NoToken)),
            tenant,
            interceptor: self.interceptor,
            distributor: distributor.clone(),
            config: self.config,
        };

        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) =
            watch::channel(ConnectionSnapshot::idle(parts.config.reconnect.max_attempts));
        let driver = Driver::new(parts, commands_rx, state_tx);
        let _ = runtime.spawn(driver.run());

        Ok(RealtimeClient {
            commands,
            state_rx,
            distributor,
        })
    }
}
