use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::{WsAuthenticator, WsCodec, WsFrame};
use crate::core::kernel::dispatch::CallbackDispatcher;
use crate::core::kernel::keepalive::{KeepAlive, KeepAliveAction};
use crate::core::kernel::subscription::SubscriptionRegistry;
use crate::core::types::{
    ConnectionEvent, ConnectionState, ConnectionStatus, DataPush, RoutingKey, Subscription,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, instrument, trace, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Reply = oneshot::Sender<Result<(), ExchangeError>>;

const EVENT_BUFFER: usize = 256;

/// Streaming connection configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Time allowed for the TCP/TLS/WebSocket handshake
    pub connect_timeout: Duration,
    /// Time allowed for the login acknowledgement
    pub auth_timeout: Duration,
    /// Liveness ping period; must stay below `server_idle_timeout`
    pub keepalive_interval: Duration,
    /// How long a ping may go unanswered before the socket is considered dead
    pub pong_timeout: Duration,
    /// Silence after which the server drops the connection
    pub server_idle_timeout: Duration,
    /// First reconnect delay; doubles per consecutive failure
    pub reconnect_base_delay: Duration,
    /// Consecutive failed reconnects before giving up
    pub max_reconnect_attempts: u32,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            auth_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(25),
            pong_timeout: Duration::from_secs(10),
            server_idle_timeout: Duration::from_secs(30),
            reconnect_base_delay: Duration::from_secs(1),
            max_reconnect_attempts: 5,
        }
    }
}

impl WsConfig {
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_auth_timeout(mut self, auth_timeout: Duration) -> Self {
        self.auth_timeout = auth_timeout;
        self
    }

    pub fn with_keepalive(mut self, interval: Duration, pong_timeout: Duration) -> Self {
        self.keepalive_interval = interval;
        self.pong_timeout = pong_timeout;
        self
    }

    pub fn with_server_idle_timeout(mut self, idle: Duration) -> Self {
        self.server_idle_timeout = idle;
        self
    }

    pub fn with_reconnect(mut self, base_delay: Duration, max_attempts: u32) -> Self {
        self.reconnect_base_delay = base_delay;
        self.max_reconnect_attempts = max_attempts;
        self
    }

    /// Delay before reconnect attempt `attempt + 1`
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        self.reconnect_base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    pub fn validate(&self) -> Result<(), ExchangeError> {
        if self.keepalive_interval.is_zero() || self.pong_timeout.is_zero() {
            return Err(ExchangeError::ConfigurationError(
                "keepalive interval and pong timeout must be non-zero".to_string(),
            ));
        }
        if self.keepalive_interval >= self.server_idle_timeout {
            return Err(ExchangeError::ConfigurationError(format!(
                "keepalive interval {:?} must be shorter than the server idle timeout {:?}",
                self.keepalive_interval, self.server_idle_timeout
            )));
        }
        if self.connect_timeout.is_zero() || self.auth_timeout.is_zero() {
            return Err(ExchangeError::ConfigurationError(
                "connect and auth timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

enum Command {
    Connect(Reply),
    Disconnect(Reply),
    Subscribe(Vec<Subscription>, Reply),
    Unsubscribe(Vec<Subscription>, Reply),
}

/// Handle to one logical streaming connection
///
/// All state transitions happen on a single driver task; this handle only
/// sends it commands and observes what it publishes. Dropping the handle
/// closes the socket and stops the driver.
pub struct WsConnection {
    exchange_name: String,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionStatus>,
    events: broadcast::Sender<ConnectionEvent>,
    dispatcher: Arc<CallbackDispatcher>,
    registry: Arc<Mutex<SubscriptionRegistry>>,
    driver: JoinHandle<()>,
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection")
            .field("exchange_name", &self.exchange_name)
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

impl WsConnection {
    /// Create a disconnected connection and spawn its driver task
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<C: WsCodec>(
        url: impl Into<String>,
        exchange_name: impl Into<String>,
        codec: C,
        authenticator: Option<Arc<dyn WsAuthenticator>>,
        config: WsConfig,
    ) -> Result<Self, ExchangeError> {
        let url = url.into();
        let exchange_name = exchange_name.into();
        config.validate()?;

        let parsed = url::Url::parse(&url).map_err(|e| {
            ExchangeError::ConfigurationError(format!("invalid WebSocket URL {}: {}", url, e))
        })?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(ExchangeError::ConfigurationError(format!(
                "unsupported WebSocket scheme: {}",
                parsed.scheme()
            )));
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let dispatcher = Arc::new(CallbackDispatcher::new());
        let registry = Arc::new(Mutex::new(SubscriptionRegistry::new()));

        let driver = Driver {
            url,
            exchange_name: exchange_name.clone(),
            codec,
            authenticator,
            config,
            commands: command_rx,
            status: status_tx,
            events: events.clone(),
            dispatcher: dispatcher.clone(),
            registry: registry.clone(),
            waiters: Vec::new(),
        };
        let driver = tokio::spawn(driver.run());

        Ok(Self {
            exchange_name,
            commands: command_tx,
            status: status_rx,
            events,
            dispatcher,
            registry,
            driver,
        })
    }

    /// Open the socket and wait until it is Ready
    ///
    /// Fails when the connection gives up (reconnects exhausted or login
    /// rejected) or when `disconnect` is called first. Clears a previous
    /// terminal failure.
    pub async fn connect(&self) -> Result<(), ExchangeError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Connect(reply))?;
        response.await.map_err(|_| ExchangeError::Shutdown)?
    }

    /// Close the socket; subscriptions are kept for the next `connect`
    pub async fn disconnect(&self) -> Result<(), ExchangeError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Disconnect(reply))?;
        response.await.map_err(|_| ExchangeError::Shutdown)?
    }

    /// Record topics and send the subscribe frame if Ready
    pub async fn subscribe(&self, subscriptions: Vec<Subscription>) -> Result<(), ExchangeError> {
        if subscriptions.is_empty() {
            return Ok(());
        }
        let (reply, response) = oneshot::channel();
        self.send(Command::Subscribe(subscriptions, reply))?;
        response.await.map_err(|_| ExchangeError::Shutdown)?
    }

    /// Forget topics and send the unsubscribe frame if Ready
    pub async fn unsubscribe(&self, subscriptions: Vec<Subscription>) -> Result<(), ExchangeError> {
        if subscriptions.is_empty() {
            return Ok(());
        }
        let (reply, response) = oneshot::channel();
        self.send(Command::Unsubscribe(subscriptions, reply))?;
        response.await.map_err(|_| ExchangeError::Shutdown)?
    }

    pub fn register_handler<F>(&self, key: RoutingKey, handler: F)
    where
        F: Fn(&DataPush) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.dispatcher.register(key, handler);
    }

    pub fn dispatcher(&self) -> Arc<CallbackDispatcher> {
        self.dispatcher.clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Receiver that observes every status change
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Topics that will be active whenever the connection is Ready
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot()
    }

    pub fn exchange_name(&self) -> &str {
        &self.exchange_name
    }

    fn send(&self, command: Command) -> Result<(), ExchangeError> {
        if self.driver.is_finished() {
            return Err(ExchangeError::Shutdown);
        }
        self.commands
            .send(command)
            .map_err(|_| ExchangeError::Shutdown)
    }
}

enum Phase {
    Idle,
    Connect { attempts: u32, reconnecting: bool },
    Backoff { attempts: u32, reconnecting: bool },
    Stop,
}

enum AuthOutcome {
    Accepted,
    Rejected(String),
    Transient(String),
    Interrupted(Phase),
}

struct Driver<C: WsCodec> {
    url: String,
    exchange_name: String,
    codec: C,
    authenticator: Option<Arc<dyn WsAuthenticator>>,
    config: WsConfig,
    commands: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<ConnectionStatus>,
    events: broadcast::Sender<ConnectionEvent>,
    dispatcher: Arc<CallbackDispatcher>,
    registry: Arc<Mutex<SubscriptionRegistry>>,
    waiters: Vec<Reply>,
}

impl<C: WsCodec> Driver<C> {
    async fn run(mut self) {
        let mut phase = Phase::Idle;
        loop {
            phase = match phase {
                Phase::Idle => self.idle().await,
                Phase::Connect {
                    attempts,
                    reconnecting,
                } => self.open(attempts, reconnecting).await,
                Phase::Backoff {
                    attempts,
                    reconnecting,
                } => self.backoff(attempts, reconnecting).await,
                Phase::Stop => break,
            };
        }

        self.settle_waiters(|| ExchangeError::Shutdown);
        debug!(exchange = %self.exchange_name, "connection driver stopped");
    }

    async fn idle(&mut self) -> Phase {
        loop {
            let command = self.commands.recv().await;
            if let Some(next) = self.offline_command(command, true) {
                return next;
            }
        }
    }

    /// Handle a command while no Ready socket exists
    fn offline_command(&mut self, command: Option<Command>, idle: bool) -> Option<Phase> {
        match command {
            Some(Command::Connect(reply)) => {
                self.waiters.push(reply);
                idle.then_some(Phase::Connect {
                    attempts: 0,
                    reconnecting: false,
                })
            }
            Some(Command::Disconnect(reply)) => {
                let _ = reply.send(Ok(()));
                if idle {
                    return None;
                }
                self.settle_waiters(|| {
                    ExchangeError::NotConnected("disconnect requested".to_string())
                });
                self.set_status(ConnectionState::Disconnected, 0, false);
                Some(Phase::Idle)
            }
            Some(Command::Subscribe(subscriptions, reply)) => {
                let added = self.registry().insert_all(&subscriptions);
                debug!(
                    exchange = %self.exchange_name,
                    count = added.len(),
                    "subscriptions queued for next Ready"
                );
                let _ = reply.send(Ok(()));
                None
            }
            Some(Command::Unsubscribe(subscriptions, reply)) => {
                self.registry().remove_all(&subscriptions);
                let _ = reply.send(Ok(()));
                None
            }
            None => Some(Phase::Stop),
        }
    }

    #[instrument(skip(self), fields(exchange = %self.exchange_name, url = %self.url))]
    async fn open(&mut self, attempts: u32, reconnecting: bool) -> Phase {
        self.set_status(ConnectionState::Connecting, attempts, false);

        let handshake = timeout(self.config.connect_timeout, connect_async(self.url.clone()));
        tokio::pin!(handshake);

        let mut stream = loop {
            tokio::select! {
                result = &mut handshake => match result {
                    Ok(Ok((stream, _))) => break stream,
                    Ok(Err(e)) => {
                        warn!(error = %e, "WebSocket connection failed");
                        return self.fail(attempts, reconnecting);
                    }
                    Err(_) => {
                        warn!(timeout_ms = self.config.connect_timeout.as_millis() as u64, "WebSocket connection timeout");
                        return self.fail(attempts, reconnecting);
                    }
                },
                command = self.commands.recv() => {
                    if let Some(next) = self.offline_command(command, false) {
                        return next;
                    }
                }
            }
        };

        self.set_status(ConnectionState::Open, attempts, false);

        if let Some(authenticator) = self.authenticator.clone() {
            self.set_status(ConnectionState::Authenticating, attempts, false);
            match self.authenticate(&mut stream, authenticator.as_ref()).await {
                AuthOutcome::Accepted => debug!("login accepted"),
                AuthOutcome::Rejected(reason) => {
                    let _ = stream.close(None).await;
                    let message = reason.clone();
                    return self.terminate(
                        attempts,
                        format!("login rejected: {}", reason),
                        move || ExchangeError::AuthError(message.clone()),
                    );
                }
                AuthOutcome::Transient(reason) => {
                    warn!(reason = %reason, "login did not complete");
                    let _ = stream.close(None).await;
                    return self.fail(attempts, reconnecting);
                }
                AuthOutcome::Interrupted(next) => {
                    let _ = stream.close(None).await;
                    return next;
                }
            }
        }

        self.serve(stream, reconnecting).await
    }

    async fn authenticate(
        &mut self,
        stream: &mut WsStream,
        authenticator: &dyn WsAuthenticator,
    ) -> AuthOutcome {
        let login = match authenticator.login_message() {
            Ok(login) => login,
            Err(e) => return AuthOutcome::Rejected(e.to_string()),
        };
        if let Err(e) = stream.send(login).await {
            return AuthOutcome::Transient(format!("failed to send login: {}", e));
        }

        let deadline = Instant::now() + self.config.auth_timeout;
        loop {
            tokio::select! {
                inbound = stream.next() => match inbound {
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(e) = stream.send(Message::Pong(payload)).await {
                            return AuthOutcome::Transient(e.to_string());
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return AuthOutcome::Transient(format!("closed during login: {:?}", frame));
                    }
                    Some(Ok(message)) => match self.codec.decode_message(message) {
                        Ok(Some(WsFrame::Login { success: true, .. })) => return AuthOutcome::Accepted,
                        Ok(Some(WsFrame::Login { code, message, .. }))
                        | Ok(Some(WsFrame::Error { code, message })) => {
                            return AuthOutcome::Rejected(format!("{} {}", code, message));
                        }
                        Ok(_) => {}
                        Err(e) => self.protocol_violation(&e),
                    },
                    Some(Err(e)) => return AuthOutcome::Transient(e.to_string()),
                    None => return AuthOutcome::Transient("stream ended during login".to_string()),
                },
                command = self.commands.recv() => {
                    if let Some(next) = self.offline_command(command, false) {
                        return AuthOutcome::Interrupted(next);
                    }
                }
                () = sleep_until(deadline) => {
                    return AuthOutcome::Transient("login acknowledgement timed out".to_string());
                }
            }
        }
    }

    async fn serve(&mut self, mut stream: WsStream, reconnecting: bool) -> Phase {
        // A topic set that cannot be encoded now never will be; stop rather than
        // come up Ready without it
        let replay = self.registry().snapshot();
        let replay_frame = if replay.is_empty() {
            None
        } else {
            match self.codec.encode_subscription(&replay) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    let _ = stream.close(None).await;
                    let message = e.to_string();
                    return self.terminate(
                        0,
                        format!("cannot encode subscription replay: {}", e),
                        move || ExchangeError::SerializationError(message.clone()),
                    );
                }
            }
        };

        self.set_status(ConnectionState::Ready, 0, false);

        if let Some(frame) = replay_frame {
            if let Err(e) = stream.send(frame).await {
                warn!(exchange = %self.exchange_name, error = %e, "failed to replay subscriptions");
                return self.fail(0, true);
            }
        }
        if reconnecting {
            info!(exchange = %self.exchange_name, replayed = replay.len(), "reconnected");
            self.emit(ConnectionEvent::Reconnected {
                replayed: replay.len(),
            });
        }
        self.settle_waiters_ok();

        let mut keepalive = KeepAlive::new(self.config.keepalive_interval, self.config.pong_timeout);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Connect(reply)) => {
                        let _ = reply.send(Ok(()));
                    }
                    Some(Command::Disconnect(reply)) => {
                        self.set_status(ConnectionState::Closing, 0, false);
                        if let Err(e) = stream.close(None).await {
                            debug!(error = %e, "close handshake failed");
                        }
                        self.set_status(ConnectionState::Disconnected, 0, false);
                        let _ = reply.send(Ok(()));
                        return Phase::Idle;
                    }
                    Some(Command::Subscribe(subscriptions, reply)) => {
                        let added = self.registry().insert_all(&subscriptions);
                        if added.is_empty() {
                            let _ = reply.send(Ok(()));
                            continue;
                        }
                        let frame = match self.codec.encode_subscription(&added) {
                            Ok(frame) => frame,
                            Err(e) => {
                                error!(exchange = %self.exchange_name, error = %e, "cannot encode subscribe");
                                self.registry().remove_all(&added);
                                let _ = reply.send(Err(e));
                                continue;
                            }
                        };
                        let _ = reply.send(Ok(()));
                        if let Err(e) = self.send_frame(&mut stream, frame).await {
                            warn!(exchange = %self.exchange_name, error = %e, "subscribe send failed");
                            return self.fail(0, true);
                        }
                    }
                    Some(Command::Unsubscribe(subscriptions, reply)) => {
                        let removed = self.registry().remove_all(&subscriptions);
                        if removed.is_empty() {
                            let _ = reply.send(Ok(()));
                            continue;
                        }
                        let frame = match self.codec.encode_unsubscription(&removed) {
                            Ok(frame) => frame,
                            Err(e) => {
                                error!(exchange = %self.exchange_name, error = %e, "cannot encode unsubscribe");
                                self.registry().insert_all(&removed);
                                let _ = reply.send(Err(e));
                                continue;
                            }
                        };
                        let _ = reply.send(Ok(()));
                        if let Err(e) = self.send_frame(&mut stream, frame).await {
                            warn!(exchange = %self.exchange_name, error = %e, "unsubscribe send failed");
                            return self.fail(0, true);
                        }
                    }
                    None => {
                        let _ = stream.close(None).await;
                        self.set_status(ConnectionState::Disconnected, 0, false);
                        return Phase::Stop;
                    }
                },
                inbound = stream.next() => {
                    keepalive.record_inbound();
                    match inbound {
                        Some(Ok(Message::Ping(payload))) => {
                            if let Err(e) = stream.send(Message::Pong(payload)).await {
                                warn!(exchange = %self.exchange_name, error = %e, "failed to answer ping");
                                return self.fail(0, true);
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            warn!(exchange = %self.exchange_name, frame = ?frame, "server closed the connection");
                            return self.fail(0, true);
                        }
                        Some(Ok(message @ (Message::Text(_) | Message::Binary(_)))) => {
                            self.handle_inbound(message);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(exchange = %self.exchange_name, error = %e, "WebSocket read failed");
                            return self.fail(0, true);
                        }
                        None => {
                            warn!(exchange = %self.exchange_name, "WebSocket stream ended");
                            return self.fail(0, true);
                        }
                    }
                },
                action = keepalive.tick() => match action {
                    KeepAliveAction::Ping => {
                        trace!(exchange = %self.exchange_name, "keepalive ping");
                        if let Err(e) = stream.send(self.codec.encode_ping()).await {
                            warn!(exchange = %self.exchange_name, error = %e, "keepalive send failed");
                            return self.fail(0, true);
                        }
                    }
                    KeepAliveAction::Expired => {
                        warn!(
                            exchange = %self.exchange_name,
                            pong_timeout_ms = self.config.pong_timeout.as_millis() as u64,
                            "keepalive unanswered"
                        );
                        let _ = stream.close(None).await;
                        return self.fail(0, true);
                    }
                },
            }
        }
    }

    async fn backoff(&mut self, attempts: u32, reconnecting: bool) -> Phase {
        if attempts >= self.config.max_reconnect_attempts {
            return self.terminate(
                attempts,
                format!("gave up after {} reconnect attempts", attempts),
                move || ExchangeError::ReconnectExhausted { attempts },
            );
        }

        let delay = self.config.reconnect_delay(attempts);
        info!(
            exchange = %self.exchange_name,
            attempt = attempts + 1,
            max_attempts = self.config.max_reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );

        let wake = sleep(delay);
        tokio::pin!(wake);
        loop {
            tokio::select! {
                () = &mut wake => {
                    return Phase::Connect {
                        attempts: attempts + 1,
                        reconnecting,
                    };
                }
                command = self.commands.recv() => {
                    if let Some(next) = self.offline_command(command, false) {
                        return next;
                    }
                }
            }
        }
    }

    fn handle_inbound(&self, message: Message) {
        match self.codec.decode_message(message) {
            Ok(Some(WsFrame::Data(push))) => {
                self.dispatcher.dispatch(&push);
            }
            Ok(Some(WsFrame::Pong)) => trace!(exchange = %self.exchange_name, "pong"),
            Ok(Some(WsFrame::Subscribed(subscription))) => {
                debug!(exchange = %self.exchange_name, topic = %subscription, "subscribed");
                self.emit(ConnectionEvent::Subscribed(subscription));
            }
            Ok(Some(WsFrame::Unsubscribed(subscription))) => {
                debug!(exchange = %self.exchange_name, topic = %subscription, "unsubscribed");
                self.emit(ConnectionEvent::Unsubscribed(subscription));
            }
            Ok(Some(WsFrame::Error { code, message })) => {
                warn!(exchange = %self.exchange_name, code = %code, message = %message, "exchange error event");
                self.emit(ConnectionEvent::ExchangeError { code, message });
            }
            Ok(Some(WsFrame::Login { success, code, .. })) => {
                debug!(exchange = %self.exchange_name, success, code = %code, "unexpected login event");
            }
            Ok(Some(WsFrame::Event { event, .. })) => {
                debug!(exchange = %self.exchange_name, event = %event, "control event");
            }
            Ok(None) => {}
            Err(e) => self.protocol_violation(&e),
        }
    }

    fn protocol_violation(&self, error: &ExchangeError) {
        warn!(exchange = %self.exchange_name, error = %error, "dropping malformed frame");
        self.emit(ConnectionEvent::ProtocolViolation(error.to_string()));
    }

    async fn send_frame(&self, stream: &mut WsStream, frame: Message) -> Result<(), ExchangeError> {
        stream
            .send(frame)
            .await
            .map_err(|e| ExchangeError::NetworkError(format!("WebSocket send failed: {}", e)))
    }

    fn fail(&mut self, attempts: u32, reconnecting: bool) -> Phase {
        self.set_status(ConnectionState::Failed, attempts, false);
        Phase::Backoff {
            attempts,
            reconnecting,
        }
    }

    fn terminate<F>(&mut self, attempts: u32, reason: String, error: F) -> Phase
    where
        F: Fn() -> ExchangeError,
    {
        error!(exchange = %self.exchange_name, reason = %reason, "connection terminated");
        self.set_status(ConnectionState::Failed, attempts, true);
        self.emit(ConnectionEvent::Terminated { reason });
        self.settle_waiters(error);
        Phase::Idle
    }

    fn set_status(&self, state: ConnectionState, reconnect_attempts: u32, terminal: bool) {
        let previous = self.status.send_replace(ConnectionStatus {
            state,
            reconnect_attempts,
            terminal,
        });
        if previous.state != state {
            debug!(exchange = %self.exchange_name, from = %previous.state, to = %state, "state transition");
            self.emit(ConnectionEvent::StateChanged {
                from: previous.state,
                to: state,
            });
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn settle_waiters_ok(&mut self) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
    }

    fn settle_waiters<F>(&mut self, error: F)
    where
        F: Fn() -> ExchangeError,
    {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(error()));
        }
    }

    fn registry(&self) -> MutexGuard<'_, SubscriptionRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
