//! Connection supervisor.
//!
//! Owns the transport and keeps the session alive:
//!
//! ```text
//!                 ┌──────────────┐  restore fails   ┌───────────────┐
//!      run() ────▶│ Disconnected │─────────────────▶│ Err(Session)  │
//!                 └──────┬───────┘                  └───────────────┘
//!                        │ credential ready
//!                        ▼
//!                 ┌──────────────┐  connect error / close / stream end
//!                 │  Connecting  │◀──────────────── backoff ─────────┐
//!                 └──────┬───────┘                                   │
//!                        │ Open update                               │
//!                        ▼                                           │
//!                 ┌──────────────┐───────────────────────────────────┘
//!                 │     Open     │
//!                 └──────┬───────┘
//!                        │ LoggedOut close: erase credential
//!                        ▼
//!                 ┌──────────────┐
//!                 │  LoggedOut   │ terminal
//!                 └──────────────┘
//! ```
//!
//! Events of one connection are handled strictly in order: event handlers
//! are handed each event first, then credential updates are persisted
//! (awaited) and message batches go through the [`Dispatcher`]. Event
//! handlers, command handlers and the connected notice all run in spawned
//! tasks, so nothing they await can stall the loop or a reconnect.
//!
//! Reconnects go through a gate: while one is pending, further requests are
//! no-ops. Retries are unbounded with a constant delay.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};
use wabot_core::{
    BoxedBot, BoxedTransport, CloseReason, Connection, ConnectionState, Payload, SendOptions,
    TransportEvent,
};
use wabot_framework::{Dispatcher, EventHandlers, PluginLoader};

use crate::config::WabotConfig;
use crate::session::{BoxedSessionStore, SessionRestorer, SessionResult, ensure_credentials};

/// Lifecycle of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Open,
    /// Terminal: the credential was revoked and erased.
    LoggedOut,
}

/// Why [`Supervisor::run`] returned normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// The session was logged out remotely.
    LoggedOut,
    /// The shutdown token was cancelled.
    Cancelled,
}

/// Supervisor timings and operator notice settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Constant delay between a close and the next connect.
    pub reconnect_delay: Duration,
    /// Delay before the first connect when a credential was stored.
    pub settle_delay: Duration,
    /// Delay before the first connect after a restore.
    pub restore_settle_delay: Duration,
    /// Chat id receiving the connected notice.
    pub operator: String,
    /// Name shown in the connected notice.
    pub bot_name: String,
    /// Command prefix shown in the connected notice.
    pub prefix: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from(&WabotConfig::default())
    }
}

impl From<&WabotConfig> for SupervisorConfig {
    fn from(config: &WabotConfig) -> Self {
        Self {
            reconnect_delay: config.connection.reconnect_delay(),
            settle_delay: config.connection.settle_delay(),
            restore_settle_delay: config.connection.restore_settle_delay(),
            operator: config.bot.operator_jid(),
            bot_name: config.bot.name.clone(),
            prefix: config.bot.prefix.clone(),
        }
    }
}

// =============================================================================
// Reconnect Gate
// =============================================================================

/// Allows at most one pending reconnect.
#[derive(Debug, Default)]
pub struct ReconnectGate {
    pending: AtomicBool,
    notify: Notify,
}

impl ReconnectGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a reconnect as pending.
    ///
    /// Returns `false` (and does nothing) if one is already pending.
    pub fn request(&self) -> bool {
        if self.pending.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.notify.notify_one();
        true
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Clears the pending flag once the reconnect starts.
    fn clear(&self) {
        self.pending.store(false, Ordering::SeqCst);
    }

    /// Resolves when a reconnect is requested.
    async fn requested(&self) {
        loop {
            self.notify.notified().await;
            // A stale wakeup from an already served request is ignored.
            if self.is_pending() {
                return;
            }
        }
    }
}

// =============================================================================
// Supervisor
// =============================================================================

/// How a connection ended.
#[derive(Debug)]
enum Ended {
    Closed(Option<CloseReason>),
    Requested,
    LoggedOut,
    Cancelled,
}

/// Keeps one transport session alive and feeds its events to the pipeline.
pub struct Supervisor {
    transport: BoxedTransport,
    store: BoxedSessionStore,
    restorer: SessionRestorer,
    dispatcher: Arc<Dispatcher>,
    loader: Arc<PluginLoader>,
    events: Arc<EventHandlers>,
    config: SupervisorConfig,
    state: watch::Sender<SessionState>,
    gate: ReconnectGate,
    shutdown: CancellationToken,
    attempts: AtomicU64,
}

impl Supervisor {
    /// Creates a supervisor with default timings and no restore source.
    pub fn new(
        transport: BoxedTransport,
        store: BoxedSessionStore,
        dispatcher: Arc<Dispatcher>,
        loader: Arc<PluginLoader>,
        events: Arc<EventHandlers>,
    ) -> Self {
        Self {
            transport,
            store,
            restorer: SessionRestorer::default(),
            dispatcher,
            loader,
            events,
            config: SupervisorConfig::default(),
            state: watch::Sender::new(SessionState::Disconnected),
            gate: ReconnectGate::new(),
            shutdown: CancellationToken::new(),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn with_restorer(mut self, restorer: SessionRestorer) -> Self {
        self.restorer = restorer;
        self
    }

    pub fn with_config(mut self, config: SupervisorConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `token` to stop the supervisor.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Returns the shutdown token.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Returns the current state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Number of connect attempts so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Drops the current connection and reconnects.
    ///
    /// Returns `false` if a reconnect is already pending.
    pub fn request_reconnect(&self) -> bool {
        let accepted = self.gate.request();
        if !accepted {
            debug!("Reconnect already pending, ignoring request");
        }
        accepted
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "Session state changed");
        }
    }

    /// Sleeps unless cancelled first. Returns `false` on cancellation.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Runs until logout or cancellation.
    ///
    /// A failed restore is fatal; every other failure leads to a reconnect.
    pub async fn run(&self) -> SessionResult<Shutdown> {
        let mut first = true;

        loop {
            if self.shutdown.is_cancelled() {
                self.set_state(SessionState::Disconnected);
                return Ok(Shutdown::Cancelled);
            }

            let (credentials, restored) =
                ensure_credentials(self.store.as_ref(), &self.restorer).await?;

            if first || restored {
                let delay = if restored {
                    self.config.restore_settle_delay
                } else {
                    self.config.settle_delay
                };
                debug!(delay_ms = delay.as_millis() as u64, restored, "Waiting before connecting");
                if !self.pause(delay).await {
                    return Ok(Shutdown::Cancelled);
                }
                first = false;
            }

            self.gate.clear();
            self.set_state(SessionState::Connecting);
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let span = info_span!("connection", attempt);

            let ended = async {
                info!("Connecting");
                match self.transport.connect(credentials).await {
                    Ok(connection) => self.drive(connection).await,
                    Err(e) => {
                        warn!(error = %e, "Connect failed");
                        Ended::Closed(None)
                    }
                }
            }
            .instrument(span)
            .await;

            match ended {
                Ended::LoggedOut => {
                    if let Err(e) = self.store.erase().await {
                        error!(error = %e, "Failed to erase credential after logout");
                    }
                    self.set_state(SessionState::LoggedOut);
                    warn!("Session logged out, not reconnecting");
                    return Ok(Shutdown::LoggedOut);
                }
                Ended::Cancelled => {
                    self.set_state(SessionState::Disconnected);
                    return Ok(Shutdown::Cancelled);
                }
                Ended::Closed(reason) => {
                    self.gate.request();
                    info!(
                        reason = ?reason,
                        delay_ms = self.config.reconnect_delay.as_millis() as u64,
                        "Connection closed, reconnecting"
                    );
                }
                Ended::Requested => {
                    info!("Reconnect requested");
                }
            }

            self.set_state(SessionState::Disconnected);
            if !self.pause(self.config.reconnect_delay).await {
                return Ok(Shutdown::Cancelled);
            }
        }
    }

    /// Processes the events of one connection until it ends.
    async fn drive(&self, connection: Connection) -> Ended {
        let Connection { bot, mut events } = connection;

        loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Ended::Cancelled,
                _ = self.gate.requested() => return Ended::Requested,
                event = events.recv() => event,
            };

            let Some(event) = event else {
                debug!("Event stream ended");
                return Ended::Closed(None);
            };
            trace!(event = event.event_name(), "Transport event");

            // Fire and forget; see `EventHandler`.
            drop(self.events.emit(&bot, &event));

            if let Some(ended) = self.handle(&bot, event).await {
                return ended;
            }
        }
    }

    async fn handle(&self, bot: &BoxedBot, event: TransportEvent) -> Option<Ended> {
        match event {
            TransportEvent::ConnectionUpdate {
                state: ConnectionState::Open,
                ..
            } => {
                self.set_state(SessionState::Open);
                info!(bot_id = %bot.id(), "Connected");
                self.on_open(bot);
                None
            }
            TransportEvent::ConnectionUpdate {
                state: ConnectionState::Connecting,
                ..
            } => None,
            TransportEvent::ConnectionUpdate {
                state: ConnectionState::Close,
                close_reason,
            } => {
                if close_reason.as_ref().is_some_and(CloseReason::is_logout) {
                    Some(Ended::LoggedOut)
                } else {
                    Some(Ended::Closed(close_reason))
                }
            }
            TransportEvent::CredentialsUpdate(credentials) => {
                if let Err(e) = self.store.save(&credentials).await {
                    error!(error = %e, "Failed to persist updated credential");
                }
                None
            }
            TransportEvent::MessagesUpsert(batch) => {
                let dispatched = self.dispatcher.dispatch_batch(bot, batch).await;
                trace!(messages = dispatched.len(), "Batch dispatched");
                None
            }
            TransportEvent::MessagesDeleted(_) => None,
        }
    }

    fn on_open(&self, bot: &BoxedBot) {
        let report = self.loader.load_all();
        if !report.loaded.is_empty() || !report.rejected_commands.is_empty() {
            info!(
                loaded = report.loaded.len(),
                rejected = report.rejected_commands.len(),
                commands = self.dispatcher.registry().len(),
                "Plugins registered"
            );
        }

        let notice = format!(
            "> {} connected ✅\n\nPREFIX: {}",
            self.config.bot_name, self.config.prefix
        );
        let bot = Arc::clone(bot);
        let operator = self.config.operator.clone();
        tokio::spawn(
            async move {
                if let Err(e) = bot
                    .send(&operator, Payload::text(notice), SendOptions::default())
                    .await
                {
                    warn!(operator = %operator, error = %e, "Failed to send connected notice");
                }
            }
            .in_current_span(),
        );
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("state", &self.state())
            .field("attempts", &self.attempts())
            .field("reconnect_pending", &self.gate.is_pending())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemorySessionStore, SessionError};
    use async_trait::async_trait;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;
    use tokio::time::Instant;
    use wabot_core::testing::RecordingBot;
    use wabot_core::{
        Credentials, MessageContent, MessageKey, RawMessage, Transport, TransportResult,
    };
    use wabot_framework::{CommandSpec, DispatchArgs, Plugin, Registrar};

    const BOT_ID: &str = "94700000000:1@s.whatsapp.net";
    const OPERATOR: &str = "94743404814@s.whatsapp.net";

    /// Hands every new connection's event sender to the test.
    struct ChannelTransport {
        bot: Arc<RecordingBot>,
        connects: Mutex<Vec<(Credentials, Instant)>>,
        senders: mpsc::UnboundedSender<mpsc::Sender<TransportEvent>>,
    }

    #[async_trait]
    impl Transport for ChannelTransport {
        async fn connect(&self, credentials: Credentials) -> TransportResult<Connection> {
            self.connects.lock().push((credentials, Instant::now()));
            let (tx, rx) = mpsc::channel(16);
            let _ = self.senders.send(tx);
            let bot: BoxedBot = self.bot.clone();
            Ok(Connection { bot, events: rx })
        }
    }

    struct Ping;

    impl Plugin for Ping {
        fn name(&self) -> &str {
            "ping"
        }

        fn register(&self, r: &mut Registrar) {
            r.command(CommandSpec::new("ping", |args: DispatchArgs| async move {
                args.reply("pong").await?;
                Ok(())
            }));
        }
    }

    struct Harness {
        supervisor: Arc<Supervisor>,
        transport: Arc<ChannelTransport>,
        store: Arc<MemorySessionStore>,
        bot: Arc<RecordingBot>,
        connections: mpsc::UnboundedReceiver<mpsc::Sender<TransportEvent>>,
    }

    impl Harness {
        fn new(store: MemorySessionStore, restorer: SessionRestorer, bot: RecordingBot) -> Self {
            let (senders, connections) = mpsc::unbounded_channel();
            let bot = Arc::new(bot);
            let transport = Arc::new(ChannelTransport {
                bot: Arc::clone(&bot),
                connects: Mutex::new(Vec::new()),
                senders,
            });
            let store = Arc::new(store);

            let dispatcher = Arc::new(Dispatcher::default());
            let events = Arc::new(EventHandlers::new());
            let loader = Arc::new(
                PluginLoader::new(
                    Arc::clone(dispatcher.registry()),
                    Arc::clone(dispatcher.replies()),
                    Arc::clone(&events),
                )
                .with(Ping),
            );

            let supervisor = Supervisor::new(
                transport.clone(),
                store.clone(),
                dispatcher,
                loader,
                events,
            )
            .with_restorer(restorer);

            Self {
                supervisor: Arc::new(supervisor),
                transport,
                store,
                bot,
                connections,
            }
        }

        fn connected() -> Self {
            Self::new(
                MemorySessionStore::with_credentials(Credentials::new(b"stored".to_vec())),
                SessionRestorer::new(None),
                RecordingBot::new(BOT_ID),
            )
        }

        fn spawn(&self) -> tokio::task::JoinHandle<SessionResult<Shutdown>> {
            let supervisor = Arc::clone(&self.supervisor);
            tokio::spawn(async move { supervisor.run().await })
        }

        async fn next_connection(&mut self) -> mpsc::Sender<TransportEvent> {
            self.connections.recv().await.unwrap()
        }

        fn connect_count(&self) -> usize {
            self.transport.connects.lock().len()
        }

        async fn wait_for_state(&self, state: SessionState) {
            let mut rx = self.supervisor.subscribe();
            rx.wait_for(|s| *s == state).await.unwrap();
        }
    }

    /// Polls `cond`, letting paused time advance in between.
    async fn until(mut cond: impl FnMut() -> bool) {
        for _ in 0..100 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stored_credential_never_restores() {
        let mut h = Harness::connected();
        let started = Instant::now();
        let run = h.spawn();

        let _conn = h.next_connection().await;
        let connects = h.transport.connects.lock().clone();
        assert_eq!(connects[0].0.as_bytes(), b"stored");
        assert!(connects[0].1 - started >= Duration::from_secs(1));
        assert_eq!(h.store.save_count(), 0);

        h.supervisor.shutdown_token().cancel();
        assert_eq!(run.await.unwrap().unwrap(), Shutdown::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_writes_credential_before_connecting() {
        let blob = br#"{"me":{"id":"94700000000:1@s.whatsapp.net"},"registered":true,"account":{}}"#;
        let mut h = Harness::new(
            MemorySessionStore::new(),
            SessionRestorer::new(Some(STANDARD.encode(blob))),
            RecordingBot::new(BOT_ID),
        );
        let started = Instant::now();
        let _run = h.spawn();

        let _conn = h.next_connection().await;
        assert_eq!(h.store.save_count(), 1);
        assert_eq!(h.store.current().unwrap().as_bytes(), blob);
        let connects = h.transport.connects.lock().clone();
        assert_eq!(connects[0].0.as_bytes(), blob);
        assert!(connects[0].1 - started >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_restore_source_is_fatal() {
        let h = Harness::new(
            MemorySessionStore::new(),
            SessionRestorer::new(None),
            RecordingBot::new(BOT_ID),
        );

        let result = h.spawn().await.unwrap();
        assert!(matches!(result, Err(SessionError::NoRestoreSource)));
        assert_eq!(h.connect_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_registers_plugins_and_notifies_operator() {
        let mut h = Harness::connected();
        let _run = h.spawn();

        let conn = h.next_connection().await;
        conn.send(TransportEvent::open()).await.unwrap();
        h.wait_for_state(SessionState::Open).await;
        until(|| !h.bot.sent().is_empty()).await;

        let notice = &h.bot.sent()[0];
        assert_eq!(notice.chat, OPERATOR);
        assert!(notice.text().unwrap().contains("PREFIX: ."));
        assert_eq!(h.supervisor.dispatcher.registry().len(), 1);

        // A second open after a reconnect registers nothing twice.
        conn.send(TransportEvent::close(Some(CloseReason::ConnectionLost)))
            .await
            .unwrap();
        let conn = h.next_connection().await;
        conn.send(TransportEvent::open()).await.unwrap();
        until(|| h.bot.sent().len() == 2).await;
        assert_eq!(h.supervisor.dispatcher.registry().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notice_failure_is_swallowed() {
        let mut h = Harness::new(
            MemorySessionStore::with_credentials(Credentials::new(b"stored".to_vec())),
            SessionRestorer::new(None),
            RecordingBot::new(BOT_ID).failing_sends(),
        );
        let _run = h.spawn();

        let conn = h.next_connection().await;
        conn.send(TransportEvent::open()).await.unwrap();
        conn.send(TransportEvent::CredentialsUpdate(Credentials::new(b"next".to_vec())))
            .await
            .unwrap();

        until(|| h.store.save_count() == 1).await;
        assert_eq!(h.supervisor.state(), SessionState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_reconnects_once_after_backoff() {
        let mut h = Harness::connected();
        let _run = h.spawn();

        let conn = h.next_connection().await;
        conn.send(TransportEvent::open()).await.unwrap();
        let closed_at = Instant::now();
        conn.send(TransportEvent::close(Some(CloseReason::RestartRequired)))
            .await
            .unwrap();

        let _conn = h.next_connection().await;
        let connects = h.transport.connects.lock().clone();
        assert!(connects[1].1 - closed_at >= Duration::from_secs(1));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.connect_count(), 2);
        assert_eq!(h.supervisor.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_end_reconnects() {
        let mut h = Harness::connected();
        let _run = h.spawn();

        let conn = h.next_connection().await;
        drop(conn);

        let _conn = h.next_connection().await;
        assert_eq!(h.connect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_reconnect_request_is_noop() {
        let mut h = Harness::connected();
        let _run = h.spawn();

        let _conn = h.next_connection().await;
        assert!(h.supervisor.request_reconnect());
        assert!(!h.supervisor.request_reconnect());

        let _conn = h.next_connection().await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.connect_count(), 2);
        assert!(!h.supervisor.gate.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_erases_credential_and_stops() {
        let mut h = Harness::connected();
        let run = h.spawn();

        let conn = h.next_connection().await;
        conn.send(TransportEvent::open()).await.unwrap();
        conn.send(TransportEvent::close(Some(CloseReason::LoggedOut)))
            .await
            .unwrap();

        assert_eq!(run.await.unwrap().unwrap(), Shutdown::LoggedOut);
        assert!(h.store.current().is_none());
        assert_eq!(h.supervisor.state(), SessionState::LoggedOut);
        assert_eq!(h.connect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_are_dispatched() {
        let mut h = Harness::connected();
        let _run = h.spawn();

        let conn = h.next_connection().await;
        conn.send(TransportEvent::open()).await.unwrap();
        conn.send(TransportEvent::MessagesUpsert(vec![RawMessage::new(
            MessageKey::new("94711111111@s.whatsapp.net", "M1"),
            MessageContent::Text {
                text: ".PING".into(),
                context: None,
            },
        )]))
        .await
        .unwrap();

        until(|| h.bot.sent_texts().iter().any(|t| t == "pong")).await;
        assert!(h.supervisor.dispatcher.cache().contains("94711111111@s.whatsapp.net", "M1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let mut h = Harness::connected();
        let run = h.spawn();

        let conn = h.next_connection().await;
        conn.send(TransportEvent::close(None)).await.unwrap();
        h.wait_for_state(SessionState::Disconnected).await;
        h.supervisor.shutdown_token().cancel();

        assert_eq!(run.await.unwrap().unwrap(), Shutdown::Cancelled);
        assert_eq!(h.connect_count(), 1);
    }

    /// Never finishes handling a deletion.
    struct Hangs;

    #[async_trait]
    impl wabot_framework::EventHandler for Hangs {
        async fn on_event(&self, _bot: &BoxedBot, event: &TransportEvent) {
            if matches!(event, TransportEvent::MessagesDeleted(_)) {
                std::future::pending::<()>().await;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_event_handler_blocks_neither_messages_nor_reconnect() {
        let mut h = Harness::connected();
        h.supervisor.events.add(Arc::new(Hangs));
        let _run = h.spawn();

        let conn = h.next_connection().await;
        conn.send(TransportEvent::open()).await.unwrap();
        conn.send(TransportEvent::MessagesDeleted(vec![MessageKey::new(
            "94711111111@s.whatsapp.net",
            "OLD",
        )]))
        .await
        .unwrap();
        conn.send(TransportEvent::MessagesUpsert(vec![RawMessage::new(
            MessageKey::new("94711111111@s.whatsapp.net", "M1"),
            MessageContent::Text {
                text: ".ping".into(),
                context: None,
            },
        )]))
        .await
        .unwrap();
        conn.send(TransportEvent::close(Some(CloseReason::ConnectionLost)))
            .await
            .unwrap();

        let _conn = h.next_connection().await;
        assert_eq!(h.connect_count(), 2);
        until(|| h.bot.sent_texts().iter().any(|t| t == "pong")).await;
        assert!(
            h.supervisor
                .dispatcher
                .cache()
                .contains("94711111111@s.whatsapp.net", "M1")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_notice_does_not_block_events() {
        let mut h = Harness::new(
            MemorySessionStore::with_credentials(Credentials::new(b"stored".to_vec())),
            SessionRestorer::new(None),
            RecordingBot::new(BOT_ID).hanging_sends_to(OPERATOR),
        );
        let _run = h.spawn();

        let conn = h.next_connection().await;
        conn.send(TransportEvent::open()).await.unwrap();
        conn.send(TransportEvent::CredentialsUpdate(Credentials::new(b"next".to_vec())))
            .await
            .unwrap();
        conn.send(TransportEvent::close(None)).await.unwrap();

        let _conn = h.next_connection().await;
        assert_eq!(h.store.save_count(), 1);
        assert_eq!(h.connect_count(), 2);
    }

    #[test]
    fn test_gate_accepts_one_pending_request() {
        let gate = ReconnectGate::new();
        assert!(gate.request());
        assert!(!gate.request());
        gate.clear();
        assert!(gate.request());
    }
}
