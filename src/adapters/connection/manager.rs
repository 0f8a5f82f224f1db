//! ConnectionManager - owns the one live connection of a sync session.
//!
//! Drives the lifecycle state machine from a background task:
//!
//! 1. Connect (bounded by `connect_timeout`) and send the wildcard topic
//!    subscription request
//! 2. Forward every inbound frame to the dispatcher, inline, in arrival order
//! 3. On connect failure or lost connection, wait `reconnect_delay` and
//!    retry, up to `max_reconnect_attempts` consecutive failures
//! 4. Past the cap, park in `Failed`: real-time sync is disabled and the
//!    consuming context falls back to manual refresh
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `max_reconnect_attempts` | 5 | Consecutive failed reconnects before `Failed` |
//! | `reconnect_delay` | 3s | Fixed delay between attempts |
//! | `connect_timeout` | 10s | Upper bound for one connect + handshake |
//! | `lifecycle_capacity` | 64 | Buffer of the lifecycle broadcast channel |

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, Span};

use crate::domain::foundation::{
    ConnectionState, EventEnvelope, StateMachine, SubscriptionRequest, Timestamp,
};
use crate::ports::{EventDispatcher, Transport, TransportConnection, TransportError};

use super::events::{ConnectionEvent, ConnectionSnapshot};

/// Configuration for the ConnectionManager.
#[derive(Debug, Clone)]
pub struct ConnectionManagerConfig {
    /// Consecutive failed reconnect attempts tolerated before giving up.
    pub max_reconnect_attempts: u32,

    /// Fixed delay before each reconnect attempt.
    pub reconnect_delay: Duration,

    /// Upper bound for one connect attempt, handshake included.
    pub connect_timeout: Duration,

    /// Capacity of the lifecycle event broadcast channel.
    pub lifecycle_capacity: usize,
}

impl Default for ConnectionManagerConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(10),
            lifecycle_capacity: 64,
        }
    }
}

impl ConnectionManagerConfig {
    /// Create config with a custom reconnect cap.
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Create config with a custom reconnect delay.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Create config with a custom connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// State shared between the manager handle and its background task.
struct Shared {
    state: watch::Sender<ConnectionState>,
    lifecycle: broadcast::Sender<ConnectionEvent>,
    reconnect_attempts: AtomicU32,
    epoch: AtomicU64,
    last_connected_at: Mutex<Option<Timestamp>>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Applies a validated transition. Returns false if it was rejected,
    /// which for the background task means "stop() won the race".
    fn transition(&self, target: ConnectionState) -> bool {
        let mut moved = false;
        self.state.send_if_modified(|state| match state.transition_to(target) {
            Ok(next) => {
                tracing::debug!(from = %state, to = %next, "Connection state changed");
                *state = next;
                moved = true;
                true
            }
            Err(_) => false,
        });
        moved
    }

    fn emit(&self, event: ConnectionEvent) {
        // No receivers is fine.
        let _ = self.lifecycle.send(event);
    }

    fn last_connected_at(&self) -> MutexGuard<'_, Option<Timestamp>> {
        self.last_connected_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Manages the single persistent connection of one sync session.
///
/// # Example
///
/// ```ignore
/// let manager = ConnectionManager::new(endpoint, transport, registry, config);
/// manager.start();
/// assert!(!manager.is_connected()); // until the handshake completes
/// manager.stop().await;
/// ```
pub struct ConnectionManager {
    endpoint: String,
    transport: Arc<dyn Transport>,
    dispatcher: Arc<dyn EventDispatcher>,
    config: ConnectionManagerConfig,
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create a manager in the `Idle` state. Nothing is opened until `start()`.
    pub fn new(
        endpoint: impl Into<String>,
        transport: Arc<dyn Transport>,
        dispatcher: Arc<dyn EventDispatcher>,
        config: ConnectionManagerConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        let (lifecycle, _) = broadcast::channel(config.lifecycle_capacity.max(1));
        let (shutdown, _) = watch::channel(false);

        Self {
            endpoint: endpoint.into(),
            transport,
            dispatcher,
            config,
            shared: Arc::new(Shared {
                state,
                lifecycle,
                reconnect_attempts: AtomicU32::new(0),
                epoch: AtomicU64::new(0),
                last_connected_at: Mutex::new(None),
            }),
            shutdown,
            task: Mutex::new(None),
        }
    }

    /// Begin connecting. No-op if already started.
    ///
    /// Must be called from within a tokio runtime. A manager that reached
    /// `Failed` or `Disconnected` cannot be restarted. The background task
    /// runs inside the caller's current span.
    pub fn start(&self) {
        self.start_in(Span::current());
    }

    /// Like [`start`](Self::start), with the background task running
    /// inside `span`.
    pub fn start_in(&self, span: Span) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            tracing::debug!(endpoint = %self.endpoint, "Connection already started");
            return;
        }

        let Ok(runtime) = Handle::try_current() else {
            tracing::error!(endpoint = %self.endpoint, "start() called outside a tokio runtime");
            return;
        };

        let shutdown = self.shutdown.subscribe();
        if !self.shared.transition(ConnectionState::Connecting) {
            tracing::warn!(
                endpoint = %self.endpoint,
                state = %self.shared.state(),
                "Connection cannot be started from its current state"
            );
            return;
        }

        let runner = Runner {
            endpoint: self.endpoint.clone(),
            transport: Arc::clone(&self.transport),
            dispatcher: Arc::clone(&self.dispatcher),
            config: self.config.clone(),
            shared: Arc::clone(&self.shared),
        };
        *task = Some(runtime.spawn(runner.run(shutdown).instrument(span)));
    }

    /// Tear down the connection. Safe from any state, any number of times.
    ///
    /// Waits for the background task to close the transport; a dispatch in
    /// flight completes first.
    pub async fn stop(&self) {
        let stopped = self.shared.transition(ConnectionState::Disconnected);
        self.shutdown.send_replace(true);

        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(endpoint = %self.endpoint, error = %e, "Connection task did not exit cleanly");
            }
        }

        if stopped {
            tracing::info!(endpoint = %self.endpoint, "Real-time sync stopped");
            self.shared.emit(ConnectionEvent::Stopped);
        }
    }

    /// True only while the state is `Connected`.
    pub fn is_connected(&self) -> bool {
        self.shared.state() == ConnectionState::Connected
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Endpoint this manager connects to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Point-in-time view of state and counters.
    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            state: self.shared.state(),
            reconnect_attempts: self.shared.reconnect_attempts.load(Ordering::SeqCst),
            epoch: self.shared.epoch.load(Ordering::SeqCst),
            last_connected_at: *self.shared.last_connected_at(),
        }
    }

    /// Receiver that always holds the latest state.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Receiver for lifecycle signals emitted from now on.
    pub fn lifecycle_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.lifecycle.subscribe()
    }
}

/// How an established connection ended.
enum Served {
    Stopped,
    Lost(String),
}

/// The background task. Owns the transport handle while it runs.
struct Runner {
    endpoint: String,
    transport: Arc<dyn Transport>,
    dispatcher: Arc<dyn EventDispatcher>,
    config: ConnectionManagerConfig,
    shared: Arc<Shared>,
}

impl Runner {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            let attempt = self.shared.reconnect_attempts.load(Ordering::SeqCst);
            self.shared.emit(ConnectionEvent::Connecting { attempt });
            tracing::debug!(endpoint = %self.endpoint, attempt, "Connecting");

            let connected = tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => return,
                result = self.connect() => result,
            };

            match connected {
                Ok(connection) => match self.serve(connection, &mut shutdown).await {
                    Served::Stopped => return,
                    Served::Lost(reason) => {
                        tracing::warn!(endpoint = %self.endpoint, reason = %reason, "Real-time sync connection lost");
                        self.shared.emit(ConnectionEvent::Disconnected { reason });
                        if !self.shared.transition(ConnectionState::Reconnecting) {
                            return;
                        }
                    }
                },
                Err(e) => {
                    tracing::warn!(endpoint = %self.endpoint, attempt, error = %e, "Connect attempt failed");
                    self.shared.emit(ConnectionEvent::ConnectError {
                        error: e.to_string(),
                    });
                }
            }

            let attempts = self.shared.reconnect_attempts.load(Ordering::SeqCst);
            if attempts >= self.config.max_reconnect_attempts {
                if self.shared.transition(ConnectionState::Failed) {
                    tracing::error!(
                        endpoint = %self.endpoint,
                        attempts,
                        "Reconnect attempts exhausted, real-time sync disabled"
                    );
                    self.shared.emit(ConnectionEvent::ReconnectFailed { attempts });
                }
                return;
            }

            if self.shared.state() != ConnectionState::Reconnecting
                && !self.shared.transition(ConnectionState::Reconnecting)
            {
                return;
            }

            let attempt = self.shared.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            let delay = self.config.reconnect_delay;
            tracing::info!(endpoint = %self.endpoint, attempt, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
            self.shared
                .emit(ConnectionEvent::ReconnectScheduled { attempt, delay });

            tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => return,
                _ = tokio::time::sleep(delay) => {}
            }

            if !self.shared.transition(ConnectionState::Connecting) {
                return;
            }
        }
    }

    /// Open the transport and send the topic subscription request.
    async fn connect(&self) -> Result<Box<dyn TransportConnection>, TransportError> {
        let timeout = self.config.connect_timeout;
        let handshake = async {
            let mut connection = self.transport.connect(&self.endpoint).await?;
            let request = SubscriptionRequest::all_topics()
                .to_frame()
                .map_err(|e| TransportError::Encode(e.message))?;
            if let Err(e) = connection.send(request).await {
                connection.close().await;
                return Err(e);
            }
            Ok::<_, TransportError>(connection)
        };

        tokio::time::timeout(timeout, handshake)
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
    }

    /// Pump inbound frames into the dispatcher until the connection ends.
    async fn serve(
        &self,
        mut connection: Box<dyn TransportConnection>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Served {
        if !self.shared.transition(ConnectionState::Connected) {
            connection.close().await;
            return Served::Stopped;
        }

        self.shared.reconnect_attempts.store(0, Ordering::SeqCst);
        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        *self.shared.last_connected_at() = Some(Timestamp::now());
        tracing::info!(endpoint = %self.endpoint, epoch, "Real-time sync connected");
        self.shared.emit(ConnectionEvent::Connected { epoch });

        loop {
            let frame = tokio::select! {
                biased;
                _ = stopped(shutdown) => {
                    connection.close().await;
                    return Served::Stopped;
                }
                frame = connection.recv() => frame,
            };

            match frame {
                Ok(Some(text)) => self.deliver(&text, epoch),
                Ok(None) => {
                    connection.close().await;
                    return Served::Lost("connection closed by peer".to_string());
                }
                Err(e) => {
                    connection.close().await;
                    return Served::Lost(e.to_string());
                }
            }
        }
    }

    fn deliver(&self, frame: &str, epoch: u64) {
        match EventEnvelope::from_frame(frame) {
            Ok(envelope) => {
                let report = self.dispatcher.dispatch(&envelope);
                tracing::trace!(
                    event_type = %envelope.event_type,
                    epoch,
                    delivered = report.delivered,
                    failed = report.failed,
                    "Envelope dispatched"
                );
            }
            Err(e) => {
                tracing::warn!(endpoint = %self.endpoint, epoch, error = %e, "Dropping malformed envelope");
            }
        }
    }
}

/// Resolves once shutdown was requested or the manager was dropped.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let requested = *shutdown.borrow_and_update();
        if requested {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::dispatch::DispatchRegistry;
    use crate::adapters::transport::InMemoryTransport;
    use crate::ports::{EventSubscriber, Handler};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    const WAIT: Duration = Duration::from_secs(5);

    fn fast_config() -> ConnectionManagerConfig {
        ConnectionManagerConfig::default()
            .with_reconnect_delay(Duration::from_millis(5))
            .with_connect_timeout(Duration::from_millis(500))
            .with_max_reconnect_attempts(3)
    }

    fn manager(
        transport: Arc<InMemoryTransport>,
        registry: Arc<DispatchRegistry>,
        config: ConnectionManagerConfig,
    ) -> ConnectionManager {
        ConnectionManager::new("ws://test/realtime", transport, registry, config)
    }

    async fn wait_for_state(manager: &ConnectionManager, target: ConnectionState) {
        let mut states = manager.state_changes();
        tokio::time::timeout(WAIT, states.wait_for(|s| *s == target))
            .await
            .expect("timed out waiting for state")
            .expect("state channel closed");
    }

    #[tokio::test]
    async fn new_manager_is_idle() {
        let m = manager(
            Arc::new(InMemoryTransport::new()),
            Arc::new(DispatchRegistry::new()),
            fast_config(),
        );

        assert_eq!(m.state(), ConnectionState::Idle);
        assert!(!m.is_connected());
        assert_eq!(m.snapshot().epoch, 0);
    }

    #[tokio::test]
    async fn connects_and_sends_wildcard_subscription() {
        let transport = Arc::new(InMemoryTransport::new());
        let m = manager(transport.clone(), Arc::new(DispatchRegistry::new()), fast_config());

        m.start();
        let mut peer = transport.next_peer(WAIT).await.unwrap();
        wait_for_state(&m, ConnectionState::Connected).await;

        assert!(m.is_connected());
        assert_eq!(peer.next_sent(WAIT).await.as_deref(), Some(r#"{"events":["*"]}"#));
        assert_eq!(m.snapshot().epoch, 1);
        assert!(m.snapshot().last_connected_at.is_some());

        m.stop().await;
    }

    #[tokio::test]
    async fn inbound_envelopes_reach_handlers_in_order() {
        let transport = Arc::new(InMemoryTransport::new());
        let registry = Arc::new(DispatchRegistry::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        registry
            .subscribe(
                "tasks.created",
                Handler::payload_fn("tasks", move |data| {
                    sink.lock().unwrap().push(data.clone());
                    Ok(())
                }),
            )
            .unwrap();

        let m = manager(transport.clone(), registry, fast_config());
        m.start();
        let peer = transport.next_peer(WAIT).await.unwrap();

        peer.push(r#"{"type":"tasks.created","data":{"id":1}}"#);
        peer.push(r#"{"data":{"id":"no type"}}"#);
        peer.push("not json");
        peer.push(r#"{"type":"tasks.created","data":{"id":2}}"#);

        tokio::time::timeout(WAIT, async {
            while seen.lock().unwrap().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![json!({"id": 1}), json!({"id": 2})]);
        assert!(m.is_connected());
        m.stop().await;
    }

    #[tokio::test]
    async fn gives_up_after_capped_attempts() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.refuse_all();
        let m = manager(transport.clone(), Arc::new(DispatchRegistry::new()), fast_config());
        let mut events = m.lifecycle_events();

        m.start();
        wait_for_state(&m, ConnectionState::Failed).await;

        assert!(!m.is_connected());
        // One initial attempt plus three reconnects.
        assert_eq!(transport.connect_calls(), 4);
        assert_eq!(m.snapshot().reconnect_attempts, 3);

        let mut saw_connected = false;
        let mut saw_failed = false;
        while let Ok(event) = events.try_recv() {
            saw_connected |= matches!(event, ConnectionEvent::Connected { .. });
            saw_failed |= matches!(event, ConnectionEvent::ReconnectFailed { attempts: 3 });
        }
        assert!(!saw_connected);
        assert!(saw_failed);

        // Failed is sticky: no further attempts.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(transport.connect_calls(), 4);
        assert_eq!(m.state(), ConnectionState::Failed);

        m.stop().await;
        assert_eq!(m.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn zero_attempt_cap_fails_on_first_error() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.refuse_all();
        let m = manager(
            transport.clone(),
            Arc::new(DispatchRegistry::new()),
            fast_config().with_max_reconnect_attempts(0),
        );

        m.start();
        wait_for_state(&m, ConnectionState::Failed).await;

        assert_eq!(transport.connect_calls(), 1);
    }

    #[tokio::test]
    async fn recovers_after_transient_failures() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.refuse_next(2);
        let m = manager(transport.clone(), Arc::new(DispatchRegistry::new()), fast_config());

        m.start();
        let _peer = transport.next_peer(WAIT).await.unwrap();
        wait_for_state(&m, ConnectionState::Connected).await;

        assert_eq!(transport.connect_calls(), 3);
        assert_eq!(m.snapshot().reconnect_attempts, 0);
        m.stop().await;
    }

    #[tokio::test]
    async fn lost_connection_reconnects_and_resubscribes() {
        let transport = Arc::new(InMemoryTransport::new());
        let m = manager(transport.clone(), Arc::new(DispatchRegistry::new()), fast_config());

        m.start();
        let first = transport.next_peer(WAIT).await.unwrap();
        wait_for_state(&m, ConnectionState::Connected).await;

        first.disconnect();

        let mut second = transport.next_peer(WAIT).await.unwrap();
        assert_eq!(second.next_sent(WAIT).await.as_deref(), Some(r#"{"events":["*"]}"#));
        wait_for_state(&m, ConnectionState::Connected).await;
        tokio::time::timeout(WAIT, async {
            while m.snapshot().epoch < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        m.stop().await;
    }

    #[tokio::test]
    async fn hung_connect_times_out() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.hang_all();
        let m = manager(
            transport.clone(),
            Arc::new(DispatchRegistry::new()),
            fast_config()
                .with_connect_timeout(Duration::from_millis(20))
                .with_max_reconnect_attempts(1),
        );
        let mut events = m.lifecycle_events();

        m.start();
        wait_for_state(&m, ConnectionState::Failed).await;

        let mut timeouts = 0;
        while let Ok(event) = events.try_recv() {
            if let ConnectionEvent::ConnectError { error } = event {
                assert!(error.contains("timed out"), "{}", error);
                timeouts += 1;
            }
        }
        assert_eq!(timeouts, 2);
    }

    #[tokio::test]
    async fn stop_before_start_is_safe() {
        let transport = Arc::new(InMemoryTransport::new());
        let m = manager(transport.clone(), Arc::new(DispatchRegistry::new()), fast_config());

        m.stop().await;
        m.stop().await;
        m.start();

        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert_eq!(transport.connect_calls(), 0);
    }

    #[tokio::test]
    async fn stop_closes_transport() {
        let transport = Arc::new(InMemoryTransport::new());
        let m = manager(transport.clone(), Arc::new(DispatchRegistry::new()), fast_config());

        m.start();
        let mut peer = transport.next_peer(WAIT).await.unwrap();
        wait_for_state(&m, ConnectionState::Connected).await;

        m.stop().await;

        assert!(!m.is_connected());
        // Subscription request, then the channel closes.
        assert!(peer.next_sent(WAIT).await.is_some());
        assert!(peer.next_sent(WAIT).await.is_none());
        assert_eq!(transport.connect_calls(), 1);
    }

    #[tokio::test]
    async fn stop_during_reconnect_delay_halts_attempts() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.refuse_all();
        let m = manager(
            transport.clone(),
            Arc::new(DispatchRegistry::new()),
            fast_config().with_reconnect_delay(Duration::from_secs(60)),
        );

        m.start();
        wait_for_state(&m, ConnectionState::Reconnecting).await;
        m.stop().await;

        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert_eq!(transport.connect_calls(), 1);
    }

    #[tokio::test]
    async fn start_twice_opens_one_connection() {
        let transport = Arc::new(InMemoryTransport::new());
        let m = manager(transport.clone(), Arc::new(DispatchRegistry::new()), fast_config());

        m.start();
        m.start();
        let _peer = transport.next_peer(WAIT).await.unwrap();
        wait_for_state(&m, ConnectionState::Connected).await;
        m.start();

        assert_eq!(transport.connect_calls(), 1);
        m.stop().await;
    }

    #[tokio::test]
    async fn stop_waits_for_in_flight_dispatch() {
        let transport = Arc::new(InMemoryTransport::new());
        let registry = Arc::new(DispatchRegistry::new());
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = handled.clone();
        registry
            .subscribe(
                "slow",
                Handler::payload_fn("slow", move |_| {
                    std::thread::sleep(Duration::from_millis(50));
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .unwrap();

        let m = manager(transport.clone(), registry, fast_config());
        m.start();
        let peer = transport.next_peer(WAIT).await.unwrap();
        wait_for_state(&m, ConnectionState::Connected).await;

        peer.push(r#"{"type":"slow"}"#);
        tokio::time::sleep(Duration::from_millis(10)).await;
        m.stop().await;

        assert_eq!(handled.load(Ordering::SeqCst), 1);
    }
}
