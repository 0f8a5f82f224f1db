//! RealtimeSync - one session of real-time sync for a consuming context.
//!
//! Owns the handler registry and the connection manager. The registry
//! outlives reconnects; `stop()` tears both down.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::Instrument;

use crate::adapters::connection::{
    ConnectionEvent, ConnectionManager, ConnectionManagerConfig, ConnectionSnapshot,
};
use crate::adapters::dispatch::{DispatchRegistry, RefetchOnEvent, SubscriptionGuard};
use crate::adapters::transport::WebSocketTransport;
use crate::config::{ConfigError, SyncConfig};
use crate::domain::foundation::{ConnectionState, DomainError, ErrorCode, SessionId};
use crate::ports::{EventSubscriber, Handler, Transport};

/// Facade over one sync session.
///
/// # Example
///
/// ```ignore
/// let sync = RealtimeSync::from_config(&SyncConfig::load()?)?;
/// sync.subscribe("tasks.created", Handler::payload_fn("task-list", |data| {
///     println!("new task: {}", data);
///     Ok(())
/// }))?;
/// let _refetch = sync.refetch_on_event(&["tasks.updated", "tasks.deleted"], || reload())?;
/// sync.start();
/// // ...
/// sync.stop().await;
/// ```
pub struct RealtimeSync {
    session_id: SessionId,
    registry: Arc<DispatchRegistry>,
    manager: ConnectionManager,
}

impl RealtimeSync {
    /// Create an idle session against `endpoint`.
    pub fn new(
        endpoint: impl Into<String>,
        transport: Arc<dyn Transport>,
        config: ConnectionManagerConfig,
    ) -> Self {
        let registry = Arc::new(DispatchRegistry::new());
        let manager = ConnectionManager::new(endpoint, transport, registry.clone(), config);

        Self {
            session_id: SessionId::new(),
            registry,
            manager,
        }
    }

    /// Create an idle session over WebSocket from validated configuration.
    pub fn from_config(config: &SyncConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let endpoint = config.endpoint_url()?;
        Ok(Self::new(
            endpoint,
            Arc::new(WebSocketTransport::new()),
            config.connection.manager_config(),
        ))
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn endpoint(&self) -> &str {
        self.manager.endpoint()
    }

    /// Register `handler` under `event_type`. Duplicate registrations are ignored.
    pub fn subscribe(&self, event_type: &str, handler: Handler) -> Result<(), DomainError> {
        self.registry.subscribe(event_type, handler)
    }

    /// Register `handler` for as long as the returned guard lives.
    pub fn subscribe_scoped(
        &self,
        event_type: &str,
        handler: Handler,
    ) -> Result<SubscriptionGuard, DomainError> {
        self.registry.subscribe_scoped(event_type, handler)
    }

    /// Remove `handler` from `event_type`. Unknown pairs are a no-op.
    pub fn unsubscribe(&self, event_type: &str, handler: &Handler) {
        self.registry.unsubscribe(event_type, handler)
    }

    /// Run `callback` whenever any of `event_types` arrives.
    pub fn refetch_on_event<F>(
        &self,
        event_types: &[&str],
        callback: F,
    ) -> Result<RefetchOnEvent, DomainError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        RefetchOnEvent::new(self.registry.clone(), event_types, callback)
    }

    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// True once reconnects are exhausted; the consumer should fall back
    /// to manual refresh.
    pub fn is_sync_disabled(&self) -> bool {
        self.manager.state() == ConnectionState::Failed
    }

    /// `Err(SyncDisabled)` once reconnects are exhausted.
    pub fn ensure_live(&self) -> Result<(), DomainError> {
        if self.is_sync_disabled() {
            return Err(DomainError::new(
                ErrorCode::SyncDisabled,
                "Real-time sync disabled, refresh manually",
            )
            .with_detail("session_id", self.session_id.to_string()));
        }
        Ok(())
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.manager.snapshot()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.manager.state_changes()
    }

    pub fn lifecycle_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.manager.lifecycle_events()
    }

    /// The session's handler registry.
    pub fn registry(&self) -> &Arc<DispatchRegistry> {
        &self.registry
    }

    /// Open the connection. No-op if already started.
    pub fn start(&self) {
        let span = tracing::info_span!("realtime_sync", session_id = %self.session_id);
        let _entered = span.clone().entered();
        tracing::info!(endpoint = %self.manager.endpoint(), "Starting real-time sync");
        self.manager.start_in(span);
    }

    /// Close the connection and drop every subscription of this session.
    pub async fn stop(&self) {
        let span = tracing::info_span!("realtime_sync", session_id = %self.session_id);
        async {
            self.manager.stop().await;
            let dropped = self.registry.event_types().len();
            self.registry.clear();
            tracing::debug!(event_types = dropped, "Subscriptions cleared");
        }
        .instrument(span)
        .await
    }
}
