//! In-memory transport for tests and local wiring.
//!
//! Every successful `connect()` hands the test side an [`InMemoryPeer`]
//! playing the server: it pushes frames to the client and reads what the
//! client sent. Failures are scripted up front.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::ports::{Transport, TransportConnection, TransportError};

const REFUSE_ALWAYS: u32 = u32::MAX;

/// Scripted transport backed by unbounded channels.
///
/// # Example
///
/// ```ignore
/// let transport = Arc::new(InMemoryTransport::new());
/// transport.refuse_next(2);
/// manager.start();
/// let peer = transport.next_peer(Duration::from_secs(1)).await.unwrap();
/// peer.push(r#"{"type":"tasks.created","data":{}}"#);
/// ```
pub struct InMemoryTransport {
    refusals: AtomicU32,
    hang: AtomicBool,
    connect_calls: AtomicU32,
    peers_tx: mpsc::UnboundedSender<InMemoryPeer>,
    peers_rx: Mutex<mpsc::UnboundedReceiver<InMemoryPeer>>,
}

impl InMemoryTransport {
    /// Transport that accepts every connect.
    pub fn new() -> Self {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Self {
            refusals: AtomicU32::new(0),
            hang: AtomicBool::new(false),
            connect_calls: AtomicU32::new(0),
            peers_tx,
            peers_rx: Mutex::new(peers_rx),
        }
    }

    /// Refuse the next `count` connects, then accept.
    pub fn refuse_next(&self, count: u32) {
        self.refusals.store(count, Ordering::SeqCst);
    }

    /// Refuse every connect from now on.
    pub fn refuse_all(&self) {
        self.refusals.store(REFUSE_ALWAYS, Ordering::SeqCst);
    }

    /// Accept connects again.
    pub fn accept_all(&self) {
        self.refusals.store(0, Ordering::SeqCst);
        self.hang.store(false, Ordering::SeqCst);
    }

    /// Make every connect hang until the caller gives up.
    pub fn hang_all(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    /// Number of `connect()` calls so far, refused ones included.
    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Wait for the server side of the next accepted connection.
    pub async fn next_peer(&self, timeout: Duration) -> Option<InMemoryPeer> {
        let mut peers = self.peers_rx.lock().await;
        tokio::time::timeout(timeout, peers.recv()).await.ok().flatten()
    }

    fn take_refusal(&self) -> bool {
        self.refusals
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                REFUSE_ALWAYS => Some(REFUSE_ALWAYS),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn TransportConnection>, TransportError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);

        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.take_refusal() {
            tracing::debug!(endpoint, "In-memory connect refused");
            return Err(TransportError::Refused(endpoint.to_string()));
        }

        let (to_client, from_server) = mpsc::unbounded_channel();
        let (to_server, from_client) = mpsc::unbounded_channel();

        // A test that stopped listening for peers just gets a connection
        // nobody pushes to.
        let _ = self.peers_tx.send(InMemoryPeer {
            to_client,
            from_client,
        });

        Ok(Box::new(InMemoryConnection {
            inbound: from_server,
            outbound: Some(to_server),
        }))
    }
}

/// Client half handed to the connection manager.
struct InMemoryConnection {
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: Option<mpsc::UnboundedSender<String>>,
}

#[async_trait]
impl TransportConnection for InMemoryConnection {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        outbound.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        Ok(self.inbound.recv().await)
    }

    async fn close(&mut self) {
        self.outbound = None;
        self.inbound.close();
    }
}

/// Server half of one in-memory connection.
///
/// Dropping it (or calling [`disconnect`](Self::disconnect)) looks like the
/// server going away.
pub struct InMemoryPeer {
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl InMemoryPeer {
    /// Push one raw frame to the client.
    pub fn push(&self, frame: &str) {
        let _ = self.to_client.send(frame.to_string());
    }

    /// Next frame the client sent. `None` on timeout or once the client closed.
    pub async fn next_sent(&mut self, timeout: Duration) -> Option<String> {
        tokio::time::timeout(timeout, self.from_client.recv())
            .await
            .ok()
            .flatten()
    }

    /// Drop the connection from the server side.
    pub fn disconnect(self) {}
}
