//! Per-operator connection registry and ownership-scoped event fan-out.
//!
//! Invariant: at most one [`OperatorConnection`] per operator. Registering a
//! new connection for an operator that already has one cancels the old one
//! first, inside the same map lock, so there is no window where both are
//! live. Removal is guarded: a stale connection's late disconnect never
//! evicts a newer registration.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use metrics::counter;
use parking_lot::Mutex as SyncMutex;
use relay_core::{ConnectionId, OperatorId, RegistryEvent};
use relay_store::SessionStore;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::metrics::{
    EVICTIONS_TOTAL, FANOUT_DELIVERED_TOTAL, FANOUT_DROPS_TOTAL, FANOUT_UNOWNED_TOTAL,
};
use crate::wire::{CloseReason, WireEvent};

/// One live transport connection for an operator.
pub struct OperatorConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// The authenticated operator.
    pub operator_id: OperatorId,
    tx: mpsc::Sender<Arc<String>>,
    cancel: CancellationToken,
    close_reason: SyncMutex<Option<CloseReason>>,
    /// Whether the client has responded since the last heartbeat check.
    pub is_alive: AtomicBool,
    dropped_messages: AtomicU64,
}

impl OperatorConnection {
    /// Create a connection with a fresh ID and cancellation token.
    #[must_use]
    pub fn new(operator_id: OperatorId, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id: ConnectionId::generate(),
            operator_id,
            tx,
            cancel: CancellationToken::new(),
            close_reason: SyncMutex::new(None),
            is_alive: AtomicBool::new(true),
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Enqueue a text message for the socket write task.
    ///
    /// Returns `false` if the channel is full or closed, incrementing the
    /// drop counter.
    pub fn send(&self, message: Arc<String>) -> bool {
        if self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize and enqueue a wire event.
    pub fn send_event(&self, event: &WireEvent) -> bool {
        self.send(Arc::new(event.to_json()))
    }

    /// Total messages dropped for this connection.
    #[must_use]
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Token cancelled when the connection must shut down (eviction,
    /// heartbeat timeout, server shutdown).
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request this connection's teardown.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Request teardown with a close reason for the client.
    pub fn close_with(&self, reason: CloseReason) {
        let _ = self.close_reason.lock().replace(reason);
        self.cancel.cancel();
    }

    /// The close reason recorded at teardown, if any.
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason.lock().clone()
    }

    /// Mark the connection as alive (pong or activity received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Check and reset the alive flag; returns whether the client was alive
    /// since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }
}

/// Registry of active operator connections plus the fan-out path.
pub struct ConnectionHub {
    store: Arc<dyn SessionStore>,
    active: Mutex<HashMap<OperatorId, Arc<OperatorConnection>>>,
}

impl ConnectionHub {
    /// Create a hub resolving ownership through `store`.
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Register a connection for its operator, evicting (cancelling) any
    /// existing one first. Eviction and insertion happen under one lock, so
    /// concurrent connects for the same operator serialize cleanly.
    ///
    /// Returns the evicted connection, if there was one.
    pub async fn register(
        &self,
        connection: Arc<OperatorConnection>,
    ) -> Option<Arc<OperatorConnection>> {
        let mut active = self.active.lock().await;
        let evicted = active.remove(&connection.operator_id);
        if let Some(old) = &evicted {
            old.close_with(CloseReason::Superseded);
            counter!(EVICTIONS_TOTAL).increment(1);
            debug!(
                operator_id = %connection.operator_id,
                old_connection = %old.id,
                new_connection = %connection.id,
                "evicted previous connection"
            );
        }
        let _ = active.insert(connection.operator_id.clone(), connection);
        evicted
    }

    /// Remove a connection, but only if it is still the registered one.
    ///
    /// Returns whether removal happened. A `false` return means a newer
    /// connection took the slot and must be left alone.
    pub async fn unregister(&self, connection: &Arc<OperatorConnection>) -> bool {
        let mut active = self.active.lock().await;
        match active.get(&connection.operator_id) {
            Some(current) if Arc::ptr_eq(current, connection) => {
                let _ = active.remove(&connection.operator_id);
                true
            }
            _ => false,
        }
    }

    /// The registered connection for an operator, if any.
    pub async fn connection_for(&self, operator_id: &OperatorId) -> Option<Arc<OperatorConnection>> {
        self.active.lock().await.get(operator_id).cloned()
    }

    /// Number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.active.lock().await.len()
    }

    /// Deliver a registry event to the channel of the operator that owns the
    /// bot. Ownership is resolved explicitly; events for unowned bots are
    /// counted and dropped, never broadcast.
    pub async fn deliver(&self, event: &RegistryEvent) {
        let owner = match self.store.owner_of(&event.bot_id) {
            Ok(Some(owner)) => owner,
            Ok(None) => {
                counter!(FANOUT_UNOWNED_TOTAL).increment(1);
                debug!(bot_id = %event.bot_id, "no owner recorded for bot, dropping event");
                return;
            }
            Err(e) => {
                counter!(FANOUT_UNOWNED_TOTAL).increment(1);
                warn!(bot_id = %event.bot_id, error = %e, "ownership lookup failed, dropping event");
                return;
            }
        };

        let Some(connection) = self.connection_for(&owner).await else {
            debug!(bot_id = %event.bot_id, operator_id = %owner, "owner not connected");
            return;
        };

        if connection.send_event(&WireEvent::from_registry(event)) {
            counter!(FANOUT_DELIVERED_TOTAL).increment(1);
        } else {
            counter!(FANOUT_DROPS_TOTAL).increment(1);
            warn!(
                operator_id = %owner,
                connection_id = %connection.id,
                total_drops = connection.drop_count(),
                "failed to enqueue event for operator (channel full or closed)"
            );
        }
    }
}

/// Pump registry events into the hub until cancelled.
///
/// A lagged subscriber logs and continues; lost events are visible in the
/// skipped count, and the persisted history remains complete.
pub async fn run_fanout(
    hub: Arc<ConnectionHub>,
    mut events: broadcast::Receiver<RegistryEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => hub.deliver(&event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "fan-out lagged behind the registry, events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            },
            () = cancel.cancelled() => return,
        }
    }
}
