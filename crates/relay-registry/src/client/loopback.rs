//! Loopback messaging client for development and tests.
//!
//! Pairs immediately: every connect emits a deterministic pairing code
//! derived from the session name. Events can then be injected with
//! [`LoopbackClient::emit`], which is how tests (and the dev binary's
//! smoke path) simulate external traffic.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use super::{ClientError, ClientEvent, ClientHandle, ClientSession, MessagingClient};

/// Channel depth per loopback session.
const EVENT_BUFFER: usize = 64;

/// In-process stand-in for the external messaging client.
#[derive(Default)]
pub struct LoopbackClient {
    channels: Arc<DashMap<String, mpsc::Sender<ClientEvent>>>,
    connect_calls: AtomicUsize,
}

impl LoopbackClient {
    /// Create a loopback client with no sessions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connect calls observed (test observability).
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connect_calls.load(Ordering::Relaxed)
    }

    /// Whether a session with this name is currently connected.
    #[must_use]
    pub fn is_connected(&self, session_name: &str) -> bool {
        self.channels.contains_key(session_name)
    }

    /// Inject an event into a connected session's stream.
    ///
    /// Returns `false` if no such session is connected or its stream is gone.
    pub async fn emit(&self, session_name: &str, event: ClientEvent) -> bool {
        let Some(tx) = self.channels.get(session_name).map(|e| e.value().clone()) else {
            return false;
        };
        tx.send(event).await.is_ok()
    }
}

#[async_trait]
impl MessagingClient for LoopbackClient {
    async fn connect(&self, session_name: &str) -> Result<ClientSession, ClientError> {
        let _ = self.connect_calls.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        // Loopback sessions pair instantly.
        let code = format!("LOOP-{session_name}");
        tx.send(ClientEvent::PairingCode(code))
            .await
            .map_err(|_| ClientError::ConnectFailed("event stream closed".into()))?;

        let _ = self.channels.insert(session_name.to_owned(), tx);
        debug!(session_name, "loopback session connected");

        Ok(ClientSession {
            handle: Box::new(LoopbackHandle {
                session_name: session_name.to_owned(),
                channels: Arc::clone(&self.channels),
            }),
            events: rx,
        })
    }
}

struct LoopbackHandle {
    session_name: String,
    channels: Arc<DashMap<String, mpsc::Sender<ClientEvent>>>,
}

#[async_trait]
impl ClientHandle for LoopbackHandle {
    async fn logout(&self) -> Result<(), ClientError> {
        // Dropping the sender ends the session's event stream.
        let _ = self.channels.remove(&self.session_name);
        debug!(session_name = self.session_name, "loopback session logged out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientMessage;

    #[tokio::test]
    async fn connect_emits_pairing_code_first() {
        let client = LoopbackClient::new();
        let mut session = client.connect("s1").await.unwrap();
        let first = session.events.recv().await.unwrap();
        assert_eq!(first, ClientEvent::PairingCode("LOOP-s1".into()));
    }

    #[tokio::test]
    async fn emit_reaches_the_stream_in_order() {
        let client = LoopbackClient::new();
        let mut session = client.connect("s1").await.unwrap();
        let _ = session.events.recv().await; // pairing code

        assert!(
            client
                .emit("s1", ClientEvent::Message(ClientMessage::received_text("a")))
                .await
        );
        assert!(
            client
                .emit("s1", ClientEvent::Message(ClientMessage::received_text("b")))
                .await
        );

        let ClientEvent::Message(m1) = session.events.recv().await.unwrap() else {
            panic!("expected message");
        };
        let ClientEvent::Message(m2) = session.events.recv().await.unwrap() else {
            panic!("expected message");
        };
        assert_eq!(m1.body, "a");
        assert_eq!(m2.body, "b");
    }

    #[tokio::test]
    async fn emit_to_unknown_session_returns_false() {
        let client = LoopbackClient::new();
        assert!(!client.emit("ghost", ClientEvent::PairingCode("x".into())).await);
    }

    #[tokio::test]
    async fn logout_ends_the_stream() {
        let client = LoopbackClient::new();
        let mut session = client.connect("s1").await.unwrap();
        let _ = session.events.recv().await;

        session.handle.logout().await.unwrap();
        assert!(!client.is_connected("s1"));
        assert!(session.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn connect_count_increments() {
        let client = LoopbackClient::new();
        assert_eq!(client.connect_count(), 0);
        let _s1 = client.connect("a").await.unwrap();
        let _s2 = client.connect("b").await.unwrap();
        assert_eq!(client.connect_count(), 2);
    }
}
