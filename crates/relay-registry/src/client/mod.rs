//! The narrow interface over the external messaging client.
//!
//! The real client library is an opaque capability; the registry only needs
//! four things from it: connect, a pairing-code stream, a message stream,
//! and logout. Connecting yields a [`ClientSession`] whose receiver carries
//! both streams multiplexed in the order the client emitted them, which is
//! what gives the registry its per-session FIFO guarantee.
//!
//! Production adapters implement these traits over the real client;
//! [`loopback::LoopbackClient`] implements them for development and tests.

pub mod loopback;

pub use loopback::LoopbackClient;

use async_trait::async_trait;
use relay_core::Direction;
use tokio::sync::mpsc;

/// Errors from the external messaging client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The connect call failed.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// Logout failed. Non-fatal: session cleanup proceeds regardless.
    #[error("logout failed: {0}")]
    LogoutFailed(String),
}

/// A message observed on the external session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientMessage {
    /// Whether the message was sent through or received by the session.
    pub direction: Direction,
    /// Message body.
    pub body: String,
    /// Client-reported message type (`"text"`, `"image"`, ...).
    pub kind: String,
}

impl ClientMessage {
    /// Convenience constructor for an inbound text message.
    #[must_use]
    pub fn received_text(body: impl Into<String>) -> Self {
        Self {
            direction: Direction::Received,
            body: body.into(),
            kind: "text".into(),
        }
    }
}

/// One event emitted by an external session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// A pairing code was issued or refreshed.
    PairingCode(String),
    /// A message flowed through the session.
    Message(ClientMessage),
}

/// The logout capability of a connected session.
#[async_trait]
pub trait ClientHandle: Send + Sync {
    /// Terminate the external session. May fail; callers treat failure as
    /// non-fatal and proceed with cleanup.
    async fn logout(&self) -> Result<(), ClientError>;
}

/// A connected external session: its handle plus the ordered event stream.
pub struct ClientSession {
    /// Logout capability.
    pub handle: Box<dyn ClientHandle>,
    /// Pairing-code and message events, in emission order. The stream ends
    /// when the external session closes.
    pub events: mpsc::Receiver<ClientEvent>,
}

/// The connect capability of the external messaging client.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Open an external session under the given name.
    async fn connect(&self, session_name: &str) -> Result<ClientSession, ClientError>;
}
