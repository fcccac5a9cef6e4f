//! Wire protocol for the operator channel.
//!
//! Everything the gateway pushes to a connected operator is a [`WireEvent`]
//! JSON object with a `type` discriminator. Rejected connections receive a
//! close frame whose reason is a compact JSON document ([`CloseReason`]),
//! never a silent drop.

use relay_core::{BotId, ConnectionId, RegistryEvent, RegistryEventKind};
use serde::Serialize;
use serde_json::json;

/// One event pushed to an operator's channel.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEvent {
    /// Event discriminator (`"message"`, `"pairing"`, `"pong"`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// RFC 3339 emission timestamp.
    pub timestamp: String,
    /// Bot the event concerns, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<BotId>,
    /// Event payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl WireEvent {
    fn new(kind: &str, bot_id: Option<BotId>, data: Option<serde_json::Value>) -> Self {
        Self {
            kind: kind.to_owned(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            bot_id,
            data,
        }
    }

    /// Sent once after a connection joins its operator channel.
    #[must_use]
    pub fn connection_established(connection_id: &ConnectionId) -> Self {
        Self::new(
            "connection.established",
            None,
            Some(json!({ "connectionId": connection_id.as_str() })),
        )
    }

    /// Reply to a client-level ping.
    #[must_use]
    pub fn pong() -> Self {
        Self::new("pong", None, None)
    }

    /// Translate a registry event into its wire form.
    #[must_use]
    pub fn from_registry(event: &RegistryEvent) -> Self {
        match &event.kind {
            RegistryEventKind::PairingCode { code } => Self::new(
                "pairing",
                Some(event.bot_id.clone()),
                Some(json!({ "code": code })),
            ),
            RegistryEventKind::Message { entry } => Self::new(
                "message",
                Some(event.bot_id.clone()),
                serde_json::to_value(entry).ok(),
            ),
            RegistryEventKind::Stopped => Self::new("session.stopped", Some(event.bot_id.clone()), None),
        }
    }

    /// Serialize to the JSON text sent over the socket.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{\"type\":\"error\"}".to_owned())
    }
}

/// Why a connection was (or is being) closed by the gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The handshake credential was missing, malformed, or expired.
    AuthFailed,
    /// Admission control rejected the attempt.
    RateLimited {
        /// Seconds after which a retry may be admitted.
        retry_after_secs: u64,
    },
    /// A newer connection for the same operator took over.
    Superseded,
    /// The client stopped answering heartbeats.
    Unresponsive,
}

impl CloseReason {
    /// Application close code (4000–4999 range).
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            Self::AuthFailed => 4401,
            Self::RateLimited { .. } => 4429,
            Self::Superseded => 4409,
            Self::Unresponsive => 4408,
        }
    }

    /// Machine-readable close reason, compact JSON.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::AuthFailed => json!({ "reason": "auth_failed" }).to_string(),
            Self::RateLimited { retry_after_secs } => json!({
                "reason": "rate_limited",
                "retryAfterSecs": retry_after_secs,
            })
            .to_string(),
            Self::Superseded => json!({ "reason": "superseded" }).to_string(),
            Self::Unresponsive => json!({ "reason": "unresponsive" }).to_string(),
        }
    }
}
