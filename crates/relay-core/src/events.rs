//! Registry events published to the realtime distribution layer.
//!
//! The session registry emits one [`RegistryEvent`] per observable change on
//! a bot's session. The realtime hub subscribes to the stream, resolves the
//! owning operator, and forwards the event to that operator's channel only.
//!
//! Ordering: events for a single bot are emitted in the order the external
//! client produced them (FIFO per session). No ordering holds across bots.

use serde::{Deserialize, Serialize};

use crate::ids::BotId;
use crate::session::EventEntry;

/// A change on a bot's session, addressed by bot ID.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEvent {
    /// The bot whose session changed.
    pub bot_id: BotId,
    /// What happened.
    #[serde(flatten)]
    pub kind: RegistryEventKind,
}

/// Payload of a [`RegistryEvent`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum RegistryEventKind {
    /// A pairing code was issued or refreshed.
    #[serde(rename_all = "camelCase")]
    PairingCode {
        /// The code the operator must present to authorize the session.
        code: String,
    },
    /// A message flowed through the session.
    #[serde(rename_all = "camelCase")]
    Message {
        /// The logged entry.
        entry: EventEntry,
    },
    /// The session was stopped and removed from the registry.
    Stopped,
}

impl RegistryEvent {
    /// A pairing-code event.
    #[must_use]
    pub fn pairing_code(bot_id: BotId, code: impl Into<String>) -> Self {
        Self {
            bot_id,
            kind: RegistryEventKind::PairingCode { code: code.into() },
        }
    }

    /// A message event.
    #[must_use]
    pub fn message(bot_id: BotId, entry: EventEntry) -> Self {
        Self {
            bot_id,
            kind: RegistryEventKind::Message { entry },
        }
    }

    /// A session-stopped event.
    #[must_use]
    pub fn stopped(bot_id: BotId) -> Self {
        Self {
            bot_id,
            kind: RegistryEventKind::Stopped,
        }
    }
}
