//! Persisted row types.

use relay_core::{BotId, Direction, EventEntry, OperatorId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted session status. Mirrors the last lifecycle state the registry
/// reported; never consulted to decide whether a session is live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// The registry last reported a live session.
    Active,
    /// The registry last reported no session.
    Inactive,
}

impl SessionStatus {
    /// Stable string form used in persisted rows.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    /// Parse from the persisted string form. Unknown values read as inactive.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        if s == "active" { Self::Active } else { Self::Inactive }
    }
}

/// One persisted session record, keyed by bot ID.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// The bot this record belongs to.
    pub session_id: BotId,
    /// Owning operator, if assigned.
    pub operator_id: Option<OperatorId>,
    /// Last known lifecycle status.
    pub status: SessionStatus,
    /// Last known pairing code, cleared on stop.
    pub pairing_code: Option<String>,
    /// Body of the most recent message.
    pub last_message: Option<String>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 timestamp of the last write.
    pub updated_at: String,
}

impl SessionRecord {
    /// Build a fresh record for a bot, stamped with the current time.
    #[must_use]
    pub fn new(session_id: BotId, operator_id: Option<OperatorId>, status: SessionStatus) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            session_id,
            operator_id,
            status,
            pairing_code: None,
            last_message: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// One persisted message-log row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageLogEntry {
    /// Row ID (UUID v7).
    pub id: String,
    /// The session the message belongs to.
    pub session_id: BotId,
    /// Message direction (stored as its string form).
    pub direction: Direction,
    /// Message body.
    pub body: String,
    /// Message type as reported by the client.
    pub kind: String,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

impl MessageLogEntry {
    /// Build a log row from an in-memory event entry.
    #[must_use]
    pub fn from_entry(session_id: BotId, entry: &EventEntry) -> Self {
        Self {
            id: format!("msg_{}", Uuid::now_v7()),
            session_id,
            direction: entry.direction,
            body: entry.body.clone(),
            kind: entry.kind.clone(),
            created_at: entry.timestamp.clone(),
        }
    }
}

/// One persisted audit-log row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditLogEntry {
    /// Row ID (UUID v7).
    pub id: String,
    /// The session the action applies to.
    pub session_id: BotId,
    /// What happened (`"session.start"`, `"session.stop"`, ...).
    pub action: String,
    /// Optional free-form detail.
    pub detail: Option<String>,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

impl AuditLogEntry {
    /// Build an audit row stamped with the current time.
    #[must_use]
    pub fn now(session_id: BotId, action: impl Into<String>, detail: Option<String>) -> Self {
        Self {
            id: format!("audit_{}", Uuid::now_v7()),
            session_id,
            action: action.into(),
            detail,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_string_forms() {
        assert_eq!(SessionStatus::Active.as_str(), "active");
        assert_eq!(SessionStatus::Inactive.as_str(), "inactive");
        assert_eq!(SessionStatus::from_str_lossy("active"), SessionStatus::Active);
        assert_eq!(SessionStatus::from_str_lossy("garbage"), SessionStatus::Inactive);
    }

    #[test]
    fn new_record_is_stamped() {
        let rec = SessionRecord::new(BotId::from("bot_1"), None, SessionStatus::Inactive);
        assert_eq!(rec.created_at, rec.updated_at);
        assert!(rec.pairing_code.is_none());
        assert!(rec.last_message.is_none());
    }

    #[test]
    fn message_log_from_entry_copies_fields() {
        let entry = EventEntry::now(Direction::Received, "hello", "text");
        let row = MessageLogEntry::from_entry(BotId::from("bot_1"), &entry);
        assert_eq!(row.body, "hello");
        assert_eq!(row.kind, "text");
        assert_eq!(row.direction, Direction::Received);
        assert_eq!(row.created_at, entry.timestamp);
        assert!(row.id.starts_with("msg_"));
    }

    #[test]
    fn audit_log_ids_are_unique() {
        let a = AuditLogEntry::now(BotId::from("b"), "session.stop", None);
        let b = AuditLogEntry::now(BotId::from("b"), "session.stop", None);
        assert_ne!(a.id, b.id);
    }
}
