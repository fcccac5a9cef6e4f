//! Session lifecycle state and the bounded per-session event log.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Lifecycle state of one bot's external client session.
///
/// Transitions: `Inactive → Starting → Pairing → Connected → Stopping →
/// Inactive`. The client handle exists only in `Starting`, `Pairing`, and
/// `Connected`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No external client session exists.
    Inactive,
    /// The connect call to the external client is in flight.
    Starting,
    /// Connected, waiting for the operator to present the pairing code.
    Pairing,
    /// Paired and exchanging messages.
    Connected,
    /// Teardown in progress.
    Stopping,
}

impl SessionState {
    /// Whether a client handle is held in this state.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Starting | Self::Pairing | Self::Connected)
    }
}

/// Direction of an event-log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Outbound message emitted through the gateway.
    Sent,
    /// Inbound message from the external client.
    Received,
    /// Gateway-generated audit entry (start/stop and the like).
    System,
}

impl Direction {
    /// Stable string form used in persisted rows.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Received => "received",
            Self::System => "system",
        }
    }
}

/// One entry in a session's event log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEntry {
    /// RFC 3339 timestamp of when the gateway observed the event.
    pub timestamp: String,
    /// Message direction.
    pub direction: Direction,
    /// Message body.
    pub body: String,
    /// Message type as reported by the external client (`"text"`, `"image"`,
    /// `"system"`, ...).
    #[serde(rename = "type")]
    pub kind: String,
}

impl EventEntry {
    /// Build an entry stamped with the current time.
    #[must_use]
    pub fn now(direction: Direction, body: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            direction,
            body: body.into(),
            kind: kind.into(),
        }
    }
}

/// Fixed-capacity ring buffer of [`EventEntry`] items.
///
/// Acts as a recency cache independent of persisted history: once full, each
/// push evicts the oldest entry. Long-lived sessions therefore hold a bounded
/// amount of memory no matter how many messages flow through them.
#[derive(Clone, Debug)]
pub struct EventLog {
    entries: VecDeque<EventEntry>,
    capacity: usize,
}

impl EventLog {
    /// Create an empty log with the given capacity (clamped to at least 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest if the log is full.
    pub fn push(&mut self, entry: EventEntry) {
        if self.entries.len() == self.capacity {
            let _ = self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the retained entries, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<EventEntry> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_is_live() {
        assert!(!SessionState::Inactive.is_live());
        assert!(SessionState::Starting.is_live());
        assert!(SessionState::Pairing.is_live());
        assert!(SessionState::Connected.is_live());
        assert!(!SessionState::Stopping.is_live());
    }

    #[test]
    fn state_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&SessionState::Pairing).unwrap(),
            "\"pairing\""
        );
        let back: SessionState = serde_json::from_str("\"connected\"").unwrap();
        assert_eq!(back, SessionState::Connected);
    }

    #[test]
    fn direction_as_str() {
        assert_eq!(Direction::Sent.as_str(), "sent");
        assert_eq!(Direction::Received.as_str(), "received");
        assert_eq!(Direction::System.as_str(), "system");
    }

    #[test]
    fn entry_kind_serializes_as_type() {
        let entry = EventEntry::now(Direction::Received, "hi", "text");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["direction"], "received");
        assert_eq!(json["body"], "hi");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn log_push_and_snapshot() {
        let mut log = EventLog::with_capacity(8);
        assert!(log.is_empty());
        log.push(EventEntry::now(Direction::Received, "a", "text"));
        log.push(EventEntry::now(Direction::Sent, "b", "text"));
        assert_eq!(log.len(), 2);
        let entries = log.to_vec();
        assert_eq!(entries[0].body, "a");
        assert_eq!(entries[1].body, "b");
    }

    #[test]
    fn log_evicts_oldest_at_capacity() {
        let mut log = EventLog::with_capacity(3);
        for i in 0..5 {
            log.push(EventEntry::now(Direction::Received, format!("m{i}"), "text"));
        }
        assert_eq!(log.len(), 3);
        let bodies: Vec<_> = log.to_vec().into_iter().map(|e| e.body).collect();
        assert_eq!(bodies, vec!["m2", "m3", "m4"]);
    }

    #[test]
    fn zero_capacity_clamps_to_one() {
        let mut log = EventLog::with_capacity(0);
        log.push(EventEntry::now(Direction::System, "x", "system"));
        log.push(EventEntry::now(Direction::System, "y", "system"));
        assert_eq!(log.len(), 1);
        assert_eq!(log.to_vec()[0].body, "y");
    }
}
