//! In-memory [`SessionStore`] for tests and ephemeral runs.

use std::collections::HashMap;

use parking_lot::Mutex;
use relay_core::{BotId, OperatorId};

use crate::errors::Result;
use crate::records::{AuditLogEntry, MessageLogEntry, SessionRecord, SessionStatus};
use crate::store::SessionStore;

#[derive(Default)]
struct Inner {
    sessions: HashMap<BotId, SessionRecord>,
    message_logs: Vec<MessageLogEntry>,
    audit_logs: Vec<AuditLogEntry>,
}

/// Hash-map-backed store with the same observable semantics as
/// [`crate::SqliteStore`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted message-log rows (test observability).
    #[must_use]
    pub fn message_log_len(&self) -> usize {
        self.inner.lock().message_logs.len()
    }

    /// Snapshot of the audit-log rows (test observability).
    #[must_use]
    pub fn audit_logs(&self) -> Vec<AuditLogEntry> {
        self.inner.lock().audit_logs.clone()
    }

    fn upsert_with(
        &self,
        session_id: &BotId,
        apply: impl FnOnce(&mut SessionRecord),
    ) {
        let mut inner = self.inner.lock();
        let record = inner
            .sessions
            .entry(session_id.clone())
            .or_insert_with(|| {
                SessionRecord::new(session_id.clone(), None, SessionStatus::Inactive)
            });
        apply(record);
        record.updated_at = chrono::Utc::now().to_rfc3339();
    }
}

impl SessionStore for MemoryStore {
    fn put_session(&self, record: &SessionRecord) -> Result<()> {
        let mut inner = self.inner.lock();
        let _ = inner
            .sessions
            .insert(record.session_id.clone(), record.clone());
        Ok(())
    }

    fn get_session(&self, session_id: &BotId) -> Result<Option<SessionRecord>> {
        Ok(self.inner.lock().sessions.get(session_id).cloned())
    }

    fn delete_session(&self, session_id: &BotId) -> Result<()> {
        let _ = self.inner.lock().sessions.remove(session_id);
        Ok(())
    }

    fn set_status(&self, session_id: &BotId, status: SessionStatus) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(record) = inner.sessions.get_mut(session_id) {
            record.status = status;
            record.updated_at = chrono::Utc::now().to_rfc3339();
        }
        Ok(())
    }

    fn record_pairing_code(&self, session_id: &BotId, code: &str) -> Result<()> {
        self.upsert_with(session_id, |record| {
            record.status = SessionStatus::Active;
            record.pairing_code = Some(code.to_owned());
        });
        Ok(())
    }

    fn record_message(&self, session_id: &BotId, last_message: &str) -> Result<()> {
        self.upsert_with(session_id, |record| {
            record.status = SessionStatus::Active;
            record.last_message = Some(last_message.to_owned());
        });
        Ok(())
    }

    fn mark_stopped(&self, session_id: &BotId) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(record) = inner.sessions.get_mut(session_id) {
            record.status = SessionStatus::Inactive;
            record.pairing_code = None;
            record.updated_at = chrono::Utc::now().to_rfc3339();
        }
        Ok(())
    }

    fn append_message_log(&self, entry: &MessageLogEntry) -> Result<()> {
        self.inner.lock().message_logs.push(entry.clone());
        Ok(())
    }

    fn append_audit_log(&self, entry: &AuditLogEntry) -> Result<()> {
        self.inner.lock().audit_logs.push(entry.clone());
        Ok(())
    }

    fn owner_of(&self, bot_id: &BotId) -> Result<Option<OperatorId>> {
        Ok(self
            .inner
            .lock()
            .sessions
            .get(bot_id)
            .and_then(|r| r.operator_id.clone()))
    }

    fn set_owner(&self, bot_id: &BotId, operator_id: &OperatorId) -> Result<()> {
        self.upsert_with(bot_id, |record| {
            record.operator_id = Some(operator_id.clone());
        });
        Ok(())
    }
}
