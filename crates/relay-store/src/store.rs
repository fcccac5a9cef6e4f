//! The persistence interface consumed by the registry, the orchestration
//! service, and the realtime hub's ownership lookup.

use relay_core::{BotId, OperatorId};

use crate::errors::Result;
use crate::records::{AuditLogEntry, MessageLogEntry, SessionRecord, SessionStatus};

/// CRUD surface over session records, message logs, and audit logs.
///
/// Implementations must be cheap to call from async contexts: every method
/// is a single small statement, and lifecycle callers invoke them from
/// detached tasks.
pub trait SessionStore: Send + Sync {
    /// Insert or replace a full session record.
    fn put_session(&self, record: &SessionRecord) -> Result<()>;

    /// Fetch a session record. Absence is not an error.
    fn get_session(&self, session_id: &BotId) -> Result<Option<SessionRecord>>;

    /// Remove a session record. Removing a missing record is a no-op.
    fn delete_session(&self, session_id: &BotId) -> Result<()>;

    /// Set the persisted status, leaving other fields untouched.
    fn set_status(&self, session_id: &BotId, status: SessionStatus) -> Result<()>;

    /// Record a pairing code: creates the record if absent, otherwise
    /// updates the code and flips status to active.
    fn record_pairing_code(&self, session_id: &BotId, code: &str) -> Result<()>;

    /// Record message activity: creates the record if absent, otherwise
    /// updates `last_message` and flips status to active.
    fn record_message(&self, session_id: &BotId, last_message: &str) -> Result<()>;

    /// Stop bookkeeping: status to inactive and pairing code cleared.
    fn mark_stopped(&self, session_id: &BotId) -> Result<()>;

    /// Append one message-log row.
    fn append_message_log(&self, entry: &MessageLogEntry) -> Result<()>;

    /// Append one audit-log row.
    fn append_audit_log(&self, entry: &AuditLogEntry) -> Result<()>;

    /// Resolve the operator that owns a bot, if any.
    fn owner_of(&self, bot_id: &BotId) -> Result<Option<OperatorId>>;

    /// Assign a bot to an operator.
    fn set_owner(&self, bot_id: &BotId, operator_id: &OperatorId) -> Result<()>;
}
