//! `SQLite`-backed [`SessionStore`].

use relay_core::{BotId, OperatorId};
use rusqlite::{OptionalExtension, Row, params};

use crate::connection::ConnectionPool;
use crate::errors::Result;
use crate::records::{AuditLogEntry, MessageLogEntry, SessionRecord, SessionStatus};
use crate::store::SessionStore;

/// Production store over an r2d2 `SQLite` pool.
pub struct SqliteStore {
    pool: ConnectionPool,
}

impl SqliteStore {
    /// Wrap a pool. Migrations must already have been run on the database.
    #[must_use]
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
        let status: String = row.get("status")?;
        let operator: Option<String> = row.get("operator_id")?;
        Ok(SessionRecord {
            session_id: BotId::from_string(row.get("session_id")?),
            operator_id: operator.map(OperatorId::from_string),
            status: SessionStatus::from_str_lossy(&status),
            pairing_code: row.get("pairing_code")?,
            last_message: row.get("last_message")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl SessionStore for SqliteStore {
    fn put_session(&self, record: &SessionRecord) -> Result<()> {
        let conn = self.pool.get()?;
        let _ = conn.execute(
            "INSERT INTO sessions (session_id, operator_id, status, pairing_code,
                                   last_message, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (session_id) DO UPDATE SET
               operator_id = excluded.operator_id,
               status = excluded.status,
               pairing_code = excluded.pairing_code,
               last_message = excluded.last_message,
               updated_at = excluded.updated_at",
            params![
                record.session_id.as_str(),
                record.operator_id.as_ref().map(OperatorId::as_str),
                record.status.as_str(),
                record.pairing_code,
                record.last_message,
                record.created_at,
                record.updated_at,
            ],
        )?;
        Ok(())
    }

    fn get_session(&self, session_id: &BotId) -> Result<Option<SessionRecord>> {
        let conn = self.pool.get()?;
        let record = conn
            .query_row(
                "SELECT * FROM sessions WHERE session_id = ?1",
                params![session_id.as_str()],
                Self::map_row,
            )
            .optional()?;
        Ok(record)
    }

    fn delete_session(&self, session_id: &BotId) -> Result<()> {
        let conn = self.pool.get()?;
        let _ = conn.execute(
            "DELETE FROM sessions WHERE session_id = ?1",
            params![session_id.as_str()],
        )?;
        Ok(())
    }

    fn set_status(&self, session_id: &BotId, status: SessionStatus) -> Result<()> {
        let conn = self.pool.get()?;
        let _ = conn.execute(
            "UPDATE sessions SET status = ?2, updated_at = ?3 WHERE session_id = ?1",
            params![
                session_id.as_str(),
                status.as_str(),
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn record_pairing_code(&self, session_id: &BotId, code: &str) -> Result<()> {
        let conn = self.pool.get()?;
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO sessions (session_id, status, pairing_code, created_at, updated_at)
             VALUES (?1, 'active', ?2, ?3, ?3)
             ON CONFLICT (session_id) DO UPDATE SET
               status = 'active',
               pairing_code = excluded.pairing_code,
               updated_at = excluded.updated_at",
            params![session_id.as_str(), code, now],
        )?;
        Ok(())
    }

    fn record_message(&self, session_id: &BotId, last_message: &str) -> Result<()> {
        let conn = self.pool.get()?;
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO sessions (session_id, status, last_message, created_at, updated_at)
             VALUES (?1, 'active', ?2, ?3, ?3)
             ON CONFLICT (session_id) DO UPDATE SET
               status = 'active',
               last_message = excluded.last_message,
               updated_at = excluded.updated_at",
            params![session_id.as_str(), last_message, now],
        )?;
        Ok(())
    }

    fn mark_stopped(&self, session_id: &BotId) -> Result<()> {
        let conn = self.pool.get()?;
        let _ = conn.execute(
            "UPDATE sessions SET status = 'inactive', pairing_code = NULL, updated_at = ?2
             WHERE session_id = ?1",
            params![session_id.as_str(), chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn append_message_log(&self, entry: &MessageLogEntry) -> Result<()> {
        let conn = self.pool.get()?;
        let _ = conn.execute(
            "INSERT INTO message_logs (id, session_id, direction, body, kind, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.id,
                entry.session_id.as_str(),
                entry.direction.as_str(),
                entry.body,
                entry.kind,
                entry.created_at,
            ],
        )?;
        Ok(())
    }

    fn append_audit_log(&self, entry: &AuditLogEntry) -> Result<()> {
        let conn = self.pool.get()?;
        let _ = conn.execute(
            "INSERT INTO audit_logs (id, session_id, action, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.id,
                entry.session_id.as_str(),
                entry.action,
                entry.detail,
                entry.created_at,
            ],
        )?;
        Ok(())
    }

    fn owner_of(&self, bot_id: &BotId) -> Result<Option<OperatorId>> {
        let conn = self.pool.get()?;
        let operator: Option<Option<String>> = conn
            .query_row(
                "SELECT operator_id FROM sessions WHERE session_id = ?1",
                params![bot_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(operator.flatten().map(OperatorId::from_string))
    }

    fn set_owner(&self, bot_id: &BotId, operator_id: &OperatorId) -> Result<()> {
        let conn = self.pool.get()?;
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO sessions (session_id, operator_id, status, created_at, updated_at)
             VALUES (?1, ?2, 'inactive', ?3, ?3)
             ON CONFLICT (session_id) DO UPDATE SET
               operator_id = excluded.operator_id,
               updated_at = excluded.updated_at",
            params![bot_id.as_str(), operator_id.as_str(), now],
        )?;
        Ok(())
    }
}
