//! Orchestration between persisted desired state and the session registry.
//!
//! The service is the only component that writes "desired" session state.
//! Every registry-touching operation rolls persisted state back on failure,
//! so a database row never claims `active` while no external session exists.

use std::sync::Arc;

use relay_core::{BotId, OperatorId};
use relay_store::{SessionRecord, SessionStatus, SessionStore};
use tracing::{instrument, warn};

use crate::errors::ServiceError;
use crate::registry::SessionRegistry;

/// Parameters for creating a session record.
#[derive(Clone, Debug)]
pub struct CreateSessionParams {
    /// The bot the record belongs to.
    pub bot_id: BotId,
    /// Owning operator, if known at creation time.
    pub operator_id: Option<OperatorId>,
    /// External session name; defaults to the bot ID.
    pub session_name: Option<String>,
    /// Whether to start the external session immediately.
    pub active: bool,
}

/// Field changes for an update. `None` leaves a field untouched.
#[derive(Clone, Debug, Default)]
pub struct SessionChanges {
    /// Desired liveness. Flipping this is the only change that touches the
    /// registry.
    pub active: Option<bool>,
    /// Reassign ownership.
    pub operator_id: Option<OperatorId>,
}

/// Mediates create/update/delete between the store and the registry.
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    registry: Arc<SessionRegistry>,
}

impl SessionService {
    /// Create a service over the given store and registry.
    pub fn new(store: Arc<dyn SessionStore>, registry: Arc<SessionRegistry>) -> Self {
        Self { store, registry }
    }

    /// Insert a record and, if requested, start its session.
    ///
    /// On start failure the persisted status is rolled back to inactive and
    /// the registry error is re-raised; the caller never observes an active
    /// record paired with a failed session.
    #[instrument(skip_all, fields(bot_id = %params.bot_id, active = params.active))]
    pub async fn create(&self, params: CreateSessionParams) -> Result<SessionRecord, ServiceError> {
        let status = if params.active {
            SessionStatus::Active
        } else {
            SessionStatus::Inactive
        };
        let record = SessionRecord::new(params.bot_id.clone(), params.operator_id.clone(), status);
        self.store.put_session(&record)?;

        if params.active {
            let name = params
                .session_name
                .unwrap_or_else(|| params.bot_id.to_string());
            if let Err(e) = self.registry.start(&params.bot_id, &name).await {
                self.rollback_to_inactive(&params.bot_id);
                return Err(e.into());
            }
        }

        Ok(self.store.get_session(&params.bot_id)?.unwrap_or(record))
    }

    /// Apply changes to a record; flipping `active` starts or stops the
    /// session. No other transition touches the registry.
    #[instrument(skip_all, fields(bot_id = %bot_id))]
    pub async fn update(
        &self,
        bot_id: &BotId,
        changes: SessionChanges,
    ) -> Result<SessionRecord, ServiceError> {
        let mut record = self
            .store
            .get_session(bot_id)?
            .ok_or_else(|| ServiceError::NotFound(bot_id.clone()))?;

        let was_active = record.status == SessionStatus::Active;
        let now_active = changes.active.unwrap_or(was_active);

        if let Some(operator_id) = changes.operator_id {
            record.operator_id = Some(operator_id);
        }
        record.status = if now_active {
            SessionStatus::Active
        } else {
            SessionStatus::Inactive
        };
        record.updated_at = chrono::Utc::now().to_rfc3339();
        self.store.put_session(&record)?;

        if !was_active && now_active {
            if let Err(e) = self.registry.start(bot_id, bot_id.as_str()).await {
                self.rollback_to_inactive(bot_id);
                return Err(e.into());
            }
        } else if was_active && !now_active {
            self.registry.stop(bot_id).await;
        }

        Ok(self.store.get_session(bot_id)?.unwrap_or(record))
    }

    /// Stop the session (best-effort; idempotent stop makes this safe even
    /// when none exists) and remove the record.
    #[instrument(skip_all, fields(bot_id = %bot_id))]
    pub async fn delete(&self, bot_id: &BotId) -> Result<(), ServiceError> {
        self.registry.stop(bot_id).await;
        self.store.delete_session(bot_id)?;
        Ok(())
    }

    fn rollback_to_inactive(&self, bot_id: &BotId) {
        if let Err(e) = self.store.set_status(bot_id, SessionStatus::Inactive) {
            warn!(bot_id = %bot_id, error = %e, "status rollback failed after start error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{
        ClientError, ClientSession, LoopbackClient, MessagingClient,
    };
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use relay_store::MemoryStore;

    struct FailingClient;

    #[async_trait]
    impl MessagingClient for FailingClient {
        async fn connect(&self, _session_name: &str) -> Result<ClientSession, ClientError> {
            Err(ClientError::ConnectFailed("unreachable".into()))
        }
    }

    fn make_service(client: Arc<dyn MessagingClient>) -> (Arc<MemoryStore>, SessionService) {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(SessionRegistry::new(client, store.clone(), 256));
        (store.clone(), SessionService::new(store, registry))
    }

    fn params(bot: &str, active: bool) -> CreateSessionParams {
        CreateSessionParams {
            bot_id: BotId::from(bot),
            operator_id: Some(OperatorId::from("op_1")),
            session_name: None,
            active,
        }
    }

    #[tokio::test]
    async fn create_inactive_never_touches_registry() {
        let client = Arc::new(LoopbackClient::new());
        let (store, service) = make_service(client.clone());
        let record = service.create(params("bot_1", false)).await.unwrap();
        assert_eq!(record.status, SessionStatus::Inactive);
        assert_eq!(client.connect_count(), 0);
        assert!(store.get_session(&BotId::from("bot_1")).unwrap().is_some());
    }

    #[tokio::test]
    async fn create_active_starts_session() {
        let client = Arc::new(LoopbackClient::new());
        let (_store, service) = make_service(client.clone());
        let record = service.create(params("bot_1", true)).await.unwrap();
        assert_eq!(record.status, SessionStatus::Active);
        assert_eq!(client.connect_count(), 1);
        assert!(client.is_connected("bot_1"));
    }

    #[tokio::test]
    async fn create_rolls_back_on_start_failure() {
        let (store, service) = make_service(Arc::new(FailingClient));
        let err = service.create(params("bot_1", true)).await.unwrap_err();
        assert_matches!(err, ServiceError::Registry(_));

        // The record exists but was rolled back to inactive.
        let record = store.get_session(&BotId::from("bot_1")).unwrap().unwrap();
        assert_eq!(record.status, SessionStatus::Inactive);
    }

    #[tokio::test]
    async fn update_flip_to_active_starts() {
        let client = Arc::new(LoopbackClient::new());
        let (_store, service) = make_service(client.clone());
        let _ = service.create(params("bot_1", false)).await.unwrap();

        let record = service
            .update(
                &BotId::from("bot_1"),
                SessionChanges {
                    active: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(record.status, SessionStatus::Active);
        assert_eq!(client.connect_count(), 1);
    }

    #[tokio::test]
    async fn update_flip_to_inactive_stops() {
        let client = Arc::new(LoopbackClient::new());
        let (_store, service) = make_service(client.clone());
        let _ = service.create(params("bot_1", true)).await.unwrap();
        assert!(client.is_connected("bot_1"));

        let record = service
            .update(
                &BotId::from("bot_1"),
                SessionChanges {
                    active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(record.status, SessionStatus::Inactive);
        assert!(!client.is_connected("bot_1"));
    }

    #[tokio::test]
    async fn update_without_flip_never_touches_registry() {
        let client = Arc::new(LoopbackClient::new());
        let (_store, service) = make_service(client.clone());
        let _ = service.create(params("bot_1", false)).await.unwrap();

        let record = service
            .update(
                &BotId::from("bot_1"),
                SessionChanges {
                    operator_id: Some(OperatorId::from("op_2")),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(record.operator_id, Some(OperatorId::from("op_2")));
        assert_eq!(client.connect_count(), 0);
    }

    #[tokio::test]
    async fn update_missing_record_is_not_found() {
        let client = Arc::new(LoopbackClient::new());
        let (_store, service) = make_service(client);
        let err = service
            .update(&BotId::from("ghost"), SessionChanges::default())
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::NotFound(_));
    }

    #[tokio::test]
    async fn update_rolls_back_on_start_failure() {
        let (store, service) = make_service(Arc::new(FailingClient));
        let _ = service.create(params("bot_1", false)).await.unwrap();

        let err = service
            .update(
                &BotId::from("bot_1"),
                SessionChanges {
                    active: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::Registry(_));
        let record = store.get_session(&BotId::from("bot_1")).unwrap().unwrap();
        assert_eq!(record.status, SessionStatus::Inactive);
    }

    #[tokio::test]
    async fn delete_stops_then_removes() {
        let client = Arc::new(LoopbackClient::new());
        let (store, service) = make_service(client.clone());
        let _ = service.create(params("bot_1", true)).await.unwrap();

        service.delete(&BotId::from("bot_1")).await.unwrap();
        assert!(!client.is_connected("bot_1"));
        assert!(store.get_session(&BotId::from("bot_1")).unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_without_session_still_removes_record() {
        let client = Arc::new(LoopbackClient::new());
        let (store, service) = make_service(client);
        let _ = service.create(params("bot_1", false)).await.unwrap();

        service.delete(&BotId::from("bot_1")).await.unwrap();
        assert!(store.get_session(&BotId::from("bot_1")).unwrap().is_none());
    }
}
