//! Registry and orchestration error types.

use relay_core::BotId;

use crate::client::ClientError;

/// Errors surfaced by the session registry.
///
/// Only lifecycle-mutating failures appear here. Logout failures and
/// persistence failures are absorbed and logged — they never block cleanup
/// or roll back an in-memory transition.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The external client's connect call failed. The registry holds no
    /// entry for the bot after this error.
    #[error("failed to start session for {bot_id}: {source}")]
    StartFailed {
        /// The bot whose start failed.
        bot_id: BotId,
        /// The underlying client error.
        #[source]
        source: ClientError,
    },
}

/// Errors surfaced by the orchestration service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// No persisted record exists for the bot.
    #[error("session not found: {0}")]
    NotFound(BotId),

    /// A persistence operation on the service's own CRUD path failed.
    #[error("store error: {0}")]
    Store(#[from] relay_store::StoreError),

    /// The registry refused a lifecycle transition; any persisted desired
    /// state has been rolled back.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
