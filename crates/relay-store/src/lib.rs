//! # relay-store
//!
//! Persistence gateway for the relay gateway.
//!
//! The registry treats persisted state as an eventually-consistent shadow of
//! its in-memory sessions: writes are detached (spawned, logged on failure)
//! and never block a lifecycle transition. This crate provides:
//!
//! - [`SessionStore`]: the persistence interface the registry, orchestration
//!   service, and realtime hub consume
//! - [`SqliteStore`]: the production implementation (r2d2 pool, WAL mode,
//!   embedded migrations)
//! - [`MemoryStore`]: an in-memory twin for tests and ephemeral runs

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod memory;
pub mod migrations;
pub mod records;
pub mod sqlite;
pub mod store;

pub use connection::{ConnectionConfig, ConnectionPool, new_file_pool, new_memory_pool};
pub use errors::{Result, StoreError};
pub use memory::MemoryStore;
pub use records::{AuditLogEntry, MessageLogEntry, SessionRecord, SessionStatus};
pub use sqlite::SqliteStore;
pub use store::SessionStore;
