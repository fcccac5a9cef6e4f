//! # relay-registry
//!
//! Session registry and lifecycle orchestration for the relay gateway.
//!
//! - [`client`]: the narrow interface over the external messaging client
//!   (connect capability, per-session event stream, logout), plus the
//!   loopback adapter used in development and tests
//! - [`registry::SessionRegistry`]: owns the in-memory map of active
//!   sessions, serializes lifecycle transitions per bot, captures pairing
//!   codes and the bounded message log, and publishes [`relay_core::RegistryEvent`]s
//! - [`service::SessionService`]: reconciles persisted desired state against
//!   the registry on create/update/delete, with rollback on partial failure
//!
//! In-memory registry state is authoritative for liveness; persisted records
//! are an eventually-consistent shadow written by detached tasks.

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod registry;
pub mod service;

pub use client::{
    ClientError, ClientEvent, ClientHandle, ClientMessage, ClientSession, LoopbackClient,
    MessagingClient,
};
pub use errors::{RegistryError, ServiceError};
pub use registry::SessionRegistry;
pub use service::{CreateSessionParams, SessionChanges, SessionService};
