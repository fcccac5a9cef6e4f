//! # relay-core
//!
//! Foundation types for the relay messaging gateway.
//!
//! This crate provides the shared vocabulary the other relay crates depend on:
//!
//! - **Branded IDs**: [`ids::BotId`], [`ids::OperatorId`], [`ids::ConnectionId`]
//!   as newtypes
//! - **Session lifecycle**: [`session::SessionState`] and the bounded
//!   [`session::EventLog`] ring buffer with [`session::EventEntry`] items
//! - **Registry events**: [`events::RegistryEvent`] published by the session
//!   registry and fanned out by the realtime hub
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other relay crates.

#![deny(unsafe_code)]

pub mod events;
pub mod ids;
pub mod session;

pub use events::{RegistryEvent, RegistryEventKind};
pub use ids::{BotId, ConnectionId, OperatorId};
pub use session::{Direction, EventEntry, EventLog, SessionState};
