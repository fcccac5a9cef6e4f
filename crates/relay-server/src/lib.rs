//! # relay-server
//!
//! Axum WebSocket realtime hub for the relay gateway.
//!
//! Per-connection pipeline: upgrade → authenticate ([`auth`]) → admission
//! check ([`gate`]) → join the operator's channel ([`hub`]) → heartbeat
//! ([`heartbeat`]) and event delivery → guarded close.
//!
//! Fan-out is ownership-scoped: a registry event reaches only the operator
//! that owns the bot, resolved through the persisted ownership mapping —
//! never a global broadcast.

#![deny(unsafe_code)]

pub mod auth;
pub mod gate;
pub mod heartbeat;
pub mod hub;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod wire;

pub use auth::{AuthError, Claims, CredentialVerifier, JwtVerifier};
pub use gate::{AdmissionError, ConnectionGate, GateConfig, run_sweep};
pub use hub::{ConnectionHub, OperatorConnection, run_fanout};
pub use server::{AppState, GatewayServer, ServerConfig};
pub use shutdown::ShutdownCoordinator;
pub use wire::{CloseReason, WireEvent};
