//! # relay-settings
//!
//! Layered configuration for the relay gateway.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If `~/.relay/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::SettingsError;
pub use loader::{load_settings, load_settings_from_path, settings_path};
pub use types::{
    AdmissionSettings, AuthSettings, RegistrySettings, RelaySettings, ServerSettings,
    StoreSettings,
};
