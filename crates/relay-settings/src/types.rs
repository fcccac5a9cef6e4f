//! Settings types with compiled defaults.

use serde::{Deserialize, Serialize};

/// Root settings document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Network and heartbeat settings.
    pub server: ServerSettings,
    /// Connection admission thresholds.
    pub admission: AdmissionSettings,
    /// Session registry tuning.
    pub registry: RegistrySettings,
    /// Credential verification settings.
    pub auth: AuthSettings,
    /// Persistence settings.
    pub store: StoreSettings,
}

/// Server network and runtime settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Port to bind (0 for auto-assign).
    pub port: u16,
    /// Interval between server-initiated heartbeat pings, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// How long a client may go silent before disconnect, in milliseconds.
    pub heartbeat_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8420,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
        }
    }
}

/// Admission-control thresholds for new realtime connections.
///
/// Two nested checks, keyed by operator identity: a burst check over a short
/// grace window that catches rapid reconnect loops, and a sustained check
/// over the full rolling window.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdmissionSettings {
    /// Maximum attempts inside the burst window.
    pub burst_limit: u32,
    /// Burst window in seconds.
    pub burst_window_secs: u64,
    /// Maximum attempts inside the full rolling window.
    pub sustained_limit: u32,
    /// Rolling window in seconds.
    pub window_secs: u64,
    /// Interval of the background sweep that drops idle identities, in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            burst_limit: 5,
            burst_window_secs: 5,
            sustained_limit: 15,
            window_secs: 60,
            sweep_interval_secs: 60,
        }
    }
}

/// Session registry tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistrySettings {
    /// Per-session event log capacity (ring buffer; oldest entries evicted).
    pub event_log_capacity: usize,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            event_log_capacity: 256,
        }
    }
}

/// Credential verification settings.
///
/// Token issuance and rotation happen elsewhere; the gateway only verifies.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthSettings {
    /// HMAC secret for HS256 verification. Empty means unset; the server
    /// refuses to start without one.
    pub jwt_secret: String,
    /// Expected `iss` claim, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

/// Persistence settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    /// Path to the `SQLite` database file, relative to `~/.relay` unless
    /// absolute.
    pub db_path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_path: "relay.db".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let s = RelaySettings::default();
        assert_eq!(s.admission.burst_limit, 5);
        assert_eq!(s.admission.burst_window_secs, 5);
        assert_eq!(s.admission.sustained_limit, 15);
        assert_eq!(s.admission.window_secs, 60);
        assert_eq!(s.registry.event_log_capacity, 256);
    }

    #[test]
    fn default_server_settings() {
        let s = ServerSettings::default();
        assert_eq!(s.host, "127.0.0.1");
        assert_eq!(s.port, 8420);
        assert_eq!(s.heartbeat_interval_ms, 30_000);
        assert_eq!(s.heartbeat_timeout_ms, 90_000);
    }

    #[test]
    fn jwt_secret_defaults_to_empty() {
        let s = AuthSettings::default();
        assert!(s.jwt_secret.is_empty());
        assert!(s.issuer.is_none());
    }

    #[test]
    fn serde_roundtrip() {
        let s = RelaySettings::default();
        let json = serde_json::to_string(&s).unwrap();
        let back: RelaySettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.server.port, s.server.port);
        assert_eq!(back.admission.sustained_limit, s.admission.sustained_limit);
        assert_eq!(back.store.db_path, s.store.db_path);
    }

    #[test]
    fn partial_document_fills_defaults() {
        let s: RelaySettings =
            serde_json::from_str(r#"{"server":{"port":9000}}"#).unwrap();
        assert_eq!(s.server.port, 9000);
        assert_eq!(s.server.host, "127.0.0.1");
        assert_eq!(s.admission.burst_limit, 5);
    }

    #[test]
    fn camel_case_field_names() {
        let json = serde_json::to_value(RelaySettings::default()).unwrap();
        assert!(json["admission"]["burstWindowSecs"].is_number());
        assert!(json["registry"]["eventLogCapacity"].is_number());
        assert!(json["server"]["heartbeatIntervalMs"].is_number());
    }
}
