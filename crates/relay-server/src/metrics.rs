//! Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connections refused before joining (counter, labels: reason).
pub const WS_REJECTS_TOTAL: &str = "ws_rejects_total";
/// Admission rejections (counter, labels: scope).
pub const ADMISSION_REJECTS_TOTAL: &str = "admission_rejects_total";
/// Old connections evicted by a newer one for the same operator (counter).
pub const EVICTIONS_TOTAL: &str = "evictions_total";
/// Events delivered to an operator channel (counter).
pub const FANOUT_DELIVERED_TOTAL: &str = "fanout_delivered_total";
/// Events dropped because the owner's channel was full or closed (counter).
pub const FANOUT_DROPS_TOTAL: &str = "fanout_drops_total";
/// Events dropped because no owner is recorded for the bot (counter).
pub const FANOUT_UNOWNED_TOTAL: &str = "fanout_unowned_total";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_are_snake_case() {
        for name in [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_REJECTS_TOTAL,
            ADMISSION_REJECTS_TOTAL,
            EVICTIONS_TOTAL,
            FANOUT_DELIVERED_TOTAL,
            FANOUT_DROPS_TOTAL,
            FANOUT_UNOWNED_TOTAL,
        ] {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
