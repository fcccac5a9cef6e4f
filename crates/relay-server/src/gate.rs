//! Connection admission control.
//!
//! Two nested checks keyed by operator identity, evaluated in order:
//!
//! 1. **Burst**: attempts inside a short grace window — catches rapid
//!    reconnect loops.
//! 2. **Sustained**: attempts inside the full rolling window.
//!
//! Acceptance appends the attempt timestamp. Expired timestamps are pruned
//! deterministically on every check for the touched identity, and
//! [`run_sweep`] periodically drops identities with nothing left in-window,
//! bounding total memory.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use parking_lot::Mutex;
use relay_core::OperatorId;
use relay_settings::AdmissionSettings;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::metrics::ADMISSION_REJECTS_TOTAL;

/// Admission thresholds.
#[derive(Clone, Debug)]
pub struct GateConfig {
    /// Maximum attempts inside the burst window.
    pub burst_limit: u32,
    /// Burst window length.
    pub burst_window: Duration,
    /// Maximum attempts inside the rolling window.
    pub sustained_limit: u32,
    /// Rolling window length.
    pub window: Duration,
}

impl GateConfig {
    /// Build from settings.
    #[must_use]
    pub fn from_settings(settings: &AdmissionSettings) -> Self {
        Self {
            burst_limit: settings.burst_limit,
            burst_window: Duration::from_secs(settings.burst_window_secs),
            sustained_limit: settings.sustained_limit,
            window: Duration::from_secs(settings.window_secs),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self::from_settings(&AdmissionSettings::default())
    }
}

/// Admission rejection, with a hint for when a retry may be admitted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    /// The burst threshold was hit.
    #[error("reconnecting too fast, retry after {retry_after_secs}s")]
    Burst {
        /// Seconds until the oldest burst-window attempt ages out.
        retry_after_secs: u64,
    },
    /// The sustained threshold was hit.
    #[error("connection rate limit exceeded, retry after {retry_after_secs}s")]
    Sustained {
        /// Seconds until the oldest in-window attempt ages out.
        retry_after_secs: u64,
    },
}

impl AdmissionError {
    /// The retry-after hint in seconds.
    #[must_use]
    pub fn retry_after_secs(&self) -> u64 {
        match self {
            Self::Burst { retry_after_secs } | Self::Sustained { retry_after_secs } => {
                *retry_after_secs
            }
        }
    }
}

/// Per-operator sliding-window connection limiter.
pub struct ConnectionGate {
    config: GateConfig,
    attempts: Mutex<HashMap<OperatorId, VecDeque<Instant>>>,
}

impl ConnectionGate {
    /// Create a gate with the given thresholds.
    #[must_use]
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Admit or reject a connection attempt for `operator`.
    ///
    /// On admission the attempt is recorded; a rejected attempt is not.
    pub fn check(&self, operator: &OperatorId) -> Result<(), AdmissionError> {
        let now = Instant::now();
        let mut attempts = self.attempts.lock();
        let entry = attempts.entry(operator.clone()).or_default();

        // Deterministic pruning of everything outside the rolling window.
        while entry
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.config.window)
        {
            let _ = entry.pop_front();
        }

        let burst_count = entry
            .iter()
            .filter(|t| now.duration_since(**t) < self.config.burst_window)
            .count();
        if burst_count >= self.config.burst_limit as usize {
            let oldest_in_burst = entry
                .iter()
                .find(|t| now.duration_since(**t) < self.config.burst_window)
                .copied()
                .unwrap_or(now);
            let retry = self.config.burst_window - now.duration_since(oldest_in_burst);
            counter!(ADMISSION_REJECTS_TOTAL, "scope" => "burst").increment(1);
            return Err(AdmissionError::Burst {
                retry_after_secs: retry.as_secs().max(1),
            });
        }

        if entry.len() >= self.config.sustained_limit as usize {
            let oldest = entry.front().copied().unwrap_or(now);
            let retry = self.config.window - now.duration_since(oldest);
            counter!(ADMISSION_REJECTS_TOTAL, "scope" => "sustained").increment(1);
            return Err(AdmissionError::Sustained {
                retry_after_secs: retry.as_secs().max(1),
            });
        }

        entry.push_back(now);
        Ok(())
    }

    /// Drop identities with no attempts left in-window.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut attempts = self.attempts.lock();
        let before = attempts.len();
        attempts.retain(|_, entry| {
            while entry
                .front()
                .is_some_and(|t| now.duration_since(*t) >= self.config.window)
            {
                let _ = entry.pop_front();
            }
            !entry.is_empty()
        });
        let removed = before - attempts.len();
        if removed > 0 {
            debug!(removed, "admission sweep dropped idle identities");
        }
    }

    /// Number of identities currently tracked.
    #[must_use]
    pub fn tracked_operators(&self) -> usize {
        self.attempts.lock().len()
    }
}

/// Periodically [`ConnectionGate::sweep`] until cancelled.
pub async fn run_sweep(gate: Arc<ConnectionGate>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    // The immediate first tick would sweep an empty table.
    let _ = ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => gate.sweep(),
            () = cancel.cancelled() => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tokio::time::advance;

    fn gate() -> ConnectionGate {
        // Default thresholds: burst 5 in 5s, sustained 15 in 60s.
        ConnectionGate::new(GateConfig::default())
    }

    fn op(name: &str) -> OperatorId {
        OperatorId::from(name)
    }

    #[tokio::test(start_paused = true)]
    async fn sixth_attempt_in_burst_window_is_rejected() {
        let gate = gate();
        for _ in 0..5 {
            gate.check(&op("a")).unwrap();
        }
        let err = gate.check(&op("a")).unwrap_err();
        assert_matches!(err, AdmissionError::Burst { .. });
        assert!(err.retry_after_secs() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_attempts_pass_burst_up_to_sustained_limit() {
        let gate = gate();
        // 2s spacing keeps at most 3 attempts inside the 5s burst window.
        for i in 0..15 {
            assert!(gate.check(&op("a")).is_ok(), "attempt {i} should be admitted");
            advance(Duration::from_secs(2)).await;
        }
        // 15 attempts within the last 60s: the 16th trips the sustained check.
        let err = gate.check(&op("a")).unwrap_err();
        assert_matches!(err, AdmissionError::Sustained { .. });
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_admits_again_after_age_out() {
        let gate = gate();
        for _ in 0..15 {
            gate.check(&op("a")).unwrap();
            advance(Duration::from_secs(2)).await;
        }
        assert!(gate.check(&op("a")).is_err());

        // The oldest attempt was 30s ago; push it past the 60s window.
        advance(Duration::from_secs(31)).await;
        assert!(gate.check(&op("a")).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn burst_admits_again_after_grace_window() {
        let gate = gate();
        for _ in 0..5 {
            gate.check(&op("a")).unwrap();
        }
        assert!(gate.check(&op("a")).is_err());
        advance(Duration::from_secs(6)).await;
        assert!(gate.check(&op("a")).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn identities_are_scoped() {
        let gate = gate();
        for _ in 0..5 {
            gate.check(&op("flooder")).unwrap();
        }
        assert!(gate.check(&op("flooder")).is_err());
        // A different operator is unaffected.
        assert!(gate.check(&op("calm")).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_attempts_are_not_recorded() {
        let gate = gate();
        for _ in 0..5 {
            gate.check(&op("a")).unwrap();
        }
        for _ in 0..10 {
            assert!(gate.check(&op("a")).is_err());
        }
        // Only the 5 admitted attempts count; once they age out of the burst
        // window the operator is admitted again.
        advance(Duration::from_secs(6)).await;
        assert!(gate.check(&op("a")).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_drops_idle_identities() {
        let gate = gate();
        gate.check(&op("a")).unwrap();
        gate.check(&op("b")).unwrap();
        assert_eq!(gate.tracked_operators(), 2);

        advance(Duration::from_secs(61)).await;
        gate.check(&op("b")).unwrap();
        gate.sweep();
        assert_eq!(gate.tracked_operators(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn run_sweep_is_cancellable() {
        let gate = Arc::new(gate());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_sweep(
            gate.clone(),
            Duration::from_secs(60),
            cancel.clone(),
        ));
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn run_sweep_prunes_on_tick() {
        let gate = Arc::new(gate());
        gate.check(&op("a")).unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_sweep(
            gate.clone(),
            Duration::from_secs(30),
            cancel.clone(),
        ));

        // Past the window plus one sweep tick.
        tokio::task::yield_now().await;
        advance(Duration::from_secs(91)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(gate.tracked_operators(), 0);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn retry_hint_reflects_oldest_attempt() {
        let gate = gate();
        for _ in 0..15 {
            gate.check(&op("a")).unwrap();
            advance(Duration::from_secs(2)).await;
        }
        advance(Duration::from_secs(10)).await;
        let err = gate.check(&op("a")).unwrap_err();
        // Oldest attempt is 40s old in a 60s window → 20s to wait.
        assert_matches!(err, AdmissionError::Sustained { .. });
        assert_eq!(err.retry_after_secs(), 20);
    }
}
