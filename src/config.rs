use std::time::Duration;

use crate::collector::DEFAULT_ENDPOINT;

/// Idle time between liveness ticks.
pub const LIVENESS_INTERVAL: Duration = Duration::from_secs(5 * 60);

const DEFAULT_QUEUE_CAPACITY: usize = 64;
const DEFAULT_SEND_RETRIES: u32 = 2;

/// What to do when the store count or a collector POST fails after retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationPolicy {
    /// Log the failure and drop the event; the liveness loop keeps running
    /// and re-attempts registration on its next tick.
    LogAndDrop,
    /// Terminate the process. Opting in reproduces the legacy semantics
    /// where telemetry was a fatal infrastructure dependency.
    ExitProcess,
}

#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// When false, every emission is a no-op and no background task starts.
    pub enabled: bool,
    pub endpoint: String,
    pub liveness_interval: Duration,
    /// Capacity of the bounded dispatch queue; a full queue drops events.
    pub queue_capacity: usize,
    /// Extra POST attempts after a transport failure, per event.
    pub send_retries: u32,
    pub escalation: EscalationPolicy,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            liveness_interval: LIVENESS_INTERVAL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            send_retries: DEFAULT_SEND_RETRIES,
            escalation: EscalationPolicy::LogAndDrop,
        }
    }
}

impl ReporterConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_collector_protocol() {
        let cfg = ReporterConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.endpoint, "http://localhost:3030/analytics");
        assert_eq!(cfg.liveness_interval, Duration::from_secs(300));
        assert_eq!(cfg.escalation, EscalationPolicy::LogAndDrop);
    }

    #[test]
    fn disabled_config_only_flips_the_gate() {
        let cfg = ReporterConfig::disabled();
        assert!(!cfg.enabled);
        assert_eq!(cfg.endpoint, ReporterConfig::default().endpoint);
    }
}
