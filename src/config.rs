use chrono::Duration;

/// Engine tuning knobs. The observed tutoring platforms never pin these
/// values down, so they are configuration with documented defaults rather
/// than constants.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a booking may sit in `pending` before auto-expiry (default 24h).
    pub pending_ttl: Duration,
    /// A pending booking always expires at least this long before the session
    /// starts, so tutors don't get confirmations landing mid-lesson
    /// (default 30min).
    pub expiry_buffer: Duration,
    /// How often the sweeper wakes up (default 5s).
    pub sweep_interval: std::time::Duration,
    /// Per-run time budget for one sweep pass; leftover expirations resume on
    /// the next tick (default 1s).
    pub sweep_budget: std::time::Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pending_ttl: Duration::hours(24),
            expiry_buffer: Duration::minutes(30),
            sweep_interval: std::time::Duration::from_secs(5),
            sweep_budget: std::time::Duration::from_secs(1),
        }
    }
}
