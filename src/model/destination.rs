use chrono::{DateTime, Utc};

/// Derived/aggregated health record for a destination (§3). Transitions
/// are monotonic per probe: a success resets `consecutive_failures` and
/// `unavailable_since`; a failure increments counters and sets
/// `unavailable_since` only on the *first* observed failure.
#[derive(Debug, Clone)]
pub struct DestinationHealth {
    pub available: bool,
    pub last_check: Option<DateTime<Utc>>,
    pub last_available: Option<DateTime<Utc>>,
    pub unavailable_since: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub total_checks: u64,
    pub successful_checks: u64,
}

impl Default for DestinationHealth {
    fn default() -> Self {
        Self {
            available: false,
            last_check: None,
            last_available: None,
            unavailable_since: None,
            consecutive_failures: 0,
            total_checks: 0,
            successful_checks: 0,
        }
    }
}

impl DestinationHealth {
    pub fn record(&mut self, available: bool, at: DateTime<Utc>) {
        self.last_check = Some(at);
        self.total_checks += 1;

        if available {
            self.successful_checks += 1;
            self.consecutive_failures = 0;
            self.unavailable_since = None;
            self.last_available = Some(at);
        } else {
            self.consecutive_failures += 1;
            if self.unavailable_since.is_none() {
                self.unavailable_since = Some(at);
            }
        }

        self.available = available;
    }

    pub fn availability_pct(&self) -> f64 {
        if self.total_checks == 0 {
            100.0
        } else {
            (self.successful_checks as f64 / self.total_checks as f64) * 100.0
        }
    }

    pub fn downtime(&self, now: DateTime<Utc>) -> chrono::Duration {
        match self.unavailable_since {
            Some(since) if !self.available => now - since,
            _ => chrono::Duration::zero(),
        }
    }
}
