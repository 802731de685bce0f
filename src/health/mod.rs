mod backoff;
mod controller;
mod history;
mod prober;
mod publisher;

pub use backoff::{backoff_delay, BackoffScheduler};
pub use controller::ConnectionController;
pub use history::{ErrorHistory, ErrorRecord};
pub use prober::{HealthProber, HttpProber, ProbeError, ProbeResult};
pub use publisher::{StatusPublisher, Subscription};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether dependents talk to the live dependency or the local substitute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Live,
    Fallback,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Live => "live",
            Mode::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Availability of the monitored dependency as last determined by a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Unknown,
    Checking,
    Available,
    Unavailable,
    /// Automatic retries used up; only a reset or a forced check probes again
    Exhausted,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unknown => "unknown",
            Status::Checking => "checking",
            Status::Available => "available",
            Status::Unavailable => "unavailable",
            Status::Exhausted => "exhausted",
        }
    }

    /// Numeric encoding used for the status gauge
    pub fn code(&self) -> u8 {
        match self {
            Status::Unknown => 0,
            Status::Checking => 1,
            Status::Available => 2,
            Status::Unavailable => 3,
            Status::Exhausted => 4,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authoritative connection record owned by a [`ConnectionController`].
///
/// Callers only ever see copies of it. Timestamps are Unix epoch millis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub mode: Mode,
    pub status: Status,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub last_checked_at: Option<u64>,
    pub next_check_at: Option<u64>,
}

impl ConnectionState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            mode: Mode::Live,
            status: Status::Unknown,
            attempt_count: 0,
            max_attempts,
            last_error: None,
            last_checked_at: None,
            next_check_at: None,
        }
    }

    /// Availability as seen by dependents. Fallback mode counts as available
    /// because requests are served by the substitute source.
    #[inline]
    pub fn is_available(&self) -> bool {
        self.mode == Mode::Fallback || self.status == Status::Available
    }

    /// Whether an automatic retry is currently scheduled
    #[inline]
    pub fn retry_pending(&self) -> bool {
        self.next_check_at.is_some()
    }
}

pub(crate) fn current_time_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = ConnectionState::new(5);
        assert_eq!(state.mode, Mode::Live);
        assert_eq!(state.status, Status::Unknown);
        assert_eq!(state.attempt_count, 0);
        assert_eq!(state.max_attempts, 5);
        assert!(!state.is_available());
        assert!(!state.retry_pending());
    }

    #[test]
    fn test_fallback_counts_as_available() {
        let mut state = ConnectionState::new(5);
        state.status = Status::Exhausted;
        state.mode = Mode::Fallback;
        assert!(state.is_available());
    }

    #[test]
    fn test_serialized_names() {
        let state = ConnectionState::new(3);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["mode"], "live");
        assert_eq!(json["status"], "unknown");
        assert_eq!(json["max_attempts"], 3);
        assert!(json["next_check_at"].is_null());
    }
}
