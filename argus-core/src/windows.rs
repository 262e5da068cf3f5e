//! Named rolling windows.
//!
//! Windows are configuration, not code: the rule engine and profile tracker
//! look them up by name so operators can retune them without touching either.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

pub const LOGIN_FAILURE_WINDOW: &str = "login_failure_window";
pub const SUSPICIOUS_IP_WINDOW: &str = "suspicious_ip_window";
pub const API_BURST_WINDOW: &str = "api_burst_window";
pub const MFA_FAIL_WINDOW: &str = "mfa_fail_window";
pub const RAPID_REQUEST_WINDOW: &str = "rapid_request_window";
pub const USER_BURST_WINDOW: &str = "user_burst_window";

/// Registry of named rolling windows, all relative to `Clock::now_ms`.
pub struct WindowRegistry {
    windows: RwLock<HashMap<String, Duration>>,
}

impl WindowRegistry {
    /// Registry preloaded with the standard windows.
    pub fn standard() -> Self {
        let mut windows = HashMap::new();
        windows.insert(LOGIN_FAILURE_WINDOW.into(), Duration::from_secs(300));
        windows.insert(SUSPICIOUS_IP_WINDOW.into(), Duration::from_secs(3600));
        windows.insert(API_BURST_WINDOW.into(), Duration::from_secs(60));
        windows.insert(MFA_FAIL_WINDOW.into(), Duration::from_secs(300));
        windows.insert(RAPID_REQUEST_WINDOW.into(), Duration::from_secs(60));
        windows.insert(USER_BURST_WINDOW.into(), Duration::from_secs(600));
        Self {
            windows: RwLock::new(windows),
        }
    }

    pub fn empty() -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
        }
    }

    pub fn set(&self, name: &str, duration: Duration) {
        self.windows.write().insert(name.to_string(), duration);
    }

    pub fn get(&self, name: &str) -> Option<Duration> {
        self.windows.read().get(name).copied()
    }

    /// Window duration in milliseconds, falling back to the given default.
    pub fn get_ms_or(&self, name: &str, default: Duration) -> i64 {
        self.get(name).unwrap_or(default).as_millis() as i64
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.windows.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for WindowRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_windows() {
        let reg = WindowRegistry::standard();
        assert_eq!(reg.get(LOGIN_FAILURE_WINDOW), Some(Duration::from_secs(300)));
        assert_eq!(reg.get(SUSPICIOUS_IP_WINDOW), Some(Duration::from_secs(3600)));
        assert_eq!(reg.get(RAPID_REQUEST_WINDOW), Some(Duration::from_secs(60)));
        assert_eq!(reg.get(USER_BURST_WINDOW), Some(Duration::from_secs(600)));
        assert_eq!(reg.names().len(), 6);
    }

    #[test]
    fn test_override() {
        let reg = WindowRegistry::standard();
        reg.set(LOGIN_FAILURE_WINDOW, Duration::from_secs(60));
        assert_eq!(reg.get_ms_or(LOGIN_FAILURE_WINDOW, Duration::ZERO), 60_000);
    }

    #[test]
    fn test_missing_window_uses_default() {
        let reg = WindowRegistry::empty();
        assert_eq!(reg.get("nope"), None);
        assert_eq!(reg.get_ms_or("nope", Duration::from_secs(5)), 5_000);
    }
}
