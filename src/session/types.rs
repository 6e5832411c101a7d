// Session types and data structures

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Prefix of the persisted per-user session key
pub const SESSION_KEY_PREFIX: &str = "mathAppSession_";

/// Fixed cutover instant, 2025-06-30T23:07:00Z, in Unix milliseconds.
/// No session may stay active past it.
pub const HARD_EXPIRY_DEADLINE_MS: i64 = 1_751_324_820_000;

/// Longest accepted idle timeout, one year
pub const MAX_TIMEOUT_MINUTES: i64 = 365 * 24 * 60;

/// Longest accepted consistency check interval, one day
pub const MAX_CHECK_INTERVAL_SECS: i64 = 24 * 60 * 60;

/// Longest accepted countdown tick, one hour
pub const MAX_COUNTDOWN_TICK_MS: i64 = 60 * 60 * 1000;

/// Persisted key of the session record for `username`
pub fn session_key(username: &str) -> String {
    format!("{}{}", SESSION_KEY_PREFIX, username)
}

/// The compiled-in hard expiry deadline
pub fn default_hard_expiry_deadline() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(HARD_EXPIRY_DEADLINE_MS).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Session timing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle timeout
    pub timeout_minutes: i64,
    /// How long before expiry the warning is raised
    pub warning_minutes: i64,
    /// Interval of the periodic consistency check
    pub check_interval_secs: i64,
    /// Countdown tick while the warning is shown
    pub countdown_tick_ms: i64,
    /// Absolute cutover after which every session is terminated
    pub hard_expiry_deadline: DateTime<Utc>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: 30,
            warning_minutes: 5,
            check_interval_secs: 60,
            countdown_tick_ms: 1000,
            hard_expiry_deadline: default_hard_expiry_deadline(),
        }
    }
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::minutes(self.timeout_minutes)
    }

    pub fn warning_window(&self) -> Duration {
        Duration::minutes(self.warning_minutes)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::seconds(self.check_interval_secs)
    }

    pub fn countdown_tick(&self) -> Duration {
        Duration::milliseconds(self.countdown_tick_ms)
    }

    /// Whether `now` is past the hard expiry deadline
    pub fn is_hard_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.hard_expiry_deadline
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_minutes <= 0 || self.timeout_minutes > MAX_TIMEOUT_MINUTES {
            return Err(format!(
                "Session timeout ({} min) must be between 1 and {} minutes",
                self.timeout_minutes, MAX_TIMEOUT_MINUTES
            ));
        }
        if self.warning_minutes < 0 || self.warning_minutes >= self.timeout_minutes {
            return Err(format!(
                "Warning window ({} min) must be non-negative and shorter than the timeout ({} min)",
                self.warning_minutes, self.timeout_minutes
            ));
        }
        if self.check_interval_secs <= 0 || self.check_interval_secs > MAX_CHECK_INTERVAL_SECS {
            return Err(format!(
                "Session check interval ({}s) must be between 1 and {} seconds",
                self.check_interval_secs, MAX_CHECK_INTERVAL_SECS
            ));
        }
        if self.countdown_tick_ms <= 0 || self.countdown_tick_ms > MAX_COUNTDOWN_TICK_MS {
            return Err(format!(
                "Countdown tick ({}ms) must be between 1 and {} milliseconds",
                self.countdown_tick_ms, MAX_COUNTDOWN_TICK_MS
            ));
        }
        Ok(())
    }
}

/// Per-user session record owned by the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSessionState {
    pub is_authenticated: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub login_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_activity: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    pub username: String,
}

impl UserSessionState {
    /// Create a fresh authenticated session starting at `now`
    pub fn new(username: &str, now: DateTime<Utc>, timeout: Duration) -> Self {
        Self {
            is_authenticated: true,
            login_time: now,
            last_activity: now,
            expires_at: expiry_after(now, timeout),
            username: username.to_string(),
        }
    }

    /// Push expiry forward from `now`
    pub fn renew(&mut self, now: DateTime<Utc>, timeout: Duration) {
        self.last_activity = now;
        self.expires_at = expiry_after(now, timeout);
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }

    /// Decode a persisted record; malformed input is treated as absent
    pub fn decode(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Discarding corrupt session record: {}", e);
                None
            }
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// `now + timeout`, saturating at the latest representable instant
fn expiry_after(now: DateTime<Utc>, timeout: Duration) -> DateTime<Utc> {
    now.checked_add_signed(timeout)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Qualifying user interactions that renew a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    PointerDown,
    PointerMove,
    KeyPress,
    Scroll,
    TouchStart,
    Click,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::PointerDown => "pointer_down",
            ActivityKind::PointerMove => "pointer_move",
            ActivityKind::KeyPress => "key_press",
            ActivityKind::Scroll => "scroll",
            ActivityKind::TouchStart => "touch_start",
            ActivityKind::Click => "click",
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryReason {
    /// No activity within the timeout
    IdleTimeout,
    /// The hard expiry deadline has passed
    HardDeadline,
    /// Explicit logout
    Logout,
}

/// Lifecycle phase as seen by presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Unauthenticated,
    Active,
    Warning,
}

/// Observable controller state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub is_authenticated: bool,
    pub show_warning: bool,
    pub remaining_time: Duration,
    pub current_user: Option<String>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            is_authenticated: false,
            show_warning: false,
            remaining_time: Duration::zero(),
            current_user: None,
        }
    }
}

impl SessionSnapshot {
    pub fn phase(&self) -> SessionPhase {
        match (self.is_authenticated, self.show_warning) {
            (false, _) => SessionPhase::Unauthenticated,
            (true, false) => SessionPhase::Active,
            (true, true) => SessionPhase::Warning,
        }
    }
}
