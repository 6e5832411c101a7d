// Session timeout controller
// Drives the Unauthenticated -> Active -> Warning -> Expired lifecycle for the user bound to this device

use super::observer::SessionObserver;
use super::timers::{TimerKind, TimerSet};
use super::types::{
    ActivityKind, ExpiryReason, SessionConfig, SessionSnapshot, UserSessionState, session_key,
};
use crate::clock::Clock;
use crate::registry::DeviceRegistry;
use crate::storage::KeyValueStore;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

/// Per-device session controller.
///
/// Timers are plain deadlines in a [`TimerSet`]; the owner calls [`poll`]
/// whenever the clock reaches [`next_deadline`]. Every transition clears the
/// whole set before arming new deadlines.
///
/// [`poll`]: SessionController::poll
/// [`next_deadline`]: SessionController::next_deadline
pub struct SessionController {
    registry: Arc<DeviceRegistry>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn SessionObserver>,
    config: SessionConfig,
    timers: TimerSet,
    is_authenticated: bool,
    show_warning: bool,
    remaining_time: Duration,
    current_user: Option<String>,
}

impl SessionController {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        observer: Arc<dyn SessionObserver>,
        config: SessionConfig,
    ) -> Self {
        Self {
            registry,
            store,
            clock,
            observer,
            config,
            timers: TimerSet::default(),
            is_authenticated: false,
            show_warning: false,
            remaining_time: Duration::zero(),
            current_user: None,
        }
    }

    /// Resume whatever session this device held before the process started.
    ///
    /// A live stored session is restored with timers re-armed from its stored
    /// expiry, a stale one is expired, and a registry binding without any
    /// stored session starts a fresh login.
    pub async fn restore(&mut self) {
        let Some(username) = self.registry.has_active_session_on_device().await else {
            debug!(
                "No user bound to device {}",
                self.registry.current_device_id()
            );
            return;
        };

        self.current_user = Some(username.clone());
        if self.is_hard_expired() {
            self.expire(ExpiryReason::HardDeadline).await;
            return;
        }

        match self.load_session(&username).await {
            Some(state) if state.is_authenticated => {
                if state.is_expired_at(self.clock.now()) {
                    info!("Stored session for {} has expired", username);
                    self.expire(ExpiryReason::IdleTimeout).await;
                } else {
                    info!(
                        "Restored session for {} (expires at {})",
                        username, state.expires_at
                    );
                    self.is_authenticated = true;
                    self.start_session_timers().await;
                }
            }
            _ => {
                debug!("No stored session for {}, starting a fresh one", username);
                self.login().await;
            }
        }
    }

    /// Start a session for the user the registry binds to this device.
    ///
    /// Returns false when no user is bound or the hard deadline has passed.
    pub async fn login(&mut self) -> bool {
        if self.is_hard_expired() {
            warn!("Login refused: hard expiry deadline has passed");
            self.expire(ExpiryReason::HardDeadline).await;
            return false;
        }

        let Some(username) = self.registry.has_active_session_on_device().await else {
            debug!(
                "Login ignored: no user bound to device {}",
                self.registry.current_device_id()
            );
            return false;
        };

        let state = UserSessionState::new(&username, self.clock.now(), self.config.timeout());
        self.save_session(&state).await;

        info!(
            "Session started for {} (expires at {})",
            username, state.expires_at
        );

        self.is_authenticated = true;
        self.show_warning = false;
        self.remaining_time = Duration::zero();
        self.current_user = Some(username);
        self.start_session_timers().await;

        self.is_authenticated
    }

    /// End the session immediately regardless of remaining time
    pub async fn logout(&mut self) {
        info!("Logout requested for {:?}", self.current_user);
        self.expire(ExpiryReason::Logout).await;
    }

    /// Explicit renewal, e.g. from the warning dialog
    pub async fn extend_session(&mut self) {
        if self.is_hard_expired() {
            self.expire(ExpiryReason::HardDeadline).await;
            return;
        }
        self.renew().await;
    }

    /// Feed a user interaction; renews the session while authenticated
    pub async fn record_activity(&mut self, kind: ActivityKind) {
        if !self.is_authenticated {
            trace!("Ignoring {} while unauthenticated", kind.as_str());
            return;
        }
        trace!("Activity {} renews session", kind.as_str());
        self.renew().await;
    }

    /// Fire every timer due at the current instant
    pub async fn poll(&mut self) {
        let now = self.clock.now();
        while let Some((kind, at)) = self.timers.pop_due(now) {
            if self.config.is_hard_expired(now) {
                self.expire(ExpiryReason::HardDeadline).await;
                return;
            }
            self.fire(kind, at, now).await;
        }
    }

    /// Earliest instant at which [`poll`](Self::poll) has work to do
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.timers.next_deadline()
    }

    pub fn is_authenticated(&self) -> bool {
        self.is_authenticated
    }

    pub fn show_warning(&self) -> bool {
        self.show_warning
    }

    pub fn remaining_time(&self) -> Duration {
        self.remaining_time
    }

    pub fn current_user(&self) -> Option<&str> {
        self.current_user.as_deref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            is_authenticated: self.is_authenticated,
            show_warning: self.show_warning,
            remaining_time: self.remaining_time,
            current_user: self.current_user.clone(),
        }
    }

    pub fn timers(&self) -> &TimerSet {
        &self.timers
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Stored session of the user bound to this device, if any
    pub async fn current_session(&self) -> Option<UserSessionState> {
        let username = self.registry.has_active_session_on_device().await?;
        self.load_session(&username).await
    }

    fn is_hard_expired(&self) -> bool {
        self.config.is_hard_expired(self.clock.now())
    }

    async fn renew(&mut self) {
        if self.is_hard_expired() {
            self.expire(ExpiryReason::HardDeadline).await;
            return;
        }

        let Some(mut state) = self.current_session().await else {
            debug!("Renewal ignored: no session on this device");
            return;
        };

        let now = self.clock.now();
        if state.is_expired_at(now) {
            self.expire(ExpiryReason::IdleTimeout).await;
            return;
        }

        state.renew(now, self.config.timeout());
        self.save_session(&state).await;
        debug!(
            "Session for {} renewed until {}",
            state.username, state.expires_at
        );

        self.show_warning = false;
        self.remaining_time = Duration::zero();
        self.start_session_timers().await;
    }

    async fn start_session_timers(&mut self) {
        self.timers.clear();

        if self.is_hard_expired() {
            self.expire(ExpiryReason::HardDeadline).await;
            return;
        }

        let Some(state) = self.current_session().await else {
            return;
        };

        let now = self.clock.now();
        if state.is_expired_at(now) {
            self.expire(ExpiryReason::IdleTimeout).await;
            return;
        }

        let warning_at = state.expires_at - self.config.warning_window();
        if warning_at > now {
            self.timers.arm(TimerKind::Warning, warning_at);
        } else {
            // Already inside the warning window
            self.show_warning = true;
            self.remaining_time = state.remaining_at(now);
            self.observer.on_warning(self.remaining_time);
            self.timers
                .arm(TimerKind::Countdown, now + self.config.countdown_tick());
        }

        self.timers.arm(TimerKind::Expiry, state.expires_at);
        self.timers
            .arm(TimerKind::ConsistencyCheck, now + self.config.check_interval());
    }

    async fn fire(&mut self, kind: TimerKind, at: DateTime<Utc>, now: DateTime<Utc>) {
        match kind {
            TimerKind::Warning => {
                self.show_warning = true;
                self.remaining_time = self.config.warning_window();
                info!(
                    "Session for {:?} expires in {}s",
                    self.current_user,
                    self.remaining_time.num_seconds()
                );
                self.observer.on_warning(self.remaining_time);
                self.timers
                    .arm(TimerKind::Countdown, at + self.config.countdown_tick());
            }
            TimerKind::Countdown => {
                let tick = self.config.countdown_tick();
                if self.remaining_time <= tick {
                    self.remaining_time = Duration::zero();
                } else {
                    self.remaining_time = self.remaining_time - tick;
                    self.timers.arm(TimerKind::Countdown, at + tick);
                }
            }
            TimerKind::Expiry => {
                info!("Session for {:?} timed out", self.current_user);
                self.expire(ExpiryReason::IdleTimeout).await;
            }
            TimerKind::ConsistencyCheck => match self.current_session().await {
                Some(state) if state.is_expired_at(now) => {
                    info!("Periodic check found expired session for {}", state.username);
                    self.expire(ExpiryReason::IdleTimeout).await;
                }
                _ => self
                    .timers
                    .arm(TimerKind::ConsistencyCheck, at + self.config.check_interval()),
            },
        }
    }

    /// Purge the session record and registry binding, cancel timers and notify
    async fn expire(&mut self, reason: ExpiryReason) {
        self.timers.clear();

        let username = match self.current_user.take() {
            Some(username) => Some(username),
            None => self.registry.has_active_session_on_device().await,
        };
        let had_session = self.is_authenticated || username.is_some();

        if let Some(username) = &username {
            if let Err(e) = self.store.remove(&session_key(username)).await {
                error!("Failed to remove session record for {}: {}", username, e);
            }
            self.registry.logout(username).await;
        }

        self.is_authenticated = false;
        self.show_warning = false;
        self.remaining_time = Duration::zero();

        if had_session {
            info!("Session for {:?} ended: {:?}", username, reason);
            self.observer.on_session_expired(reason);
        } else {
            debug!("No session to end ({:?})", reason);
        }
    }

    async fn load_session(&self, username: &str) -> Option<UserSessionState> {
        match self.store.get(&session_key(username)).await {
            Ok(Some(raw)) => UserSessionState::decode(&raw),
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to load session for {}: {}", username, e);
                None
            }
        }
    }

    async fn save_session(&self, state: &UserSessionState) {
        let encoded = match state.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                error!("Failed to encode session for {}: {}", state.username, e);
                return;
            }
        };

        if let Err(e) = self.store.set(&session_key(&state.username), encoded).await {
            error!("Failed to save session for {}: {}", state.username, e);
        }
    }
}
