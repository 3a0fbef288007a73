//! Inactivity timeout with an advance warning.
//!
//! Once armed, the monitor schedules two callbacks measured from the last
//! reset: a warning at `timeout - warning` and a hard timeout at `timeout`.
//! Every reset cancels the previous pair and bumps a generation counter; a
//! callback that wakes up under an older generation does nothing, which covers
//! the window between a timer firing and its handle being cancelled.

use crate::error::{AuthError, Result};
use crate::timer::{Scheduler, TimerHandle};
use milkman_core::{Clock, SessionConfig};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

/// Timing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    timeout: Duration,
    warning: Duration,
    enabled: bool,
}

impl TimeoutConfig {
    /// Build from whole minutes.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidConfig`] unless `0 <= warning < timeout`.
    pub fn from_minutes(timeout_minutes: u32, warning_minutes: u32, enabled: bool) -> Result<Self> {
        Self::new(
            Duration::from_secs(u64::from(timeout_minutes) * 60),
            Duration::from_secs(u64::from(warning_minutes) * 60),
            enabled,
        )
    }

    /// Build from arbitrary durations.
    pub fn new(timeout: Duration, warning: Duration, enabled: bool) -> Result<Self> {
        if timeout.is_zero() {
            return Err(AuthError::InvalidConfig(
                "timeout must be greater than zero".to_string(),
            ));
        }
        if warning >= timeout {
            return Err(AuthError::InvalidConfig(format!(
                "warning ({warning:?}) must be shorter than timeout ({timeout:?})"
            )));
        }
        Ok(Self {
            timeout,
            warning,
            enabled,
        })
    }

    /// Take the timing from the `[session]` configuration section.
    pub fn from_session_config(config: &SessionConfig) -> Result<Self> {
        Self::from_minutes(config.timeout_minutes, config.warning_minutes, config.enabled)
    }

    /// Delay from reset to the warning callback.
    #[must_use]
    pub fn warning_delay(&self) -> Duration {
        self.timeout - self.warning
    }

    /// Delay from reset to the timeout callback.
    #[must_use]
    pub fn hard_delay(&self) -> Duration {
        self.timeout
    }

    /// Whether timers are scheduled at all.
    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30 * 60),
            warning: Duration::from_secs(2 * 60),
            enabled: true,
        }
    }
}

/// Snapshot of the monitor's deadlines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeoutState {
    /// The warning callback has fired since the last reset
    pub warning_fired: bool,
    /// When the warning fires, epoch millis
    pub warning_deadline_epoch_millis: Option<i64>,
    /// When the session times out, epoch millis
    pub timeout_deadline_epoch_millis: Option<i64>,
}

/// Callback invoked by the monitor.
pub type Callback = Arc<dyn Fn() + Send + Sync + 'static>;

#[derive(Debug, Default)]
struct MonitorInner {
    generation: u64,
    state: TimeoutState,
    warning_timer: Option<TimerHandle>,
    timeout_timer: Option<TimerHandle>,
}

impl MonitorInner {
    fn armed(&self) -> bool {
        self.state.timeout_deadline_epoch_millis.is_some()
    }

    fn disarm(&mut self) -> (Option<TimerHandle>, Option<TimerHandle>) {
        self.generation += 1;
        self.state = TimeoutState::default();
        (self.warning_timer.take(), self.timeout_timer.take())
    }
}

/// Inactivity monitor.
pub struct SessionTimeoutMonitor {
    config: TimeoutConfig,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    on_warning: Callback,
    on_timeout: Callback,
    inner: Arc<Mutex<MonitorInner>>,
}

impl SessionTimeoutMonitor {
    /// Create a disarmed monitor.
    pub fn new(
        config: TimeoutConfig,
        scheduler: Arc<dyn Scheduler>,
        clock: Arc<dyn Clock>,
        on_warning: Callback,
        on_timeout: Callback,
    ) -> Self {
        Self {
            config,
            scheduler,
            clock,
            on_warning,
            on_timeout,
            inner: Arc::default(),
        }
    }

    /// Timing parameters.
    #[must_use]
    pub fn config(&self) -> &TimeoutConfig {
        &self.config
    }

    /// Cancel pending callbacks and schedule a fresh warning/timeout pair.
    ///
    /// Does nothing when the monitor is disabled.
    pub fn reset_timer(&self) {
        if !self.config.enabled {
            return;
        }

        let now = self.clock.now_millis();
        let warning_delay = self.config.warning_delay();
        let hard_delay = self.config.hard_delay();

        let mut inner = lock(&self.inner);
        let stale = inner.disarm();
        let generation = inner.generation;

        inner.state.warning_deadline_epoch_millis = Some(now + millis(warning_delay));
        inner.state.timeout_deadline_epoch_millis = Some(now + millis(hard_delay));

        let weak = Arc::downgrade(&self.inner);
        let callback = Arc::clone(&self.on_warning);
        inner.warning_timer = Some(self.scheduler.schedule(
            warning_delay,
            Box::new(move || fire_warning(&weak, generation, &callback)),
        ));

        let weak = Arc::downgrade(&self.inner);
        let callback = Arc::clone(&self.on_timeout);
        inner.timeout_timer = Some(self.scheduler.schedule(
            hard_delay,
            Box::new(move || fire_timeout(&weak, generation, &callback)),
        ));
        drop(inner);
        drop(stale);

        tracing::trace!(generation, "Session timers reset");
    }

    /// Reset only if currently armed. Returns whether a reset happened.
    pub fn record_activity(&self) -> bool {
        if lock(&self.inner).armed() {
            self.reset_timer();
            true
        } else {
            false
        }
    }

    /// Cancel both callbacks and forget any shown warning.
    pub fn clear_timers(&self) {
        let stale = lock(&self.inner).disarm();
        drop(stale);
        tracing::trace!("Session timers cleared");
    }

    /// Whether a timeout is pending.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        lock(&self.inner).armed()
    }

    /// Current deadlines.
    #[must_use]
    pub fn state(&self) -> TimeoutState {
        lock(&self.inner).state
    }
}

impl fmt::Debug for SessionTimeoutMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTimeoutMonitor")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Drop for SessionTimeoutMonitor {
    fn drop(&mut self) {
        self.clear_timers();
    }
}

fn lock(inner: &Mutex<MonitorInner>) -> MutexGuard<'_, MonitorInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

fn fire_warning(inner: &Weak<Mutex<MonitorInner>>, generation: u64, callback: &Callback) {
    let Some(inner) = inner.upgrade() else { return };
    {
        let mut guard = lock(&inner);
        if guard.generation != generation || guard.state.warning_fired {
            return;
        }
        guard.state.warning_fired = true;
        guard.warning_timer = None;
    }
    tracing::debug!("Session inactivity warning");
    callback();
}

fn fire_timeout(inner: &Weak<Mutex<MonitorInner>>, generation: u64, callback: &Callback) {
    let Some(inner) = inner.upgrade() else { return };
    let stale = {
        let mut guard = lock(&inner);
        if guard.generation != generation {
            return;
        }
        guard.disarm()
    };
    drop(stale);
    tracing::info!("Session timed out after inactivity");
    callback();
}
