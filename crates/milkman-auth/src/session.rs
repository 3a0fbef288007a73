//! The authenticated session as seen by the rest of the application.
//!
//! [`AuthSessionManager`] owns the in-memory identity and drives the
//! [`TokenStore`], the [`SessionTimeoutMonitor`] and the
//! [`VisibilityObserver`]. UI code subscribes to [`SessionEvent`]s rather than
//! polling.

use crate::activity::{ActivitySource, PageEvent, SubscriptionId};
use crate::backend::{Authenticator, Credentials, LogoutReason, SessionHooks};
use crate::error::{AuthError, Result};
use crate::storage::{MemoryStorage, Storage};
use crate::timeout::{SessionTimeoutMonitor, TimeoutConfig, TimeoutState};
use crate::timer::{Scheduler, TokioScheduler};
use crate::token_store::TokenStore;
use crate::visibility::{VisibilityObserver, VisibilityOutcome};
use milkman_core::{Session, UserIdentity};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use tokio::sync::broadcast;

/// Route the UI navigates to after a forced logout.
pub const LOGIN_ROUTE: &str = "/login";

const INVALID_CREDENTIALS: &str = "Invalid credentials";
const LOGIN_FAILED: &str = "Login failed";

/// Result of a login attempt that reached a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Session established
    Success(UserIdentity),
    /// Login refused; `message` is safe to show the user
    Rejected {
        /// User-facing explanation
        message: String,
    },
}

impl LoginOutcome {
    /// Whether the login succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Session lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A login succeeded
    LoggedIn(UserIdentity),
    /// A persisted session was picked up on start
    Restored(UserIdentity),
    /// Identity fields changed after a token refresh
    IdentityChanged(UserIdentity),
    /// The session ended
    LoggedOut,
    /// The inactivity warning should be shown
    Warning,
    /// The inactivity warning was dismissed
    WarningDismissed,
    /// The inactivity timeout elapsed
    TimedOut,
    /// The session was ended by the system; navigate to `redirect_to`
    ForcedLogout {
        /// Why
        reason: LogoutReason,
        /// Route to show next
        redirect_to: &'static str,
    },
}

/// Builder for [`AuthSessionManager`].
pub struct AuthSessionManagerBuilder {
    store: Arc<TokenStore>,
    authenticator: Arc<dyn Authenticator>,
    session_storage: Option<Arc<dyn Storage>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    timeout: TimeoutConfig,
    event_capacity: usize,
}

impl AuthSessionManagerBuilder {
    /// Storage cleared on logout and page unload. Defaults to a fresh [`MemoryStorage`].
    #[must_use]
    pub fn session_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.session_storage = Some(storage);
        self
    }

    /// Timer backend. Defaults to tokio on the current runtime.
    #[must_use]
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Inactivity timing.
    #[must_use]
    pub fn timeout(mut self, timeout: TimeoutConfig) -> Self {
        self.timeout = timeout;
        self
    }

    /// Buffered events per subscriber before slow subscribers start lagging.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    /// Build the manager.
    ///
    /// # Errors
    /// [`AuthError::NoRuntime`] if no scheduler was given and the caller is not
    /// inside a tokio runtime.
    pub fn build(self) -> Result<Arc<AuthSessionManager>> {
        let scheduler: Arc<dyn Scheduler> = match self.scheduler {
            Some(s) => s,
            None => Arc::new(TokioScheduler::try_current().ok_or(AuthError::NoRuntime)?),
        };
        let session_storage = self
            .session_storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        let (events, _) = broadcast::channel(self.event_capacity);
        let clock = Arc::clone(self.store.clock());
        let visibility = VisibilityObserver::new(
            Arc::clone(&self.store),
            Arc::clone(&session_storage),
            self.timeout.hard_delay(),
        );

        Ok(Arc::new_cyclic(|weak: &Weak<AuthSessionManager>| {
            let on_warning = {
                let weak = weak.clone();
                Arc::new(move || {
                    if let Some(manager) = weak.upgrade() {
                        manager.show_warning();
                    }
                })
            };
            let on_timeout = {
                let weak = weak.clone();
                Arc::new(move || {
                    if let Some(manager) = weak.upgrade() {
                        manager.emit(SessionEvent::TimedOut);
                        manager.force_logout(LogoutReason::InactivityTimeout);
                    }
                })
            };

            AuthSessionManager {
                store: self.store,
                session_storage,
                authenticator: self.authenticator,
                monitor: SessionTimeoutMonitor::new(
                    self.timeout,
                    scheduler,
                    clock,
                    on_warning,
                    on_timeout,
                ),
                visibility,
                user: RwLock::new(None),
                warning_visible: AtomicBool::new(false),
                events,
                subscription: Mutex::new(None),
            }
        }))
    }
}

/// Owns the login state.
pub struct AuthSessionManager {
    store: Arc<TokenStore>,
    session_storage: Arc<dyn Storage>,
    authenticator: Arc<dyn Authenticator>,
    monitor: SessionTimeoutMonitor,
    visibility: VisibilityObserver,
    user: RwLock<Option<UserIdentity>>,
    warning_visible: AtomicBool,
    events: broadcast::Sender<SessionEvent>,
    subscription: Mutex<Option<(Arc<dyn ActivitySource>, SubscriptionId)>>,
}

impl AuthSessionManager {
    /// Start building a manager over `store` that logs in through `authenticator`.
    pub fn builder(
        store: Arc<TokenStore>,
        authenticator: Arc<dyn Authenticator>,
    ) -> AuthSessionManagerBuilder {
        AuthSessionManagerBuilder {
            store,
            authenticator,
            session_storage: None,
            scheduler: None,
            timeout: TimeoutConfig::default(),
            event_capacity: 32,
        }
    }

    /// Pick up a persisted session.
    ///
    /// If the session was flagged expired while the page was hidden, all
    /// storage is wiped instead. Returns the restored identity, if any.
    pub fn restore_on_load(&self) -> Result<Option<UserIdentity>> {
        if self.store.is_marked_expired()? {
            tracing::info!("Persisted session was flagged expired, clearing storage");
            self.store.clear_all()?;
            self.set_user(None);
            return Ok(None);
        }

        let Some(session) = self.store.load()? else {
            tracing::debug!("No persisted session to restore");
            return Ok(None);
        };

        let user = session.user().clone();
        self.set_user(Some(user.clone()));
        self.monitor.reset_timer();
        tracing::info!(customer_id = %user.customer_id, role = %user.role, "Session restored");
        self.emit(SessionEvent::Restored(user.clone()));
        Ok(Some(user))
    }

    /// Log in with a phone number (or email) and PIN.
    ///
    /// Rejections are returned as [`LoginOutcome::Rejected`] and leave storage
    /// untouched. Only storage failures surface as errors.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<LoginOutcome> {
        let credentials = Credentials::new(identifier, secret);

        let response = match self.authenticator.authenticate(&credentials).await {
            Ok(response) => response,
            Err(AuthError::Backend { status, message }) => {
                tracing::warn!(?status, "Login request failed");
                let message = message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| LOGIN_FAILED.to_string());
                return Ok(LoginOutcome::Rejected { message });
            }
            Err(e) => return Err(e),
        };

        let (Some(access), true) = (response.access_token(), response.is_success()) else {
            tracing::info!(status = ?response.status, "Login rejected by backend");
            return Ok(rejected(INVALID_CREDENTIALS));
        };
        let Some(user) = response.identity() else {
            tracing::warn!("Successful login response carried no customer id");
            return Ok(rejected(INVALID_CREDENTIALS));
        };

        let session = Session::new(
            access,
            response.refresh_token.clone().unwrap_or_default(),
            user.clone(),
            self.store.clock().now_millis(),
        );
        self.store.save(&session)?;
        self.store.clear_expired_flag()?;

        self.set_user(Some(user.clone()));
        self.warning_visible.store(false, Ordering::SeqCst);
        self.monitor.reset_timer();

        tracing::info!(customer_id = %user.customer_id, role = %user.role, "Logged in");
        self.emit(SessionEvent::LoggedIn(user.clone()));
        Ok(LoginOutcome::Success(user))
    }

    /// End the session. Safe to call when already logged out.
    pub fn logout(&self) -> Result<()> {
        self.monitor.clear_timers();
        self.warning_visible.store(false, Ordering::SeqCst);
        let previous = self.take_user();

        self.store.clear()?;
        self.session_storage.clear()?;

        if let Some(user) = previous {
            tracing::info!(customer_id = %user.customer_id, "Logged out");
            self.emit(SessionEvent::LoggedOut);
        }
        Ok(())
    }

    /// End the session on the system's initiative and ask the UI to show the
    /// login page.
    pub fn force_logout(&self, reason: LogoutReason) {
        tracing::info!(%reason, "Forcing logout");
        if let Err(e) = self.logout() {
            tracing::warn!(error = %e, "Failed to clear session storage during forced logout");
        }
        self.emit(SessionEvent::ForcedLogout {
            reason,
            redirect_to: LOGIN_ROUTE,
        });
    }

    /// Hide the inactivity warning and restart the timers.
    pub fn dismiss_warning(&self) {
        self.warning_visible.store(false, Ordering::SeqCst);
        if !self.is_authenticated() {
            return;
        }
        self.monitor.reset_timer();
        self.emit(SessionEvent::WarningDismissed);
    }

    /// React to user activity, visibility changes and unload.
    pub fn handle_page_event(&self, event: &PageEvent) {
        if let PageEvent::Activity(kind) = event {
            if !self.is_authenticated() {
                return;
            }
            tracing::trace!(?kind, "User activity");
            self.monitor.record_activity();
            self.warning_visible.store(false, Ordering::SeqCst);
            if let Err(e) = self.store.touch_now() {
                tracing::warn!(error = %e, "Failed to persist activity timestamp");
            }
            return;
        }

        match self.visibility.handle(event) {
            Ok(VisibilityOutcome::Expired) if self.is_authenticated() => {
                self.force_logout(LogoutReason::ExpiredWhileHidden);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, ?event, "Failed to handle page event"),
        }
    }

    /// Subscribe to events from `source`, replacing any earlier source.
    pub fn attach_activity_source(self: &Arc<Self>, source: Arc<dyn ActivitySource>) {
        self.detach_activity_source();

        let weak = Arc::downgrade(self);
        let id = source.subscribe(Arc::new(move |event: &PageEvent| {
            if let Some(manager) = weak.upgrade() {
                manager.handle_page_event(event);
            }
        }));
        *self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some((source, id));
    }

    /// Stop listening to the attached activity source.
    pub fn detach_activity_source(&self) {
        let previous = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some((source, id)) = previous {
            source.unsubscribe(id);
        }
    }

    /// Whether the current user is an administrator.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.read_user().as_ref().is_some_and(UserIdentity::is_admin)
    }

    /// The logged-in user.
    #[must_use]
    pub fn current_user(&self) -> Option<UserIdentity> {
        self.read_user().clone()
    }

    /// Whether a user is logged in.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.read_user().is_some()
    }

    /// Whether the inactivity warning is currently showing.
    #[must_use]
    pub fn warning_visible(&self) -> bool {
        self.warning_visible.load(Ordering::SeqCst)
    }

    /// Inactivity deadlines.
    #[must_use]
    pub fn timeout_state(&self) -> TimeoutState {
        self.monitor.state()
    }

    /// Receive future [`SessionEvent`]s.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Underlying token store.
    #[must_use]
    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    fn show_warning(&self) {
        if self.is_authenticated() {
            self.warning_visible.store(true, Ordering::SeqCst);
            self.emit(SessionEvent::Warning);
        }
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn read_user(&self) -> std::sync::RwLockReadGuard<'_, Option<UserIdentity>> {
        self.user.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_user(&self, user: Option<UserIdentity>) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = user;
    }

    fn take_user(&self) -> Option<UserIdentity> {
        self.user
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl SessionHooks for AuthSessionManager {
    fn force_logout(&self, reason: LogoutReason) {
        AuthSessionManager::force_logout(self, reason);
    }

    fn identity_changed(&self, user: &UserIdentity) {
        let mut current = self.user.write().unwrap_or_else(PoisonError::into_inner);
        if current.is_none() || current.as_ref() == Some(user) {
            return;
        }
        *current = Some(user.clone());
        drop(current);
        tracing::info!(customer_id = %user.customer_id, role = %user.role, "Identity updated from refresh");
        self.emit(SessionEvent::IdentityChanged(user.clone()));
    }
}

impl fmt::Debug for AuthSessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSessionManager")
            .field("user", &*self.read_user())
            .field("warning_visible", &self.warning_visible())
            .field("monitor", &self.monitor)
            .finish_non_exhaustive()
    }
}

impl Drop for AuthSessionManager {
    fn drop(&mut self) {
        self.detach_activity_source();
    }
}

fn rejected(message: &str) -> LoginOutcome {
    LoginOutcome::Rejected {
        message: message.to_string(),
    }
}
