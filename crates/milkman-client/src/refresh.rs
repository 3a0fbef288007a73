//! Single-flight access token refresh.
//!
//! When a request comes back 401 the coordinator decides what happens next:
//!
//! - **Idle** and the failed token is still the stored one: the caller becomes
//!   the leader, the state moves to refreshing, and the leader runs the refresh.
//! - **Idle** but the stored token has changed since the request was sent: a
//!   refresh already happened, so the caller just replays with the new token.
//! - **Idle** and the stored token is gone: the session already ended while
//!   the request was in flight, so there is nothing to recover.
//! - **Refreshing**: the caller queues a one-shot channel and waits for the
//!   leader's result.
//!
//! The leader settles every waiter in queue order with the same result and
//! returns the state to idle. If the leader is dropped mid-refresh, its guard
//! settles the waiters with [`RefreshError::Cancelled`].

use crate::error::RefreshError;
use milkman_auth::{LogoutReason, SessionHooks, TokenResponse, TokenStore};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use tokio::sync::oneshot;

type Waiter = oneshot::Sender<Result<String, RefreshError>>;

#[derive(Debug, Default)]
struct CoordinatorState {
    refreshing: bool,
    queue: VecDeque<Waiter>,
}

enum Ticket<'a> {
    Leader(LeaderGuard<'a>),
    Waiter(oneshot::Receiver<Result<String, RefreshError>>),
    Replay(String),
}

/// Serializes token refreshes for one client.
pub struct RefreshCoordinator {
    store: Arc<TokenStore>,
    state: Mutex<CoordinatorState>,
    hooks: RwLock<Option<Weak<dyn SessionHooks>>>,
}

impl RefreshCoordinator {
    /// Create an idle coordinator over `store`.
    pub fn new(store: Arc<TokenStore>) -> Self {
        Self {
            store,
            state: Mutex::default(),
            hooks: RwLock::new(None),
        }
    }

    /// Register who to notify when the session cannot be recovered.
    pub fn set_hooks(&self, hooks: Weak<dyn SessionHooks>) {
        *self.hooks.write().unwrap_or_else(PoisonError::into_inner) = Some(hooks);
    }

    /// Whether a refresh is in flight.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.lock().refreshing
    }

    /// Number of requests waiting on the in-flight refresh.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Obtain a token to replay a request that failed with 401.
    ///
    /// `failed_token` is the bearer the request was sent with. `refresh` is
    /// called at most once per coordinator-wide refresh, with the stored
    /// refresh token, and only by the leader.
    pub async fn recover<F, Fut>(
        &self,
        failed_token: Option<&str>,
        refresh: F,
    ) -> Result<String, RefreshError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<TokenResponse, RefreshError>>,
    {
        match self.ticket(failed_token)? {
            Ticket::Replay(token) => {
                tracing::debug!("Token changed since request was sent, replaying");
                Ok(token)
            }
            Ticket::Waiter(rx) => {
                tracing::debug!("Waiting for in-flight token refresh");
                rx.await.unwrap_or(Err(RefreshError::Cancelled))
            }
            Ticket::Leader(guard) => self.lead(guard, refresh).await,
        }
    }

    fn ticket(&self, failed_token: Option<&str>) -> Result<Ticket<'_>, RefreshError> {
        let mut state = self.lock();

        if state.refreshing {
            let (tx, rx) = oneshot::channel();
            state.queue.push_back(tx);
            return Ok(Ticket::Waiter(rx));
        }

        match self.store.access_token().map_err(storage_error)? {
            Some(current) if failed_token != Some(current.as_str()) => {
                return Ok(Ticket::Replay(current));
            }
            None if failed_token.is_some() => return Err(RefreshError::SessionEnded),
            _ => {}
        }

        state.refreshing = true;
        Ok(Ticket::Leader(LeaderGuard {
            coordinator: self,
            settled: false,
        }))
    }

    async fn lead<F, Fut>(&self, mut guard: LeaderGuard<'_>, refresh: F) -> Result<String, RefreshError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<TokenResponse, RefreshError>>,
    {
        let refresh_token = match self.store.refresh_token() {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::warn!("Received 401 with no refresh token stored");
                return Err(self.fail(&mut guard, RefreshError::MissingRefreshToken));
            }
            Err(e) => return Err(self.fail(&mut guard, storage_error(e))),
        };

        tracing::info!("Access token rejected, refreshing");
        let outcome = match refresh(refresh_token.clone()).await {
            Ok(response) => self.install(&refresh_token, &response),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(token) => {
                guard.settle(&Ok(token.clone()));
                tracing::info!("Access token refreshed");
                Ok(token)
            }
            Err(RefreshError::SessionEnded) => {
                // Whoever ended the session already cleaned up; the store may
                // even hold a newer login that must not be cleared.
                tracing::info!("Session ended while refreshing, dropping new tokens");
                guard.settle(&Err(RefreshError::SessionEnded));
                Err(RefreshError::SessionEnded)
            }
            Err(e) => Err(self.fail(&mut guard, e)),
        }
    }

    fn install(&self, used_refresh: &str, response: &TokenResponse) -> Result<String, RefreshError> {
        let Some(token) = response.access_token() else {
            return Err(RefreshError::Rejected {
                status: None,
                message: "refresh response carried no access token".to_string(),
            });
        };
        let identity = response.identity();

        let installed = self
            .store
            .replace_tokens(
                used_refresh,
                token,
                response.refresh_token.as_deref(),
                identity.as_ref(),
            )
            .map_err(storage_error)?;
        if !installed {
            return Err(RefreshError::SessionEnded);
        }

        if let (Some(user), Some(hooks)) = (identity, self.hooks()) {
            hooks.identity_changed(&user);
        }
        Ok(token.to_string())
    }

    fn fail(&self, guard: &mut LeaderGuard<'_>, error: RefreshError) -> RefreshError {
        tracing::warn!(error = %error, "Token refresh failed, ending session");

        // Cleared before going idle, so a late 401 ends as `SessionEnded`
        // instead of starting another refresh.
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "Failed to clear tokens after refresh failure");
        }
        guard.settle(&Err(error.clone()));

        let reason = match error {
            RefreshError::MissingRefreshToken => LogoutReason::MissingRefreshToken,
            _ => LogoutReason::RefreshFailed,
        };
        if let Some(hooks) = self.hooks() {
            hooks.force_logout(reason);
        }
        error
    }

    fn hooks(&self) -> Option<Arc<dyn SessionHooks>> {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
    }

    fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("RefreshCoordinator")
            .field("refreshing", &state.refreshing)
            .field("pending", &state.queue.len())
            .finish_non_exhaustive()
    }
}

/// Held by the leader for the duration of a refresh.
struct LeaderGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl LeaderGuard<'_> {
    /// Return to idle and hand `result` to every waiter in arrival order.
    fn settle(&mut self, result: &Result<String, RefreshError>) {
        if self.settled {
            return;
        }
        self.settled = true;

        let waiters = {
            let mut state = self.coordinator.lock();
            state.refreshing = false;
            std::mem::take(&mut state.queue)
        };

        if !waiters.is_empty() {
            tracing::debug!(waiters = waiters.len(), ok = result.is_ok(), "Releasing queued requests");
        }
        for waiter in waiters {
            // A waiter whose request was dropped has gone away; nothing to do.
            let _ = waiter.send(result.clone());
        }
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!("Token refresh abandoned mid-flight");
            self.settle(&Err(RefreshError::Cancelled));
        }
    }
}

fn storage_error(e: milkman_auth::StorageError) -> RefreshError {
    RefreshError::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use milkman_auth::{MemoryStorage, Storage};
    use milkman_core::{ManualClock, Role, Session, UserIdentity};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn store_with(access: &str, refresh: &str) -> Arc<TokenStore> {
        let store = Arc::new(TokenStore::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(ManualClock::new(0)),
        ));
        store
            .save(&Session::new(
                access,
                refresh,
                UserIdentity::new("C1", "Asha", Role::Customer),
                0,
            ))
            .unwrap();
        store
    }

    fn success(token: &str) -> TokenResponse {
        TokenResponse {
            status: Some("SUCCESS".to_string()),
            auth_token: Some(token.to_string()),
            ..TokenResponse::default()
        }
    }

    #[derive(Default)]
    struct CountingHooks {
        logouts: AtomicUsize,
        renamed: AtomicUsize,
    }

    impl SessionHooks for CountingHooks {
        fn force_logout(&self, _reason: LogoutReason) {
            self.logouts.fetch_add(1, Ordering::SeqCst);
        }

        fn identity_changed(&self, _user: &UserIdentity) {
            self.renamed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_leader_refreshes_and_stores_token() {
        let store = store_with("old", "r1");
        let coordinator = RefreshCoordinator::new(store.clone());

        let token = coordinator
            .recover(Some("old"), |refresh| async move {
                assert_eq!(refresh, "r1");
                Ok(success("new"))
            })
            .await
            .unwrap();

        assert_eq!(token, "new");
        assert_eq!(store.access_token().unwrap().as_deref(), Some("new"));
        assert_eq!(store.refresh_token().unwrap().as_deref(), Some("r1"));
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_stale_token_replays_without_refresh() {
        let store = store_with("current", "r1");
        let coordinator = RefreshCoordinator::new(store);

        let refreshed = AtomicUsize::new(0);

        let token = coordinator
            .recover(Some("previous"), |_| {
                refreshed.fetch_add(1, Ordering::SeqCst);
                async { Ok(success("unused")) }
            })
            .await
            .unwrap();
        assert_eq!(token, "current");
        assert_eq!(refreshed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_refresh() {
        let store = store_with("old", "r1");
        let coordinator = Arc::new(RefreshCoordinator::new(store));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..5 {
            let coordinator = coordinator.clone();
            let calls = calls.clone();
            tasks.push(tokio::spawn(async move {
                coordinator
                    .recover(Some("old"), |_| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(success("new"))
                    })
                    .await
            }));
        }

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "new");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_rejects_waiters_and_logs_out_once() {
        let store = store_with("old", "r1");
        let coordinator = Arc::new(RefreshCoordinator::new(store.clone()));
        let hooks = Arc::new(CountingHooks::default());
        coordinator.set_hooks(Arc::downgrade(&hooks) as Weak<dyn SessionHooks>);

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let coordinator = coordinator.clone();
            tasks.push(tokio::spawn(async move {
                coordinator
                    .recover(Some("old"), |_| async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Err(RefreshError::Rejected {
                            status: Some(401),
                            message: "refresh token expired".to_string(),
                        })
                    })
                    .await
            }));
        }

        for task in tasks {
            assert!(matches!(
                task.await.unwrap(),
                Err(RefreshError::Rejected { status: Some(401), .. })
            ));
        }
        assert_eq!(hooks.logouts.load(Ordering::SeqCst), 1);
        assert!(store.access_token().unwrap().is_none());
        assert!(store.refresh_token().unwrap().is_none());
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_missing_refresh_token_skips_refresh() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set("token", "old").unwrap();
        let store = Arc::new(TokenStore::new(storage, Arc::new(ManualClock::new(0))));
        let coordinator = RefreshCoordinator::new(store.clone());
        let hooks = Arc::new(CountingHooks::default());
        coordinator.set_hooks(Arc::downgrade(&hooks) as Weak<dyn SessionHooks>);

        let refreshed = AtomicUsize::new(0);

        let err = coordinator
            .recover(Some("old"), |_| {
                refreshed.fetch_add(1, Ordering::SeqCst);
                async { Ok(success("unused")) }
            })
            .await
            .unwrap_err();

        assert_eq!(err, RefreshError::MissingRefreshToken);
        assert_eq!(refreshed.load(Ordering::SeqCst), 0);
        assert_eq!(hooks.logouts.load(Ordering::SeqCst), 1);
        assert!(store.access_token().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_without_token_in_response_fails() {
        let store = store_with("old", "r1");
        let coordinator = RefreshCoordinator::new(store.clone());

        let err = coordinator
            .recover(Some("old"), |_| async {
                Ok(TokenResponse {
                    status: Some("SUCCESS".to_string()),
                    ..TokenResponse::default()
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshError::Rejected { .. }));
        assert!(store.access_token().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_identity_from_refresh_is_propagated() {
        let store = store_with("old", "r1");
        let coordinator = RefreshCoordinator::new(store.clone());
        let hooks = Arc::new(CountingHooks::default());
        coordinator.set_hooks(Arc::downgrade(&hooks) as Weak<dyn SessionHooks>);

        coordinator
            .recover(Some("old"), |_| async {
                Ok(TokenResponse {
                    refresh_token: Some("r2".to_string()),
                    customer_id: Some("C1".to_string()),
                    customer_name: Some("Asha K".to_string()),
                    role: Some("ADMIN".to_string()),
                    ..success("new")
                })
            })
            .await
            .unwrap();

        assert_eq!(hooks.renamed.load(Ordering::SeqCst), 1);
        assert_eq!(store.refresh_token().unwrap().as_deref(), Some("r2"));
        assert!(store.user().unwrap().unwrap().is_admin());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_leader_releases_waiters() {
        let store = store_with("old", "r1");
        let coordinator = Arc::new(RefreshCoordinator::new(store));

        let leader = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .recover(Some("old"), |_| async {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Ok(success("never"))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(coordinator.is_refreshing());

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .recover(Some("old"), |_| async { Ok(success("unused")) })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(coordinator.pending(), 1);

        leader.abort();
        assert_eq!(waiter.await.unwrap(), Err(RefreshError::Cancelled));
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn test_cleared_session_is_not_refreshed() {
        let store = store_with("old", "r1");
        store.clear().unwrap();
        let coordinator = RefreshCoordinator::new(store);
        let hooks = Arc::new(CountingHooks::default());
        coordinator.set_hooks(Arc::downgrade(&hooks) as Weak<dyn SessionHooks>);

        let err = coordinator
            .recover(Some("old"), |_| async { Ok(success("unused")) })
            .await
            .unwrap_err();
        assert_eq!(err, RefreshError::SessionEnded);
        assert_eq!(hooks.logouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_logout_during_refresh_discards_new_tokens() {
        let store = store_with("old", "r1");
        let coordinator = RefreshCoordinator::new(store.clone());
        let hooks = Arc::new(CountingHooks::default());
        coordinator.set_hooks(Arc::downgrade(&hooks) as Weak<dyn SessionHooks>);

        let cleared = store.clone();
        let err = coordinator
            .recover(Some("old"), move |_| async move {
                cleared.clear().unwrap();
                Ok(TokenResponse {
                    refresh_token: Some("r2".to_string()),
                    ..success("new")
                })
            })
            .await
            .unwrap_err();

        assert_eq!(err, RefreshError::SessionEnded);
        assert!(store.access_token().unwrap().is_none());
        assert!(store.refresh_token().unwrap().is_none());
        assert_eq!(hooks.logouts.load(Ordering::SeqCst), 0);
        assert!(!coordinator.is_refreshing());
    }
}
