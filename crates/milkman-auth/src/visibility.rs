//! Staleness detection across page visibility changes.
//!
//! Timers do not run reliably while a page is in the background, so the
//! monitor alone cannot be trusted to have fired. When the page is hidden the
//! activity timestamp is persisted; when it becomes visible again the elapsed
//! time is compared against the hard timeout.

use crate::activity::{PageEvent, Visibility};
use crate::error::StorageResult;
use crate::storage::Storage;
use crate::token_store::TokenStore;
use std::sync::Arc;
use std::time::Duration;

/// What a page event meant for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityOutcome {
    /// Nothing to do
    Unchanged,
    /// Activity timestamp persisted on hide
    Suspended,
    /// The page came back within the timeout
    Resumed,
    /// The page came back after the timeout; `sessionExpired` is now set
    Expired,
    /// Session-scoped storage was cleared on unload
    Unloaded,
}

/// Reacts to visibility and unload events.
#[derive(Debug, Clone)]
pub struct VisibilityObserver {
    store: Arc<TokenStore>,
    session_storage: Arc<dyn Storage>,
    hard_timeout: Duration,
}

impl VisibilityObserver {
    /// Create an observer that expires sessions idle for longer than `hard_timeout`.
    pub fn new(
        store: Arc<TokenStore>,
        session_storage: Arc<dyn Storage>,
        hard_timeout: Duration,
    ) -> Self {
        Self {
            store,
            session_storage,
            hard_timeout,
        }
    }

    /// Handle one page event. Activity events are ignored here.
    pub fn handle(&self, event: &PageEvent) -> StorageResult<VisibilityOutcome> {
        match event {
            PageEvent::Visibility(Visibility::Hidden) => {
                self.store.touch_now()?;
                tracing::debug!("Page hidden, activity timestamp saved");
                Ok(VisibilityOutcome::Suspended)
            }
            PageEvent::Visibility(Visibility::Visible) => self.on_visible(),
            PageEvent::Unload => {
                self.session_storage.clear()?;
                tracing::debug!("Page unloading, session-scoped storage cleared");
                Ok(VisibilityOutcome::Unloaded)
            }
            PageEvent::Activity(_) => Ok(VisibilityOutcome::Unchanged),
        }
    }

    fn on_visible(&self) -> StorageResult<VisibilityOutcome> {
        let Some(last) = self.store.last_activity()? else {
            return Ok(VisibilityOutcome::Unchanged);
        };

        let elapsed = self.store.clock().now_millis().saturating_sub(last);
        let limit = i64::try_from(self.hard_timeout.as_millis()).unwrap_or(i64::MAX);

        if elapsed > limit {
            self.store.mark_expired()?;
            tracing::info!(elapsed_ms = elapsed, "Session expired while page was hidden");
            Ok(VisibilityOutcome::Expired)
        } else {
            Ok(VisibilityOutcome::Resumed)
        }
    }
}
