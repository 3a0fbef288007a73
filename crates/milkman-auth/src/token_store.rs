//! Persistent session state.
//!
//! The token store is the only component that reads or writes the session keys.
//! Everything it persists is a plain string under a fixed key so that state
//! written by the web front-end and by this crate stay interchangeable:
//!
//! | key              | value                                  |
//! |------------------|----------------------------------------|
//! | `token`          | access token                           |
//! | `refreshToken`   | refresh token                          |
//! | `user`           | JSON-encoded [`UserIdentity`]          |
//! | `lastActivity`   | epoch milliseconds as a decimal string |
//! | `sessionExpired` | `"true"` or absent                     |

use crate::error::StorageResult;
use crate::storage::Storage;
use milkman_core::{Clock, Session, UserIdentity};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Storage key names.
pub mod keys {
    /// Access token
    pub const TOKEN: &str = "token";
    /// Refresh token
    pub const REFRESH_TOKEN: &str = "refreshToken";
    /// Serialized user identity
    pub const USER: &str = "user";
    /// Last observed activity, epoch millis
    pub const LAST_ACTIVITY: &str = "lastActivity";
    /// Staleness flag set when a resumed session is found expired
    pub const SESSION_EXPIRED: &str = "sessionExpired";

    /// Keys that make up an authenticated session.
    pub const SESSION: [&str; 4] = [TOKEN, REFRESH_TOKEN, USER, LAST_ACTIVITY];
}

/// Reads and writes session state through a [`Storage`] backend.
#[derive(Debug, Clone)]
pub struct TokenStore {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    /// Serializes multi-key writes so a refresh cannot interleave with a logout.
    writes: Arc<Mutex<()>>,
}

impl TokenStore {
    /// Create a store over `storage`.
    pub fn new(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            writes: Arc::default(),
        }
    }

    /// Persist a complete session.
    pub fn save(&self, session: &Session) -> StorageResult<()> {
        let user = serde_json::to_string(session.user())?;
        let _writes = self.write_lock();
        self.storage.set(keys::TOKEN, session.access_token())?;
        self.storage.set(keys::REFRESH_TOKEN, session.refresh_token())?;
        self.storage.set(keys::USER, &user)?;
        self.storage.set(
            keys::LAST_ACTIVITY,
            &session.last_activity_epoch_millis().to_string(),
        )?;
        tracing::debug!(customer_id = %session.user().customer_id, "Session saved");
        Ok(())
    }

    /// Load the persisted session.
    ///
    /// Returns `None` unless the access token, refresh token and user are all
    /// present and the user record parses. Anything short of that is partial
    /// state left behind by a crash or an older client, and is cleared.
    pub fn load(&self) -> StorageResult<Option<Session>> {
        let token = self.non_empty(keys::TOKEN)?;
        let refresh = self.non_empty(keys::REFRESH_TOKEN)?;
        let user_raw = self.non_empty(keys::USER)?;

        let (Some(token), Some(refresh), Some(user_raw)) = (token, refresh, user_raw) else {
            if self.has_any_session_key()? {
                tracing::warn!("Discarding incomplete persisted session");
                self.clear()?;
            }
            return Ok(None);
        };

        let user = match parse_user(&user_raw) {
            Some(user) => user,
            None => {
                tracing::warn!("Discarding persisted session with unreadable user record");
                self.clear()?;
                return Ok(None);
            }
        };

        let last_activity = self
            .last_activity()?
            .unwrap_or_else(|| self.clock.now_millis());

        Ok(Some(Session::new(token, refresh, user, last_activity)))
    }

    /// Remove the session keys. The `sessionExpired` flag is left in place.
    pub fn clear(&self) -> StorageResult<()> {
        let _writes = self.write_lock();
        for key in keys::SESSION {
            self.storage.remove(key)?;
        }
        tracing::debug!("Session keys cleared");
        Ok(())
    }

    /// Remove everything in the backing storage, including the expiry flag.
    pub fn clear_all(&self) -> StorageResult<()> {
        let _writes = self.write_lock();
        self.storage.clear()
    }

    /// Current access token.
    pub fn access_token(&self) -> StorageResult<Option<String>> {
        self.non_empty(keys::TOKEN)
    }

    /// Current refresh token.
    pub fn refresh_token(&self) -> StorageResult<Option<String>> {
        self.non_empty(keys::REFRESH_TOKEN)
    }

    /// Persisted user, if readable.
    pub fn user(&self) -> StorageResult<Option<UserIdentity>> {
        Ok(self
            .non_empty(keys::USER)?
            .as_deref()
            .and_then(parse_user))
    }

    /// Install tokens obtained by refreshing with `used_refresh`.
    ///
    /// Nothing is written and `false` is returned unless `used_refresh` is
    /// still the stored refresh token, so a refresh that finishes after a
    /// logout or a new login cannot resurrect or overwrite the session.
    /// A missing `refresh` keeps the current refresh token. A present `user`
    /// replaces the stored identity wholesale.
    pub fn replace_tokens(
        &self,
        used_refresh: &str,
        access: &str,
        refresh: Option<&str>,
        user: Option<&UserIdentity>,
    ) -> StorageResult<bool> {
        let _writes = self.write_lock();
        if self.refresh_token()?.as_deref() != Some(used_refresh) {
            tracing::debug!("Session changed during refresh, discarding new tokens");
            return Ok(false);
        }

        self.storage.set(keys::TOKEN, access)?;
        if let Some(refresh) = refresh.filter(|r| !r.is_empty()) {
            self.storage.set(keys::REFRESH_TOKEN, refresh)?;
        }
        if let Some(user) = user {
            self.storage.set(keys::USER, &serde_json::to_string(user)?)?;
        }
        tracing::debug!(
            rotated_refresh = refresh.is_some(),
            updated_user = user.is_some(),
            "Tokens replaced"
        );
        Ok(true)
    }

    /// Record activity at `now_millis`.
    pub fn touch(&self, now_millis: i64) -> StorageResult<()> {
        self.storage
            .set(keys::LAST_ACTIVITY, &now_millis.to_string())
    }

    /// Record activity at the current clock time.
    pub fn touch_now(&self) -> StorageResult<()> {
        self.touch(self.clock.now_millis())
    }

    /// Last recorded activity. Unparseable values read as absent.
    pub fn last_activity(&self) -> StorageResult<Option<i64>> {
        Ok(self
            .storage
            .get(keys::LAST_ACTIVITY)?
            .and_then(|v| v.trim().parse().ok()))
    }

    /// Flag the persisted session as expired.
    pub fn mark_expired(&self) -> StorageResult<()> {
        self.storage.set(keys::SESSION_EXPIRED, "true")
    }

    /// Whether the expiry flag is set.
    pub fn is_marked_expired(&self) -> StorageResult<bool> {
        Ok(self.storage.get(keys::SESSION_EXPIRED)?.as_deref() == Some("true"))
    }

    /// Remove the expiry flag.
    pub fn clear_expired_flag(&self) -> StorageResult<()> {
        self.storage.remove(keys::SESSION_EXPIRED)
    }

    /// Clock this store stamps activity with.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn non_empty(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.storage.get(key)?.filter(|v| !v.is_empty()))
    }

    fn has_any_session_key(&self) -> StorageResult<bool> {
        for key in keys::SESSION {
            if self.storage.get(key)?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn parse_user(raw: &str) -> Option<UserIdentity> {
    // Older front-ends stored the literal string "undefined".
    if raw == "undefined" || raw == "null" {
        return None;
    }
    serde_json::from_str(raw).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use milkman_core::{ManualClock, Role};

    fn store() -> (TokenStore, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let store = TokenStore::new(storage.clone(), Arc::new(ManualClock::new(5_000)));
        (store, storage)
    }

    fn session() -> Session {
        Session::new(
            "abc",
            "xyz",
            UserIdentity::new("C1", "Asha", Role::Customer),
            1_000,
        )
    }

    #[test]
    fn test_save_and_load() {
        let (store, storage) = store();
        store.save(&session()).unwrap();

        assert_eq!(storage.get(keys::TOKEN).unwrap().as_deref(), Some("abc"));
        assert_eq!(storage.get(keys::LAST_ACTIVITY).unwrap().as_deref(), Some("1000"));

        let loaded = store.load().unwrap().expect("session present");
        assert_eq!(loaded, session());
    }

    #[test]
    fn test_load_empty() {
        let (store, _) = store();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_load_clears_partial_state() {
        let (store, storage) = store();
        storage.set(keys::TOKEN, "abc").unwrap();
        storage.set(keys::USER, r#"{"customerId":"C1"}"#).unwrap();

        assert!(store.load().unwrap().is_none());
        assert_eq!(storage.get(keys::TOKEN).unwrap(), None);
        assert_eq!(storage.get(keys::USER).unwrap(), None);
    }

    #[test]
    fn test_load_rejects_undefined_user() {
        let (store, storage) = store();
        storage.set(keys::TOKEN, "abc").unwrap();
        storage.set(keys::REFRESH_TOKEN, "xyz").unwrap();
        storage.set(keys::USER, "undefined").unwrap();

        assert!(store.load().unwrap().is_none());
        assert!(storage.is_empty());
    }

    #[test]
    fn test_load_rejects_corrupt_user() {
        let (store, storage) = store();
        storage.set(keys::TOKEN, "abc").unwrap();
        storage.set(keys::REFRESH_TOKEN, "xyz").unwrap();
        storage.set(keys::USER, "{broken").unwrap();

        assert!(store.load().unwrap().is_none());
        assert_eq!(storage.get(keys::TOKEN).unwrap(), None);
        assert_eq!(storage.get(keys::REFRESH_TOKEN).unwrap(), None);
        assert_eq!(storage.get(keys::USER).unwrap(), None);
    }

    #[test]
    fn test_load_defaults_missing_last_activity_to_now() {
        let (store, storage) = store();
        store.save(&session()).unwrap();
        storage.remove(keys::LAST_ACTIVITY).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.last_activity_epoch_millis(), 5_000);
    }

    #[test]
    fn test_clear_keeps_expired_flag() {
        let (store, _) = store();
        store.save(&session()).unwrap();
        store.mark_expired().unwrap();

        store.clear().unwrap();
        assert!(store.access_token().unwrap().is_none());
        assert!(store.is_marked_expired().unwrap());

        store.clear_all().unwrap();
        assert!(!store.is_marked_expired().unwrap());
    }

    #[test]
    fn test_replace_tokens_keeps_refresh_when_absent() {
        let (store, _) = store();
        store.save(&session()).unwrap();

        assert!(store.replace_tokens("xyz", "new-access", None, None).unwrap());
        assert_eq!(store.access_token().unwrap().as_deref(), Some("new-access"));
        assert_eq!(store.refresh_token().unwrap().as_deref(), Some("xyz"));

        assert!(store
            .replace_tokens("xyz", "newer", Some("rotated"), None)
            .unwrap());
        assert_eq!(store.refresh_token().unwrap().as_deref(), Some("rotated"));
    }

    #[test]
    fn test_replace_tokens_updates_user() {
        let (store, _) = store();
        store.save(&session()).unwrap();

        let promoted = UserIdentity::new("C1", "Asha", Role::Admin);
        assert!(store
            .replace_tokens("xyz", "new-access", None, Some(&promoted))
            .unwrap());
        assert_eq!(store.user().unwrap(), Some(promoted));
    }

    #[test]
    fn test_replace_tokens_after_clear_writes_nothing() {
        let (store, storage) = store();
        store.save(&session()).unwrap();
        store.clear().unwrap();

        assert!(!store
            .replace_tokens("xyz", "new-access", Some("rotated"), None)
            .unwrap());
        assert!(store.access_token().unwrap().is_none());
        assert!(store.refresh_token().unwrap().is_none());
        assert!(storage.is_empty());
    }

    #[test]
    fn test_replace_tokens_does_not_touch_a_newer_session() {
        let (store, _) = store();
        store.save(&session()).unwrap();
        store
            .save(&Session::new(
                "second-login",
                "second-refresh",
                UserIdentity::new("C2", "Ravi", Role::Customer),
                0,
            ))
            .unwrap();

        assert!(!store.replace_tokens("xyz", "stale", None, None).unwrap());
        assert_eq!(store.access_token().unwrap().as_deref(), Some("second-login"));
    }

    #[test]
    fn test_touch_and_last_activity() {
        let (store, storage) = store();
        store.touch(42).unwrap();
        assert_eq!(store.last_activity().unwrap(), Some(42));

        store.touch_now().unwrap();
        assert_eq!(store.last_activity().unwrap(), Some(5_000));

        storage.set(keys::LAST_ACTIVITY, "yesterday").unwrap();
        assert_eq!(store.last_activity().unwrap(), None);
    }
}
