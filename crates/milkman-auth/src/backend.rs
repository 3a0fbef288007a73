//! Seams between the session layer and the HTTP client.
//!
//! The session manager needs to authenticate against the backend, and the
//! HTTP client needs to tell the session manager when a refresh failed. Both
//! directions go through the traits here so neither crate depends on the other.

use crate::error::Result;
use async_trait::async_trait;
use milkman_core::{CustomerId, Role, UserIdentity};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Login credentials as sent to `/customer/authenticate`.
#[derive(Clone, Serialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    email_id_or_phone: String,
    auth_pin: String,
}

impl Credentials {
    /// Phone number or email plus PIN.
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            email_id_or_phone: identifier.into(),
            auth_pin: secret.into(),
        }
    }

    /// Phone number or email the user typed.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.email_id_or_phone
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email_id_or_phone", &self.email_id_or_phone)
            .field("auth_pin", &"[redacted]")
            .finish()
    }
}

/// Token-bearing response from the authenticate and refresh endpoints.
///
/// Every field is optional on the wire; callers decide what they require.
#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    /// `"SUCCESS"` on success
    #[serde(default)]
    pub status: Option<String>,
    /// New access token
    #[serde(default)]
    pub auth_token: Option<String>,
    /// New refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Customer identifier
    #[serde(default)]
    pub customer_id: Option<String>,
    /// Display name
    #[serde(default)]
    pub customer_name: Option<String>,
    /// Role name, e.g. `ADMIN`
    #[serde(default)]
    pub role: Option<String>,
    /// Human-readable explanation
    #[serde(default)]
    pub message: Option<String>,
}

impl TokenResponse {
    /// Status reported as `SUCCESS`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some("SUCCESS")
    }

    /// Non-empty access token, if any.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.auth_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Identity carried by the response, if it names a customer.
    #[must_use]
    pub fn identity(&self) -> Option<UserIdentity> {
        let customer_id = CustomerId::new(self.customer_id.clone()?).ok()?;
        Some(UserIdentity {
            customer_id,
            display_name: self.customer_name.clone().unwrap_or_default(),
            role: Role::from_backend(self.role.as_deref()),
        })
    }
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("status", &self.status)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[redacted]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[redacted]"))
            .field("customer_id", &self.customer_id)
            .field("role", &self.role)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Performs the login call.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Exchange credentials for tokens.
    ///
    /// # Errors
    /// [`AuthError::Backend`](crate::AuthError::Backend) when the backend is
    /// unreachable or answers with an HTTP error.
    async fn authenticate(&self, credentials: &Credentials) -> Result<TokenResponse>;
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// No activity for the configured timeout
    InactivityTimeout,
    /// The backend refused to refresh the access token
    RefreshFailed,
    /// A 401 arrived and there was no refresh token to recover with
    MissingRefreshToken,
    /// The page came back from the background after the timeout
    ExpiredWhileHidden,
}

impl LogoutReason {
    /// Stable identifier for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InactivityTimeout => "inactivity_timeout",
            Self::RefreshFailed => "refresh_failed",
            Self::MissingRefreshToken => "missing_refresh_token",
            Self::ExpiredWhileHidden => "expired_while_hidden",
        }
    }
}

impl fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callbacks from the HTTP layer into whoever owns the session.
pub trait SessionHooks: Send + Sync {
    /// Tokens could not be recovered; end the session and return to login.
    fn force_logout(&self, reason: LogoutReason);

    /// A refresh response carried updated identity fields.
    fn identity_changed(&self, _user: &UserIdentity) {}
}
