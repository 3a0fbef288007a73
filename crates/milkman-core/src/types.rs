//! Session data model shared across the Milkman crates.
//!
//! The JSON shape of [`UserIdentity`] matches what the web front-end has always
//! written under the `user` storage key, so sessions persisted by either side
//! remain readable.

use crate::error::MilkmanError;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Backend-issued customer identifier (e.g. `ADMIN001`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CustomerId(String);

impl CustomerId {
    /// Create a new `CustomerId`.
    ///
    /// # Errors
    /// Returns error if the identifier is empty or only whitespace.
    pub fn new(id: impl Into<String>) -> Result<Self, MilkmanError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(MilkmanError::EmptyCustomerId);
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CustomerId {
    type Error = MilkmanError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<CustomerId> for String {
    fn from(id: CustomerId) -> Self {
        id.0
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authorization role carried by a user identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// Back-office administrator
    Admin,
    /// Regular customer
    #[default]
    Customer,
}

impl Role {
    /// Interpret the free-form role string returned by the backend.
    ///
    /// Anything other than `ADMIN` (case-insensitive) is a customer.
    #[must_use]
    pub fn from_backend(role: Option<&str>) -> Self {
        match role {
            Some(r) if r.trim().eq_ignore_ascii_case("admin") => Self::Admin,
            _ => Self::Customer,
        }
    }

    /// Wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Customer => "CUSTOMER",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the logged-in user, as issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Customer identifier
    #[serde(rename = "customerId")]
    pub customer_id: CustomerId,
    /// Name shown in the UI
    #[serde(rename = "customerName", default, deserialize_with = "null_as_empty")]
    pub display_name: String,
    /// Authorization role
    #[serde(default)]
    pub role: Role,
}

impl UserIdentity {
    /// Build an identity from trusted parts.
    ///
    /// # Panics
    /// Panics if `customer_id` is empty; use [`CustomerId::new`] for untrusted input.
    #[must_use]
    pub fn new(customer_id: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            customer_id: CustomerId::new(customer_id).expect("non-empty customer id"),
            display_name: display_name.into(),
            role,
        }
    }

    /// Whether this identity carries the administrator role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// An authenticated session.
///
/// Token material is wiped from memory when the value is dropped.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Session {
    access_token: String,
    refresh_token: String,
    #[zeroize(skip)]
    user: UserIdentity,
    last_activity_epoch_millis: i64,
}

impl Session {
    /// Create a new session.
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        user: UserIdentity,
        last_activity_epoch_millis: i64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            user,
            last_activity_epoch_millis,
        }
    }

    /// Short-lived bearer credential.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Long-lived credential used only to obtain a new access token.
    #[must_use]
    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    /// Identity the session belongs to.
    #[must_use]
    pub fn user(&self) -> &UserIdentity {
        &self.user
    }

    /// Last observed user activity.
    #[must_use]
    pub fn last_activity_epoch_millis(&self) -> i64 {
        self.last_activity_epoch_millis
    }

    /// Record user activity at `now`.
    pub fn touch(&mut self, now: i64) {
        self.last_activity_epoch_millis = now;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .field("user", &self.user)
            .field("last_activity_epoch_millis", &self.last_activity_epoch_millis)
            .finish()
    }
}
