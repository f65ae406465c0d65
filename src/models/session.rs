use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The identity carried by a signed session.
///
/// Every field is a plain string. Providers that do not expose an avatar map
/// `image` to an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    /// The application user id.
    pub id: String,
    /// The display name.
    pub name: String,
    /// The primary email address.
    pub email: String,
    /// The avatar URL, possibly empty.
    pub image: String,
}

/// Represents an authenticated session.
///
/// This is exactly the payload signed into the session cookie. `expires` is
/// serialized as an RFC 3339 timestamp in UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The timestamp when the session expires.
    pub expires: DateTime<Utc>,
    /// The authenticated user.
    pub user: SessionUser,
}

impl Session {
    /// Returns `true` while `now` is strictly before `expires`.
    ///
    /// A session whose `expires` equals `now` is already expired.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires
    }
}
