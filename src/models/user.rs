use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::session::SessionUser;

/// A profile as returned by an identity provider, after mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// The account id at the provider.
    pub id: String,
    /// The display name.
    pub name: String,
    /// The primary email address, empty when the provider hides it.
    pub email: String,
    /// The avatar URL, empty when absent.
    pub image: String,
}

/// Represents a user known to the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// The unique identifier for the user.
    pub id: String,
    /// The user's display name.
    pub name: String,
    /// The user's email address.
    pub email: String,
    /// The user's avatar URL.
    pub image: String,
    /// The provider the user signed in with.
    pub provider_id: String,
    /// The account id at that provider.
    pub provider_account_id: String,
    /// The timestamp when the user was first seen.
    pub created_at: DateTime<Utc>,
}

impl From<&UserRecord> for SessionUser {
    fn from(user: &UserRecord) -> Self {
        SessionUser {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            image: user.image.clone(),
        }
    }
}
