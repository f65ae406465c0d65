use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::models::user::{Profile, UserRecord};

/// The persistence capability handed to every request.
///
/// Implementations own their isolation discipline; callers treat the handle
/// as shared.
pub trait DataAccess: Send + Sync {
    /// Creates or refreshes the user linked to `(provider_id, profile.id)`.
    fn upsert_user<'a>(
        &'a self,
        provider_id: &'a str,
        profile: Profile,
    ) -> BoxFuture<'a, Result<UserRecord>>;

    /// Looks a user up by application id.
    fn find_user<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<UserRecord>>>;
}

/// A process-wide, cheaply clonable handle to the data capability.
#[derive(Clone)]
pub struct DataHandle(Arc<dyn DataAccess>);

impl DataHandle {
    pub fn new(access: impl DataAccess + 'static) -> Self {
        Self(Arc::new(access))
    }

    /// Whether two handles point at the same capability.
    pub fn same_as(&self, other: &DataHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for DataHandle {
    type Target = dyn DataAccess;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

/// An in-memory [`DataAccess`] implementation.
#[derive(Default)]
pub struct MemoryData {
    /// Users keyed by `(provider_id, provider_account_id)`.
    users: RwLock<HashMap<(String, String), UserRecord>>,
}

impl MemoryData {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DataAccess for MemoryData {
    fn upsert_user<'a>(
        &'a self,
        provider_id: &'a str,
        profile: Profile,
    ) -> BoxFuture<'a, Result<UserRecord>> {
        Box::pin(async move {
            let mut users = self.users.write().await;
            let key = (provider_id.to_string(), profile.id.clone());

            let user = users
                .entry(key)
                .and_modify(|user| {
                    user.name = profile.name.clone();
                    user.email = profile.email.clone();
                    user.image = profile.image.clone();
                })
                .or_insert_with(|| {
                    tracing::info!("👤 New {} user: {}", provider_id, profile.id);
                    UserRecord {
                        id: Uuid::new_v4().to_string(),
                        name: profile.name.clone(),
                        email: profile.email.clone(),
                        image: profile.image.clone(),
                        provider_id: provider_id.to_string(),
                        provider_account_id: profile.id.clone(),
                        created_at: Utc::now(),
                    }
                });

            Ok(user.clone())
        })
    }

    fn find_user<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<UserRecord>>> {
        Box::pin(async move {
            let users = self.users.read().await;
            Ok(users.values().find(|user| user.id == id).cloned())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str) -> Profile {
        Profile {
            id: "42".to_string(),
            name: name.to_string(),
            email: "octo@example.com".to_string(),
            image: String::new(),
        }
    }

    #[tokio::test]
    async fn upsert_keeps_id_and_refreshes_profile() {
        let data = DataHandle::new(MemoryData::new());

        let first = data.upsert_user("github", profile("Octo")).await.unwrap();
        let second = data.upsert_user("github", profile("Octocat")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Octocat");
        assert_eq!(second.created_at, first.created_at);

        let found = data.find_user(&first.id).await.unwrap().unwrap();
        assert_eq!(found.name, "Octocat");
    }

    #[tokio::test]
    async fn same_account_id_on_other_provider_is_another_user() {
        let data = DataHandle::new(MemoryData::new());

        let a = data.upsert_user("github", profile("Octo")).await.unwrap();
        let b = data.upsert_user("gitlab", profile("Octo")).await.unwrap();

        assert_ne!(a.id, b.id);
        assert!(data.find_user("missing").await.unwrap().is_none());
    }

    #[test]
    fn clones_share_the_capability() {
        let data = DataHandle::new(MemoryData::new());
        let other = DataHandle::new(MemoryData::new());
        assert!(data.same_as(&data.clone()));
        assert!(!data.same_as(&other));
    }
}
