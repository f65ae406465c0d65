use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use crate::data::DataHandle;
use crate::error::Result;
use crate::models::provider::Provider;
use crate::models::session::Session;
use crate::models::user::{Profile, UserRecord};
use crate::state::AuthState;

/// Application hooks run while completing an OAuth sign-in.
pub trait AuthCallbacks: Send + Sync {
    /// Maps a provider profile to an application user.
    fn on_sign_in<'a>(
        &'a self,
        provider_id: &'a str,
        profile: Profile,
    ) -> BoxFuture<'a, Result<UserRecord>>;

    /// Enriches the session before it is signed into the cookie.
    fn on_session(&self, session: Session, _user: &UserRecord) -> Session {
        session
    }
}

/// Default callbacks: users are upserted through the data capability.
pub struct DataCallbacks {
    data: DataHandle,
}

impl DataCallbacks {
    pub fn new(data: DataHandle) -> Self {
        Self { data }
    }
}

impl AuthCallbacks for DataCallbacks {
    fn on_sign_in<'a>(
        &'a self,
        provider_id: &'a str,
        profile: Profile,
    ) -> BoxFuture<'a, Result<UserRecord>> {
        self.data.upsert_user(provider_id, profile)
    }
}

/// Runs the token exchange, profile fetch and callbacks for a callback `code`.
///
/// # Returns
///
/// The session to sign into the session cookie.
pub async fn complete_sign_in(
    auth: &AuthState,
    provider: &Provider,
    code: &str,
    now: DateTime<Utc>,
) -> Result<Session> {
    tracing::debug!("🔐 Completing {} sign-in", provider.id());

    let redirect_uri = auth.callback_url(provider.id());
    let access_token = auth
        .oauth
        .exchange_code(provider, code, &redirect_uri)
        .await?;
    let profile = auth.oauth.fetch_profile(provider, &access_token).await?;

    let user = auth.callbacks.on_sign_in(provider.id(), profile).await?;
    tracing::info!("✅ User signed in with {}: {}", provider.id(), user.id);

    let session = Session {
        expires: now + auth.session_max_age,
        user: (&user).into(),
    };

    Ok(auth.callbacks.on_session(session, &user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::data::MemoryData;
    use crate::error::AppError;
    use crate::middleware_layer::cookies::CookiePlugin;
    use crate::services::oauth::OAuthClient;
    use std::sync::Arc;

    struct FakeOAuth {
        fail_exchange: bool,
    }

    impl OAuthClient for FakeOAuth {
        fn exchange_code<'a>(
            &'a self,
            _provider: &'a Provider,
            code: &'a str,
            _redirect_uri: &'a str,
        ) -> BoxFuture<'a, Result<String>> {
            Box::pin(async move {
                if self.fail_exchange {
                    Err(AppError::Provider("bad_verification_code".to_string()))
                } else {
                    Ok(format!("token-for-{}", code))
                }
            })
        }

        fn fetch_profile<'a>(
            &'a self,
            _provider: &'a Provider,
            access_token: &'a str,
        ) -> BoxFuture<'a, Result<Profile>> {
            Box::pin(async move {
                assert_eq!(access_token, "token-for-abc");
                Ok(Profile {
                    id: "42".to_string(),
                    name: "Octo".to_string(),
                    email: "octo@example.com".to_string(),
                    image: String::new(),
                })
            })
        }
    }

    struct Tagging(DataCallbacks);

    impl AuthCallbacks for Tagging {
        fn on_sign_in<'a>(
            &'a self,
            provider_id: &'a str,
            profile: Profile,
        ) -> BoxFuture<'a, Result<UserRecord>> {
            self.0.on_sign_in(provider_id, profile)
        }

        fn on_session(&self, mut session: Session, user: &UserRecord) -> Session {
            session.user.name = format!("{} via {}", user.name, user.provider_id);
            session
        }
    }

    fn auth(callbacks: Arc<dyn AuthCallbacks>, fail_exchange: bool) -> AuthState {
        AuthState::for_config(
            &Config::for_local("0123456789abcdef0123456789abcdef"),
            CookiePlugin::new(b"abc", false).unwrap(),
            callbacks,
            Arc::new(FakeOAuth { fail_exchange }),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn sign_in_issues_session_for_upserted_user() {
        let data = DataHandle::new(MemoryData::new());
        let auth = auth(Arc::new(DataCallbacks::new(data.clone())), false);
        let provider = auth.providers.get("github").unwrap().clone();
        let now = Utc::now();

        let session = complete_sign_in(&auth, &provider, "abc", now).await.unwrap();

        assert_eq!(session.expires, now + auth.session_max_age);
        assert_eq!(session.user.name, "Octo");
        let stored = data.find_user(&session.user.id).await.unwrap().unwrap();
        assert_eq!(stored.provider_account_id, "42");
    }

    #[tokio::test]
    async fn on_session_enriches_the_payload() {
        let data = DataHandle::new(MemoryData::new());
        let auth = auth(Arc::new(Tagging(DataCallbacks::new(data))), false);
        let provider = auth.providers.get("github").unwrap().clone();

        let session = complete_sign_in(&auth, &provider, "abc", Utc::now()).await.unwrap();
        assert_eq!(session.user.name, "Octo via github");
    }

    #[tokio::test]
    async fn failed_exchange_yields_no_session() {
        let data = DataHandle::new(MemoryData::new());
        let auth = auth(Arc::new(DataCallbacks::new(data)), true);
        let provider = auth.providers.get("github").unwrap().clone();

        let err = complete_sign_in(&auth, &provider, "abc", Utc::now()).await.unwrap_err();
        assert!(matches!(err, AppError::Provider(_)));
    }
}
