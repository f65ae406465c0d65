use std::sync::Arc;

use zeroize::Zeroizing;

use crate::config::Config;
use crate::context::{ContextFactory, RpcContext};
use crate::error::{AppError, Result};
use crate::middleware_layer::cookies::CookiePlugin;
use crate::models::provider::{self, ProviderRegistry};
use crate::rpc::router::Router;
use crate::services::auth::AuthCallbacks;
use crate::services::oauth::OAuthClient;

/// The minimum accepted length of the session signing secret.
pub const MIN_SECRET_LEN: usize = 32;
/// Where the auth plugin mounts its routes.
pub const AUTH_PREFIX: &str = "/auth";

/// State shared by the auth plugin: the session resolver and the sign-in routes.
#[derive(Clone)]
pub struct AuthState {
    secret: Arc<Zeroizing<Vec<u8>>>,
    /// The registered identity providers.
    pub providers: Arc<ProviderRegistry>,
    /// Application hooks for the sign-in flow.
    pub callbacks: Arc<dyn AuthCallbacks>,
    /// The outbound OAuth client.
    pub oauth: Arc<dyn OAuthClient>,
    /// The cookie plugin the auth routes write through.
    pub cookies: CookiePlugin,
    /// The externally visible base URL.
    pub public_url: String,
    /// How long an issued session lives.
    pub session_max_age: chrono::Duration,
}

impl AuthState {
    /// Creates a new `AuthState`.
    ///
    /// # Returns
    ///
    /// An error when the secret is too short.
    pub fn new(
        secret: Zeroizing<Vec<u8>>,
        providers: ProviderRegistry,
        callbacks: Arc<dyn AuthCallbacks>,
        oauth: Arc<dyn OAuthClient>,
        cookies: CookiePlugin,
        public_url: String,
        session_max_age: chrono::Duration,
    ) -> Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(AppError::Config(format!(
                "AUTH_SECRET must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }
        if session_max_age <= chrono::Duration::zero() {
            return Err(AppError::Config("session max age must be positive".to_string()));
        }

        Ok(Self {
            secret: Arc::new(secret),
            providers: Arc::new(providers),
            callbacks,
            oauth,
            cookies,
            public_url,
            session_max_age,
        })
    }

    /// Builds the auth state for `config` with the GitHub provider.
    pub fn for_config(
        config: &Config,
        cookies: CookiePlugin,
        callbacks: Arc<dyn AuthCallbacks>,
        oauth: Arc<dyn OAuthClient>,
    ) -> Result<Self> {
        let providers = ProviderRegistry::new(vec![provider::github(
            config.github_client_id.clone(),
            config.github_client_secret.clone(),
        )])?;

        Self::new(
            config.auth_secret.clone(),
            providers,
            callbacks,
            oauth,
            cookies,
            config.public_url.clone(),
            chrono::Duration::days(config.session_max_age_days),
        )
    }

    pub fn secret(&self) -> &[u8] {
        &self.secret
    }

    pub fn signin_url(&self, provider_id: &str) -> String {
        format!("{}{}/signin/{}", self.public_url, AUTH_PREFIX, provider_id)
    }

    pub fn callback_url(&self, provider_id: &str) -> String {
        format!("{}{}/callback/{}", self.public_url, AUTH_PREFIX, provider_id)
    }
}

/// Limits applied by the RPC plugin before any procedure runs.
#[derive(Clone, Copy, Debug)]
pub struct RpcLimits {
    /// Maximum raw length of the procedure path and of the `input` parameter.
    pub max_param_length: usize,
    /// Maximum size of a POST body.
    pub max_body_bytes: usize,
}

impl From<&Config> for RpcLimits {
    fn from(config: &Config) -> Self {
        Self {
            max_param_length: config.max_param_length,
            max_body_bytes: config.max_body_bytes,
        }
    }
}

/// State of the RPC plugin, generic over the context its procedures take.
pub struct RpcState<C> {
    pub router: Arc<Router<C>>,
    pub factory: ContextFactory<C>,
    pub prefix: String,
    pub limits: RpcLimits,
}

impl<C> Clone for RpcState<C> {
    fn clone(&self) -> Self {
        Self {
            router: self.router.clone(),
            factory: self.factory.clone(),
            prefix: self.prefix.clone(),
            limits: self.limits,
        }
    }
}

impl<C: RpcContext> RpcState<C> {
    /// Checks the router and the prefix; registration fails on either.
    pub fn new(
        router: Router<C>,
        factory: ContextFactory<C>,
        prefix: &str,
        limits: RpcLimits,
    ) -> Result<Self> {
        router.check()?;

        let prefix = prefix.trim_end_matches('/');
        if !prefix.starts_with('/') || prefix.len() < 2 {
            return Err(AppError::Config(format!("invalid RPC prefix {:?}", prefix)));
        }

        Ok(Self {
            router: Arc::new(router),
            factory,
            prefix: prefix.to_string(),
            limits,
        })
    }
}
