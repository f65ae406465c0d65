use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::provider::Provider;
use crate::models::user::Profile;

/// The outbound half of an OAuth sign-in.
pub trait OAuthClient: Send + Sync {
    /// Trades an authorization `code` for an access token.
    fn exchange_code<'a>(
        &'a self,
        provider: &'a Provider,
        code: &'a str,
        redirect_uri: &'a str,
    ) -> BoxFuture<'a, Result<String>>;

    /// Fetches and maps the profile behind `access_token`.
    fn fetch_profile<'a>(
        &'a self,
        provider: &'a Provider,
        access_token: &'a str,
    ) -> BoxFuture<'a, Result<Profile>>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// [`OAuthClient`] over HTTPS.
#[derive(Clone)]
pub struct HttpOAuthClient {
    http: reqwest::Client,
}

impl HttpOAuthClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self { http })
    }
}

impl OAuthClient for HttpOAuthClient {
    fn exchange_code<'a>(
        &'a self,
        provider: &'a Provider,
        code: &'a str,
        redirect_uri: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let registration = &provider.registration;
            let response: TokenResponse = self
                .http
                .post(&provider.token_url)
                .header(reqwest::header::ACCEPT, "application/json")
                .form(&[
                    ("client_id", registration.client_id.as_str()),
                    ("client_secret", registration.client_secret.as_str()),
                    ("code", code),
                    ("redirect_uri", redirect_uri),
                    ("grant_type", "authorization_code"),
                ])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            match response {
                TokenResponse {
                    access_token: Some(token),
                    ..
                } => Ok(token),
                TokenResponse {
                    error,
                    error_description,
                    ..
                } => Err(AppError::Provider(format!(
                    "{} token exchange failed: {} {}",
                    provider.id(),
                    error.unwrap_or_default(),
                    error_description.unwrap_or_default()
                ))),
            }
        })
    }

    fn fetch_profile<'a>(
        &'a self,
        provider: &'a Provider,
        access_token: &'a str,
    ) -> BoxFuture<'a, Result<Profile>> {
        Box::pin(async move {
            let doc: Value = self
                .http
                .get(&provider.userinfo_url)
                .bearer_auth(access_token)
                .header(reqwest::header::ACCEPT, "application/json")
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;

            (provider.map_profile)(&doc).ok_or_else(|| {
                AppError::Provider(format!("{} returned an unusable profile", provider.id()))
            })
        })
    }
}
