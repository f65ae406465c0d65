use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;
use tower_cookies::cookie::time::Duration;

use crate::{
    crypto::{
        state::{generate_state, state_matches},
        token,
    },
    error::{AppError, Result},
    middleware_layer::{
        cookies::{SESSION_COOKIE, STATE_COOKIE},
        session::ResolvedSession,
    },
    models::session::Session,
    services::auth as auth_service,
    state::AuthState,
};

/// How long a pending OAuth state stays valid.
const STATE_MAX_AGE_MINUTES: i64 = 15;

/// A provider as listed to clients.
#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
    pub signin_url: String,
    pub callback_url: String,
}

/// The query string the provider redirects back with.
#[derive(Deserialize, Debug)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// The response payload for authentication-related requests.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
}

/// Lists the registered providers.
pub async fn providers(State(auth): State<AuthState>) -> Json<Vec<ProviderInfo>> {
    Json(
        auth.providers
            .iter()
            .map(|provider| ProviderInfo {
                id: provider.id().to_string(),
                name: provider.name.clone(),
                signin_url: auth.signin_url(provider.id()),
                callback_url: auth.callback_url(provider.id()),
            })
            .collect(),
    )
}

/// Starts a sign-in: remembers a fresh `state` and redirects to the provider.
#[axum::debug_handler]
pub async fn signin(
    State(auth): State<AuthState>,
    Path(provider_id): Path<String>,
    cookies: Cookies,
) -> Result<Response> {
    let provider = auth.providers.get(&provider_id).ok_or(AppError::NotFound)?;
    let state = generate_state();
    let redirect_uri = auth.callback_url(provider.id());

    let url = reqwest::Url::parse_with_params(
        &provider.authorization_url,
        &[
            ("client_id", provider.registration.client_id.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("scope", provider.scope.as_str()),
            ("state", state.as_str()),
            ("response_type", "code"),
        ],
    )
    .map_err(|e| AppError::Internal(format!("Invalid authorization URL: {}", e)))?;

    auth.cookies.signed(&cookies).add(auth.cookies.build(
        STATE_COOKIE,
        format!("{}:{}", provider.id(), state),
        Duration::minutes(STATE_MAX_AGE_MINUTES),
    ));

    tracing::info!("🔐 Redirecting to {} for sign-in", provider.id());
    Ok(Redirect::to(url.as_str()).into_response())
}

/// Finishes a sign-in and issues the session cookie.
///
/// Any failure clears the pending state and leaves the caller anonymous.
#[axum::debug_handler]
pub async fn callback(
    State(auth): State<AuthState>,
    Path(provider_id): Path<String>,
    Query(params): Query<CallbackParams>,
    cookies: Cookies,
) -> Result<Response> {
    let pending = auth
        .cookies
        .signed(&cookies)
        .get(STATE_COOKIE)
        .map(|cookie| cookie.value().to_string());
    cookies.remove(auth.cookies.expired(STATE_COOKIE));

    let provider = auth.providers.get(&provider_id).ok_or(AppError::NotFound)?;

    let outcome = async {
        if let Some(error) = &params.error {
            return Err(AppError::Authentication(format!(
                "{} returned error: {}",
                provider.id(),
                error
            )));
        }

        let (expected_provider, expected_state) = pending
            .as_deref()
            .and_then(|value| value.split_once(':'))
            .ok_or_else(|| AppError::Authentication("Missing OAuth state".to_string()))?;
        let received_state = params.state.as_deref().unwrap_or_default();
        if expected_provider != provider.id() || !state_matches(expected_state, received_state) {
            return Err(AppError::Authentication("OAuth state mismatch".to_string()));
        }

        let code = params
            .code
            .as_deref()
            .ok_or_else(|| AppError::Authentication("Missing authorization code".to_string()))?;

        let session = auth_service::complete_sign_in(&auth, provider, code, Utc::now()).await?;
        let token = token::sign(&session, auth.secret())
            .map_err(|e| AppError::Internal(format!("Session signing failed: {}", e)))?;
        Ok::<_, AppError>((session, token))
    }
    .await;

    match outcome {
        Ok((session, token)) => {
            let max_age = Duration::seconds(auth.session_max_age.num_seconds());
            cookies.add(auth.cookies.build(SESSION_COOKIE, token, max_age));
            tracing::info!("✅ Session cookie issued for user: {}", session.user.id);
            Ok(Redirect::to("/").into_response())
        }
        Err(e) => {
            tracing::warn!("❌ Sign-in with {} failed: {}", provider.id(), e);
            cookies.remove(auth.cookies.expired(SESSION_COOKIE));
            Err(AppError::Authentication("Sign-in failed".to_string()))
        }
    }
}

/// Clears the session cookie.
pub async fn signout(State(auth): State<AuthState>, cookies: Cookies) -> Json<AuthResponse> {
    cookies.remove(auth.cookies.expired(SESSION_COOKIE));
    tracing::info!("👋 Session cookie cleared");

    Json(AuthResponse {
        success: true,
        message: "Signed out".to_string(),
    })
}

/// Returns the session resolved for this request, or `null`.
pub async fn session(Extension(resolved): Extension<ResolvedSession>) -> Json<Option<Session>> {
    Json(resolved.0.as_deref().cloned())
}
