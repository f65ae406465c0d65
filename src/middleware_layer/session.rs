use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use chrono::{DateTime, Utc};
use tower_cookies::Cookies;

use crate::{
    crypto::token,
    middleware_layer::cookies::SESSION_COOKIE,
    models::session::Session,
    state::AuthState,
};

/// The session resolved for the current request, stored in its extensions.
///
/// Inserted exactly once per request by [`resolve_session`].
#[derive(Clone, Debug, Default)]
pub struct ResolvedSession(pub Option<Arc<Session>>);

/// Turns a raw session token into a live session.
///
/// Absent, forged, malformed and expired tokens all resolve to `None`.
pub fn resolve(token: Option<&str>, secret: &[u8], now: DateTime<Utc>) -> Option<Session> {
    let token = token?;

    match token::verify::<Session>(token, secret) {
        Ok(session) if session.is_active_at(now) => Some(session),
        Ok(session) => {
            tracing::debug!("⌛ Session expired for user: {}", session.user.id);
            None
        }
        Err(e) => {
            tracing::debug!("❌ Ignoring session cookie: {}", e);
            None
        }
    }
}

/// A middleware that resolves the optional session of every request.
///
/// Never rejects: an unusable cookie degrades to an anonymous request.
pub async fn resolve_session(
    State(auth): State<AuthState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = cookies.get(SESSION_COOKIE).map(|cookie| cookie.value().to_string());
    let session = resolve(token.as_deref(), auth.secret(), Utc::now());

    if let Some(session) = &session {
        tracing::debug!("✅ Session resolved for user: {}", session.user.id);
    }

    request
        .extensions_mut()
        .insert(ResolvedSession(session.map(Arc::new)));

    next.run(request).await
}
