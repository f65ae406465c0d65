use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    middleware::Next,
    response::{IntoResponse, Response},
};
use http::{HeaderValue, Method, Request, header};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::error::{AppError, Result};

/// The methods announced to cross-origin callers.
pub const ALLOWED_METHODS: [Method; 4] = [Method::GET, Method::POST, Method::PUT, Method::DELETE];

/// An explicit origin allow-list. Matching is byte-exact, so scheme and
/// port are part of the comparison.
#[derive(Clone, Debug)]
pub struct CorsPolicy {
    origins: Arc<Vec<HeaderValue>>,
}

impl CorsPolicy {
    pub fn new(origins: &[String]) -> Result<Self> {
        if origins.is_empty() {
            return Err(AppError::Config("CORS allow-list must not be empty".to_string()));
        }

        let origins = origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin)
                    .map_err(|_| AppError::Config(format!("invalid CORS origin {:?}", origin)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            origins: Arc::new(origins),
        })
    }

    pub fn allows(&self, origin: &HeaderValue) -> bool {
        self.origins.iter().any(|allowed| allowed == origin)
    }

    /// The layer that answers preflights and decorates allowed responses.
    pub fn layer(&self) -> CorsLayer {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(self.origins.iter().cloned()))
            .allow_methods(ALLOWED_METHODS)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
            .allow_credentials(true)
            .max_age(Duration::from_secs(86400))
    }
}

/// Rejects requests whose `Origin` is not on the allow-list.
///
/// Runs outside [`CorsPolicy::layer`], so foreign preflights are refused too.
/// Requests without an `Origin` header pass.
pub async fn enforce_origin(
    State(policy): State<CorsPolicy>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if let Some(origin) = request.headers().get(header::ORIGIN) {
        if !policy.allows(origin) {
            tracing::warn!("❌ CORS: origin {:?} not allowed", origin);
            return AppError::Forbidden("Origin not allowed".to_string()).into_response();
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CorsPolicy {
        CorsPolicy::new(&["http://localhost:3000".to_string(), "my.company.dev".to_string()])
            .unwrap()
    }

    #[test]
    fn exact_origins_are_allowed() {
        let policy = policy();
        assert!(policy.allows(&HeaderValue::from_static("http://localhost:3000")));
        assert!(policy.allows(&HeaderValue::from_static("my.company.dev")));
    }

    #[test]
    fn scheme_or_port_changes_are_rejected() {
        let policy = policy();
        assert!(!policy.allows(&HeaderValue::from_static("https://localhost:3000")));
        assert!(!policy.allows(&HeaderValue::from_static("http://localhost:3001")));
        assert!(!policy.allows(&HeaderValue::from_static("http://localhost")));
        assert!(!policy.allows(&HeaderValue::from_static("http://evil.example")));
    }

    #[test]
    fn invalid_lists_fail_registration() {
        assert!(CorsPolicy::new(&[]).is_err());
        assert!(CorsPolicy::new(&["http://bad\norigin".to_string()]).is_err());
    }
}
