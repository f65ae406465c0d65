//! Plugin registration and router assembly.
//!
//! Plugins are registered in a fixed order: cookies, CORS, auth, RPC. Each
//! registration validates its inputs and the first failure aborts startup.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::{
    config::Config,
    context::{ContextFactory, RpcContext},
    handlers,
    middleware_layer::{
        cookies::CookiePlugin,
        cors::{self, CorsPolicy},
        session,
    },
    rpc::router::Router as RpcRouter,
    services::{auth::AuthCallbacks, oauth::OAuthClient},
    state::{AUTH_PREFIX, AuthState, RpcLimits, RpcState},
};

/// The registered plugins, ready to be assembled into a router.
pub struct Plugins<C> {
    pub cookies: CookiePlugin,
    pub cors: CorsPolicy,
    pub auth: AuthState,
    pub rpc: RpcState<C>,
}

/// Registers every plugin in order.
pub fn register<C: RpcContext>(
    config: &Config,
    callbacks: Arc<dyn AuthCallbacks>,
    oauth: Arc<dyn OAuthClient>,
    router: RpcRouter<C>,
    factory: ContextFactory<C>,
) -> Result<Plugins<C>> {
    let cookies = CookiePlugin::new(&config.cookie_secret, config.secure_cookies())
        .context("Failed to register cookie plugin")?;
    tracing::info!("✅ Cookie plugin registered");

    let cors = CorsPolicy::new(&config.cors_origins).context("Failed to register CORS plugin")?;
    tracing::info!("✅ CORS plugin registered ({} origins)", config.cors_origins.len());

    let auth = AuthState::for_config(config, cookies.clone(), callbacks, oauth)
        .context("Failed to register auth plugin")?;
    tracing::info!(
        "✅ Auth plugin registered with providers: {}",
        auth.providers.iter().map(|p| p.id()).collect::<Vec<_>>().join(", ")
    );

    let rpc = RpcState::new(router, factory, &config.rpc_prefix, RpcLimits::from(config))
        .context("Failed to register RPC plugin")?;
    tracing::info!("✅ RPC plugin registered at {}", rpc.prefix);

    Ok(Plugins {
        cookies,
        cors,
        auth,
        rpc,
    })
}

/// Builds the HTTP router.
///
/// Request flow, outermost first: trace, cookies, origin check, CORS headers,
/// session resolution, routes.
pub fn app<C: RpcContext>(plugins: Plugins<C>) -> Router {
    let Plugins {
        cookies,
        cors,
        auth,
        rpc,
    } = plugins;

    let rpc_routes = Router::new()
        .route(
            &format!("{}/{{path}}", rpc.prefix),
            get(handlers::rpc::dispatch::<C>).post(handlers::rpc::dispatch::<C>),
        )
        .with_state(rpc);

    let auth_routes = Router::new()
        .route(&format!("{}/providers", AUTH_PREFIX), get(handlers::auth::providers))
        .route(&format!("{}/signin/{{provider}}", AUTH_PREFIX), get(handlers::auth::signin))
        .route(&format!("{}/callback/{{provider}}", AUTH_PREFIX), get(handlers::auth::callback))
        .route(&format!("{}/signout", AUTH_PREFIX), post(handlers::auth::signout))
        .route(&format!("{}/session", AUTH_PREFIX), get(handlers::auth::session))
        .with_state(auth.clone());

    Router::new()
        .merge(rpc_routes)
        .merge(auth_routes)
        .layer(from_fn_with_state(auth, session::resolve_session))
        .layer(cors.layer())
        .layer(from_fn_with_state(cors, cors::enforce_origin))
        .layer(cookies.layer())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false))
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
}

/// Serves `app` until Ctrl-C.
pub async fn serve(listener: TcpListener, app: Router) -> Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("🛑 Shutdown requested"),
        Err(e) => {
            tracing::error!("❌ Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
