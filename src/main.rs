use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hearth::{
    config::Config,
    context::create_context,
    data::{DataHandle, MemoryData},
    lifecycle::Lifecycle,
    procedures, server,
    services::{auth::DataCallbacks, oauth::HttpOAuthClient},
};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    std::panic::set_hook(Box::new(|info| {
        tracing::error!("💥 {}", info);
    }));

    if let Err(e) = run().await {
        tracing::error!("❌ Fatal: {:#}", e);
        std::process::exit(1);
    }

    tracing::info!("👋 Shut down cleanly");
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded successfully");

    let data = DataHandle::new(MemoryData::new());
    let oauth = HttpOAuthClient::new()?;

    let plugins = server::register(
        &config,
        Arc::new(DataCallbacks::new(data.clone())),
        Arc::new(oauth),
        procedures::app_router(),
        create_context(data),
    )?;
    let app = server::app(plugins);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!("🚀 Server listening on http://{}", config.listen_addr);

    let mut lifecycle = Lifecycle::new();
    lifecycle.spawn("http server", server::serve(listener, app));
    lifecycle.run().await
}
