use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use playnext_api::{
    config::Config,
    db::{create_pool, create_redis_client, run_migrations, RedisStore},
    routes::{create_router, AppState},
    services::{providers::postgres::PostgresProvider, RecommendationEngine},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("playnext_api=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;

    let redis_client = create_redis_client(&config.redis_url)?;
    let (store, store_writer) = RedisStore::new(redis_client, config.redis_key_prefix.clone()).await;

    let launcher = Arc::new(PostgresProvider::new(pool));
    let engine = Arc::new(RecommendationEngine::new(
        launcher.clone(),
        launcher.clone(),
        Arc::new(store),
        launcher,
        config.engine_settings(),
    ));

    // The writer drains queued arm writes even when startup or serving fails.
    let served = serve(&config, engine).await;
    store_writer.shutdown().await;
    served
}

async fn serve(config: &Config, engine: Arc<RecommendationEngine>) -> anyhow::Result<()> {
    engine.initialize().await?;

    let app = create_router(Arc::new(AppState::new(engine)));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
