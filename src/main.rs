//! Storefront - Self-hosted E-commerce Backend

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::notify::{LogNotify, NatsNotify, Notify};
use storefront::store::PgStore;
use storefront::{AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let notify: Arc<dyn Notify> = match &config.nats_url {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => {
                tracing::info!("publishing order events to NATS at {url}");
                Arc::new(NatsNotify::new(client))
            }
            Err(err) => {
                tracing::warn!(%err, "NATS unavailable, order events will only be logged");
                Arc::new(LogNotify)
            }
        },
        None => Arc::new(LogNotify),
    };

    let state = AppState { store: Arc::new(PgStore::new(db)), notify };
    let app = storefront::http::router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!("🚀 storefront listening on 0.0.0.0:{}", config.port);
    axum::serve(listener, app).await?;
    Ok(())
}
