use anyhow::Context;
use dotenvy::dotenv;
use migration::MigratorTrait;
use sea_orm::Database;
use tracing_subscriber::{prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt};

mod config;
mod entity;
mod entity_impl;
mod error;
mod haiku;
mod handler;
mod pinata;
mod state;
#[cfg(test)]
mod testing;

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_error::ErrorLayer::default())
        .init();

    let config = crate::config::CONFIG.clone();
    if config.debug {
        tracing::warn!("Enabling debug mode... DO NOT USE IN PRODUCTION!");
    }

    let db = Database::connect(config.database_url.as_str())
        .await
        .context("failed to connect to database")?;

    migration::Migrator::up(&db, None)
        .await
        .context("failed to migrate database")?;

    let listen_addr = config.listen_addr.clone();
    let state = crate::state::AppState::new(config, db).context("failed to construct app state")?;
    let router = crate::handler::create_router(state);

    tracing::info!(%listen_addr, "starting http server...");
    axum::Server::bind(&listen_addr.parse()?)
        .serve(router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
