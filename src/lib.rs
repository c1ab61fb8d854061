pub(crate) mod controllers;
pub(crate) mod core;
pub(crate) mod routes;
pub(crate) mod store;
pub(crate) mod types;
pub(crate) mod utils;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub use crate::core::error::ConfigError as Error;
use crate::core::{config::Args, state::AppState};
use crate::store::Stores;

pub async fn run() -> Result<(), Error> {
    let config = Args::load()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_new(&config.log_level).unwrap_or_default())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let stores = Stores::connect(&config).await?;

    tokio::fs::create_dir_all(&config.upload_dir).await?;

    let state = AppState::new(&config, stores)?;

    let app = routes::router::routes(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;

    tracing::info!("listening on port {}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
